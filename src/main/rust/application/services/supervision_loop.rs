use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::domain::entities::{ForwardingAttempt, SupervisionLifecycle};
use crate::domain::ports::{HealthProbe, MetricsReporter, ProcessLauncher};
use crate::domain::value_objects::{
    BackoffPolicy, HealthStatus, SessionDescriptor, SupervisionState, SupervisionTimings,
};

/// What interrupted a bounded wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wake {
    Elapsed,
    Shutdown,
    Restart,
}

/// How a forwarding attempt ended
#[derive(Debug)]
enum AttemptOutcome {
    Failed(String),
    Shutdown,
    Restart,
}

/// State machine supervising one camera→RTSP session.
///
/// Starts a forwarding attempt, probes it on a fixed cadence and replaces it
/// with backoff whenever it stalls or dies. Runs until the shutdown token is
/// cancelled. At most one attempt is live at a time: the previous process is
/// always stopped and awaited before the next one is launched.
pub struct SupervisionLoop {
    session: SessionDescriptor,
    launcher: Arc<dyn ProcessLauncher>,
    probe: Arc<dyn HealthProbe>,
    metrics: Arc<dyn MetricsReporter>,
    backoff_policy: BackoffPolicy,
    timings: SupervisionTimings,
    lifecycle: SupervisionLifecycle,
    attempt: Option<ForwardingAttempt>,
    state_tx: watch::Sender<SupervisionState>,
    shutdown: CancellationToken,
    restart: Arc<Notify>,
}

impl SupervisionLoop {
    pub fn new(
        session: SessionDescriptor,
        launcher: Arc<dyn ProcessLauncher>,
        probe: Arc<dyn HealthProbe>,
        metrics: Arc<dyn MetricsReporter>,
        backoff_policy: BackoffPolicy,
        timings: SupervisionTimings,
    ) -> Self {
        let (state_tx, _) = watch::channel(SupervisionState::Idle);
        Self {
            session,
            launcher,
            probe,
            metrics,
            backoff_policy,
            timings,
            lifecycle: SupervisionLifecycle::new(),
            attempt: None,
            state_tx,
            shutdown: CancellationToken::new(),
            restart: Arc::new(Notify::new()),
        }
    }

    pub fn camera_id(&self) -> &str {
        self.session.camera_id()
    }

    /// Cancelling this token stops the loop from any state.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Notifying this forces a fresh attempt without waiting out the backoff.
    pub fn restart_handle(&self) -> Arc<Notify> {
        self.restart.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SupervisionState> {
        self.state_tx.subscribe()
    }

    pub fn current_state(&self) -> SupervisionState {
        *self.lifecycle.current_state()
    }

    /// Supervise until shutdown. Returns the final lifecycle for inspection.
    pub async fn run(mut self) -> SupervisionLifecycle {
        info!(
            camera = %self.camera_id(),
            sink = %self.session.sink_url_redacted(),
            "Supervision started"
        );

        let mut reason = "startup".to_string();
        while !self.shutdown.is_cancelled() {
            let outcome = self.run_attempt(reason).await;
            self.retire_attempt().await;

            reason = match outcome {
                AttemptOutcome::Shutdown => break,
                AttemptOutcome::Restart => self.restart_requested(),
                AttemptOutcome::Failed(why) => match self.back_off(why).await {
                    Wake::Elapsed => "backoff elapsed".to_string(),
                    Wake::Shutdown => break,
                    Wake::Restart => self.restart_requested(),
                },
            };
        }

        self.retire_attempt().await;
        self.transition(SupervisionState::Stopped, "shutdown requested".to_string());
        info!(camera = %self.camera_id(), "Supervision stopped");

        self.lifecycle
    }

    async fn run_attempt(&mut self, reason: String) -> AttemptOutcome {
        // Never overlap two forwarding processes on the same sink.
        self.retire_attempt().await;

        let number = self.lifecycle.record_attempt_started();
        self.transition(SupervisionState::Starting, reason);
        self.metrics.report_attempt_started();

        let handle = match self
            .launcher
            .start(self.session.source(), self.session.sink_url())
        {
            Ok(handle) => handle,
            Err(e) => {
                error!(
                    camera = %self.camera_id(),
                    attempt = number,
                    error = %e,
                    "Failed to launch forwarding process"
                );
                return AttemptOutcome::Failed(format!("launch failed: {}", e));
            }
        };

        info!(
            camera = %self.camera_id(),
            attempt = number,
            process = %handle,
            "Forwarding process launched"
        );
        self.attempt = Some(ForwardingAttempt::new(number, handle));

        self.supervise_attempt().await
    }

    async fn supervise_attempt(&mut self) -> AttemptOutcome {
        loop {
            match self.wait(self.timings.probe_interval).await {
                Wake::Elapsed => {}
                Wake::Shutdown => return AttemptOutcome::Shutdown,
                Wake::Restart => return AttemptOutcome::Restart,
            }

            let status = self.probe_attempt().await;
            self.metrics.report_probe(&status);

            if status.is_failure() {
                warn!(
                    camera = %self.camera_id(),
                    status = %status,
                    was_forwarding = self.attempt.as_ref().is_some_and(|a| a.has_been_healthy()),
                    "Forwarding attempt failed"
                );
                return AttemptOutcome::Failed(status.to_string());
            }

            if status == HealthStatus::Healthy {
                self.on_healthy();
            } else if let Some(attempt) = self.attempt.as_mut() {
                attempt.record_unhealthy();
                debug!(camera = %self.camera_id(), "Waiting for first forwarded data");
            }
        }
    }

    /// A probe that cannot answer within the probe timeout counts as stalled.
    async fn probe_attempt(&self) -> HealthStatus {
        let Some(attempt) = self.attempt.as_ref() else {
            return HealthStatus::Dead { exit_code: None };
        };

        match tokio::time::timeout(self.timings.probe_timeout, self.probe.check(attempt)).await {
            Ok(status) => status,
            Err(_) => {
                warn!(
                    camera = %self.camera_id(),
                    attempt = attempt.number(),
                    timeout = ?self.timings.probe_timeout,
                    "Health probe timed out"
                );
                HealthStatus::Stalled
            }
        }
    }

    fn on_healthy(&mut self) {
        let Some(attempt) = self.attempt.as_mut() else {
            return;
        };
        let streak = attempt.record_healthy();

        if self.current_state() == SupervisionState::Starting {
            self.transition(SupervisionState::Forwarding, "first healthy probe".to_string());
        }

        // Flapping connections must not earn a reset.
        if streak == self.timings.sustained_healthy_probes && self.lifecycle.reset_failures() {
            info!(
                camera = %self.camera_id(),
                healthy_probes = streak,
                "Sustained health, failure count reset"
            );
            self.metrics.report_failures(0);
        }

        if let Some(uptime) = self.lifecycle.forwarding_uptime() {
            self.metrics.report_uptime(uptime.as_secs_f64());
        }
    }

    async fn back_off(&mut self, why: String) -> Wake {
        let exponent = self.lifecycle.record_failure();
        let delay = self.backoff_policy.jittered_delay_for(exponent);

        self.transition(SupervisionState::BackingOff, why);
        self.metrics.report_backoff(delay);
        self.metrics.report_failures(self.lifecycle.consecutive_failures());

        info!(
            camera = %self.camera_id(),
            failures = self.lifecycle.consecutive_failures(),
            delay = ?delay,
            "Retrying after backoff"
        );

        self.wait(delay).await
    }

    fn restart_requested(&mut self) -> String {
        let reason = "restart requested".to_string();
        self.transition(SupervisionState::Idle, reason.clone());
        reason
    }

    /// Stop the live attempt, if any, and wait until its process is gone.
    async fn retire_attempt(&mut self) {
        if let Some(attempt) = self.attempt.take() {
            self.launcher
                .stop(attempt.handle(), self.timings.stop_grace)
                .await;
            debug!(
                camera = %self.camera_id(),
                attempt = attempt.number(),
                lived = ?attempt.age(),
                "Forwarding process stopped"
            );
        }
    }

    async fn wait(&self, period: Duration) -> Wake {
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Wake::Shutdown,
            _ = self.restart.notified() => Wake::Restart,
            _ = tokio::time::sleep(period) => Wake::Elapsed,
        }
    }

    fn transition(&mut self, to: SupervisionState, reason: String) {
        let reason = Some(reason);
        let transition = match to {
            SupervisionState::Idle => self.lifecycle.transition_to_idle(reason),
            SupervisionState::Starting => self.lifecycle.transition_to_starting(reason),
            SupervisionState::Forwarding => self.lifecycle.transition_to_forwarding(reason),
            SupervisionState::BackingOff => self.lifecycle.transition_to_backing_off(reason),
            SupervisionState::Stopped => self.lifecycle.transition_to_stopped(reason),
        };

        info!(
            camera = %self.session.camera_id(),
            from = %transition.from,
            to = %transition.to,
            attempt = self.lifecycle.attempts_started(),
            failures = self.lifecycle.consecutive_failures(),
            time_in_previous = ?transition.time_in_previous,
            reason = transition.reason.as_deref().unwrap_or(""),
            "State transition"
        );

        self.metrics.report_state_change(&to);
        self.state_tx.send_replace(to);
    }
}
