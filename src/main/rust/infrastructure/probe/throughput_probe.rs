use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::domain::entities::ForwardingAttempt;
use crate::domain::ports::{HealthProbe, ProcessLauncher};
use crate::domain::value_objects::{HealthStatus, ProcessStatus};

/// Judges an attempt by process status and the time of its last forwarded chunk
pub struct ThroughputProbe {
    launcher: Arc<dyn ProcessLauncher>,
    liveness_window: Duration,
    startup_timeout: Duration,
}

impl ThroughputProbe {
    pub fn new(
        launcher: Arc<dyn ProcessLauncher>,
        liveness_window: Duration,
        startup_timeout: Duration,
    ) -> Self {
        Self {
            launcher,
            liveness_window,
            startup_timeout,
        }
    }

    /// Health of a running process from its progress timestamps.
    pub fn evaluate(
        &self,
        last_progress_at: Option<Instant>,
        started_at: Instant,
        now: Instant,
    ) -> HealthStatus {
        match last_progress_at {
            Some(at) if now.saturating_duration_since(at) <= self.liveness_window => {
                HealthStatus::Healthy
            }
            Some(_) => HealthStatus::Stalled,
            None if now.saturating_duration_since(started_at) < self.startup_timeout => {
                HealthStatus::Awaiting
            }
            None => HealthStatus::Stalled,
        }
    }
}

#[async_trait]
impl HealthProbe for ThroughputProbe {
    async fn check(&self, attempt: &ForwardingAttempt) -> HealthStatus {
        let handle = attempt.handle();
        if let ProcessStatus::Exited(exit_code) = self.launcher.poll(handle) {
            return HealthStatus::Dead { exit_code };
        }

        let last_progress_at = self
            .launcher
            .activity(handle)
            .and_then(|activity| activity.last_progress_at);
        self.evaluate(last_progress_at, attempt.started_at(), Instant::now())
    }
}
