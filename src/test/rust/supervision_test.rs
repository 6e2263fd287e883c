use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use url::Url;

use micam_bridge::{
    ActivitySnapshot, BackoffPolicy, Credential, DomainError, FeedSource, ForwardingAttempt,
    GatewayEndpoint, HealthProbe, HealthStatus, LaunchError, MetricsReporter, ProcessHandle,
    ProcessLauncher, ProcessStatus, SessionDescriptor, SessionRegistry, StreamOptions,
    SupervisionLifecycle, SupervisionLoop, SupervisionState, SupervisionTimings,
};

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

#[derive(Default)]
struct LauncherState {
    running: HashSet<ProcessHandle>,
    max_concurrent: usize,
}

/// Launcher that spawns nothing and tracks how many "processes" overlap
#[derive(Default)]
struct FakeLauncher {
    next_id: AtomicU64,
    starts: AtomicU32,
    failing_starts: AtomicU32,
    /// Processes linger for the whole grace period before they are gone.
    exits_after_grace: bool,
    state: Mutex<LauncherState>,
}

impl FakeLauncher {
    fn failing_first(n: u32) -> Self {
        let launcher = Self::default();
        launcher.failing_starts.store(n, Ordering::SeqCst);
        launcher
    }

    fn slow_to_exit() -> Self {
        Self {
            exits_after_grace: true,
            ..Self::default()
        }
    }

    fn starts(&self) -> u32 {
        self.starts.load(Ordering::SeqCst)
    }

    fn running(&self) -> usize {
        self.state.lock().unwrap().running.len()
    }

    fn max_concurrent(&self) -> usize {
        self.state.lock().unwrap().max_concurrent
    }
}

#[async_trait]
impl ProcessLauncher for FakeLauncher {
    fn start(&self, _source: &FeedSource, _sink_url: &Url) -> Result<ProcessHandle, LaunchError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        let failing = self.failing_starts.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_starts.store(failing - 1, Ordering::SeqCst);
            return Err(LaunchError::MissingStdin);
        }

        let handle = ProcessHandle::new(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let mut state = self.state.lock().unwrap();
        state.running.insert(handle);
        state.max_concurrent = state.max_concurrent.max(state.running.len());
        Ok(handle)
    }

    async fn stop(&self, handle: ProcessHandle, grace: Duration) {
        if self.exits_after_grace && self.state.lock().unwrap().running.contains(&handle) {
            tokio::time::sleep(grace).await;
        }
        self.state.lock().unwrap().running.remove(&handle);
    }

    fn poll(&self, handle: ProcessHandle) -> ProcessStatus {
        if self.state.lock().unwrap().running.contains(&handle) {
            ProcessStatus::Running
        } else {
            ProcessStatus::Exited(None)
        }
    }

    fn activity(&self, _handle: ProcessHandle) -> Option<ActivitySnapshot> {
        None
    }
}

/// Probe answering from a fixed script
struct ScriptedProbe {
    script: Vec<HealthStatus>,
    cycle: bool,
    calls: AtomicU32,
}

impl ScriptedProbe {
    /// Plays `script` once, then keeps answering with its last entry.
    fn new(script: Vec<HealthStatus>) -> Self {
        Self {
            script,
            cycle: false,
            calls: AtomicU32::new(0),
        }
    }

    /// Plays `pattern` over and over.
    fn cycling(pattern: Vec<HealthStatus>) -> Self {
        Self {
            script: pattern,
            cycle: true,
            calls: AtomicU32::new(0),
        }
    }

    fn always(status: HealthStatus) -> Self {
        Self::new(vec![status])
    }
}

#[async_trait]
impl HealthProbe for ScriptedProbe {
    async fn check(&self, _attempt: &ForwardingAttempt) -> HealthStatus {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
        let index = if self.cycle {
            call % self.script.len()
        } else {
            call.min(self.script.len() - 1)
        };
        self.script[index]
    }
}

/// Probe that never answers
struct HangingProbe;

#[async_trait]
impl HealthProbe for HangingProbe {
    async fn check(&self, _attempt: &ForwardingAttempt) -> HealthStatus {
        std::future::pending::<HealthStatus>().await
    }
}

#[derive(Default)]
struct RecordingReporter {
    states: Mutex<Vec<SupervisionState>>,
    backoffs: Mutex<Vec<Duration>>,
    failures: Mutex<Vec<u32>>,
    probes: Mutex<Vec<HealthStatus>>,
    attempts: AtomicU32,
}

impl RecordingReporter {
    fn states(&self) -> Vec<SupervisionState> {
        self.states.lock().unwrap().clone()
    }

    fn backoffs(&self) -> Vec<Duration> {
        self.backoffs.lock().unwrap().clone()
    }

    fn failures(&self) -> Vec<u32> {
        self.failures.lock().unwrap().clone()
    }

    fn probes(&self) -> Vec<HealthStatus> {
        self.probes.lock().unwrap().clone()
    }

    fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl MetricsReporter for RecordingReporter {
    fn report_state_change(&self, state: &SupervisionState) {
        self.states.lock().unwrap().push(*state);
    }

    fn report_attempt_started(&self) {
        self.attempts.fetch_add(1, Ordering::SeqCst);
    }

    fn report_backoff(&self, delay: Duration) {
        self.backoffs.lock().unwrap().push(delay);
    }

    fn report_failures(&self, consecutive: u32) {
        self.failures.lock().unwrap().push(consecutive);
    }

    fn report_probe(&self, status: &HealthStatus) {
        self.probes.lock().unwrap().push(*status);
    }

    fn report_uptime(&self, _uptime_secs: f64) {}
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn session(camera_id: &str) -> SessionDescriptor {
    let gateway = GatewayEndpoint::new("https://miloco:8000", "admin", false).unwrap();
    let source = FeedSource::new(
        camera_id,
        Credential::new("e10adc3949ba59abbe56e057f20f883e"),
        gateway,
        StreamOptions::default(),
    )
    .unwrap();
    SessionDescriptor::new(source, "rtsp://go2rtc:8554/xiaomi").unwrap()
}

fn timings() -> SupervisionTimings {
    SupervisionTimings {
        probe_interval: Duration::from_secs(1),
        probe_timeout: Duration::from_millis(500),
        liveness_window: Duration::from_secs(10),
        startup_timeout: Duration::from_secs(30),
        sustained_healthy_probes: 3,
        stop_grace: Duration::from_millis(100),
    }
}

/// Default growth, no jitter, so delays are exact.
fn exact_backoff() -> BackoffPolicy {
    BackoffPolicy::new(Duration::from_secs(1), Duration::from_secs(30), 2.0, 0.0).unwrap()
}

fn supervision(
    launcher: &Arc<FakeLauncher>,
    probe: impl HealthProbe + 'static,
    reporter: &Arc<RecordingReporter>,
    backoff: BackoffPolicy,
) -> SupervisionLoop {
    SupervisionLoop::new(
        session("1085493829"),
        launcher.clone(),
        Arc::new(probe),
        reporter.clone(),
        backoff,
        timings(),
    )
}

/// Run `supervision` for `period` of (paused) time, then shut it down.
async fn run_for(supervision: SupervisionLoop, period: Duration) -> SupervisionLifecycle {
    let shutdown = supervision.shutdown_token();
    let task = tokio::spawn(supervision.run());
    tokio::time::sleep(period).await;
    shutdown.cancel();
    task.await.unwrap()
}

fn secs(values: &[u64]) -> Vec<Duration> {
    values.iter().map(|s| Duration::from_secs(*s)).collect()
}

use SupervisionState::{BackingOff, Forwarding, Idle, Starting, Stopped};

// ---------------------------------------------------------------------------
// Supervision loop
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_healthy_start_reaches_forwarding() {
    let launcher = Arc::new(FakeLauncher::default());
    let reporter = Arc::new(RecordingReporter::default());
    let probe = ScriptedProbe::always(HealthStatus::Healthy);

    let lifecycle = run_for(
        supervision(&launcher, probe, &reporter, exact_backoff()),
        Duration::from_secs(10),
    )
    .await;

    assert_eq!(reporter.states(), vec![Starting, Forwarding, Stopped]);
    assert_eq!(launcher.starts(), 1);
    assert_eq!(reporter.attempts(), 1);
    assert!(reporter.backoffs().is_empty());
    assert_eq!(lifecycle.attempts_started(), 1);
    assert_eq!(lifecycle.consecutive_failures(), 0);
    assert_eq!(*lifecycle.current_state(), Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_process_death_backs_off_then_recovers() {
    let launcher = Arc::new(FakeLauncher::default());
    let reporter = Arc::new(RecordingReporter::default());
    let probe = ScriptedProbe::new(vec![
        HealthStatus::Dead { exit_code: Some(1) },
        HealthStatus::Healthy,
    ]);

    let lifecycle = run_for(
        supervision(&launcher, probe, &reporter, exact_backoff()),
        Duration::from_secs(10),
    )
    .await;

    assert_eq!(
        reporter.states(),
        vec![Starting, BackingOff, Starting, Forwarding, Stopped]
    );
    assert_eq!(reporter.backoffs(), secs(&[1]));
    assert_eq!(launcher.starts(), 2);

    let backoff = lifecycle
        .history()
        .find(|t| t.to == BackingOff)
        .expect("backoff transition recorded");
    assert!(backoff.reason.as_deref().unwrap().contains("exit code 1"));
}

#[tokio::test(start_paused = true)]
async fn test_repeated_stalls_double_the_delay() {
    let launcher = Arc::new(FakeLauncher::default());
    let reporter = Arc::new(RecordingReporter::default());
    let probe = ScriptedProbe::new(vec![
        HealthStatus::Stalled,
        HealthStatus::Stalled,
        HealthStatus::Stalled,
        HealthStatus::Healthy,
    ]);

    // Stalls at t=1, 3 and 6; healthy from t=11 on.
    let lifecycle = run_for(
        supervision(&launcher, probe, &reporter, exact_backoff()),
        Duration::from_secs(20),
    )
    .await;

    assert_eq!(reporter.backoffs(), secs(&[1, 2, 4]));
    assert_eq!(launcher.starts(), 4);
    assert_eq!(
        reporter.states(),
        vec![
            Starting, BackingOff, Starting, BackingOff, Starting, BackingOff, Starting,
            Forwarding, Stopped
        ]
    );
    // Nine healthy probes since t=11 reset the count.
    assert_eq!(lifecycle.consecutive_failures(), 0);
    assert_eq!(reporter.failures(), vec![1, 2, 3, 0]);
}

#[tokio::test(start_paused = true)]
async fn test_flapping_connection_keeps_growing_the_delay() {
    let launcher = Arc::new(FakeLauncher::default());
    let reporter = Arc::new(RecordingReporter::default());
    let probe = ScriptedProbe::cycling(vec![HealthStatus::Healthy, HealthStatus::Stalled]);

    let lifecycle = run_for(
        supervision(&launcher, probe, &reporter, exact_backoff()),
        Duration::from_secs(120),
    )
    .await;

    let backoffs = reporter.backoffs();
    assert!(backoffs.len() >= 7);
    assert_eq!(backoffs[..7], secs(&[1, 2, 4, 8, 16, 30, 30])[..]);
    assert!(!reporter.failures().contains(&0));
    assert!(lifecycle.consecutive_failures() >= 7);
}

#[tokio::test(start_paused = true)]
async fn test_sustained_health_resets_the_delay() {
    let launcher = Arc::new(FakeLauncher::default());
    let reporter = Arc::new(RecordingReporter::default());
    let probe = ScriptedProbe::new(vec![
        HealthStatus::Stalled,
        HealthStatus::Stalled,
        HealthStatus::Healthy,
        HealthStatus::Healthy,
        HealthStatus::Healthy,
        HealthStatus::Stalled,
        HealthStatus::Healthy,
    ]);

    run_for(
        supervision(&launcher, probe, &reporter, exact_backoff()),
        Duration::from_secs(30),
    )
    .await;

    // Third failure after a sustained healthy run starts from the initial delay.
    assert_eq!(reporter.backoffs(), secs(&[1, 2, 1]));
}

#[tokio::test(start_paused = true)]
async fn test_short_healthy_run_does_not_reset() {
    let launcher = Arc::new(FakeLauncher::default());
    let reporter = Arc::new(RecordingReporter::default());
    let probe = ScriptedProbe::new(vec![
        HealthStatus::Stalled,
        HealthStatus::Healthy,
        HealthStatus::Healthy,
        HealthStatus::Stalled,
        HealthStatus::Healthy,
    ]);

    run_for(
        supervision(&launcher, probe, &reporter, exact_backoff()),
        Duration::from_secs(20),
    )
    .await;

    assert_eq!(reporter.backoffs(), secs(&[1, 2]));
}

#[tokio::test(start_paused = true)]
async fn test_awaiting_probes_keep_the_attempt_starting() {
    let launcher = Arc::new(FakeLauncher::default());
    let reporter = Arc::new(RecordingReporter::default());
    let probe = ScriptedProbe::new(vec![
        HealthStatus::Awaiting,
        HealthStatus::Awaiting,
        HealthStatus::Awaiting,
        HealthStatus::Healthy,
    ]);

    run_for(
        supervision(&launcher, probe, &reporter, exact_backoff()),
        Duration::from_secs(10),
    )
    .await;

    assert_eq!(reporter.states(), vec![Starting, Forwarding, Stopped]);
    assert_eq!(launcher.starts(), 1);
    assert_eq!(
        reporter.probes()[..4],
        [
            HealthStatus::Awaiting,
            HealthStatus::Awaiting,
            HealthStatus::Awaiting,
            HealthStatus::Healthy
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_probe_timeout_counts_as_stalled() {
    let launcher = Arc::new(FakeLauncher::default());
    let reporter = Arc::new(RecordingReporter::default());

    let lifecycle = run_for(
        supervision(&launcher, HangingProbe, &reporter, exact_backoff()),
        Duration::from_secs(3),
    )
    .await;

    let backoff = lifecycle
        .history()
        .find(|t| t.to == BackingOff)
        .expect("backoff transition recorded");
    assert_eq!(backoff.from, Starting);
    assert!(backoff.reason.as_deref().unwrap().starts_with("stalled"));
    assert_eq!(reporter.backoffs()[0], Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_launch_failure_backs_off() {
    let launcher = Arc::new(FakeLauncher::failing_first(1));
    let reporter = Arc::new(RecordingReporter::default());
    let probe = ScriptedProbe::always(HealthStatus::Healthy);

    let lifecycle = run_for(
        supervision(&launcher, probe, &reporter, exact_backoff()),
        Duration::from_secs(10),
    )
    .await;

    assert_eq!(
        reporter.states(),
        vec![Starting, BackingOff, Starting, Forwarding, Stopped]
    );
    assert_eq!(reporter.backoffs(), secs(&[1]));
    let backoff = lifecycle
        .history()
        .find(|t| t.to == BackingOff)
        .expect("backoff transition recorded");
    assert!(backoff
        .reason
        .as_deref()
        .unwrap()
        .starts_with("launch failed"));
}

#[tokio::test(start_paused = true)]
async fn test_restart_forces_a_fresh_attempt() {
    let launcher = Arc::new(FakeLauncher::default());
    let reporter = Arc::new(RecordingReporter::default());
    let probe = ScriptedProbe::always(HealthStatus::Healthy);

    let supervision = supervision(&launcher, probe, &reporter, exact_backoff());
    let shutdown = supervision.shutdown_token();
    let restart = supervision.restart_handle();
    let mut state = supervision.subscribe();
    let task = tokio::spawn(supervision.run());

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(*state.borrow_and_update(), Forwarding);

    restart.notify_one();
    tokio::time::sleep(Duration::from_secs(5)).await;
    shutdown.cancel();
    let lifecycle = task.await.unwrap();

    assert_eq!(
        reporter.states(),
        vec![Starting, Forwarding, Idle, Starting, Forwarding, Stopped]
    );
    assert_eq!(launcher.starts(), 2);
    assert_eq!(launcher.max_concurrent(), 1);
    assert!(reporter.backoffs().is_empty());
    assert_eq!(lifecycle.attempts_started(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_restart_skips_the_remaining_backoff() {
    let launcher = Arc::new(FakeLauncher::default());
    let reporter = Arc::new(RecordingReporter::default());
    let probe = ScriptedProbe::new(vec![HealthStatus::Stalled, HealthStatus::Healthy]);
    let long_backoff =
        BackoffPolicy::new(Duration::from_secs(60), Duration::from_secs(120), 2.0, 0.0).unwrap();

    let supervision = supervision(&launcher, probe, &reporter, long_backoff);
    let shutdown = supervision.shutdown_token();
    let restart = supervision.restart_handle();
    let state = supervision.subscribe();
    let task = tokio::spawn(supervision.run());

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(*state.borrow(), BackingOff);

    restart.notify_one();
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(*state.borrow(), Forwarding);

    shutdown.cancel();
    task.await.unwrap();
    assert_eq!(launcher.starts(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_during_backoff_stops_promptly() {
    let launcher = Arc::new(FakeLauncher::default());
    let reporter = Arc::new(RecordingReporter::default());
    let probe = ScriptedProbe::always(HealthStatus::Dead { exit_code: None });
    let long_backoff =
        BackoffPolicy::new(Duration::from_secs(60), Duration::from_secs(120), 2.0, 0.0).unwrap();

    let supervision = supervision(&launcher, probe, &reporter, long_backoff);
    let shutdown = supervision.shutdown_token();
    let state = supervision.subscribe();
    let task = tokio::spawn(supervision.run());

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(*state.borrow(), BackingOff);

    let cancelled_at = Instant::now();
    shutdown.cancel();
    let lifecycle = task.await.unwrap();

    assert!(cancelled_at.elapsed() < Duration::from_secs(1));
    assert_eq!(*lifecycle.current_state(), Stopped);
    assert_eq!(*state.borrow(), Stopped);
    assert_eq!(launcher.running(), 0);
    assert_eq!(launcher.starts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_while_forwarding_stops_the_process() {
    let launcher = Arc::new(FakeLauncher::default());
    let reporter = Arc::new(RecordingReporter::default());
    let probe = ScriptedProbe::always(HealthStatus::Healthy);

    let lifecycle = run_for(
        supervision(&launcher, probe, &reporter, exact_backoff()),
        Duration::from_secs(5),
    )
    .await;

    assert_eq!(launcher.running(), 0);
    let last = lifecycle.last_transition().unwrap();
    assert_eq!(last.from, Forwarding);
    assert_eq!(last.to, Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_waits_at_most_grace_plus_one_interval() {
    let launcher = Arc::new(FakeLauncher::slow_to_exit());
    let reporter = Arc::new(RecordingReporter::default());
    let health = ScriptedProbe::always(HealthStatus::Healthy);

    let supervision = supervision(&launcher, health, &reporter, exact_backoff());
    let shutdown = supervision.shutdown_token();
    let state = supervision.subscribe();
    let task = tokio::spawn(supervision.run());

    tokio::time::sleep(Duration::from_millis(5500)).await;
    assert_eq!(*state.borrow(), Forwarding);
    assert_eq!(launcher.running(), 1);

    let cancelled_at = Instant::now();
    shutdown.cancel();
    let lifecycle = task.await.unwrap();
    let elapsed = cancelled_at.elapsed();

    let timings = timings();
    assert!(elapsed >= timings.stop_grace, "stopped after {:?}", elapsed);
    assert!(
        elapsed <= timings.stop_grace + timings.probe_interval,
        "stopped after {:?}",
        elapsed
    );
    assert_eq!(*lifecycle.current_state(), Stopped);
    assert_eq!(*state.borrow(), Stopped);
    assert_eq!(launcher.running(), 0);
    assert_eq!(launcher.starts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_never_more_than_one_live_process() {
    let launcher = Arc::new(FakeLauncher::default());
    let reporter = Arc::new(RecordingReporter::default());
    let probe = ScriptedProbe::cycling(vec![
        HealthStatus::Healthy,
        HealthStatus::Dead { exit_code: Some(1) },
        HealthStatus::Stalled,
    ]);

    run_for(
        supervision(&launcher, probe, &reporter, exact_backoff()),
        Duration::from_secs(90),
    )
    .await;

    assert!(launcher.starts() > 5);
    assert_eq!(launcher.max_concurrent(), 1);
    assert_eq!(launcher.running(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_jittered_delays_stay_within_policy() {
    let launcher = Arc::new(FakeLauncher::default());
    let reporter = Arc::new(RecordingReporter::default());
    let probe = ScriptedProbe::always(HealthStatus::Stalled);

    run_for(
        supervision(&launcher, probe, &reporter, BackoffPolicy::default()),
        Duration::from_secs(200),
    )
    .await;

    let policy = BackoffPolicy::default();
    let backoffs = reporter.backoffs();
    assert!(backoffs.len() >= 6);
    for (failures, delay) in backoffs.iter().enumerate() {
        let nominal = policy.delay_for(failures as u32).as_secs_f64();
        assert!(delay.as_secs_f64() >= nominal * 0.8 - 1e-6);
        assert!(delay.as_secs_f64() <= nominal * 1.2 + 1e-6);
        assert!(*delay <= policy.max_delay());
    }
}

// ---------------------------------------------------------------------------
// Session registry
// ---------------------------------------------------------------------------

fn registry_loop(camera_id: &str, launcher: &Arc<FakeLauncher>) -> SupervisionLoop {
    SupervisionLoop::new(
        session(camera_id),
        launcher.clone(),
        Arc::new(ScriptedProbe::always(HealthStatus::Healthy)),
        Arc::new(RecordingReporter::default()),
        exact_backoff(),
        timings(),
    )
}

#[tokio::test(start_paused = true)]
async fn test_registry_runs_independent_sessions() {
    let launcher = Arc::new(FakeLauncher::default());
    let mut registry = SessionRegistry::new();
    registry.spawn(registry_loop("front-door", &launcher)).unwrap();
    registry.spawn(registry_loop("garage", &launcher)).unwrap();
    assert_eq!(registry.len(), 2);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(registry.all_forwarding());
    assert_eq!(registry.state("garage"), Some(Forwarding));
    assert_eq!(launcher.running(), 2);

    registry.shutdown().await;
    assert!(registry.states().values().all(|s| *s == Stopped));
    assert_eq!(launcher.running(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_registry_rejects_duplicate_camera() {
    let launcher = Arc::new(FakeLauncher::default());
    let mut registry = SessionRegistry::new();
    registry.spawn(registry_loop("garage", &launcher)).unwrap();

    let result = registry.spawn(registry_loop("garage", &launcher));
    assert!(matches!(result, Err(DomainError::DuplicateSession(id)) if id == "garage"));

    registry.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_registry_restart_unknown_camera() {
    let registry = SessionRegistry::new();
    assert!(registry.is_empty());
    assert!(!registry.all_forwarding());
    assert!(matches!(
        registry.restart("porch"),
        Err(DomainError::UnknownSession(id)) if id == "porch"
    ));
}
