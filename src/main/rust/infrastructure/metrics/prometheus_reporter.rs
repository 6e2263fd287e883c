use std::time::Duration;

use lazy_static::lazy_static;
use prometheus::{Encoder, GaugeVec, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};

use crate::domain::ports::MetricsReporter;
use crate::domain::value_objects::{HealthStatus, SupervisionState};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // Supervision state (0=Idle, 1=Starting, 2=Forwarding, 3=BackingOff, 4=Stopped)
    pub static ref SUPERVISION_STATE: GaugeVec = GaugeVec::new(
        Opts::new("micam_supervision_state", "Current supervision state"),
        &["camera"]
    ).expect("metric can be created");

    pub static ref FORWARDING_ATTEMPTS: IntCounterVec = IntCounterVec::new(
        Opts::new("micam_forwarding_attempts_total", "Total number of forwarding attempts"),
        &["camera"]
    ).expect("metric can be created");

    pub static ref BACKOFF_SECONDS: GaugeVec = GaugeVec::new(
        Opts::new("micam_backoff_seconds", "Most recent backoff delay"),
        &["camera"]
    ).expect("metric can be created");

    pub static ref CONSECUTIVE_FAILURES: IntGaugeVec = IntGaugeVec::new(
        Opts::new("micam_consecutive_failures", "Failures since the last sustained healthy period"),
        &["camera"]
    ).expect("metric can be created");

    pub static ref UPTIME_SECONDS: GaugeVec = GaugeVec::new(
        Opts::new("micam_forwarding_uptime_seconds", "Time since forwarding became healthy"),
        &["camera"]
    ).expect("metric can be created");

    pub static ref PROBE_RESULTS: IntCounterVec = IntCounterVec::new(
        Opts::new("micam_probe_results_total", "Health probe results"),
        &["camera", "result"]
    ).expect("metric can be created");
}

/// Reports one session's metrics, labelled with its camera id
pub struct PrometheusReporter {
    camera_id: String,
}

impl PrometheusReporter {
    pub fn new(camera_id: impl Into<String>) -> Self {
        Self {
            camera_id: camera_id.into(),
        }
    }

    pub fn init_metrics() -> Result<(), prometheus::Error> {
        REGISTRY.register(Box::new(SUPERVISION_STATE.clone()))?;
        REGISTRY.register(Box::new(FORWARDING_ATTEMPTS.clone()))?;
        REGISTRY.register(Box::new(BACKOFF_SECONDS.clone()))?;
        REGISTRY.register(Box::new(CONSECUTIVE_FAILURES.clone()))?;
        REGISTRY.register(Box::new(UPTIME_SECONDS.clone()))?;
        REGISTRY.register(Box::new(PROBE_RESULTS.clone()))?;
        Ok(())
    }

    pub fn gather_metrics() -> Vec<u8> {
        let encoder = TextEncoder::new();
        let metric_families = REGISTRY.gather();
        let mut buffer = vec![];
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::error!("Failed to encode metrics: {}", e);
            return b"# Error encoding metrics\n".to_vec();
        }
        buffer
    }
}

impl MetricsReporter for PrometheusReporter {
    fn report_state_change(&self, state: &SupervisionState) {
        SUPERVISION_STATE
            .with_label_values(&[self.camera_id.as_str()])
            .set(state.as_metric());
        if !state.is_forwarding() {
            UPTIME_SECONDS.with_label_values(&[self.camera_id.as_str()]).set(0.0);
        }
    }

    fn report_attempt_started(&self) {
        FORWARDING_ATTEMPTS
            .with_label_values(&[self.camera_id.as_str()])
            .inc();
    }

    fn report_backoff(&self, delay: Duration) {
        BACKOFF_SECONDS
            .with_label_values(&[self.camera_id.as_str()])
            .set(delay.as_secs_f64());
    }

    fn report_failures(&self, consecutive: u32) {
        CONSECUTIVE_FAILURES
            .with_label_values(&[self.camera_id.as_str()])
            .set(i64::from(consecutive));
    }

    fn report_probe(&self, status: &HealthStatus) {
        PROBE_RESULTS
            .with_label_values(&[self.camera_id.as_str(), status.as_label()])
            .inc();
    }

    fn report_uptime(&self, uptime_secs: f64) {
        UPTIME_SECONDS
            .with_label_values(&[self.camera_id.as_str()])
            .set(uptime_secs);
    }
}
