use std::time::Duration;

use crate::domain::value_objects::{HealthStatus, SupervisionState};

/// Port for metrics reporting
pub trait MetricsReporter: Send + Sync {
    fn report_state_change(&self, state: &SupervisionState);
    fn report_attempt_started(&self);
    fn report_backoff(&self, delay: Duration);
    fn report_failures(&self, consecutive: u32);
    fn report_probe(&self, status: &HealthStatus);
    fn report_uptime(&self, uptime_secs: f64);
}
