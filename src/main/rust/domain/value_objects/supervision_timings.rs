use std::time::Duration;

use crate::domain::errors::ConfigError;

/// Probe cadence, liveness thresholds and shutdown grace for one session
#[derive(Debug, Clone, PartialEq)]
pub struct SupervisionTimings {
    /// Time between health probes
    pub probe_interval: Duration,
    /// A probe taking longer than this counts as stalled
    pub probe_timeout: Duration,
    /// Maximum silence before a running attempt is considered stalled
    pub liveness_window: Duration,
    /// How long a fresh attempt may go without any data (login, keyframe wait)
    pub startup_timeout: Duration,
    /// Consecutive healthy probes needed before the failure count resets
    pub sustained_healthy_probes: u32,
    /// Time given to the forwarding process to exit before it is killed
    pub stop_grace: Duration,
}

impl SupervisionTimings {
    pub fn validate(self) -> Result<Self, ConfigError> {
        if self.probe_interval.is_zero() {
            return Err(ConfigError::InvalidSetting(
                "probe interval cannot be 0".to_string(),
            ));
        }
        if self.probe_timeout.is_zero() || self.probe_timeout >= self.probe_interval {
            return Err(ConfigError::InvalidSetting(format!(
                "probe timeout ({:?}) must be non-zero and shorter than the probe interval ({:?})",
                self.probe_timeout, self.probe_interval
            )));
        }
        if self.liveness_window < self.probe_interval {
            return Err(ConfigError::InvalidSetting(format!(
                "liveness window ({:?}) cannot be shorter than the probe interval ({:?})",
                self.liveness_window, self.probe_interval
            )));
        }
        if self.startup_timeout < self.liveness_window {
            return Err(ConfigError::InvalidSetting(format!(
                "startup timeout ({:?}) cannot be shorter than the liveness window ({:?})",
                self.startup_timeout, self.liveness_window
            )));
        }
        if self.sustained_healthy_probes == 0 {
            return Err(ConfigError::InvalidSetting(
                "sustained healthy probe count cannot be 0".to_string(),
            ));
        }
        Ok(self)
    }
}

impl Default for SupervisionTimings {
    fn default() -> Self {
        Self {
            probe_interval: Duration::from_secs(2),
            probe_timeout: Duration::from_secs(1),
            liveness_window: Duration::from_secs(10),
            startup_timeout: Duration::from_secs(30),
            sustained_healthy_probes: 5,
            stop_grace: Duration::from_secs(5),
        }
    }
}
