use std::fmt;

use serde::Serialize;

/// Supervision loop states (pure domain)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SupervisionState {
    /// Not started yet, or about to restart on request
    Idle,
    /// Forwarding process launched, waiting for the first healthy probe
    Starting,
    /// Data is flowing to the sink
    Forwarding,
    /// Last attempt failed, sleeping before the next one
    BackingOff,
    /// Shut down on request (terminal)
    Stopped,
}

impl fmt::Display for SupervisionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::Starting => write!(f, "STARTING"),
            Self::Forwarding => write!(f, "FORWARDING"),
            Self::BackingOff => write!(f, "BACKING_OFF"),
            Self::Stopped => write!(f, "STOPPED"),
        }
    }
}

impl SupervisionState {
    /// Convert state to numeric value for metrics
    pub fn as_metric(&self) -> f64 {
        match self {
            Self::Idle => 0.0,
            Self::Starting => 1.0,
            Self::Forwarding => 2.0,
            Self::BackingOff => 3.0,
            Self::Stopped => 4.0,
        }
    }

    pub fn is_forwarding(&self) -> bool {
        matches!(self, Self::Forwarding)
    }
}

impl Default for SupervisionState {
    fn default() -> Self {
        Self::Idle
    }
}
