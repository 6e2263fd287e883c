use std::fmt;

/// Result of a single health probe against a forwarding attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    /// Data was forwarded within the liveness window
    Healthy,
    /// Process running, nothing forwarded yet, still inside the startup window
    Awaiting,
    /// Process running but no forward progress
    Stalled,
    /// Forwarding process exited
    Dead { exit_code: Option<i32> },
}

impl HealthStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Stalled | Self::Dead { .. })
    }

    /// Label used for metrics
    pub fn as_label(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Awaiting => "awaiting",
            Self::Stalled => "stalled",
            Self::Dead { .. } => "dead",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Awaiting => write!(f, "awaiting first data"),
            Self::Stalled => write!(f, "stalled (no forward progress)"),
            Self::Dead {
                exit_code: Some(code),
            } => write!(f, "dead (exit code {})", code),
            Self::Dead { exit_code: None } => write!(f, "dead"),
        }
    }
}
