use std::time::Duration;

use tokio::time::Instant;

use crate::domain::value_objects::ProcessHandle;

/// One try at establishing and holding the forwarding path.
///
/// The process behind `handle` is owned by the launcher; the attempt only
/// refers to it.
#[derive(Debug, Clone)]
pub struct ForwardingAttempt {
    number: u64,
    handle: ProcessHandle,
    started_at: Instant,
    last_healthy_signal_at: Option<Instant>,
    healthy_streak: u32,
}

impl ForwardingAttempt {
    pub fn new(number: u64, handle: ProcessHandle) -> Self {
        Self {
            number,
            handle,
            started_at: Instant::now(),
            last_healthy_signal_at: None,
            healthy_streak: 0,
        }
    }

    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn handle(&self) -> ProcessHandle {
        self.handle
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn age(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn has_been_healthy(&self) -> bool {
        self.last_healthy_signal_at.is_some()
    }

    /// Record a healthy probe; returns the current streak length.
    pub fn record_healthy(&mut self) -> u32 {
        self.last_healthy_signal_at = Some(Instant::now());
        self.healthy_streak = self.healthy_streak.saturating_add(1);
        self.healthy_streak
    }

    /// Break the streak without failing the attempt.
    pub fn record_unhealthy(&mut self) {
        self.healthy_streak = 0;
    }
}
