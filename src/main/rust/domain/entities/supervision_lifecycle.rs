use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

use crate::domain::value_objects::SupervisionState;

/// Transitions kept for diagnostics; older entries are dropped.
const HISTORY_LIMIT: usize = 64;

/// State transition record
#[derive(Debug, Clone)]
pub struct StateTransition {
    pub from: SupervisionState,
    pub to: SupervisionState,
    pub timestamp: Instant,
    pub time_in_previous: Duration,
    pub reason: Option<String>,
}

/// Domain entity holding the supervision state of one session
#[derive(Debug)]
pub struct SupervisionLifecycle {
    current_state: SupervisionState,
    entered_at: Instant,
    history: VecDeque<StateTransition>,
    transition_count: u64,
    consecutive_failures: u32,
    attempts_started: u64,
    forwarding_since: Option<Instant>,
}

impl SupervisionLifecycle {
    pub fn new() -> Self {
        Self {
            current_state: SupervisionState::Idle,
            entered_at: Instant::now(),
            history: VecDeque::with_capacity(HISTORY_LIMIT),
            transition_count: 0,
            consecutive_failures: 0,
            attempts_started: 0,
            forwarding_since: None,
        }
    }

    pub fn current_state(&self) -> &SupervisionState {
        &self.current_state
    }

    pub fn transition_count(&self) -> u64 {
        self.transition_count
    }

    pub fn last_transition(&self) -> Option<&StateTransition> {
        self.history.back()
    }

    pub fn history(&self) -> impl Iterator<Item = &StateTransition> {
        self.history.iter()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn attempts_started(&self) -> u64 {
        self.attempts_started
    }

    /// Time spent in the current forwarding stretch
    pub fn forwarding_uptime(&self) -> Option<Duration> {
        self.forwarding_since.map(|start| start.elapsed())
    }

    /// Returns the number of the attempt being started (1-based).
    pub fn record_attempt_started(&mut self) -> u64 {
        self.attempts_started += 1;
        self.attempts_started
    }

    /// Count a failure. Returns the count before this failure, which is the
    /// backoff exponent for the delay that follows it.
    pub fn record_failure(&mut self) -> u32 {
        let previous = self.consecutive_failures;
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        previous
    }

    /// Clear the failure count after sustained health. Returns true if it was non-zero.
    pub fn reset_failures(&mut self) -> bool {
        let had_failures = self.consecutive_failures > 0;
        self.consecutive_failures = 0;
        had_failures
    }

    pub fn transition_to_idle(&mut self, reason: Option<String>) -> StateTransition {
        self.record_transition(SupervisionState::Idle, reason)
    }

    pub fn transition_to_starting(&mut self, reason: Option<String>) -> StateTransition {
        self.record_transition(SupervisionState::Starting, reason)
    }

    pub fn transition_to_forwarding(&mut self, reason: Option<String>) -> StateTransition {
        self.forwarding_since = Some(Instant::now());
        self.record_transition(SupervisionState::Forwarding, reason)
    }

    pub fn transition_to_backing_off(&mut self, reason: Option<String>) -> StateTransition {
        self.record_transition(SupervisionState::BackingOff, reason)
    }

    pub fn transition_to_stopped(&mut self, reason: Option<String>) -> StateTransition {
        self.record_transition(SupervisionState::Stopped, reason)
    }

    fn record_transition(
        &mut self,
        new_state: SupervisionState,
        reason: Option<String>,
    ) -> StateTransition {
        let now = Instant::now();
        if new_state != SupervisionState::Forwarding {
            self.forwarding_since = None;
        }

        let transition = StateTransition {
            from: self.current_state,
            to: new_state,
            timestamp: now,
            time_in_previous: now.duration_since(self.entered_at),
            reason,
        };

        if self.history.len() == HISTORY_LIMIT {
            self.history.pop_front();
        }
        self.history.push_back(transition.clone());
        self.transition_count += 1;
        self.current_state = new_state;
        self.entered_at = now;

        transition
    }
}

impl Default for SupervisionLifecycle {
    fn default() -> Self {
        Self::new()
    }
}
