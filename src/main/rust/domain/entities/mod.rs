mod forwarding_attempt;
mod supervision_lifecycle;

pub use forwarding_attempt::ForwardingAttempt;
pub use supervision_lifecycle::{StateTransition, SupervisionLifecycle};
