mod session_registry;
mod supervision_loop;

pub use session_registry::SessionRegistry;
pub use supervision_loop::SupervisionLoop;
