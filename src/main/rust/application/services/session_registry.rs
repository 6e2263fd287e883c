use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::sync::{watch, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::SupervisionLoop;
use crate::domain::entities::SupervisionLifecycle;
use crate::domain::errors::{DomainError, Result};
use crate::domain::value_objects::SupervisionState;

struct SessionHandle {
    state: watch::Receiver<SupervisionState>,
    shutdown: CancellationToken,
    restart: Arc<Notify>,
    task: Mutex<Option<JoinHandle<SupervisionLifecycle>>>,
}

/// Independent supervision loops indexed by camera id.
///
/// Sessions share nothing; the registry only holds their control handles.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: HashMap<String, SessionHandle>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `supervision` on the runtime and index it by its camera id.
    pub fn spawn(&mut self, supervision: SupervisionLoop) -> Result<()> {
        let camera_id = supervision.camera_id().to_string();
        if self.sessions.contains_key(&camera_id) {
            return Err(DomainError::DuplicateSession(camera_id));
        }

        let handle = SessionHandle {
            state: supervision.subscribe(),
            shutdown: supervision.shutdown_token(),
            restart: supervision.restart_handle(),
            task: Mutex::new(Some(tokio::spawn(supervision.run()))),
        };

        info!(camera = %camera_id, "Session registered");
        self.sessions.insert(camera_id, handle);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn state(&self, camera_id: &str) -> Option<SupervisionState> {
        self.sessions
            .get(camera_id)
            .map(|session| *session.state.borrow())
    }

    pub fn states(&self) -> BTreeMap<String, SupervisionState> {
        self.sessions
            .iter()
            .map(|(id, session)| (id.clone(), *session.state.borrow()))
            .collect()
    }

    /// True when every session is forwarding.
    pub fn all_forwarding(&self) -> bool {
        !self.sessions.is_empty()
            && self
                .sessions
                .values()
                .all(|session| session.state.borrow().is_forwarding())
    }

    /// Force a fresh forwarding attempt for `camera_id`.
    pub fn restart(&self, camera_id: &str) -> Result<()> {
        let session = self
            .sessions
            .get(camera_id)
            .ok_or_else(|| DomainError::UnknownSession(camera_id.to_string()))?;

        info!(camera = %camera_id, "Restart requested");
        session.restart.notify_one();
        Ok(())
    }

    /// Cancel every session and wait for all of them to reach `Stopped`.
    pub async fn shutdown(&self) {
        for session in self.sessions.values() {
            session.shutdown.cancel();
        }

        for (camera_id, session) in &self.sessions {
            let Some(task) = session.task.lock().await.take() else {
                continue;
            };
            match task.await {
                Ok(lifecycle) => info!(
                    camera = %camera_id,
                    attempts = lifecycle.attempts_started(),
                    transitions = lifecycle.transition_count(),
                    stopped_from = ?lifecycle.last_transition().map(|t| t.from),
                    "Session shut down"
                ),
                Err(e) => error!(camera = %camera_id, error = %e, "Session task failed"),
            }
        }
    }
}
