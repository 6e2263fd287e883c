use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use url::Url;

use crate::domain::errors::LaunchError;
use crate::domain::value_objects::{FeedSource, ProcessHandle, ProcessStatus};

/// Forward progress of one forwarding process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ActivitySnapshot {
    pub bytes_forwarded: u64,
    pub chunks_forwarded: u64,
    pub last_progress_at: Option<Instant>,
}

/// Port for starting and stopping the forwarding process
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    /// Spawn a forwarding process from `source` to `sink_url`. Does not wait
    /// for the stream to come up; later failures show up through `poll`.
    fn start(&self, source: &FeedSource, sink_url: &Url) -> Result<ProcessHandle, LaunchError>;

    /// Ask the process to exit, force it after `grace`. Returns once the
    /// process is gone. Stopping an unknown or stopped handle is a no-op.
    async fn stop(&self, handle: ProcessHandle, grace: Duration);

    /// Non-blocking status. Stopped or unknown handles report `Exited(None)`.
    fn poll(&self, handle: ProcessHandle) -> ProcessStatus;

    /// Progress counters, if the handle is live.
    fn activity(&self, handle: ProcessHandle) -> Option<ActivitySnapshot>;
}
