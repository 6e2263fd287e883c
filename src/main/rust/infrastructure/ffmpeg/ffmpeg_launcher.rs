use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use super::{pump_feed, FfmpegCommandBuilder, ForwardingActivity};
use crate::domain::errors::LaunchError;
use crate::domain::ports::{ActivitySnapshot, FeedConnector, ProcessLauncher};
use crate::domain::value_objects::{redact_url, FeedSource, ProcessHandle, ProcessStatus};

struct ManagedProcess {
    camera_id: String,
    child: Child,
    pump: JoinHandle<()>,
    stderr: Option<JoinHandle<()>>,
    activity: Arc<ForwardingActivity>,
}

/// Launches ffmpeg fed from the gateway through its stdin.
///
/// Each `start` spawns one ffmpeg process plus the pump task writing the
/// camera feed into it. Processes are spawned with kill-on-drop, so dropping
/// the launcher never leaves one behind.
pub struct FfmpegLauncher {
    program: String,
    connector: Arc<dyn FeedConnector>,
    next_id: AtomicU64,
    processes: Mutex<HashMap<ProcessHandle, ManagedProcess>>,
}

impl FfmpegLauncher {
    pub fn new(program: impl Into<String>, connector: Arc<dyn FeedConnector>) -> Self {
        Self {
            program: program.into(),
            connector,
            next_id: AtomicU64::new(1),
            processes: Mutex::new(HashMap::new()),
        }
    }

    /// Number of processes this launcher has not yet stopped.
    pub fn live_processes(&self) -> usize {
        self.processes().len()
    }

    fn processes(&self) -> MutexGuard<'_, HashMap<ProcessHandle, ManagedProcess>> {
        self.processes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ProcessLauncher for FfmpegLauncher {
    fn start(&self, source: &FeedSource, sink_url: &Url) -> Result<ProcessHandle, LaunchError> {
        let codec = source.stream().codec;
        let camera_id = source.camera_id().to_string();

        info!(
            camera = %camera_id,
            command = %FfmpegCommandBuilder::describe(&self.program, codec, &redact_url(sink_url)),
            "Starting ffmpeg"
        );

        let mut child = Command::new(&self.program)
            .args(FfmpegCommandBuilder::build_args(codec, sink_url.as_str()))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| LaunchError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        // Dropping `child` on this path kills it.
        let stdin = child.stdin.take().ok_or(LaunchError::MissingStdin)?;
        let stderr = child
            .stderr
            .take()
            .map(|stderr| tokio::spawn(log_stderr(stderr, camera_id.clone())));

        let activity = Arc::new(ForwardingActivity::default());
        let pump = tokio::spawn(pump_feed(
            self.connector.clone(),
            source.clone(),
            stdin,
            activity.clone(),
        ));

        let handle = ProcessHandle::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        debug!(camera = %camera_id, process = %handle, pid = ?child.id(), "ffmpeg spawned");

        self.processes().insert(
            handle,
            ManagedProcess {
                camera_id,
                child,
                pump,
                stderr,
                activity,
            },
        );
        Ok(handle)
    }

    async fn stop(&self, handle: ProcessHandle, grace: Duration) {
        let Some(mut process) = self.processes().remove(&handle) else {
            return;
        };

        // Ending the pump closes stdin; ffmpeg flushes and exits on EOF.
        process.pump.abort();
        let _ = process.pump.await;

        match tokio::time::timeout(grace, process.child.wait()).await {
            Ok(Ok(status)) => debug!(
                camera = %process.camera_id,
                process = %handle,
                exit_code = ?status.code(),
                "ffmpeg exited"
            ),
            Ok(Err(e)) => warn!(
                camera = %process.camera_id,
                process = %handle,
                error = %e,
                "Failed waiting for ffmpeg"
            ),
            Err(_) => {
                warn!(
                    camera = %process.camera_id,
                    process = %handle,
                    grace = ?grace,
                    "ffmpeg did not exit in time, killing"
                );
                if let Err(e) = process.child.kill().await {
                    warn!(camera = %process.camera_id, error = %e, "Failed to kill ffmpeg");
                }
            }
        }

        if let Some(stderr) = process.stderr {
            stderr.abort();
        }
    }

    fn poll(&self, handle: ProcessHandle) -> ProcessStatus {
        let mut processes = self.processes();
        let Some(process) = processes.get_mut(&handle) else {
            return ProcessStatus::Exited(None);
        };

        match process.child.try_wait() {
            Ok(None) => ProcessStatus::Running,
            Ok(Some(status)) => ProcessStatus::Exited(status.code()),
            Err(e) => {
                warn!(camera = %process.camera_id, error = %e, "Failed to poll ffmpeg");
                ProcessStatus::Exited(None)
            }
        }
    }

    fn activity(&self, handle: ProcessHandle) -> Option<ActivitySnapshot> {
        self.processes()
            .get(&handle)
            .map(|process| process.activity.snapshot())
    }
}

async fn log_stderr<R>(stderr: R, camera_id: String)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim();
        if !line.is_empty() {
            warn!(camera = %camera_id, "ffmpeg: {}", line);
        }
    }
}
