use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures::StreamExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::domain::ports::{ActivitySnapshot, FeedConnector};
use crate::domain::value_objects::{FeedSource, KeyframeGate};

/// Progress counters shared between a pump and the launcher that owns it
#[derive(Debug, Default)]
pub struct ForwardingActivity {
    bytes: AtomicU64,
    chunks: AtomicU64,
    last_progress_at: Mutex<Option<Instant>>,
}

impl ForwardingActivity {
    pub fn record(&self, len: usize) {
        self.bytes.fetch_add(len as u64, Ordering::Relaxed);
        self.chunks.fetch_add(1, Ordering::Relaxed);
        *self
            .last_progress_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
    }

    pub fn snapshot(&self) -> ActivitySnapshot {
        ActivitySnapshot {
            bytes_forwarded: self.bytes.load(Ordering::Relaxed),
            chunks_forwarded: self.chunks.load(Ordering::Relaxed),
            last_progress_at: *self
                .last_progress_at
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        }
    }
}

/// Copy the gateway feed into `sink` until either side ends.
///
/// Chunks before the first keyframe are dropped. Returning drops `sink`,
/// which for ffmpeg's stdin means end of input.
pub async fn pump_feed<W>(
    connector: Arc<dyn FeedConnector>,
    source: FeedSource,
    mut sink: W,
    activity: Arc<ForwardingActivity>,
) where
    W: AsyncWrite + Unpin,
{
    let camera_id = source.camera_id();

    let mut frames = match connector.connect(&source).await {
        Ok(frames) => frames,
        Err(e) => {
            warn!(camera = %camera_id, error = %e, "Gateway feed unavailable");
            return;
        }
    };
    info!(camera = %camera_id, "Gateway feed connected, waiting for keyframe");

    let mut gate = KeyframeGate::new(source.stream().codec);
    while let Some(frame) = frames.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                warn!(camera = %camera_id, error = %e, "Gateway feed failed");
                break;
            }
        };

        let was_open = gate.is_open();
        if !gate.admit(&frame) {
            continue;
        }
        if !was_open {
            info!(camera = %camera_id, "Keyframe received, forwarding started");
        }

        if let Err(e) = sink.write_all(&frame).await {
            warn!(camera = %camera_id, error = %e, "Forwarding pipe closed");
            break;
        }
        activity.record(frame.len());
    }

    let _ = sink.flush().await;
    debug!(
        camera = %camera_id,
        bytes = activity.snapshot().bytes_forwarded,
        "Gateway feed ended"
    );
}
