mod backoff_policy;
mod credential;
mod health_status;
mod process_handle;
mod session_descriptor;
mod supervision_state;
mod supervision_timings;
mod video_codec;

pub use backoff_policy::BackoffPolicy;
pub use credential::{redact_url, Credential};
pub use health_status::HealthStatus;
pub use process_handle::{ProcessHandle, ProcessStatus};
pub use session_descriptor::{FeedSource, GatewayEndpoint, SessionDescriptor, StreamOptions};
pub use supervision_state::SupervisionState;
pub use supervision_timings::SupervisionTimings;
pub use video_codec::{KeyframeGate, VideoCodec};
