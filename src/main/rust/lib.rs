pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

// Re-exports for convenience
pub use application::services::{SessionRegistry, SupervisionLoop};
pub use config::{Config, LogFormat};
pub use domain::entities::{ForwardingAttempt, StateTransition, SupervisionLifecycle};
pub use domain::errors::{ConfigError, DomainError, GatewayError, LaunchError, Result};
pub use domain::ports::{
    ActivitySnapshot, FeedConnector, FeedStream, HealthProbe, MetricsReporter, ProcessLauncher,
};
pub use domain::value_objects::{
    BackoffPolicy, Credential, FeedSource, GatewayEndpoint, HealthStatus, ProcessHandle,
    ProcessStatus, SessionDescriptor, StreamOptions, SupervisionState, SupervisionTimings,
    VideoCodec,
};
pub use infrastructure::ffmpeg::{FfmpegCommandBuilder, FfmpegLauncher};
pub use infrastructure::metrics::{bind_status_server, PrometheusReporter};
pub use infrastructure::miloco::MilocoGateway;
pub use infrastructure::probe::ThroughputProbe;
