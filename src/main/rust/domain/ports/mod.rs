mod feed_connector;
mod health_probe;
mod metrics_reporter;
mod process_launcher;

pub use feed_connector::{FeedConnector, FeedStream};
pub use health_probe::HealthProbe;
pub use metrics_reporter::MetricsReporter;
pub use process_launcher::{ActivitySnapshot, ProcessLauncher};
