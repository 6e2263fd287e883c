use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::domain::errors::ConfigError;
use crate::domain::value_objects::{
    BackoffPolicy, Credential, FeedSource, GatewayEndpoint, SessionDescriptor, StreamOptions,
    SupervisionTimings, VideoCodec,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "micam-bridge",
    version,
    about = "Forwards a Xiaomi camera feed from a Miloco gateway to an RTSP sink"
)]
pub struct Config {
    /// Base URL of the Miloco gateway
    #[arg(long, env = "MILOCO_BASE_URL", default_value = "https://miloco:8000")]
    pub base_url: String,

    /// Gateway login username
    #[arg(long, env = "MILOCO_USERNAME", default_value = "admin")]
    pub username: String,

    /// Gateway login password (MD5 hash)
    #[arg(long, env = "MILOCO_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Verify the gateway's TLS certificate
    #[arg(long, env = "MILOCO_VERIFY_TLS")]
    pub gateway_verify_tls: bool,

    /// Camera to stream
    #[arg(long, env = "CAMERA_ID")]
    pub camera_id: Option<String>,

    /// RTSP sink URL (go2rtc publish address)
    #[arg(long, env = "RTSP_URL")]
    pub rtsp_url: Option<String>,

    /// Video codec delivered by the camera
    #[arg(long, env = "VIDEO_CODEC", value_enum, ignore_case = true, default_value = "hevc")]
    pub video_codec: VideoCodec,

    /// Camera channel
    #[arg(long, env = "STREAM_CHANNEL", default_value = "0")]
    pub channel: u32,

    /// Camera video quality
    #[arg(long, env = "VIDEO_QUALITY", default_value = "2")]
    pub video_quality: u32,

    /// ffmpeg executable
    #[arg(long, env = "FFMPEG_PATH", default_value = "ffmpeg")]
    pub ffmpeg_path: String,

    /// Status and metrics server port
    #[arg(long, env = "METRICS_PORT", default_value = "9002")]
    pub metrics_port: u16,

    /// Initial reconnection delay in milliseconds
    #[arg(long, env = "RECONNECT_INITIAL_DELAY_MS", default_value = "1000")]
    pub reconnect_initial_delay_ms: u64,

    /// Maximum reconnection delay in milliseconds
    #[arg(long, env = "RECONNECT_MAX_DELAY_MS", default_value = "30000")]
    pub reconnect_max_delay_ms: u64,

    /// Reconnection backoff multiplier
    #[arg(long, env = "RECONNECT_MULTIPLIER", default_value = "2.0")]
    pub reconnect_multiplier: f64,

    /// Random spread applied to each delay (0.2 = ±20%)
    #[arg(long, env = "RECONNECT_JITTER", default_value = "0.2")]
    pub reconnect_jitter: f64,

    /// Time between health probes in milliseconds
    #[arg(long, env = "PROBE_INTERVAL_MS", default_value = "2000")]
    pub probe_interval_ms: u64,

    /// Probe answer deadline in milliseconds
    #[arg(long, env = "PROBE_TIMEOUT_MS", default_value = "1000")]
    pub probe_timeout_ms: u64,

    /// Silence tolerated before a running stream counts as stalled, in milliseconds
    #[arg(long, env = "LIVENESS_WINDOW_MS", default_value = "10000")]
    pub liveness_window_ms: u64,

    /// Time a fresh attempt may take to deliver its first data, in milliseconds
    #[arg(long, env = "STARTUP_TIMEOUT_MS", default_value = "30000")]
    pub startup_timeout_ms: u64,

    /// Consecutive healthy probes before the failure count resets
    #[arg(long, env = "SUSTAINED_HEALTHY_PROBES", default_value = "5")]
    pub sustained_healthy_probes: u32,

    /// Grace period for ffmpeg to exit before it is killed, in milliseconds
    #[arg(long, env = "STOP_GRACE_MS", default_value = "5000")]
    pub stop_grace_ms: u64,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value = "text")]
    pub log_format: LogFormat,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Minimum allowed port (ports below 1024 are privileged)
const MIN_USER_PORT: u16 = 1024;

impl Config {
    /// Build the session descriptor. Pure: reads nothing but `self`.
    pub fn resolve(&self) -> Result<SessionDescriptor, ConfigError> {
        let camera_id = required(&self.camera_id, "camera id")?;
        let password = required(&self.password, "gateway credential")?;
        let rtsp_url = required(&self.rtsp_url, "sink URL")?;

        let gateway =
            GatewayEndpoint::new(&self.base_url, &self.username, self.gateway_verify_tls)?;
        let stream = StreamOptions {
            codec: self.video_codec,
            channel: self.channel,
            video_quality: self.video_quality,
        };
        let source = FeedSource::new(camera_id, Credential::new(password), gateway, stream)?;

        SessionDescriptor::new(source, rtsp_url)
    }

    pub fn to_backoff_policy(&self) -> Result<BackoffPolicy, ConfigError> {
        BackoffPolicy::new(
            Duration::from_millis(self.reconnect_initial_delay_ms),
            Duration::from_millis(self.reconnect_max_delay_ms),
            self.reconnect_multiplier,
            self.reconnect_jitter,
        )
    }

    pub fn to_timings(&self) -> Result<SupervisionTimings, ConfigError> {
        SupervisionTimings {
            probe_interval: Duration::from_millis(self.probe_interval_ms),
            probe_timeout: Duration::from_millis(self.probe_timeout_ms),
            liveness_window: Duration::from_millis(self.liveness_window_ms),
            startup_timeout: Duration::from_millis(self.startup_timeout_ms),
            sustained_healthy_probes: self.sustained_healthy_probes,
            stop_grace: Duration::from_millis(self.stop_grace_ms),
        }
        .validate()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.resolve()?;
        self.to_backoff_policy()?;
        self.to_timings()?;
        Self::validate_port(self.metrics_port, "metrics")
    }

    fn validate_port(port: u16, name: &str) -> Result<(), ConfigError> {
        if port == 0 {
            return Err(ConfigError::InvalidSetting(format!(
                "invalid {} port: port cannot be 0",
                name
            )));
        }
        if port < MIN_USER_PORT {
            return Err(ConfigError::InvalidSetting(format!(
                "invalid {} port: {} is a privileged port (< {}). Use a port >= {}",
                name, port, MIN_USER_PORT, MIN_USER_PORT
            )));
        }
        Ok(())
    }
}

/// A setting that is absent or blank is missing.
fn required<'a>(value: &'a Option<String>, field: &'static str) -> Result<&'a str, ConfigError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::MissingField(field))
}
