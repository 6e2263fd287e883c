use url::Url;

use super::{redact_url, Credential, VideoCodec};
use crate::domain::errors::ConfigError;

/// Where the Miloco gateway lives and how to log in to it
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayEndpoint {
    base_url: String,
    username: String,
    verify_tls: bool,
}

impl GatewayEndpoint {
    pub fn new(base_url: &str, username: &str, verify_tls: bool) -> Result<Self, ConfigError> {
        let base_url = base_url.trim().trim_end_matches('/');
        let parsed = parse_url("gateway", base_url)?;

        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(invalid_url("gateway", base_url, "scheme must be http or https"));
        }

        Ok(Self {
            base_url: base_url.to_string(),
            username: username.trim().to_string(),
            verify_tls,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn verify_tls(&self) -> bool {
        self.verify_tls
    }

    pub fn is_tls(&self) -> bool {
        self.base_url.starts_with("https://")
    }
}

/// Which stream of the camera to pull
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamOptions {
    pub codec: VideoCodec,
    pub channel: u32,
    pub video_quality: u32,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            codec: VideoCodec::Hevc,
            channel: 0,
            video_quality: 2,
        }
    }
}

/// The source half of a session: one camera behind one gateway
#[derive(Debug, Clone, PartialEq)]
pub struct FeedSource {
    camera_id: String,
    credential: Credential,
    gateway: GatewayEndpoint,
    stream: StreamOptions,
}

impl FeedSource {
    pub fn new(
        camera_id: &str,
        credential: Credential,
        gateway: GatewayEndpoint,
        stream: StreamOptions,
    ) -> Result<Self, ConfigError> {
        let camera_id = camera_id.trim();
        if camera_id.is_empty() {
            return Err(ConfigError::MissingField("camera id"));
        }
        if credential.expose().trim().is_empty() {
            return Err(ConfigError::MissingField("gateway credential"));
        }

        Ok(Self {
            camera_id: camera_id.to_string(),
            credential,
            gateway,
            stream,
        })
    }

    pub fn camera_id(&self) -> &str {
        &self.camera_id
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn gateway(&self) -> &GatewayEndpoint {
        &self.gateway
    }

    pub fn stream(&self) -> &StreamOptions {
        &self.stream
    }
}

/// Immutable description of one camera→RTSP forwarding session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionDescriptor {
    source: FeedSource,
    sink_url: Url,
}

impl SessionDescriptor {
    pub fn new(source: FeedSource, sink_url: &str) -> Result<Self, ConfigError> {
        let sink_url = sink_url.trim();
        if sink_url.is_empty() {
            return Err(ConfigError::MissingField("sink URL"));
        }

        let parsed = parse_url("sink", sink_url)?;
        if !matches!(parsed.scheme(), "rtsp" | "rtsps") {
            return Err(invalid_url("sink", sink_url, "scheme must be rtsp or rtsps"));
        }

        Ok(Self {
            source,
            sink_url: parsed,
        })
    }

    pub fn camera_id(&self) -> &str {
        self.source.camera_id()
    }

    pub fn source(&self) -> &FeedSource {
        &self.source
    }

    pub fn sink_url(&self) -> &Url {
        &self.sink_url
    }

    /// Sink URL with any password masked
    pub fn sink_url_redacted(&self) -> String {
        redact_url(&self.sink_url)
    }
}

fn parse_url(field: &'static str, raw: &str) -> Result<Url, ConfigError> {
    let parsed = Url::parse(raw).map_err(|e| invalid_url(field, raw, &e.to_string()))?;
    match parsed.host_str() {
        Some(host) if !host.is_empty() => Ok(parsed),
        _ => Err(invalid_url(field, raw, "missing host")),
    }
}

fn invalid_url(field: &'static str, raw: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidUrl {
        field,
        url: raw.to_string(),
        reason: reason.to_string(),
    }
}
