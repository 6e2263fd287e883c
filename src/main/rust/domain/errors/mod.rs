use thiserror::Error;

/// Startup configuration errors. Always fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Missing required setting: {0}")]
    MissingField(&'static str),

    #[error("Invalid {field} URL '{url}': {reason}")]
    InvalidUrl {
        field: &'static str,
        url: String,
        reason: String,
    },

    #[error("Invalid setting: {0}")]
    InvalidSetting(String),
}

/// The forwarding subprocess could not be spawned.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Forwarding process has no stdin pipe")]
    MissingStdin,
}

/// Failures talking to the Miloco gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Gateway request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Gateway login rejected ({status}): {body}")]
    LoginRejected { status: u16, body: String },

    #[error("Gateway login status check failed ({0})")]
    LoginStatus(u16),

    #[error("TLS setup failed: {0}")]
    Tls(String),

    #[error("Invalid gateway stream URL: {0}")]
    StreamUrl(String),

    #[error("Gateway stream failed: {0}")]
    Stream(String),
}

#[derive(Debug, Error)]
pub enum DomainError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Launch(#[from] LaunchError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("Unknown session: {0}")]
    UnknownSession(String),

    #[error("Session already registered: {0}")]
    DuplicateSession(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
