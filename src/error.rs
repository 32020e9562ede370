use thiserror::Error;

/// Failures that abort a whole scan run. Per-port and per-check failures are
/// recorded inside the report instead.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("invalid target {input:?}: {reason}")]
    InvalidTarget { input: String, reason: String },
    #[error("could not resolve {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{host} resolved to no addresses")]
    NoAddress { host: String },
    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, ScanError>;
