//! Error types for the scan-ingest pipeline.

use thiserror::Error;

/// Main error type for safepath operations.
///
/// Only [`Error::Config`], [`Error::Io`] and [`Error::Toml`] are meant to stop a
/// run. Everything else is caught per target or per finding, logged, and the
/// pass carries on.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("failed to launch scanner '{program}': {source}")]
    Invocation {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("scan of '{target}' timed out after {secs:.1}s")]
    ScanTimeout { target: String, secs: f64 },

    #[error("malformed scan output: {0}")]
    Parse(#[from] quick_xml::Error),

    #[error("malformed scan output: {0}")]
    MalformedDocument(String),

    #[error("delivery attempt failed: {0}")]
    Delivery(String),

    #[error("delivery gave up after {attempts} attempt(s): {last_error}")]
    DeliveryExhausted { attempts: u32, last_error: String },

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for safepath operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether this error should terminate the process rather than be
    /// absorbed by the pipeline.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Config(_) | Error::Io(_) | Error::Toml(_))
    }
}
