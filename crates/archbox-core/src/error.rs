//! Error types for archbox core operations.

use thiserror::Error;

/// Result type alias using the archbox [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types, one variant per failure class the orchestrator reacts to.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid required setting or secret
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transport-level failure while talking to a remote endpoint
    #[error("Network error fetching {url}: {reason}")]
    Network { url: String, reason: String },

    /// Remote endpoint answered with a non-success status
    #[error("HTTP {status} from {url}")]
    HttpStatus { url: String, status: u16 },

    /// The downloaded archive could not be decompressed
    #[error("Failed to extract archive: {0}")]
    Extraction(#[source] std::io::Error),

    /// Writing or moving the installed file failed
    #[error("Install failed: {0}")]
    Install(String),

    /// The elevated action was declined or did not complete
    #[error("Elevation failed: {0}")]
    Elevation(String),

    /// No elevation primitive exists on this platform
    #[error("Privilege elevation is not available on this platform")]
    ElevationUnavailable,

    /// The tunnel subprocess could not be started
    #[error("Failed to start {program}: {source}")]
    SubprocessStart {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error came from the network rather than local state.
    pub const fn is_network(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::HttpStatus { .. })
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn http_status_is_network() {
        let err = Error::HttpStatus {
            url: "https://example.test".into(),
            status: 404,
        };
        assert!(err.is_network());
        assert_eq!(err.to_string(), "HTTP 404 from https://example.test");
    }

    #[test]
    fn extraction_is_not_network() {
        let err = Error::Extraction(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "corrupt deflate stream",
        ));
        assert!(!err.is_network());
        assert!(err.to_string().contains("corrupt deflate stream"));
    }
}
