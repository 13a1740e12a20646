//! Error types for the fs-loader metrics harness

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while registering, recording or exposing metrics
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Prometheus registration or encoding error
    #[error("Prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),

    /// Exposition text was not valid UTF-8
    #[error("Exposition text is not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),

    /// Listen address could not be parsed
    #[error("Invalid address '{addr}': {reason}")]
    InvalidAddress { addr: String, reason: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_prometheus_error_converts() {
        let err: Error = prometheus::Error::AlreadyReg.into();
        assert_matches!(err, Error::Prometheus(prometheus::Error::AlreadyReg));
    }

    #[test]
    fn test_invalid_address_message() {
        let err = Error::InvalidAddress {
            addr: "nope".to_string(),
            reason: "invalid socket address syntax".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid address 'nope': invalid socket address syntax"
        );
    }
}
