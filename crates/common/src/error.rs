//! Unified error type for the map orchestrator.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("HTTP request failed: {message}")]
    Http { message: String, timeout: bool },

    #[error("API error (status={status}): {message}")]
    Api { status: u16, message: String },

    #[error("Response decode error: {0}")]
    Decode(String),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Transport failure helper.
    pub fn http(message: impl Into<String>, timeout: bool) -> Self {
        Error::Http {
            message: message.into(),
            timeout,
        }
    }

    /// Whether this failure is worth retrying.
    ///
    /// Transient signatures: gateway/unavailable/timeout-class statuses,
    /// transport timeouts, and bodies that were not the JSON we expected
    /// (the backend serves an HTML error page when a tile worker dies).
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Http { timeout, .. } => *timeout,
            Error::Api { status, .. } => matches!(status, 408 | 429 | 502 | 503 | 504),
            Error::Decode(_) => true,
            Error::Json(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_statuses_are_transient() {
        for status in [408u16, 429, 502, 503, 504] {
            let e = Error::Api {
                status,
                message: String::new(),
            };
            assert!(e.is_transient(), "status {} should be transient", status);
        }
        let e = Error::Api {
            status: 404,
            message: String::new(),
        };
        assert!(!e.is_transient());
    }

    #[test]
    fn decode_and_timeout_are_transient() {
        assert!(Error::Decode("html body".into()).is_transient());
        assert!(Error::http("connect timed out", true).is_transient());
        assert!(!Error::http("dns failure", false).is_transient());
    }

    #[test]
    fn validation_is_not_transient() {
        assert!(!Error::Validation("bad offset".into()).is_transient());
    }
}
