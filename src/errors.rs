//! Error types for the event source.
//!
//! Geo lookups have no error type of their own: the resolver absorbs every
//! failure into a default location.

use thiserror::Error;

/// Errors from the AI event-discovery call.
#[derive(Error, Debug)]
pub enum EventSourceError {
    /// No API credential configured; no network attempt is made.
    #[error("API key not configured")]
    NoApiKey,

    /// Transport-level failure.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The API answered with a non-success status.
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// The reply contained no parseable JSON array.
    #[error("failed to parse event data: {0}")]
    Parse(String),

    /// The reply parsed but held nothing usable.
    #[error("{0}")]
    Validation(String),
}

impl EventSourceError {
    /// Transient-overload classification: these signals are worth a
    /// backoff-retry, everything else fails fast.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Api { status, message } => {
                *status == 503 || is_transient_text(message)
            }
            _ => false,
        }
    }
}

/// Same classification applied to an opaque error string, used by the
/// error screen to pick its messaging.
pub fn is_transient_text(message: &str) -> bool {
    message.contains("503")
        || message.contains("overloaded")
        || message.contains("UNAVAILABLE")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_503_is_transient() {
        let err = EventSourceError::Api {
            status: 503,
            message: "Service Unavailable".into(),
        };
        assert!(err.is_transient());
    }

    #[test]
    fn test_overloaded_body_is_transient() {
        let err = EventSourceError::Api {
            status: 429,
            message: "the model is overloaded".into(),
        };
        assert!(err.is_transient());

        let err = EventSourceError::Api {
            status: 500,
            message: "code: UNAVAILABLE".into(),
        };
        assert!(err.is_transient());
    }

    #[test]
    fn test_other_errors_are_not_transient() {
        let err = EventSourceError::Api {
            status: 400,
            message: "bad request".into(),
        };
        assert!(!err.is_transient());
        assert!(!EventSourceError::NoApiKey.is_transient());
        assert!(!EventSourceError::Parse("no array".into()).is_transient());
        assert!(!EventSourceError::Validation("empty".into()).is_transient());
    }

    #[test]
    fn test_transient_text() {
        assert!(is_transient_text("HTTP 503 from upstream"));
        assert!(is_transient_text("model overloaded, retry later"));
        assert!(is_transient_text("status UNAVAILABLE"));
        assert!(!is_transient_text("nothing found for today"));
    }
}
