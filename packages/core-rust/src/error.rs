//! Interceptor-level failure type.

/// Typed failure raised by an interceptor's `process` call (or by a service
/// endpoint while handling an exchange).
///
/// `Display` renders the message only, so the text a caller sees for a
/// re-raised failure is exactly what the interceptor reported.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ProcessingError {
    message: String,
    #[source]
    source: Option<anyhow::Error>,
    panicked: bool,
}

impl ProcessingError {
    /// Creates a failure with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
            panicked: false,
        }
    }

    /// Creates a failure wrapping an underlying cause.
    pub fn with_source(message: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
            panicked: false,
        }
    }

    /// Creates a failure describing a panic caught while processing.
    pub fn panicked(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
            panicked: true,
        }
    }

    /// The failure message, as reported by the interceptor.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether this failure was produced from a caught panic.
    #[must_use]
    pub fn is_panic(&self) -> bool {
        self.panicked
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn display_is_message_only() {
        let err = ProcessingError::new("boom");
        assert_eq!(err.to_string(), "boom");
        assert_eq!(err.message(), "boom");
        assert!(!err.is_panic());
        assert!(err.source().is_none());
    }

    #[test]
    fn source_is_exposed() {
        let io = std::io::Error::other("disk gone");
        let err = ProcessingError::with_source("cannot persist", io);
        assert_eq!(err.to_string(), "cannot persist");
        assert_eq!(err.source().map(ToString::to_string).as_deref(), Some("disk gone"));
    }

    #[test]
    fn panicked_flag_is_set() {
        assert!(ProcessingError::panicked("interceptor panicked").is_panic());
    }
}
