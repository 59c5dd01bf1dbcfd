//! Structural validation of the message in flight.

use esb_core::{interceptor_types, Exchange, Interceptor, ProcessingError, Properties};

use super::builtin_properties;

/// Rejects messages that miss required headers, have empty content, or
/// exceed a size limit.
///
/// Checks the message currently in flight: the out-message once the provider
/// has answered an `InOut` exchange, the in-message otherwise.
#[derive(Debug, Clone)]
pub struct ValidationInterceptor {
    required_headers: Vec<String>,
    allow_empty: bool,
    max_content_bytes: Option<usize>,
}

impl ValidationInterceptor {
    pub const NAME: &'static str = "validation";
    pub const PRIORITY: i64 = 10;

    /// Rejects empty content; no header or size requirements.
    #[must_use]
    pub fn new() -> Self {
        Self {
            required_headers: Vec::new(),
            allow_empty: false,
            max_content_bytes: None,
        }
    }

    #[must_use]
    pub fn require_header(mut self, key: impl Into<String>) -> Self {
        self.required_headers.push(key.into());
        self
    }

    #[must_use]
    pub fn allow_empty(mut self, allow: bool) -> Self {
        self.allow_empty = allow;
        self
    }

    #[must_use]
    pub fn max_content_bytes(mut self, limit: usize) -> Self {
        self.max_content_bytes = Some(limit);
        self
    }
}

impl Default for ValidationInterceptor {
    fn default() -> Self {
        Self::new()
    }
}

impl Interceptor for ValidationInterceptor {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn properties(&self) -> Properties {
        builtin_properties(interceptor_types::VALIDATION, Self::PRIORITY)
    }

    fn process(&self, exchange: &mut Exchange) -> Result<(), ProcessingError> {
        let message = exchange.current_message();

        if !self.allow_empty && message.content.trim().is_empty() {
            return Err(ProcessingError::new("message content is empty"));
        }
        if let Some(limit) = self.max_content_bytes {
            let size = message.content.len();
            if size > limit {
                return Err(ProcessingError::new(format!(
                    "message content is {size} bytes, limit is {limit}"
                )));
            }
        }
        let missing: Vec<&str> = self
            .required_headers
            .iter()
            .filter(|key| message.property(key).is_none())
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(ProcessingError::new(format!(
                "missing required headers: {}",
                missing.join(", ")
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use esb_core::{NormalizedMessage, Pattern, Role};

    use super::*;

    fn with_content(content: &str) -> Exchange {
        Exchange::new(Pattern::InOut).with_in_message(NormalizedMessage::new(content))
    }

    #[test]
    fn accepts_valid_message() {
        let validator = ValidationInterceptor::new()
            .require_header("tenant")
            .max_content_bytes(64);
        let mut ex = Exchange::new(Pattern::InOnly)
            .with_in_message(NormalizedMessage::new("payload").with_property("tenant", "acme"));
        validator.process(&mut ex).unwrap();
    }

    #[test]
    fn rejects_empty_content_unless_allowed() {
        let err = ValidationInterceptor::new()
            .process(&mut with_content("   "))
            .unwrap_err();
        assert_eq!(err.message(), "message content is empty");

        ValidationInterceptor::new()
            .allow_empty(true)
            .process(&mut with_content(""))
            .unwrap();
    }

    #[test]
    fn rejects_oversized_content() {
        let err = ValidationInterceptor::new()
            .max_content_bytes(4)
            .process(&mut with_content("too long"))
            .unwrap_err();
        assert_eq!(err.message(), "message content is 8 bytes, limit is 4");
    }

    #[test]
    fn lists_every_missing_header() {
        let err = ValidationInterceptor::new()
            .require_header("tenant")
            .require_header("trace")
            .process(&mut with_content("x"))
            .unwrap_err();
        assert_eq!(err.message(), "missing required headers: tenant, trace");
    }

    #[test]
    fn validates_out_message_on_provider_reply() {
        let validator = ValidationInterceptor::new().require_header("status");
        let mut ex = with_content("request").with_role(Role::Provider);
        ex.set_out_message(NormalizedMessage::new("reply")).unwrap();
        assert!(validator.process(&mut ex).is_err());

        ex.out_message_mut()
            .unwrap()
            .properties
            .insert("status".to_string(), "ok".into());
        validator.process(&mut ex).unwrap();
    }
}
