//! Content transformation of the message in flight.

use std::fmt;

use esb_core::{interceptor_types, Exchange, Interceptor, ProcessingError, Properties};

use super::builtin_properties;

type TransformFn = dyn Fn(&str) -> Result<String, ProcessingError> + Send + Sync;

/// Applies a caller-supplied transformation to the content of the message
/// in flight, then renames headers.
///
/// Header renames run after the content function and only when it succeeds.
pub struct TransformInterceptor {
    name: String,
    transform: Box<TransformFn>,
    header_renames: Vec<(String, String)>,
}

impl TransformInterceptor {
    pub const PRIORITY: i64 = 50;

    pub fn new<F>(name: impl Into<String>, transform: F) -> Self
    where
        F: Fn(&str) -> Result<String, ProcessingError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            transform: Box::new(transform),
            header_renames: Vec::new(),
        }
    }

    /// A transformation that only renames headers.
    pub fn headers_only(name: impl Into<String>) -> Self {
        Self::new(name, |content| Ok(content.to_string()))
    }

    #[must_use]
    pub fn rename_header(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.header_renames.push((from.into(), to.into()));
        self
    }
}

impl fmt::Debug for TransformInterceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformInterceptor")
            .field("name", &self.name)
            .field("header_renames", &self.header_renames)
            .finish_non_exhaustive()
    }
}

impl Interceptor for TransformInterceptor {
    fn name(&self) -> &str {
        &self.name
    }

    fn properties(&self) -> Properties {
        builtin_properties(interceptor_types::TRANSFORMATION, Self::PRIORITY)
    }

    fn process(&self, exchange: &mut Exchange) -> Result<(), ProcessingError> {
        let message = exchange.current_message_mut();
        message.content = (self.transform)(&message.content)?;

        for (from, to) in &self.header_renames {
            if let Some(value) = message.properties.remove(from) {
                message.properties.insert(to.clone(), value);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use esb_core::{NormalizedMessage, Pattern, Value};

    use super::*;

    fn exchange(content: &str) -> Exchange {
        Exchange::new(Pattern::InOut)
            .with_in_message(NormalizedMessage::new(content).with_property("x-legacy", "v1"))
    }

    #[test]
    fn transforms_in_message_content() {
        let upper = TransformInterceptor::new("upper", |c| Ok(c.to_uppercase()));
        let mut ex = exchange("hello");
        upper.process(&mut ex).unwrap();
        assert_eq!(ex.in_message().content, "HELLO");
        assert_eq!(upper.name(), "upper");
    }

    #[test]
    fn transforms_reply_once_present() {
        let upper = TransformInterceptor::new("upper", |c| Ok(c.to_uppercase()));
        let mut ex = exchange("request");
        ex.set_out_message(NormalizedMessage::new("reply")).unwrap();
        upper.process(&mut ex).unwrap();
        assert_eq!(ex.in_message().content, "request");
        assert_eq!(ex.out_message().unwrap().content, "REPLY");
    }

    #[test]
    fn renames_headers() {
        let renamer = TransformInterceptor::headers_only("rename")
            .rename_header("x-legacy", "version")
            .rename_header("absent", "ignored");
        let mut ex = exchange("body");
        renamer.process(&mut ex).unwrap();

        let message = ex.in_message();
        assert_eq!(message.content, "body");
        assert_eq!(message.property("version"), Some(&Value::from("v1")));
        assert!(message.property("x-legacy").is_none());
        assert!(message.property("ignored").is_none());
    }

    #[test]
    fn transform_error_leaves_headers_untouched() {
        let failing = TransformInterceptor::new("strict-json", |c| {
            serde_json::from_str::<serde_json::Value>(c)
                .map(|v| v.to_string())
                .map_err(|e| ProcessingError::with_source("content is not JSON", e))
        })
        .rename_header("x-legacy", "version");

        let mut ex = exchange("not json");
        let err = failing.process(&mut ex).unwrap_err();
        assert_eq!(err.message(), "content is not JSON");
        assert!(ex.in_message().property("x-legacy").is_some());
    }
}
