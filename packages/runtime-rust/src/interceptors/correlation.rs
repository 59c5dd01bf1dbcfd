//! Correlation id propagation.

use esb_core::{interceptor_types, keys, Exchange, Interceptor, ProcessingError, Properties, Value};
use uuid::Uuid;

use super::builtin_properties;

/// Ensures every exchange carries `esb.correlation.id`.
///
/// An id already on the exchange wins; otherwise the in-message header of
/// the same name is copied; otherwise a fresh UUID is generated.
#[derive(Debug, Clone, Default)]
pub struct CorrelationInterceptor;

impl CorrelationInterceptor {
    pub const NAME: &'static str = "correlation";
    pub const PRIORITY: i64 = 20;

    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Interceptor for CorrelationInterceptor {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn properties(&self) -> Properties {
        builtin_properties(interceptor_types::CORRELATION, Self::PRIORITY)
    }

    fn process(&self, exchange: &mut Exchange) -> Result<(), ProcessingError> {
        match exchange.property(keys::CORRELATION_ID) {
            Some(Value::String(id)) if !id.is_empty() => return Ok(()),
            Some(Value::String(_)) | None => {}
            Some(other) => {
                return Err(ProcessingError::new(format!(
                    "{} must be a string, got {}",
                    keys::CORRELATION_ID,
                    other.kind()
                )))
            }
        }

        let id = exchange
            .in_message()
            .property(keys::CORRELATION_ID)
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map_or_else(|| Uuid::new_v4().to_string(), str::to_string);

        tracing::debug!(exchange_id = %exchange.id(), correlation_id = %id, "correlation id assigned");
        exchange.set_property(keys::CORRELATION_ID, id);
        Ok(())
    }
}
