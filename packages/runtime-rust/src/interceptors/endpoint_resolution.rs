//! Resolves the concrete endpoint for an exchange's target service.

use dashmap::DashMap;
use esb_core::{interceptor_types, Exchange, Interceptor, ProcessingError, Properties};

use super::builtin_properties;

/// Fills `target.endpoint` from a service -> endpoint table.
///
/// Exchanges that already carry an endpoint are left untouched. An unknown
/// service is an error only in strict mode.
#[derive(Debug, Default)]
pub struct EndpointResolutionInterceptor {
    endpoints: DashMap<String, String>,
    strict: bool,
}

impl EndpointResolutionInterceptor {
    pub const NAME: &'static str = "endpoint-resolution";
    pub const PRIORITY: i64 = 0;

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails exchanges whose service has no known endpoint.
    #[must_use]
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Adds a binding, builder style.
    #[must_use]
    pub fn with_endpoint(self, service: impl Into<String>, endpoint: impl Into<String>) -> Self {
        self.bind(service, endpoint);
        self
    }

    pub fn bind(&self, service: impl Into<String>, endpoint: impl Into<String>) {
        self.endpoints.insert(service.into(), endpoint.into());
    }

    pub fn unbind(&self, service: &str) -> Option<String> {
        self.endpoints.remove(service).map(|(_, endpoint)| endpoint)
    }

    #[must_use]
    pub fn endpoint_for(&self, service: &str) -> Option<String> {
        self.endpoints.get(service).map(|e| e.value().clone())
    }
}

impl Interceptor for EndpointResolutionInterceptor {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn properties(&self) -> Properties {
        builtin_properties(interceptor_types::ENDPOINT_RESOLUTION, Self::PRIORITY)
    }

    fn process(&self, exchange: &mut Exchange) -> Result<(), ProcessingError> {
        if exchange.target().endpoint.is_some() {
            return Ok(());
        }
        let Some(service) = exchange.service().map(str::to_string) else {
            if self.strict {
                return Err(ProcessingError::new("cannot resolve endpoint: exchange has no service"));
            }
            return Ok(());
        };

        match self.endpoint_for(&service) {
            Some(endpoint) => {
                tracing::debug!(exchange_id = %exchange.id(), service = %service, endpoint = %endpoint, "endpoint resolved");
                exchange.target_mut().endpoint = Some(endpoint);
                Ok(())
            }
            None if self.strict => Err(ProcessingError::new(format!(
                "no endpoint known for service {service}"
            ))),
            None => Ok(()),
        }
    }
}
