//! Endpoint routing: resolves the provider endpoint for a service name.

use std::sync::Arc;

use dashmap::DashMap;
use esb_core::ServiceEndpoint;

/// Service-name keyed table of provider endpoints.
///
/// Endpoints come and go at runtime, so the table is a `DashMap` rather than
/// a map frozen at construction time.
#[derive(Default)]
pub struct EndpointRouter {
    endpoints: DashMap<String, Arc<dyn ServiceEndpoint>>,
}

impl EndpointRouter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `endpoint` to `service`, returning the endpoint it replaced.
    pub fn register(
        &self,
        service: impl Into<String>,
        endpoint: Arc<dyn ServiceEndpoint>,
    ) -> Option<Arc<dyn ServiceEndpoint>> {
        let service = service.into();
        tracing::info!(service = %service, "endpoint registered");
        self.endpoints.insert(service, endpoint)
    }

    /// Removes the endpoint bound to `service`.
    pub fn unregister(&self, service: &str) -> Option<Arc<dyn ServiceEndpoint>> {
        let removed = self.endpoints.remove(service).map(|(_, endpoint)| endpoint);
        if removed.is_some() {
            tracing::info!(service, "endpoint unregistered");
        }
        removed
    }

    #[must_use]
    pub fn resolve(&self, service: &str) -> Option<Arc<dyn ServiceEndpoint>> {
        self.endpoints.get(service).map(|entry| Arc::clone(entry.value()))
    }

    /// Registered service names, sorted.
    #[must_use]
    pub fn services(&self) -> Vec<String> {
        let mut services: Vec<String> = self.endpoints.iter().map(|e| e.key().clone()).collect();
        services.sort();
        services
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}
