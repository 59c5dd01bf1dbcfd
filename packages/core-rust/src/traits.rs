use async_trait::async_trait;

use crate::error::ProcessingError;
use crate::exchange::Exchange;
use crate::types::Properties;

/// Pluggable unit of cross-cutting exchange processing (validation,
/// correlation, tracking, monitoring, transformation, ...).
///
/// `process` runs on the thread that dispatched the exchange and may block.
/// It either completes normally, possibly mutating the exchange, or returns a
/// [`ProcessingError`]. Held as `Arc<dyn Interceptor>`; the `Arc` allocation
/// is the interceptor's identity in the registry.
pub trait Interceptor: Send + Sync {
    /// Canonical name, used by applicability hints and in logs.
    fn name(&self) -> &str;

    /// Metadata used for filtering and sorting. Registration properties are
    /// layered on top of these.
    fn properties(&self) -> Properties {
        Properties::new()
    }

    /// Processes the exchange at this chain position.
    ///
    /// # Errors
    ///
    /// Returns a [`ProcessingError`] when the exchange must not proceed
    /// past this interceptor.
    fn process(&self, exchange: &mut Exchange) -> Result<(), ProcessingError>;
}

/// Provider-side business handler that serves exchanges for one service.
#[async_trait]
pub trait ServiceEndpoint: Send + Sync {
    /// Handles the exchange, typically by attaching an out-message.
    ///
    /// # Errors
    ///
    /// A returned error is attached to the exchange as a fault.
    async fn handle(&self, exchange: &mut Exchange) -> Result<(), ProcessingError>;
}

/// Well-known property keys.
pub mod keys {
    /// Integer sort key on interceptor properties; lower runs first.
    pub const PRIORITY: &str = "esb.interceptor.priority";
    /// Interceptor category on interceptor properties.
    pub const TYPE: &str = "esb.interceptor.type";
    /// Array of anchored service-name regexes an interceptor is limited to.
    pub const SERVICES: &str = "esb.interceptor.services";
    /// Exchange property: map of interceptor name -> applicability.
    pub const APPLICABILITY: &str = "esb.interceptors";
    /// Exchange/message property carrying the correlation identifier.
    pub const CORRELATION_ID: &str = "esb.correlation.id";
}

/// Interceptor categories understood by the type-order sorting strategy.
pub mod interceptor_types {
    pub const ENDPOINT_RESOLUTION: &str = "endpoint-resolution";
    pub const VALIDATION: &str = "validation";
    pub const CORRELATION: &str = "correlation";
    pub const TRACKING: &str = "tracking";
    pub const MONITORING: &str = "monitoring";
    pub const TRANSFORMATION: &str = "transformation";

    /// Default execution order of the built-in categories.
    pub const DEFAULT_ORDER: &[&str] = &[
        ENDPOINT_RESOLUTION,
        VALIDATION,
        CORRELATION,
        TRACKING,
        MONITORING,
        TRANSFORMATION,
    ];
}
