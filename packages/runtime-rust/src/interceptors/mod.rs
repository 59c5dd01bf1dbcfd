//! Built-in cross-cutting interceptors.
//!
//! Each built-in declares its category (`esb.interceptor.type`) and a default
//! priority in [`Interceptor::properties`]; registration properties can
//! override either.
//!
//! | Interceptor                      | Type                  | Priority |
//! |----------------------------------|-----------------------|----------|
//! | [`EndpointResolutionInterceptor`]| `endpoint-resolution` | 0        |
//! | [`ValidationInterceptor`]        | `validation`          | 10       |
//! | [`CorrelationInterceptor`]       | `correlation`         | 20       |
//! | [`TrackingInterceptor`]          | `tracking`            | 30       |
//! | [`MonitoringInterceptor`]        | `monitoring`          | 40       |
//! | [`TransformInterceptor`]         | `transformation`      | 50       |
//!
//! [`Interceptor::properties`]: esb_core::Interceptor::properties

pub mod correlation;
pub mod endpoint_resolution;
pub mod monitoring;
pub mod tracking;
pub mod transform;
pub mod validation;

pub use correlation::CorrelationInterceptor;
pub use endpoint_resolution::EndpointResolutionInterceptor;
pub use monitoring::{MonitoringInterceptor, ServiceCounters};
pub use tracking::{TrackingInterceptor, TrackingRecord, TrackingStore};
pub use transform::TransformInterceptor;
pub use validation::ValidationInterceptor;

use esb_core::{keys, properties, Properties, Value};

/// Type and priority properties shared by the built-ins.
pub(crate) fn builtin_properties(kind: &str, priority: i64) -> Properties {
    properties([
        (keys::TYPE, Value::from(kind)),
        (keys::PRIORITY, Value::Int(priority)),
    ])
}

/// Label used for exchanges that carry no service.
pub(crate) const UNKNOWN_SERVICE: &str = "unknown";
