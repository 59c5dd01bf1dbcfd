//! Per-service exchange counters.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use esb_core::{interceptor_types, Exchange, Interceptor, ProcessingError, Properties, Role};
use serde::Serialize;

use super::{builtin_properties, UNKNOWN_SERVICE};

#[derive(Debug, Default)]
struct ServiceStats {
    consumer_legs: AtomicU64,
    provider_legs: AtomicU64,
    faulted_legs: AtomicU64,
}

/// Point-in-time counters for one service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ServiceCounters {
    pub consumer_legs: u64,
    pub provider_legs: u64,
    /// Legs that arrived with a fault already attached.
    pub faulted_legs: u64,
}

impl ServiceCounters {
    #[must_use]
    pub fn total(&self) -> u64 {
        self.consumer_legs + self.provider_legs
    }
}

/// Counts exchange legs per service and mirrors them to the `metrics`
/// counter `esb_exchanges_total`.
#[derive(Debug, Default)]
pub struct MonitoringInterceptor {
    stats: DashMap<String, ServiceStats>,
}

impl MonitoringInterceptor {
    pub const NAME: &'static str = "monitoring";
    pub const PRIORITY: i64 = 40;

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counters for `service`, or zeroes if it was never seen.
    #[must_use]
    pub fn counters(&self, service: &str) -> ServiceCounters {
        self.stats
            .get(service)
            .map(|stats| ServiceCounters {
                consumer_legs: stats.consumer_legs.load(Ordering::Relaxed),
                provider_legs: stats.provider_legs.load(Ordering::Relaxed),
                faulted_legs: stats.faulted_legs.load(Ordering::Relaxed),
            })
            .unwrap_or_default()
    }

    /// Services seen so far, sorted.
    #[must_use]
    pub fn services(&self) -> Vec<String> {
        let mut services: Vec<String> = self.stats.iter().map(|e| e.key().clone()).collect();
        services.sort();
        services
    }

    pub fn reset(&self) {
        self.stats.clear();
    }
}

impl Interceptor for MonitoringInterceptor {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn properties(&self) -> Properties {
        builtin_properties(interceptor_types::MONITORING, Self::PRIORITY)
    }

    fn process(&self, exchange: &mut Exchange) -> Result<(), ProcessingError> {
        let service = exchange.service().unwrap_or(UNKNOWN_SERVICE);
        let role = exchange.role();
        {
            let stats = self.stats.entry(service.to_string()).or_default();
            match role {
                Role::Consumer => stats.consumer_legs.fetch_add(1, Ordering::Relaxed),
                Role::Provider => stats.provider_legs.fetch_add(1, Ordering::Relaxed),
            };
            if exchange.error().is_some() {
                stats.faulted_legs.fetch_add(1, Ordering::Relaxed);
            }
        }

        metrics::counter!(
            "esb_exchanges_total",
            "service" => service.to_string(),
            "role" => role.as_str()
        )
        .increment(1);
        Ok(())
    }
}
