//! Exchange tracking: a bounded in-memory log of every leg seen.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use esb_core::{
    interceptor_types, keys, Exchange, ExchangeId, ExchangeStatus, Interceptor, ProcessingError,
    Properties, Role, Value,
};
use parking_lot::Mutex;
use serde::Serialize;

use super::builtin_properties;

/// One observed exchange leg.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackingRecord {
    pub exchange_id: String,
    pub role: &'static str,
    pub service: Option<String>,
    pub operation: Option<String>,
    pub status: String,
    pub correlation_id: Option<String>,
    pub timestamp_millis: u64,
}

impl TrackingRecord {
    fn capture(exchange: &Exchange) -> Self {
        Self {
            exchange_id: exchange.id().to_string(),
            role: exchange.role().as_str(),
            service: exchange.service().map(str::to_string),
            operation: exchange.operation().map(str::to_string),
            status: format!("{:?}", exchange.status()),
            correlation_id: exchange
                .property(keys::CORRELATION_ID)
                .and_then(Value::as_str)
                .map(str::to_string),
            timestamp_millis: now_millis(),
        }
    }

    /// Whether this leg was observed on the consumer side.
    #[must_use]
    pub fn is_consumer_leg(&self) -> bool {
        self.role == Role::Consumer.as_str()
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        self.status == format!("{:?}", ExchangeStatus::Done)
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

/// Bounded FIFO of [`TrackingRecord`]s; the oldest record is evicted first.
#[derive(Debug)]
pub struct TrackingStore {
    records: Mutex<VecDeque<TrackingRecord>>,
    capacity: usize,
}

impl TrackingStore {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
        }
    }

    pub fn push(&self, record: TrackingRecord) {
        let mut records = self.records.lock();
        if records.len() == self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }

    /// All retained records, oldest first.
    #[must_use]
    pub fn records(&self) -> Vec<TrackingRecord> {
        self.records.lock().iter().cloned().collect()
    }

    /// Retained records for one exchange, oldest first.
    #[must_use]
    pub fn for_exchange(&self, id: ExchangeId) -> Vec<TrackingRecord> {
        let id = id.to_string();
        self.records
            .lock()
            .iter()
            .filter(|r| r.exchange_id == id)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Appends a [`TrackingRecord`] for every exchange leg it sees.
#[derive(Debug, Clone)]
pub struct TrackingInterceptor {
    store: Arc<TrackingStore>,
}

impl TrackingInterceptor {
    pub const NAME: &'static str = "tracking";
    pub const PRIORITY: i64 = 30;

    #[must_use]
    pub fn new(store: Arc<TrackingStore>) -> Self {
        Self { store }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<TrackingStore> {
        &self.store
    }
}

impl Interceptor for TrackingInterceptor {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn properties(&self) -> Properties {
        builtin_properties(interceptor_types::TRACKING, Self::PRIORITY)
    }

    fn process(&self, exchange: &mut Exchange) -> Result<(), ProcessingError> {
        let record = TrackingRecord::capture(exchange);
        tracing::trace!(exchange_id = %record.exchange_id, role = record.role, "exchange tracked");
        self.store.push(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use esb_core::Pattern;

    use super::*;

    #[test]
    fn records_each_leg() {
        let store = Arc::new(TrackingStore::new(8));
        let tracker = TrackingInterceptor::new(Arc::clone(&store));
        let mut ex = Exchange::new(Pattern::InOut)
            .with_service("orders")
            .with_operation("create")
            .with_property(keys::CORRELATION_ID, "c-1");

        tracker.process(&mut ex).unwrap();
        ex.set_role(Role::Provider);
        tracker.process(&mut ex).unwrap();

        let records = store.for_exchange(ex.id());
        assert_eq!(records.len(), 2);
        assert!(records[0].is_consumer_leg());
        assert!(!records[1].is_consumer_leg());
        assert_eq!(records[0].service.as_deref(), Some("orders"));
        assert_eq!(records[0].operation.as_deref(), Some("create"));
        assert_eq!(records[1].correlation_id.as_deref(), Some("c-1"));
        assert!(!records[1].is_done());
    }

    #[test]
    fn evicts_oldest_when_full() {
        let store = Arc::new(TrackingStore::new(2));
        let tracker = TrackingInterceptor::new(Arc::clone(&store));
        let exchanges: Vec<Exchange> = (0..3).map(|_| Exchange::new(Pattern::InOnly)).collect();
        for ex in &exchanges {
            tracker.process(&mut ex.clone()).unwrap();
        }

        assert_eq!(store.len(), 2);
        assert!(store.for_exchange(exchanges[0].id()).is_empty());
        assert_eq!(store.for_exchange(exchanges[2].id()).len(), 1);
    }

    #[test]
    fn zero_capacity_keeps_one_record() {
        let store = TrackingStore::new(0);
        assert_eq!(store.capacity(), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn record_serializes_to_json() {
        let record = TrackingRecord::capture(&Exchange::new(Pattern::InOnly).with_service("orders"));
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["role"], "consumer");
        assert_eq!(json["service"], "orders");
        assert_eq!(json["status"], "Active");
    }
}
