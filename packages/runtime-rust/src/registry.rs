//! Hot-pluggable interceptor registry.
//!
//! Readers take lock-free point-in-time snapshots through `ArcSwap`; writers
//! copy the current list, modify the copy, and publish it. A dispatch that is
//! iterating a snapshot is never affected by concurrent (de)registration.

use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use esb_core::{keys, Exchange, Interceptor, ProcessingError, Properties, Value};
use parking_lot::Mutex;

// ---------------------------------------------------------------------------
// RegistrationError
// ---------------------------------------------------------------------------

/// Errors surfaced by register/unregister calls on the interceptor registry
/// and the exception listener list.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("invalid registration: {reason}")]
    InvalidArgument { reason: String },
    #[error("already registered: {name}")]
    Duplicate { name: String },
    #[error("not registered: {name}")]
    NotRegistered { name: String },
}

// ---------------------------------------------------------------------------
// RegisteredInterceptor
// ---------------------------------------------------------------------------

/// An interceptor together with its effective registration metadata.
///
/// Effective properties are the interceptor's own properties overlaid with
/// the properties supplied at registration (registration wins).
pub struct RegisteredInterceptor {
    interceptor: Arc<dyn Interceptor>,
    properties: Properties,
    sequence: u64,
}

impl RegisteredInterceptor {
    pub(crate) fn new(interceptor: Arc<dyn Interceptor>, overrides: Properties, sequence: u64) -> Self {
        let mut properties = interceptor.properties();
        properties.extend(overrides);
        Self {
            interceptor,
            properties,
            sequence,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.interceptor.name()
    }

    #[must_use]
    pub fn interceptor(&self) -> &Arc<dyn Interceptor> {
        &self.interceptor
    }

    #[must_use]
    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    #[must_use]
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Registration sequence number; strictly increasing in registration order.
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Whether this entry wraps the given interceptor instance.
    #[must_use]
    pub fn wraps(&self, interceptor: &Arc<dyn Interceptor>) -> bool {
        Arc::ptr_eq(&self.interceptor, interceptor)
    }

    /// Runs the wrapped interceptor.
    ///
    /// # Errors
    ///
    /// Propagates the interceptor's [`ProcessingError`].
    pub fn process(&self, exchange: &mut Exchange) -> Result<(), ProcessingError> {
        self.interceptor.process(exchange)
    }
}

impl fmt::Debug for RegisteredInterceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredInterceptor")
            .field("name", &self.name())
            .field("sequence", &self.sequence)
            .field("properties", &self.properties)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// InterceptorSnapshot
// ---------------------------------------------------------------------------

/// Immutable point-in-time view of the registered interceptors, in
/// registration order. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct InterceptorSnapshot(Arc<Vec<Arc<RegisteredInterceptor>>>);

impl InterceptorSnapshot {
    /// Builds a snapshot from an explicit list (management/testing).
    #[must_use]
    pub fn from_entries(entries: Vec<Arc<RegisteredInterceptor>>) -> Self {
        Self(Arc::new(entries))
    }

    /// Names in snapshot order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.0.iter().map(|e| e.name().to_string()).collect()
    }
}

impl Deref for InterceptorSnapshot {
    type Target = [Arc<RegisteredInterceptor>];

    fn deref(&self) -> &Self::Target {
        self.0.as_slice()
    }
}

// ---------------------------------------------------------------------------
// InterceptorRegistry
// ---------------------------------------------------------------------------

/// Thread-safe set of currently active interceptors.
///
/// Unregistering an interceptor that is not registered fails with
/// [`RegistrationError::NotRegistered`] rather than being ignored.
pub struct InterceptorRegistry {
    entries: ArcSwap<Vec<Arc<RegisteredInterceptor>>>,
    /// Serializes writers; readers never take it.
    write_lock: Mutex<()>,
    next_sequence: AtomicU64,
}

impl InterceptorRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: ArcSwap::from_pointee(Vec::new()),
            write_lock: Mutex::new(()),
            next_sequence: AtomicU64::new(0),
        }
    }

    /// Adds an interceptor to the live set.
    ///
    /// # Errors
    ///
    /// - [`RegistrationError::InvalidArgument`] if the interceptor has an empty
    ///   name or its effective priority property is not an integer.
    /// - [`RegistrationError::Duplicate`] if this instance is already registered.
    pub fn register(
        &self,
        interceptor: Arc<dyn Interceptor>,
        properties: Properties,
    ) -> Result<(), RegistrationError> {
        if interceptor.name().trim().is_empty() {
            return Err(RegistrationError::InvalidArgument {
                reason: "interceptor name must not be empty".to_string(),
            });
        }

        let _guard = self.write_lock.lock();
        let current = self.entries.load_full();
        if current.iter().any(|e| e.wraps(&interceptor)) {
            return Err(RegistrationError::Duplicate {
                name: interceptor.name().to_string(),
            });
        }

        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        let entry = RegisteredInterceptor::new(interceptor, properties, sequence);
        if let Some(priority) = entry.property(keys::PRIORITY) {
            if priority.as_int().is_none() {
                return Err(RegistrationError::InvalidArgument {
                    reason: format!(
                        "{} of {} must be an integer, got {}",
                        keys::PRIORITY,
                        entry.name(),
                        priority.kind()
                    ),
                });
            }
        }

        let priority = entry.property(keys::PRIORITY).and_then(Value::as_int);
        tracing::info!(
            interceptor = entry.name(),
            sequence,
            ?priority,
            "interceptor registered"
        );

        let mut next = Vec::with_capacity(current.len() + 1);
        next.extend(current.iter().cloned());
        next.push(Arc::new(entry));
        self.entries.store(Arc::new(next));
        Ok(())
    }

    /// Removes an interceptor from the live set.
    ///
    /// `properties` mirrors the registration call and is only logged.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::NotRegistered`] if the instance is unknown.
    pub fn unregister(
        &self,
        interceptor: &Arc<dyn Interceptor>,
        properties: &Properties,
    ) -> Result<(), RegistrationError> {
        let _guard = self.write_lock.lock();
        let current = self.entries.load_full();
        let Some(position) = current.iter().position(|e| e.wraps(interceptor)) else {
            return Err(RegistrationError::NotRegistered {
                name: interceptor.name().to_string(),
            });
        };

        let mut next: Vec<_> = current.iter().cloned().collect();
        next.remove(position);
        self.entries.store(Arc::new(next));

        tracing::info!(
            interceptor = interceptor.name(),
            properties = properties.len(),
            "interceptor unregistered"
        );
        Ok(())
    }

    /// Point-in-time snapshot of the registered interceptors.
    #[must_use]
    pub fn registered_interceptors(&self) -> InterceptorSnapshot {
        InterceptorSnapshot(self.entries.load_full())
    }

    /// Whether this interceptor instance is currently registered.
    #[must_use]
    pub fn contains(&self, interceptor: &Arc<dyn Interceptor>) -> bool {
        self.entries.load().iter().any(|e| e.wraps(interceptor))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.load().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.load().is_empty()
    }
}

impl Default for InterceptorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
