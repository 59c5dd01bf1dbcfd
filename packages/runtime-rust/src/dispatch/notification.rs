//! Exception notification fan-out.
//!
//! Defines [`ExceptionListener`] for reacting to interceptor failures and
//! [`ExceptionNotificationSender`], which broadcasts each failure to every
//! registered listener. A broken listener never reaches the dispatch path.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use arc_swap::ArcSwap;
use esb_core::{Exchange, ProcessingError};
use parking_lot::Mutex;
use serde::Serialize;

use super::panic_message;
use crate::registry::{RegisteredInterceptor, RegistrationError};

/// An interceptor failure, as seen by exception listeners.
#[derive(Debug, Clone, Copy)]
pub struct ExceptionEvent<'a> {
    pub error: &'a ProcessingError,
    pub exchange: &'a Exchange,
    pub interceptor: &'a RegisteredInterceptor,
}

/// Observer notified whenever an interceptor fails.
///
/// Used as `Arc<dyn ExceptionListener>`. Returned errors and panics are
/// logged by the sender and otherwise ignored.
pub trait ExceptionListener: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str {
        "exception-listener"
    }

    /// Called once per interceptor failure.
    ///
    /// # Errors
    ///
    /// Any error is logged and suppressed by the sender.
    fn on_exception(&self, event: &ExceptionEvent<'_>) -> anyhow::Result<()>;
}

// ---------------------------------------------------------------------------
// ExceptionNotificationSender
// ---------------------------------------------------------------------------

/// Fans out interceptor failures to all registered listeners.
///
/// The listener list is copy-on-write: a notification iterates the snapshot
/// taken when it started, so concurrent (de)registration is never observed
/// half-applied. No ordering is guaranteed among listeners.
pub struct ExceptionNotificationSender {
    listeners: ArcSwap<Vec<Arc<dyn ExceptionListener>>>,
    write_lock: Mutex<()>,
}

impl ExceptionNotificationSender {
    #[must_use]
    pub fn new() -> Self {
        Self {
            listeners: ArcSwap::from_pointee(Vec::new()),
            write_lock: Mutex::new(()),
        }
    }

    /// Registers a listener.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::Duplicate`] if this instance is already
    /// registered.
    pub fn add_listener(&self, listener: Arc<dyn ExceptionListener>) -> Result<(), RegistrationError> {
        let _guard = self.write_lock.lock();
        let current = self.listeners.load_full();
        if current.iter().any(|l| Arc::ptr_eq(l, &listener)) {
            return Err(RegistrationError::Duplicate {
                name: listener.name().to_string(),
            });
        }
        tracing::info!(listener = listener.name(), "exception listener registered");
        let mut next: Vec<_> = current.iter().cloned().collect();
        next.push(listener);
        self.listeners.store(Arc::new(next));
        Ok(())
    }

    /// Removes a listener.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::NotRegistered`] if the instance is unknown.
    pub fn remove_listener(&self, listener: &Arc<dyn ExceptionListener>) -> Result<(), RegistrationError> {
        let _guard = self.write_lock.lock();
        let current = self.listeners.load_full();
        let Some(position) = current.iter().position(|l| Arc::ptr_eq(l, listener)) else {
            return Err(RegistrationError::NotRegistered {
                name: listener.name().to_string(),
            });
        };
        let mut next: Vec<_> = current.iter().cloned().collect();
        next.remove(position);
        self.listeners.store(Arc::new(next));
        tracing::info!(listener = listener.name(), "exception listener unregistered");
        Ok(())
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.load().len()
    }

    /// Notifies every listener of an interceptor failure.
    ///
    /// Returns how many listeners handled the event without failing. Never
    /// fails and never panics because of a listener.
    pub fn send_notification(
        &self,
        error: &ProcessingError,
        exchange: &Exchange,
        interceptor: &RegisteredInterceptor,
    ) -> usize {
        let listeners = self.listeners.load_full();
        let event = ExceptionEvent {
            error,
            exchange,
            interceptor,
        };

        let mut delivered = 0;
        for listener in listeners.iter() {
            match catch_unwind(AssertUnwindSafe(|| listener.on_exception(&event))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    tracing::warn!(
                        listener = listener.name(),
                        exchange_id = %exchange.id(),
                        error = %e,
                        "exception listener failed"
                    );
                }
                Err(panic) => {
                    tracing::warn!(
                        listener = listener.name(),
                        exchange_id = %exchange.id(),
                        panic = %panic_message(panic.as_ref()),
                        "exception listener panicked"
                    );
                }
            }
        }
        delivered
    }
}

impl Default for ExceptionNotificationSender {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Built-in listeners
// ---------------------------------------------------------------------------

/// Logs every interceptor failure at `error` level.
#[derive(Debug, Clone, Default)]
pub struct LoggingExceptionListener;

impl ExceptionListener for LoggingExceptionListener {
    fn name(&self) -> &str {
        "logging"
    }

    fn on_exception(&self, event: &ExceptionEvent<'_>) -> anyhow::Result<()> {
        tracing::error!(
            exchange_id = %event.exchange.id(),
            role = %event.exchange.role(),
            service = event.exchange.service().unwrap_or("-"),
            interceptor = event.interceptor.name(),
            error = %event.error,
            "interceptor failed"
        );
        Ok(())
    }
}

/// Summary of one interceptor failure kept by [`CollectingExceptionListener`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExceptionRecord {
    pub exchange_id: String,
    pub role: String,
    pub service: Option<String>,
    pub interceptor: String,
    pub message: String,
}

/// Keeps the most recent failures in memory for management inspection.
pub struct CollectingExceptionListener {
    capacity: usize,
    records: Mutex<VecDeque<ExceptionRecord>>,
}

impl CollectingExceptionListener {
    /// Keeps at most `capacity` records; older ones are dropped first.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            records: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Collected records, oldest first.
    #[must_use]
    pub fn records(&self) -> Vec<ExceptionRecord> {
        self.records.lock().iter().cloned().collect()
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

impl ExceptionListener for CollectingExceptionListener {
    fn name(&self) -> &str {
        "collecting"
    }

    fn on_exception(&self, event: &ExceptionEvent<'_>) -> anyhow::Result<()> {
        if self.capacity == 0 {
            return Ok(());
        }
        let record = ExceptionRecord {
            exchange_id: event.exchange.id().to_string(),
            role: event.exchange.role().to_string(),
            service: event.exchange.service().map(str::to_string),
            interceptor: event.interceptor.name().to_string(),
            message: event.error.message().to_string(),
        };
        let mut records = self.records.lock();
        while records.len() >= self.capacity {
            records.pop_front();
        }
        records.push_back(record);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
