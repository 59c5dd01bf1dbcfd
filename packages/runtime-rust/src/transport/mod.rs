//! Exchange event source and in-process delivery channel.
//!
//! [`ExchangeListener`] is the contract through which a transport reports
//! exchange-sent and exchange-delivered events. [`InProcessChannel`] is a
//! concrete event source that carries exchanges from a consumer to a
//! registered [`ServiceEndpoint`] inside the current process.

pub mod router;

use std::sync::Arc;

use arc_swap::ArcSwap;
use esb_core::{
    Exchange, ExchangeError, ExchangeFault, ExchangeId, ProcessingError, Role, ServiceEndpoint,
};
use parking_lot::Mutex;
use tokio::sync::broadcast;

pub use router::EndpointRouter;

use crate::dispatch::{DispatchError, DispatchOutcome};
use crate::registry::RegistrationError;

// ---------------------------------------------------------------------------
// ExchangeListener
// ---------------------------------------------------------------------------

/// Receives exchange lifecycle events from a transport.
pub trait ExchangeListener: Send + Sync {
    /// Called whenever either side sends the exchange.
    ///
    /// # Errors
    ///
    /// A returned error aborts the send and is reported to the sender.
    fn exchange_sent(&self, exchange: &mut Exchange) -> Result<DispatchOutcome, DispatchError>;

    /// Called once the exchange has reached its final state.
    fn exchange_delivered(&self, exchange: &Exchange);
}

// ---------------------------------------------------------------------------
// Errors and completions
// ---------------------------------------------------------------------------

/// Errors returned to the party sending an exchange.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error("no endpoint registered for service {service}")]
    NoEndpoint { service: String },
    #[error("exchange has no target service")]
    MissingService,
    #[error(transparent)]
    Exchange(#[from] ExchangeError),
}

/// Final result of an exchange sent with [`InProcessChannel::send`].
#[derive(Debug, Clone)]
pub struct ExchangeCompletion {
    pub exchange_id: ExchangeId,
    pub outcome: CompletionOutcome,
}

#[derive(Debug, Clone)]
pub enum CompletionOutcome {
    /// The exchange reached `Done` or `Error` and was handed back.
    Delivered(Box<Exchange>),
    /// Delivery failed before the exchange reached a final state.
    Failed { message: String },
}

impl ExchangeCompletion {
    /// The delivered exchange, if delivery succeeded.
    #[must_use]
    pub fn exchange(&self) -> Option<&Exchange> {
        match &self.outcome {
            CompletionOutcome::Delivered(exchange) => Some(exchange),
            CompletionOutcome::Failed { .. } => None,
        }
    }
}

// ---------------------------------------------------------------------------
// InProcessChannel
// ---------------------------------------------------------------------------

struct ChannelInner {
    listeners: ArcSwap<Vec<Arc<dyn ExchangeListener>>>,
    listener_lock: Mutex<()>,
    endpoints: EndpointRouter,
    completions: broadcast::Sender<ExchangeCompletion>,
}

/// In-process delivery channel.
///
/// Cheap to clone; clones share listeners, endpoints and the completion
/// stream. A consumer-role exchange travels through two legs: the consumer
/// leg fires exchange-sent before routing, the provider leg fires it again
/// after the endpoint has handled the exchange.
#[derive(Clone)]
pub struct InProcessChannel {
    inner: Arc<ChannelInner>,
}

impl InProcessChannel {
    /// Creates a channel whose completion stream buffers `completion_capacity`
    /// events per subscriber.
    #[must_use]
    pub fn new(completion_capacity: usize) -> Self {
        let (completions, _) = broadcast::channel(completion_capacity.max(1));
        Self {
            inner: Arc::new(ChannelInner {
                listeners: ArcSwap::from_pointee(Vec::new()),
                listener_lock: Mutex::new(()),
                endpoints: EndpointRouter::new(),
                completions,
            }),
        }
    }

    // -- listeners ---------------------------------------------------------

    /// Attaches an exchange listener.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::Duplicate`] if this instance is attached.
    pub fn add_listener(&self, listener: Arc<dyn ExchangeListener>) -> Result<(), RegistrationError> {
        let _guard = self.inner.listener_lock.lock();
        let current = self.inner.listeners.load_full();
        if current.iter().any(|l| Arc::ptr_eq(l, &listener)) {
            return Err(RegistrationError::Duplicate {
                name: "exchange-listener".to_string(),
            });
        }
        let mut next: Vec<_> = current.iter().cloned().collect();
        next.push(listener);
        self.inner.listeners.store(Arc::new(next));
        Ok(())
    }

    /// Detaches an exchange listener.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::NotRegistered`] if it was never attached.
    pub fn remove_listener(&self, listener: &Arc<dyn ExchangeListener>) -> Result<(), RegistrationError> {
        let _guard = self.inner.listener_lock.lock();
        let current = self.inner.listeners.load_full();
        let Some(position) = current.iter().position(|l| Arc::ptr_eq(l, listener)) else {
            return Err(RegistrationError::NotRegistered {
                name: "exchange-listener".to_string(),
            });
        };
        let mut next: Vec<_> = current.iter().cloned().collect();
        next.remove(position);
        self.inner.listeners.store(Arc::new(next));
        Ok(())
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.load().len()
    }

    // -- endpoints ---------------------------------------------------------

    pub fn register_endpoint(&self, service: impl Into<String>, endpoint: Arc<dyn ServiceEndpoint>) {
        self.inner.endpoints.register(service, endpoint);
    }

    /// Removes the endpoint for `service`; returns whether one was bound.
    pub fn unregister_endpoint(&self, service: &str) -> bool {
        self.inner.endpoints.unregister(service).is_some()
    }

    #[must_use]
    pub fn endpoints(&self) -> &EndpointRouter {
        &self.inner.endpoints
    }

    /// Subscribes to completions of exchanges sent with [`InProcessChannel::send`].
    #[must_use]
    pub fn subscribe_completions(&self) -> broadcast::Receiver<ExchangeCompletion> {
        self.inner.completions.subscribe()
    }

    // -- sending -----------------------------------------------------------

    /// Sends an exchange and waits until it reaches its final state.
    ///
    /// # Errors
    ///
    /// - [`TransportError::Dispatch`] if a consumer-side interceptor fails or
    ///   a chain cannot be planned.
    /// - [`TransportError::MissingService`] / [`TransportError::NoEndpoint`]
    ///   if a consumer-role exchange cannot be routed.
    pub async fn send_sync(&self, mut exchange: Exchange) -> Result<Exchange, TransportError> {
        self.fire_sent(&mut exchange)?;
        self.complete(exchange).await
    }

    /// Sends an exchange and returns once the sender's leg has been
    /// dispatched. Delivery continues on a spawned task and its result is
    /// published on [`InProcessChannel::subscribe_completions`].
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// [`TransportError::Dispatch`] if the sender's interceptor chain fails.
    #[allow(clippy::unused_async)]
    pub async fn send(&self, mut exchange: Exchange) -> Result<ExchangeId, TransportError> {
        let exchange_id = exchange.id();
        self.fire_sent(&mut exchange)?;

        let channel = self.clone();
        tokio::spawn(async move {
            let outcome = match channel.complete(exchange).await {
                Ok(exchange) => CompletionOutcome::Delivered(Box::new(exchange)),
                Err(e) => {
                    tracing::warn!(exchange_id = %exchange_id, error = %e, "asynchronous delivery failed");
                    CompletionOutcome::Failed { message: e.to_string() }
                }
            };
            // No subscribers is not an error.
            let _ = channel.inner.completions.send(ExchangeCompletion { exchange_id, outcome });
        });

        Ok(exchange_id)
    }

    /// Routes a consumer-role exchange to its endpoint, runs the provider
    /// leg, and finalizes the exchange.
    ///
    /// An `InOut` endpoint that returns without a reply faults the exchange.
    /// Faults on an `InOnly` exchange are logged and dropped, so the consumer
    /// receives it as `Done`.
    async fn complete(&self, mut exchange: Exchange) -> Result<Exchange, TransportError> {
        if exchange.role() == Role::Consumer && !exchange.is_terminal() {
            let service = exchange
                .service()
                .ok_or(TransportError::MissingService)?
                .to_string();
            let endpoint = self
                .inner
                .endpoints
                .resolve(&service)
                .ok_or_else(|| TransportError::NoEndpoint {
                    service: service.clone(),
                })?;

            exchange.set_role(Role::Provider);
            let handled = match endpoint.handle(&mut exchange).await {
                Ok(()) if exchange.pattern().has_response() && exchange.out_message().is_none() => {
                    Err(ProcessingError::new(format!("endpoint for {service} returned no reply")))
                }
                other => other,
            };
            if let Err(e) = handled {
                tracing::debug!(
                    exchange_id = %exchange.id(),
                    service = %service,
                    error = %e,
                    "endpoint failed; fault attached"
                );
                exchange.set_error(ExchangeFault::from_endpoint(e));
            }
            self.fire_sent(&mut exchange)?;
        }

        if !exchange.pattern().reports_faults() {
            if let Some(fault) = exchange.take_error() {
                tracing::warn!(
                    exchange_id = %exchange.id(),
                    interceptor = fault.interceptor(),
                    error = %fault,
                    "in-only exchange faulted; fault not reported to consumer"
                );
                metrics::counter!("esb_unreported_faults_total").increment(1);
            }
        }
        if !exchange.is_terminal() {
            exchange.mark_done()?;
        }
        self.fire_delivered(&exchange);
        Ok(exchange)
    }

    fn fire_sent(&self, exchange: &mut Exchange) -> Result<(), DispatchError> {
        let listeners = self.inner.listeners.load_full();
        for listener in listeners.iter() {
            let outcome = listener.exchange_sent(exchange)?;
            tracing::trace!(exchange_id = %exchange.id(), ?outcome, "exchange-sent handled");
        }
        Ok(())
    }

    fn fire_delivered(&self, exchange: &Exchange) {
        let listeners = self.inner.listeners.load_full();
        for listener in listeners.iter() {
            listener.exchange_delivered(exchange);
        }
    }
}

impl Default for InProcessChannel {
    fn default() -> Self {
        Self::new(256)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
