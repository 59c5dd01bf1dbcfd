//! Message exchange model.
//!
//! An [`Exchange`] is one logical message interaction flowing through the bus:
//! a request, an optional response, and an optional fault. Interceptors receive
//! the same `Exchange` instance by `&mut` and mutate it in place.

use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

use crate::error::ProcessingError;
use crate::types::{Properties, Value};

// ---------------------------------------------------------------------------
// Identity and classification
// ---------------------------------------------------------------------------

/// Unique identifier of an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExchangeId(Uuid);

impl ExchangeId {
    /// Generates a fresh random identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ExchangeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Which side of the interaction the current processing point represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// The local party initiated the exchange (sender).
    Consumer,
    /// The local party serves the exchange (receiver).
    Provider,
}

impl Role {
    /// The opposite role.
    #[must_use]
    pub fn flipped(self) -> Self {
        match self {
            Self::Consumer => Self::Provider,
            Self::Provider => Self::Consumer,
        }
    }

    /// Lower-case label for logs and metrics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Consumer => "consumer",
            Self::Provider => "provider",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Interaction pattern of an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pattern {
    /// Request only. Provider-side faults are logged and dropped; the
    /// consumer only learns that the exchange was accepted.
    InOnly,
    /// Request only, but provider-side faults are reported back to the consumer.
    RobustInOnly,
    /// Request followed by a response or a fault.
    InOut,
}

impl Pattern {
    /// Whether this pattern carries an out-message.
    #[must_use]
    pub fn has_response(self) -> bool {
        matches!(self, Self::InOut)
    }

    /// Whether provider-side faults travel back to the consumer.
    #[must_use]
    pub fn reports_faults(self) -> bool {
        !matches!(self, Self::InOnly)
    }
}

/// Lifecycle status of an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExchangeStatus {
    /// In flight.
    Active,
    /// Completed normally.
    Done,
    /// Completed with a fault attached.
    Error,
}

// ---------------------------------------------------------------------------
// Messages and faults
// ---------------------------------------------------------------------------

/// Service/operation/endpoint addressed by an exchange.
///
/// Every field is optional: exchanges may be observed before routing has
/// resolved a concrete endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceTarget {
    /// Logical service name.
    pub service: Option<String>,
    /// Operation invoked on the service.
    pub operation: Option<String>,
    /// Concrete endpoint resolved for the service.
    pub endpoint: Option<String>,
}

/// A message payload with its headers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedMessage {
    /// Message body.
    pub content: String,
    /// Message headers.
    pub properties: Properties,
}

impl NormalizedMessage {
    /// Creates a message with the given content and no headers.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            properties: Properties::new(),
        }
    }

    /// Adds a header, builder style.
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Looks up a header.
    #[must_use]
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }
}

/// Fault attached to an exchange.
///
/// Shares the original [`ProcessingError`] so that whoever inspects the
/// exchange later (tracking, monitoring, the consumer) sees the exact failure.
#[derive(Debug, Clone)]
pub struct ExchangeFault {
    interceptor: Option<String>,
    cause: Arc<ProcessingError>,
}

impl ExchangeFault {
    /// Fault raised by the named interceptor.
    pub fn from_interceptor(interceptor: impl Into<String>, cause: ProcessingError) -> Self {
        Self {
            interceptor: Some(interceptor.into()),
            cause: Arc::new(cause),
        }
    }

    /// Fault raised by a service endpoint.
    #[must_use]
    pub fn from_endpoint(cause: ProcessingError) -> Self {
        Self {
            interceptor: None,
            cause: Arc::new(cause),
        }
    }

    /// Failure message.
    #[must_use]
    pub fn message(&self) -> &str {
        self.cause.message()
    }

    /// Name of the interceptor that raised the fault, if any.
    #[must_use]
    pub fn interceptor(&self) -> Option<&str> {
        self.interceptor.as_deref()
    }

    /// The underlying failure.
    #[must_use]
    pub fn cause(&self) -> &ProcessingError {
        &self.cause
    }
}

impl fmt::Display for ExchangeFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Errors from state transitions that the exchange pattern does not allow.
#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    #[error("pattern {pattern:?} does not carry an out-message")]
    OutMessageNotAllowed { pattern: Pattern },
    #[error("exchange {id} is already terminal ({status:?})")]
    AlreadyTerminal { id: ExchangeId, status: ExchangeStatus },
}

// ---------------------------------------------------------------------------
// Exchange
// ---------------------------------------------------------------------------

/// One message interaction flowing through the bus.
#[derive(Debug, Clone)]
pub struct Exchange {
    id: ExchangeId,
    role: Role,
    pattern: Pattern,
    status: ExchangeStatus,
    target: ServiceTarget,
    in_message: NormalizedMessage,
    out_message: Option<NormalizedMessage>,
    error: Option<ExchangeFault>,
    properties: Properties,
}

impl Exchange {
    /// Creates an active consumer-side exchange with an empty in-message.
    #[must_use]
    pub fn new(pattern: Pattern) -> Self {
        Self {
            id: ExchangeId::new(),
            role: Role::Consumer,
            pattern,
            status: ExchangeStatus::Active,
            target: ServiceTarget::default(),
            in_message: NormalizedMessage::default(),
            out_message: None,
            error: None,
            properties: Properties::new(),
        }
    }

    /// Sets the target service, builder style.
    #[must_use]
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.target.service = Some(service.into());
        self
    }

    /// Sets the target operation, builder style.
    #[must_use]
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.target.operation = Some(operation.into());
        self
    }

    /// Sets the role, builder style.
    #[must_use]
    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    /// Sets the in-message, builder style.
    #[must_use]
    pub fn with_in_message(mut self, message: NormalizedMessage) -> Self {
        self.in_message = message;
        self
    }

    /// Sets an exchange property, builder style.
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn id(&self) -> ExchangeId {
        self.id
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    pub fn set_role(&mut self, role: Role) {
        self.role = role;
    }

    #[must_use]
    pub fn pattern(&self) -> Pattern {
        self.pattern
    }

    #[must_use]
    pub fn status(&self) -> ExchangeStatus {
        self.status
    }

    #[must_use]
    pub fn target(&self) -> &ServiceTarget {
        &self.target
    }

    pub fn target_mut(&mut self) -> &mut ServiceTarget {
        &mut self.target
    }

    /// Target service name, if known.
    #[must_use]
    pub fn service(&self) -> Option<&str> {
        self.target.service.as_deref()
    }

    /// Target operation name, if known.
    #[must_use]
    pub fn operation(&self) -> Option<&str> {
        self.target.operation.as_deref()
    }

    #[must_use]
    pub fn in_message(&self) -> &NormalizedMessage {
        &self.in_message
    }

    pub fn in_message_mut(&mut self) -> &mut NormalizedMessage {
        &mut self.in_message
    }

    #[must_use]
    pub fn out_message(&self) -> Option<&NormalizedMessage> {
        self.out_message.as_ref()
    }

    pub fn out_message_mut(&mut self) -> Option<&mut NormalizedMessage> {
        self.out_message.as_mut()
    }

    /// Attaches the response message.
    ///
    /// # Errors
    ///
    /// Returns [`ExchangeError::OutMessageNotAllowed`] unless the pattern is
    /// `InOut`.
    pub fn set_out_message(&mut self, message: NormalizedMessage) -> Result<(), ExchangeError> {
        if !self.pattern.has_response() {
            return Err(ExchangeError::OutMessageNotAllowed {
                pattern: self.pattern,
            });
        }
        self.out_message = Some(message);
        Ok(())
    }

    /// The message currently in flight: the out-message once a response
    /// exists, the in-message otherwise.
    #[must_use]
    pub fn current_message(&self) -> &NormalizedMessage {
        self.out_message.as_ref().unwrap_or(&self.in_message)
    }

    /// Mutable access to [`Exchange::current_message`].
    pub fn current_message_mut(&mut self) -> &mut NormalizedMessage {
        match self.out_message {
            Some(ref mut out) => out,
            None => &mut self.in_message,
        }
    }

    #[must_use]
    pub fn error(&self) -> Option<&ExchangeFault> {
        self.error.as_ref()
    }

    /// Attaches a fault and moves the exchange to `Error`.
    ///
    /// The first fault wins: if one is already attached, `fault` is dropped
    /// and `false` is returned.
    pub fn set_error(&mut self, fault: ExchangeFault) -> bool {
        self.status = ExchangeStatus::Error;
        if self.error.is_some() {
            return false;
        }
        self.error = Some(fault);
        true
    }

    /// Detaches the fault, if any, and marks the exchange `Done`.
    ///
    /// Used when the pattern does not report faults back to the consumer.
    pub fn take_error(&mut self) -> Option<ExchangeFault> {
        let fault = self.error.take()?;
        self.status = ExchangeStatus::Done;
        Some(fault)
    }

    /// Marks the exchange as completed normally.
    ///
    /// # Errors
    ///
    /// Returns [`ExchangeError::AlreadyTerminal`] if the exchange is not
    /// `Active` (for example a fault was attached).
    pub fn mark_done(&mut self) -> Result<(), ExchangeError> {
        if self.status != ExchangeStatus::Active {
            return Err(ExchangeError::AlreadyTerminal {
                id: self.id,
                status: self.status,
            });
        }
        self.status = ExchangeStatus::Done;
        Ok(())
    }

    /// Whether the exchange reached `Done` or `Error`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status != ExchangeStatus::Active
    }

    #[must_use]
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.properties.insert(key.into(), value.into());
    }

    #[must_use]
    pub fn properties(&self) -> &Properties {
        &self.properties
    }
}
