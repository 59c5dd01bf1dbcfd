//! ESB Runtime: interceptor registry, chain planning, exchange dispatch, and
//! exception notification over an in-process delivery channel.

pub mod config;
pub mod dispatch;
pub mod interceptors;
pub mod planner;
pub mod registry;
pub mod runtime;
pub mod transport;

pub use config::{FilterMode, PlannerConfig, RuntimeConfig, SortingMode};
pub use dispatch::{
    DispatchError, DispatchOutcome, ExceptionEvent, ExceptionListener,
    ExceptionNotificationSender, ExchangeDispatcher, FaultPolicy,
};
pub use planner::{InterceptorChain, Planner, PlanningError};
pub use registry::{InterceptorRegistry, InterceptorSnapshot, RegisteredInterceptor, RegistrationError};
pub use runtime::EsbRuntime;
pub use transport::{ExchangeCompletion, ExchangeListener, InProcessChannel, TransportError};
