//! Exchange dispatch: runs the planned interceptor chain for every
//! exchange-sent event.
//!
//! Per event the dispatcher moves through
//! `RECEIVED -> CHAIN_COMPUTED -> EXECUTING(i) -> {CONTINUE(i+1) | FAULTED | COMPLETED}`:
//!
//! - a planning failure, including a panicking strategy, aborts the
//!   exchange (no partial chain runs);
//! - the first failing interceptor stops the chain, is reported to the
//!   [`ExceptionNotificationSender`], and is then handled by the
//!   [`FaultPolicy`] of the exchange's role.

pub mod notification;

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use esb_core::{Exchange, ExchangeFault, ProcessingError, Role};
use tracing::info_span;

pub use notification::{
    CollectingExceptionListener, ExceptionEvent, ExceptionListener, ExceptionNotificationSender,
    ExceptionRecord, LoggingExceptionListener,
};

use crate::planner::{Planner, PlanningError};
use crate::registry::RegisteredInterceptor;
use crate::transport::ExchangeListener;

// ---------------------------------------------------------------------------
// Outcomes and errors
// ---------------------------------------------------------------------------

/// Errors that escape the dispatcher to the party that sent the exchange.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Planning(#[from] PlanningError),
    /// A consumer-side interceptor failure, re-raised as-is. Displays the
    /// interceptor's own message.
    #[error("{source}")]
    Interceptor {
        interceptor: String,
        position: usize,
        source: ProcessingError,
    },
}

/// How a dispatch ended when no error escaped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Every interceptor in the chain ran successfully.
    Completed { executed: usize },
    /// A provider-side interceptor failed; the fault is attached to the exchange.
    Faulted { interceptor: String, position: usize },
}

/// What to do with an interceptor failure, decided by the exchange role.
///
/// The consumer initiated the exchange, so its send call fails directly. The
/// provider answers through the exchange protocol, so the failure travels
/// back as a fault on the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultPolicy {
    Rethrow,
    AttachToExchange,
}

impl FaultPolicy {
    #[must_use]
    pub fn for_role(role: Role) -> Self {
        match role {
            Role::Consumer => Self::Rethrow,
            Role::Provider => Self::AttachToExchange,
        }
    }
}

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// ---------------------------------------------------------------------------
// ExchangeDispatcher
// ---------------------------------------------------------------------------

/// Runs interceptor chains for exchanges emitted by the transport.
///
/// Holds no per-exchange state: one instance serves every exchange, and
/// concurrent exchanges may be dispatched from any number of threads.
/// Interceptors of one chain always run sequentially on the calling thread.
pub struct ExchangeDispatcher {
    planner: Arc<Planner>,
    notifier: Arc<ExceptionNotificationSender>,
}

impl ExchangeDispatcher {
    #[must_use]
    pub fn new(planner: Arc<Planner>, notifier: Arc<ExceptionNotificationSender>) -> Self {
        Self { planner, notifier }
    }

    #[must_use]
    pub fn planner(&self) -> &Arc<Planner> {
        &self.planner
    }

    #[must_use]
    pub fn notifier(&self) -> &Arc<ExceptionNotificationSender> {
        &self.notifier
    }

    /// Plans and runs the interceptor chain for `exchange`.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::Planning`] if the chain cannot be computed.
    /// - [`DispatchError::Interceptor`] if an interceptor fails on a
    ///   consumer-role exchange.
    pub fn dispatch(&self, exchange: &mut Exchange) -> Result<DispatchOutcome, DispatchError> {
        let span = info_span!(
            "dispatch",
            exchange_id = %exchange.id(),
            role = %exchange.role(),
            service = exchange.service().unwrap_or("-"),
        );
        let _entered = span.enter();

        let role = exchange.role();
        let start = Instant::now();
        let result = self.run_chain(exchange);

        let outcome = match &result {
            Ok(DispatchOutcome::Completed { .. }) => "completed",
            Ok(DispatchOutcome::Faulted { .. }) => "faulted",
            Err(DispatchError::Planning(_)) => "planning_failed",
            Err(DispatchError::Interceptor { .. }) => "rethrown",
        };
        metrics::counter!("esb_dispatch_total", "role" => role.as_str(), "outcome" => outcome)
            .increment(1);
        metrics::histogram!("esb_dispatch_duration_seconds", "role" => role.as_str())
            .record(start.elapsed().as_secs_f64());

        result
    }

    fn run_chain(&self, exchange: &mut Exchange) -> Result<DispatchOutcome, DispatchError> {
        let planned = catch_unwind(AssertUnwindSafe(|| self.planner.plan(exchange)))
            .unwrap_or_else(|panic| Err(PlanningError::Panicked(panic_message(panic.as_ref()))));
        let chain = match planned {
            Ok(chain) => chain,
            Err(e) => {
                tracing::error!(error = %e, "interceptor chain planning failed; exchange aborted");
                return Err(DispatchError::Planning(e));
            }
        };

        for (position, entry) in chain.iter().enumerate() {
            tracing::debug!(interceptor = entry.name(), position, "running interceptor");
            let error = match catch_unwind(AssertUnwindSafe(|| entry.process(exchange))) {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e,
                Err(panic) => ProcessingError::panicked(format!(
                    "interceptor {} panicked: {}",
                    entry.name(),
                    panic_message(panic.as_ref())
                )),
            };
            return self.handle_fault(exchange, entry, position, error);
        }

        tracing::debug!(executed = chain.len(), "interceptor chain completed");
        Ok(DispatchOutcome::Completed {
            executed: chain.len(),
        })
    }

    fn handle_fault(
        &self,
        exchange: &mut Exchange,
        entry: &RegisteredInterceptor,
        position: usize,
        error: ProcessingError,
    ) -> Result<DispatchOutcome, DispatchError> {
        metrics::counter!("esb_interceptor_faults_total", "interceptor" => entry.name().to_string())
            .increment(1);
        let notified = self.notifier.send_notification(&error, exchange, entry);

        let policy = FaultPolicy::for_role(exchange.role());
        tracing::debug!(
            interceptor = entry.name(),
            position,
            notified,
            ?policy,
            error = %error,
            "interceptor failed"
        );

        match policy {
            FaultPolicy::Rethrow => Err(DispatchError::Interceptor {
                interceptor: entry.name().to_string(),
                position,
                source: error,
            }),
            FaultPolicy::AttachToExchange => {
                if !exchange.set_error(ExchangeFault::from_interceptor(entry.name(), error)) {
                    tracing::debug!(
                        interceptor = entry.name(),
                        "exchange already faulted; earlier fault kept"
                    );
                }
                Ok(DispatchOutcome::Faulted {
                    interceptor: entry.name().to_string(),
                    position,
                })
            }
        }
    }
}

impl ExchangeListener for ExchangeDispatcher {
    fn exchange_sent(&self, exchange: &mut Exchange) -> Result<DispatchOutcome, DispatchError> {
        self.dispatch(exchange)
    }

    fn exchange_delivered(&self, exchange: &Exchange) {
        tracing::debug!(
            exchange_id = %exchange.id(),
            status = ?exchange.status(),
            error = exchange.error().map(ExchangeFault::message),
            "exchange delivered"
        );
        metrics::counter!("esb_exchanges_delivered_total", "status" => format!("{:?}", exchange.status()))
            .increment(1);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use esb_core::{keys, properties, ExchangeStatus, Hint, Interceptor, Pattern, Properties, Value};
    use parking_lot::Mutex;

    use super::*;
    use crate::planner::{HintExtractor, PrioritySortingStrategy, SortingStrategy};
    use crate::registry::InterceptorRegistry;

    /// Interceptor that records its invocations and optionally fails.
    struct Recorder {
        name: &'static str,
        calls: AtomicUsize,
        fail_with: Option<&'static str>,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Recorder {
        fn ok(name: &'static str, log: &Arc<Mutex<Vec<String>>>) -> Arc<Self> {
            Arc::new(Self {
                name,
                calls: AtomicUsize::new(0),
                fail_with: None,
                log: Arc::clone(log),
            })
        }

        fn failing(name: &'static str, message: &'static str, log: &Arc<Mutex<Vec<String>>>) -> Arc<Self> {
            Arc::new(Self {
                name,
                calls: AtomicUsize::new(0),
                fail_with: Some(message),
                log: Arc::clone(log),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Interceptor for Recorder {
        fn name(&self) -> &str {
            self.name
        }

        fn process(&self, exchange: &mut Exchange) -> Result<(), ProcessingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.log.lock().push(self.name.to_string());
            exchange.set_property(format!("visited.{}", self.name), true);
            match self.fail_with {
                Some(message) => Err(ProcessingError::new(message)),
                None => Ok(()),
            }
        }
    }

    struct Panicky;

    impl Interceptor for Panicky {
        fn name(&self) -> &str {
            "panicky"
        }

        fn process(&self, _exchange: &mut Exchange) -> Result<(), ProcessingError> {
            panic!("lost invariant")
        }
    }

    #[derive(Default)]
    struct CountingListener {
        count: AtomicUsize,
        last_interceptor: Mutex<Option<String>>,
    }

    impl ExceptionListener for CountingListener {
        fn on_exception(&self, event: &ExceptionEvent<'_>) -> anyhow::Result<()> {
            self.count.fetch_add(1, Ordering::SeqCst);
            *self.last_interceptor.lock() = Some(event.interceptor.name().to_string());
            Ok(())
        }
    }

    struct BrokenListener;

    impl ExceptionListener for BrokenListener {
        fn on_exception(&self, _event: &ExceptionEvent<'_>) -> anyhow::Result<()> {
            panic!("listener bug")
        }
    }

    struct Harness {
        registry: Arc<InterceptorRegistry>,
        notifier: Arc<ExceptionNotificationSender>,
        dispatcher: ExchangeDispatcher,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Harness {
        fn new() -> Self {
            let registry = Arc::new(InterceptorRegistry::new());
            let planner = Arc::new(Planner::new(Arc::clone(&registry)));
            planner.set_sorting_strategy(Some(Arc::new(PrioritySortingStrategy::new())));
            let notifier = Arc::new(ExceptionNotificationSender::new());
            let dispatcher = ExchangeDispatcher::new(planner, Arc::clone(&notifier));
            Self {
                registry,
                notifier,
                dispatcher,
                log: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn add(&self, interceptor: Arc<dyn Interceptor>, priority: i64) {
            self.registry
                .register(interceptor, properties([(keys::PRIORITY, Value::Int(priority))]))
                .unwrap();
        }
    }

    fn exchange(role: Role) -> Exchange {
        Exchange::new(Pattern::InOut)
            .with_service("orders")
            .with_role(role)
    }

    #[test]
    fn fault_policy_follows_role() {
        assert_eq!(FaultPolicy::for_role(Role::Consumer), FaultPolicy::Rethrow);
        assert_eq!(FaultPolicy::for_role(Role::Provider), FaultPolicy::AttachToExchange);
    }

    #[test]
    fn runs_chain_in_priority_order() {
        let h = Harness::new();
        h.add(Recorder::ok("late", &h.log), 30);
        h.add(Recorder::ok("early", &h.log), 10);
        h.add(Recorder::ok("middle", &h.log), 20);

        let mut ex = exchange(Role::Consumer);
        let outcome = h.dispatcher.dispatch(&mut ex).unwrap();

        assert_eq!(outcome, DispatchOutcome::Completed { executed: 3 });
        assert_eq!(*h.log.lock(), vec!["early", "middle", "late"]);
        assert_eq!(ex.property("visited.middle"), Some(&Value::Bool(true)));
        assert_eq!(ex.status(), ExchangeStatus::Active);
    }

    #[test]
    fn empty_chain_completes() {
        let h = Harness::new();
        let mut ex = exchange(Role::Provider);
        assert_eq!(
            h.dispatcher.dispatch(&mut ex).unwrap(),
            DispatchOutcome::Completed { executed: 0 }
        );
    }

    #[test]
    fn fault_short_circuits_remaining_interceptors() {
        let h = Harness::new();
        let first = Recorder::ok("first", &h.log);
        let faulty = Recorder::failing("faulty", "bad payload", &h.log);
        let after1 = Recorder::ok("after1", &h.log);
        let after2 = Recorder::ok("after2", &h.log);
        h.add(Arc::clone(&first) as Arc<dyn Interceptor>, 1);
        h.add(Arc::clone(&faulty) as Arc<dyn Interceptor>, 2);
        h.add(Arc::clone(&after1) as Arc<dyn Interceptor>, 3);
        h.add(Arc::clone(&after2) as Arc<dyn Interceptor>, 4);

        for role in [Role::Consumer, Role::Provider] {
            let mut ex = exchange(role);
            let _ = h.dispatcher.dispatch(&mut ex);
        }

        assert_eq!(first.calls(), 2);
        assert_eq!(faulty.calls(), 2);
        assert_eq!(after1.calls(), 0);
        assert_eq!(after2.calls(), 0);
    }

    #[test]
    fn consumer_fault_is_rethrown() {
        let h = Harness::new();
        h.add(Recorder::failing("thrower", "boom", &h.log), 1);

        let mut ex = exchange(Role::Consumer);
        let err = h.dispatcher.dispatch(&mut ex).unwrap_err();

        assert_eq!(err.to_string(), "boom");
        assert!(matches!(
            err,
            DispatchError::Interceptor { ref interceptor, position: 0, .. } if interceptor == "thrower"
        ));
        assert!(ex.error().is_none());
    }

    #[test]
    fn provider_fault_is_attached() {
        let h = Harness::new();
        h.add(Recorder::failing("thrower", "boom", &h.log), 1);

        let mut ex = exchange(Role::Provider);
        let outcome = h.dispatcher.dispatch(&mut ex).unwrap();

        assert_eq!(
            outcome,
            DispatchOutcome::Faulted {
                interceptor: "thrower".to_string(),
                position: 0
            }
        );
        let fault = ex.error().unwrap();
        assert_eq!(fault.message(), "boom");
        assert_eq!(fault.interceptor(), Some("thrower"));
        assert_eq!(ex.status(), ExchangeStatus::Error);
    }

    #[test]
    fn listeners_are_notified_with_the_faulting_interceptor() {
        let h = Harness::new();
        let listener = Arc::new(CountingListener::default());
        h.notifier
            .add_listener(Arc::clone(&listener) as Arc<dyn ExceptionListener>)
            .unwrap();
        h.add(Recorder::ok("fine", &h.log), 1);
        h.add(Recorder::failing("thrower", "boom", &h.log), 2);

        let _ = h.dispatcher.dispatch(&mut exchange(Role::Consumer));
        let _ = h.dispatcher.dispatch(&mut exchange(Role::Provider));

        assert_eq!(listener.count.load(Ordering::SeqCst), 2);
        assert_eq!(listener.last_interceptor.lock().as_deref(), Some("thrower"));
    }

    #[test]
    fn broken_listener_does_not_disturb_fault_handling() {
        let h = Harness::new();
        let healthy = Arc::new(CountingListener::default());
        h.notifier.add_listener(Arc::new(BrokenListener)).unwrap();
        h.notifier
            .add_listener(Arc::clone(&healthy) as Arc<dyn ExceptionListener>)
            .unwrap();
        h.add(Recorder::failing("thrower", "boom", &h.log), 1);

        let mut provider = exchange(Role::Provider);
        assert!(h.dispatcher.dispatch(&mut provider).is_ok());
        assert_eq!(provider.error().unwrap().message(), "boom");

        let err = h.dispatcher.dispatch(&mut exchange(Role::Consumer)).unwrap_err();
        assert_eq!(err.to_string(), "boom");

        assert_eq!(healthy.count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn panicking_interceptor_becomes_processing_error() {
        let h = Harness::new();
        h.add(Arc::new(Panicky), 1);

        let mut ex = exchange(Role::Provider);
        h.dispatcher.dispatch(&mut ex).unwrap();
        let fault = ex.error().unwrap();
        assert!(fault.cause().is_panic());
        assert!(fault.message().contains("lost invariant"));
    }

    #[test]
    fn planning_failure_aborts_for_both_roles() {
        struct Broken;
        impl HintExtractor for Broken {
            fn extract_hints(&self, _exchange: &Exchange) -> Result<Vec<Hint>, PlanningError> {
                Err(PlanningError::HintExtraction("unreadable".to_string()))
            }
        }

        let h = Harness::new();
        let recorder = Recorder::ok("never", &h.log);
        h.add(Arc::clone(&recorder) as Arc<dyn Interceptor>, 1);
        h.dispatcher.planner().set_hint_extractor(Some(Arc::new(Broken)));

        for role in [Role::Consumer, Role::Provider] {
            let mut ex = exchange(role);
            let err = h.dispatcher.dispatch(&mut ex).unwrap_err();
            assert!(matches!(err, DispatchError::Planning(PlanningError::HintExtraction(_))));
            assert!(ex.error().is_none());
        }
        assert_eq!(recorder.calls(), 0);
    }

    #[test]
    fn panicking_strategy_becomes_planning_error() {
        struct Exploding;
        impl SortingStrategy for Exploding {
            fn sort(
                &self,
                _interceptors: Vec<Arc<RegisteredInterceptor>>,
            ) -> Result<Vec<Arc<RegisteredInterceptor>>, PlanningError> {
                panic!("comparator broke")
            }
        }

        let h = Harness::new();
        let recorder = Recorder::ok("never", &h.log);
        h.add(Arc::clone(&recorder) as Arc<dyn Interceptor>, 1);
        h.dispatcher.planner().set_sorting_strategy(Some(Arc::new(Exploding)));

        for role in [Role::Consumer, Role::Provider] {
            let mut ex = exchange(role);
            let err = h.dispatcher.dispatch(&mut ex).unwrap_err();
            assert!(matches!(
                err,
                DispatchError::Planning(PlanningError::Panicked(ref msg)) if msg == "comparator broke"
            ));
            assert!(ex.error().is_none());
        }
        assert_eq!(recorder.calls(), 0);
    }

    #[test]
    fn chain_reflects_registration_between_exchanges() {
        let h = Harness::new();
        let a = Recorder::ok("a", &h.log);
        h.add(Arc::clone(&a) as Arc<dyn Interceptor>, 1);
        h.dispatcher.dispatch(&mut exchange(Role::Consumer)).unwrap();

        let b = Recorder::ok("b", &h.log);
        h.add(Arc::clone(&b) as Arc<dyn Interceptor>, 0);
        let outcome = h.dispatcher.dispatch(&mut exchange(Role::Consumer)).unwrap();

        assert_eq!(outcome, DispatchOutcome::Completed { executed: 2 });
        assert_eq!(*h.log.lock(), vec!["a", "b", "a"]);
        h.registry
            .unregister(&(Arc::clone(&a) as Arc<dyn Interceptor>), &Properties::new())
            .unwrap();
        assert_eq!(
            h.dispatcher.dispatch(&mut exchange(Role::Consumer)).unwrap(),
            DispatchOutcome::Completed { executed: 1 }
        );
    }

    #[test]
    fn dispatches_concurrently() {
        let h = Harness::new();
        let recorder = Recorder::ok("shared", &h.log);
        h.add(Arc::clone(&recorder) as Arc<dyn Interceptor>, 1);
        let dispatcher = Arc::new(h.dispatcher);

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let dispatcher = Arc::clone(&dispatcher);
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        let role = if i % 2 == 0 { Role::Consumer } else { Role::Provider };
                        dispatcher.dispatch(&mut exchange(role)).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(recorder.calls(), 100);
    }
}
