//! `EsbRuntime`: wires registry, planner, dispatcher, notification and the
//! in-process channel together.

use std::sync::Arc;

use esb_core::{Interceptor, Properties, ServiceEndpoint};

use crate::config::{FilterMode, PlannerConfig, RuntimeConfig, SortingMode};
use crate::dispatch::{
    CollectingExceptionListener, ExceptionListener, ExceptionNotificationSender, ExceptionRecord,
    ExchangeDispatcher, LoggingExceptionListener,
};
use crate::interceptors::{CorrelationInterceptor, MonitoringInterceptor, TrackingInterceptor, TrackingStore};
use crate::planner::{
    CompositeHintExtractor, FilterStrategy, HintExtractor, HintFilterStrategy, PassThroughFilter,
    Planner, PrioritySortingStrategy, PropertyHintExtractor, RegistrationOrderSorting,
    SortingStrategy, TargetHintExtractor, TypeOrderSortingStrategy,
};
use crate::registry::{InterceptorRegistry, RegistrationError};
use crate::transport::{ExchangeListener, InProcessChannel};

/// A fully wired interceptor runtime.
///
/// Everything is shared through `Arc`s, so components handed out by the
/// accessors stay valid for as long as the caller holds them.
pub struct EsbRuntime {
    config: RuntimeConfig,
    registry: Arc<InterceptorRegistry>,
    planner: Arc<Planner>,
    notifier: Arc<ExceptionNotificationSender>,
    dispatcher: Arc<ExchangeDispatcher>,
    channel: InProcessChannel,
    collector: Arc<CollectingExceptionListener>,
    tracking: Arc<TrackingStore>,
    monitoring: Arc<MonitoringInterceptor>,
}

impl EsbRuntime {
    /// Builds the runtime and attaches the dispatcher to the channel.
    ///
    /// # Errors
    ///
    /// Returns a [`RegistrationError`] if a built-in listener cannot be
    /// attached.
    pub fn new(config: RuntimeConfig) -> Result<Self, RegistrationError> {
        let registry = Arc::new(InterceptorRegistry::new());
        let planner = Arc::new(Planner::new(Arc::clone(&registry)));
        configure_planner(&planner, &config.planner);

        let notifier = Arc::new(ExceptionNotificationSender::new());
        let collector = Arc::new(CollectingExceptionListener::new(config.collected_exceptions));
        notifier.add_listener(Arc::new(LoggingExceptionListener))?;
        notifier.add_listener(Arc::clone(&collector) as Arc<dyn ExceptionListener>)?;

        let dispatcher = Arc::new(ExchangeDispatcher::new(Arc::clone(&planner), Arc::clone(&notifier)));
        let channel = InProcessChannel::new(config.completion_channel_capacity);
        channel.add_listener(Arc::clone(&dispatcher) as Arc<dyn ExchangeListener>)?;

        let tracking = Arc::new(TrackingStore::new(config.tracking_capacity));

        tracing::info!(
            node_id = %config.node_id,
            filter = ?config.planner.filter,
            sorting = ?config.planner.sorting,
            hints = config.planner.hints_enabled,
            "esb runtime started"
        );

        Ok(Self {
            config,
            registry,
            planner,
            notifier,
            dispatcher,
            channel,
            collector,
            tracking,
            monitoring: Arc::new(MonitoringInterceptor::new()),
        })
    }

    /// Registers the correlation, tracking and monitoring interceptors.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::Duplicate`] if called twice.
    pub fn register_builtin_interceptors(&self) -> Result<(), RegistrationError> {
        self.registry
            .register(Arc::new(CorrelationInterceptor::new()), Properties::new())?;
        self.registry.register(
            Arc::new(TrackingInterceptor::new(Arc::clone(&self.tracking))),
            Properties::new(),
        )?;
        self.registry.register(
            Arc::clone(&self.monitoring) as Arc<dyn Interceptor>,
            Properties::new(),
        )
    }

    // -- registration ------------------------------------------------------

    /// # Errors
    ///
    /// See [`InterceptorRegistry::register`].
    pub fn register_interceptor(
        &self,
        interceptor: Arc<dyn Interceptor>,
        properties: Properties,
    ) -> Result<(), RegistrationError> {
        self.registry.register(interceptor, properties)
    }

    /// # Errors
    ///
    /// See [`InterceptorRegistry::unregister`].
    pub fn unregister_interceptor(
        &self,
        interceptor: &Arc<dyn Interceptor>,
        properties: &Properties,
    ) -> Result<(), RegistrationError> {
        self.registry.unregister(interceptor, properties)
    }

    /// # Errors
    ///
    /// See [`ExceptionNotificationSender::add_listener`].
    pub fn add_exception_listener(
        &self,
        listener: Arc<dyn ExceptionListener>,
    ) -> Result<(), RegistrationError> {
        self.notifier.add_listener(listener)
    }

    /// # Errors
    ///
    /// See [`ExceptionNotificationSender::remove_listener`].
    pub fn remove_exception_listener(
        &self,
        listener: &Arc<dyn ExceptionListener>,
    ) -> Result<(), RegistrationError> {
        self.notifier.remove_listener(listener)
    }

    pub fn register_endpoint(&self, service: impl Into<String>, endpoint: Arc<dyn ServiceEndpoint>) {
        self.channel.register_endpoint(service, endpoint);
    }

    pub fn unregister_endpoint(&self, service: &str) -> bool {
        self.channel.unregister_endpoint(service)
    }

    /// Replaces the planner strategies at runtime.
    pub fn reconfigure_planner(&self, config: &PlannerConfig) {
        configure_planner(&self.planner, config);
        tracing::info!(filter = ?config.filter, sorting = ?config.sorting, "planner reconfigured");
    }

    // -- accessors ---------------------------------------------------------

    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    #[must_use]
    pub fn channel(&self) -> &InProcessChannel {
        &self.channel
    }

    #[must_use]
    pub fn planner(&self) -> &Arc<Planner> {
        &self.planner
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<InterceptorRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn dispatcher(&self) -> &Arc<ExchangeDispatcher> {
        &self.dispatcher
    }

    #[must_use]
    pub fn tracking_store(&self) -> &Arc<TrackingStore> {
        &self.tracking
    }

    #[must_use]
    pub fn monitoring(&self) -> &Arc<MonitoringInterceptor> {
        &self.monitoring
    }

    /// Most recent interceptor failures, oldest first.
    #[must_use]
    pub fn recent_exceptions(&self) -> Vec<ExceptionRecord> {
        self.collector.records()
    }
}

/// Installs the strategies selected by `config` on `planner`.
fn configure_planner(planner: &Planner, config: &PlannerConfig) {
    let extractor: Option<Arc<dyn HintExtractor>> = config.hints_enabled.then(|| {
        Arc::new(CompositeHintExtractor::new(vec![
            Arc::new(PropertyHintExtractor) as Arc<dyn HintExtractor>,
            Arc::new(TargetHintExtractor),
        ])) as Arc<dyn HintExtractor>
    });

    let filter: Arc<dyn FilterStrategy> = match config.filter {
        FilterMode::PassThrough => Arc::new(PassThroughFilter),
        FilterMode::Hints => Arc::new(HintFilterStrategy::new()),
    };

    let sorting: Arc<dyn SortingStrategy> = match config.sorting {
        SortingMode::Registration => Arc::new(RegistrationOrderSorting),
        SortingMode::Priority => Arc::new(PrioritySortingStrategy::with_key(config.priority_key.clone())),
        SortingMode::TypeOrder => Arc::new(
            TypeOrderSortingStrategy::new(config.type_order.clone())
                .with_priority_key(config.priority_key.clone()),
        ),
    };

    planner.set_hint_extractor(extractor);
    planner.set_filter_strategy(Some(filter));
    planner.set_sorting_strategy(Some(sorting));
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
