//! Interceptor chain planning.
//!
//! For every exchange the [`Planner`] computes a fresh chain:
//!
//! 1. **Hints** (`hints`): `Exchange` -> `Vec<Hint>` (empty when no extractor is installed)
//! 2. **Filter** (`filter`): registered snapshot + hints -> applicable interceptors
//! 3. **Sort** (`sort`): applicable interceptors -> ordered [`InterceptorChain`]
//!
//! Strategies attach and detach at runtime. Without them the planner keeps
//! every interceptor in registration order.

pub mod filter;
pub mod hints;
pub mod sort;

use std::sync::Arc;

use esb_core::Exchange;
use parking_lot::RwLock;

pub use filter::{FilterStrategy, HintFilterStrategy, PassThroughFilter};
pub use hints::{CompositeHintExtractor, HintExtractor, PropertyHintExtractor, TargetHintExtractor};
pub use sort::{
    PrioritySortingStrategy, RegistrationOrderSorting, SortingStrategy, TypeOrderSortingStrategy,
};

use crate::registry::{InterceptorRegistry, InterceptorSnapshot, RegisteredInterceptor};

// ---------------------------------------------------------------------------
// PlanningError
// ---------------------------------------------------------------------------

/// Failures inside the planning pipeline. Never absorbed by the planner.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum PlanningError {
    #[error("hint extraction failed: {0}")]
    HintExtraction(String),
    #[error("interceptor filtering failed: {0}")]
    Filter(String),
    #[error("interceptor sorting failed: {0}")]
    Sort(String),
    /// A hint extractor or strategy panicked while planning.
    #[error("interceptor chain planning panicked: {0}")]
    Panicked(String),
}

// ---------------------------------------------------------------------------
// InterceptorChain
// ---------------------------------------------------------------------------

/// Ordered interceptors selected for one exchange.
#[derive(Debug, Clone, Default)]
pub struct InterceptorChain {
    entries: Vec<Arc<RegisteredInterceptor>>,
}

impl InterceptorChain {
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<RegisteredInterceptor>> {
        self.entries.iter()
    }

    /// Interceptor names in execution order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.name().to_string()).collect()
    }
}

impl<'a> IntoIterator for &'a InterceptorChain {
    type Item = &'a Arc<RegisteredInterceptor>;
    type IntoIter = std::slice::Iter<'a, Arc<RegisteredInterceptor>>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

// ---------------------------------------------------------------------------
// Planner
// ---------------------------------------------------------------------------

/// Computes the interceptor chain for an exchange.
///
/// Holds no per-exchange state; safe to call concurrently for any number of
/// in-flight exchanges. Strategy slots are cloned out before use so no lock is
/// held while a strategy runs.
pub struct Planner {
    registry: Arc<InterceptorRegistry>,
    hint_extractor: RwLock<Option<Arc<dyn HintExtractor>>>,
    filter_strategy: RwLock<Option<Arc<dyn FilterStrategy>>>,
    sorting_strategy: RwLock<Option<Arc<dyn SortingStrategy>>>,
}

impl Planner {
    /// Creates a planner with no strategies installed.
    #[must_use]
    pub fn new(registry: Arc<InterceptorRegistry>) -> Self {
        Self {
            registry,
            hint_extractor: RwLock::new(None),
            filter_strategy: RwLock::new(None),
            sorting_strategy: RwLock::new(None),
        }
    }

    /// Installs (or, with `None`, removes) the hint extractor.
    pub fn set_hint_extractor(&self, extractor: Option<Arc<dyn HintExtractor>>) {
        *self.hint_extractor.write() = extractor;
    }

    /// Installs (or removes) the filter strategy.
    pub fn set_filter_strategy(&self, strategy: Option<Arc<dyn FilterStrategy>>) {
        *self.filter_strategy.write() = strategy;
    }

    /// Installs (or removes) the sorting strategy.
    pub fn set_sorting_strategy(&self, strategy: Option<Arc<dyn SortingStrategy>>) {
        *self.sorting_strategy.write() = strategy;
    }

    /// Snapshot of the registered interceptors.
    #[must_use]
    pub fn registered_interceptors(&self) -> InterceptorSnapshot {
        self.registry.registered_interceptors()
    }

    /// Computes the chain for `exchange` from the given snapshot.
    ///
    /// # Errors
    ///
    /// Propagates any [`PlanningError`] from the hint extractor, filter, or
    /// sorting strategy.
    pub fn interceptor_chain(
        &self,
        registered: &InterceptorSnapshot,
        exchange: &Exchange,
    ) -> Result<InterceptorChain, PlanningError> {
        let extractor = self.hint_extractor.read().clone();
        let filter = self.filter_strategy.read().clone();
        let sorting = self.sorting_strategy.read().clone();

        let hints = match extractor {
            Some(extractor) => extractor.extract_hints(exchange)?,
            None => Vec::new(),
        };

        let candidates = match filter {
            Some(filter) => filter.filter(registered, &hints)?,
            None => registered.to_vec(),
        };

        let entries = match sorting {
            Some(sorting) => sorting.sort(candidates)?,
            None => candidates,
        };

        tracing::debug!(
            exchange_id = %exchange.id(),
            registered = registered.len(),
            hints = hints.len(),
            chain = entries.len(),
            "interceptor chain computed"
        );

        Ok(InterceptorChain { entries })
    }

    /// Snapshots the registry and computes the chain for `exchange`.
    ///
    /// # Errors
    ///
    /// See [`Planner::interceptor_chain`].
    pub fn plan(&self, exchange: &Exchange) -> Result<InterceptorChain, PlanningError> {
        let registered = self.registered_interceptors();
        self.interceptor_chain(&registered, exchange)
    }
}

// ---------------------------------------------------------------------------
// Test support
// ---------------------------------------------------------------------------


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
