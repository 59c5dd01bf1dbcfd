//! Sorting strategies: turn the filtered interceptors into a totally ordered
//! chain.

use std::sync::Arc;

use esb_core::{interceptor_types, keys};

use super::PlanningError;
use crate::registry::RegisteredInterceptor;

/// Orders filtered interceptors into the final execution chain.
///
/// Implementations must produce a total order; entries that compare equal
/// keep their input (registration) order.
pub trait SortingStrategy: Send + Sync {
    /// # Errors
    ///
    /// Returns [`PlanningError::Sort`] when an ordering key is malformed.
    fn sort(
        &self,
        candidates: Vec<Arc<RegisteredInterceptor>>,
    ) -> Result<Vec<Arc<RegisteredInterceptor>>, PlanningError>;
}

/// Reads an optional integer key from an interceptor's properties.
fn int_key(entry: &RegisteredInterceptor, key: &str) -> Result<Option<i64>, PlanningError> {
    match entry.property(key) {
        None => Ok(None),
        Some(value) => value.as_int().map(Some).ok_or_else(|| {
            PlanningError::Sort(format!(
                "{key} of {} must be an integer, got {}",
                entry.name(),
                value.kind()
            ))
        }),
    }
}

/// Sort key placing present values first (ascending) and missing ones last.
fn presence_rank(value: Option<i64>) -> (bool, i64) {
    match value {
        Some(v) => (false, v),
        None => (true, 0),
    }
}

// ---------------------------------------------------------------------------
// RegistrationOrderSorting
// ---------------------------------------------------------------------------

/// Leaves interceptors in registration order.
#[derive(Debug, Clone, Default)]
pub struct RegistrationOrderSorting;

impl SortingStrategy for RegistrationOrderSorting {
    fn sort(
        &self,
        candidates: Vec<Arc<RegisteredInterceptor>>,
    ) -> Result<Vec<Arc<RegisteredInterceptor>>, PlanningError> {
        Ok(candidates)
    }
}

// ---------------------------------------------------------------------------
// PrioritySortingStrategy
// ---------------------------------------------------------------------------

/// Sorts ascending by an integer priority property.
///
/// Interceptors without the property run after all prioritized ones.
#[derive(Debug, Clone)]
pub struct PrioritySortingStrategy {
    key: String,
}

impl PrioritySortingStrategy {
    /// Sorts by `esb.interceptor.priority`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_key(keys::PRIORITY)
    }

    /// Sorts by a custom property key.
    pub fn with_key(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Default for PrioritySortingStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl SortingStrategy for PrioritySortingStrategy {
    fn sort(
        &self,
        candidates: Vec<Arc<RegisteredInterceptor>>,
    ) -> Result<Vec<Arc<RegisteredInterceptor>>, PlanningError> {
        let mut keyed = candidates
            .into_iter()
            .map(|entry| Ok((presence_rank(int_key(&entry, &self.key)?), entry)))
            .collect::<Result<Vec<_>, PlanningError>>()?;

        // `sort_by_key` is stable: equal keys keep registration order.
        keyed.sort_by_key(|(rank, _)| *rank);
        Ok(keyed.into_iter().map(|(_, entry)| entry).collect())
    }
}

// ---------------------------------------------------------------------------
// TypeOrderSortingStrategy
// ---------------------------------------------------------------------------

/// Sorts by the position of `esb.interceptor.type` in a configured category
/// list, then by priority, then registration order.
///
/// Categories not in the list (and interceptors without a type) run last.
#[derive(Debug, Clone)]
pub struct TypeOrderSortingStrategy {
    order: Vec<String>,
    priority_key: String,
}

impl TypeOrderSortingStrategy {
    #[must_use]
    pub fn new(order: Vec<String>) -> Self {
        Self {
            order,
            priority_key: keys::PRIORITY.to_string(),
        }
    }

    /// Overrides the secondary priority key.
    #[must_use]
    pub fn with_priority_key(mut self, key: impl Into<String>) -> Self {
        self.priority_key = key.into();
        self
    }

    fn type_rank(&self, entry: &RegisteredInterceptor) -> usize {
        entry
            .property(keys::TYPE)
            .and_then(|value| value.as_str())
            .and_then(|kind| self.order.iter().position(|known| known == kind))
            .unwrap_or(self.order.len())
    }
}

impl Default for TypeOrderSortingStrategy {
    fn default() -> Self {
        Self::new(
            interceptor_types::DEFAULT_ORDER
                .iter()
                .map(|kind| (*kind).to_string())
                .collect(),
        )
    }
}

impl SortingStrategy for TypeOrderSortingStrategy {
    fn sort(
        &self,
        candidates: Vec<Arc<RegisteredInterceptor>>,
    ) -> Result<Vec<Arc<RegisteredInterceptor>>, PlanningError> {
        let mut keyed = candidates
            .into_iter()
            .map(|entry| {
                let priority = presence_rank(int_key(&entry, &self.priority_key)?);
                Ok(((self.type_rank(&entry), priority), entry))
            })
            .collect::<Result<Vec<_>, PlanningError>>()?;

        keyed.sort_by_key(|(rank, _)| *rank);
        Ok(keyed.into_iter().map(|(_, entry)| entry).collect())
    }
}

#[cfg(test)]
mod tests {
    use esb_core::{properties, Properties, Value};
    use proptest::prelude::*;

    use super::*;
    use crate::planner::test_support::{entries, entry};

    fn prio(name: &str, priority: i64, sequence: u64) -> Arc<RegisteredInterceptor> {
        entry(name, properties([(keys::PRIORITY, Value::Int(priority))]), sequence)
    }

    fn names(sorted: &[Arc<RegisteredInterceptor>]) -> Vec<String> {
        sorted.iter().map(|e| e.name().to_string()).collect()
    }

    #[test]
    fn registration_order_is_identity() {
        let sorted = RegistrationOrderSorting.sort(entries(&["c", "a", "b"])).unwrap();
        assert_eq!(names(&sorted), vec!["c", "a", "b"]);
    }

    #[test]
    fn priority_sorts_ascending_with_unkeyed_last() {
        let candidates = vec![
            prio("x", 10, 0),
            prio("y", 5, 1),
            entry("z", Properties::new(), 2),
        ];
        let sorted = PrioritySortingStrategy::new().sort(candidates).unwrap();
        assert_eq!(names(&sorted), vec!["y", "x", "z"]);
    }

    #[test]
    fn priority_ties_keep_registration_order() {
        let candidates = vec![
            entry("n1", Properties::new(), 0),
            prio("p1", 3, 1),
            entry("n2", Properties::new(), 2),
            prio("p2", 3, 3),
            prio("p0", -1, 4),
        ];
        let sorted = PrioritySortingStrategy::new().sort(candidates).unwrap();
        assert_eq!(names(&sorted), vec!["p0", "p1", "p2", "n1", "n2"]);
    }

    #[test]
    fn priority_rejects_non_integer_key() {
        let candidates = vec![entry("bad", properties([("order", "first")]), 0)];
        let err = PrioritySortingStrategy::with_key("order")
            .sort(candidates)
            .unwrap_err();
        assert!(matches!(err, PlanningError::Sort(msg) if msg.contains("bad")));
    }

    #[test]
    fn custom_priority_key() {
        let candidates = vec![
            entry("a", properties([("rank", Value::Int(2))]), 0),
            entry("b", properties([("rank", Value::Int(1))]), 1),
        ];
        let strategy = PrioritySortingStrategy::with_key("rank");
        assert_eq!(strategy.key(), "rank");
        assert_eq!(names(&strategy.sort(candidates).unwrap()), vec!["b", "a"]);
    }

    #[test]
    fn endpoint_resolution_always_runs_first() {
        let typed = |name: &str, kind: &str, priority: i64, seq: u64| {
            entry(
                name,
                properties([
                    (keys::TYPE, Value::from(kind)),
                    (keys::PRIORITY, Value::Int(priority)),
                ]),
                seq,
            )
        };
        let candidates = vec![
            typed("tracker", interceptor_types::TRACKING, -100, 0),
            entry("untyped", Properties::new(), 1),
            typed("validator", interceptor_types::VALIDATION, 0, 2),
            typed("resolver", interceptor_types::ENDPOINT_RESOLUTION, 1_000, 3),
        ];

        let sorted = TypeOrderSortingStrategy::default().sort(candidates).unwrap();
        assert_eq!(names(&sorted), vec!["resolver", "validator", "tracker", "untyped"]);
    }

    #[test]
    fn type_order_breaks_ties_by_priority() {
        let typed = |name: &str, priority: Option<i64>, seq: u64| {
            let mut props = properties([(keys::TYPE, interceptor_types::VALIDATION)]);
            if let Some(p) = priority {
                props.insert(keys::PRIORITY.to_string(), Value::Int(p));
            }
            entry(name, props, seq)
        };
        let candidates = vec![typed("v-none", None, 0), typed("v-9", Some(9), 1), typed("v-1", Some(1), 2)];
        let sorted = TypeOrderSortingStrategy::default().sort(candidates).unwrap();
        assert_eq!(names(&sorted), vec!["v-1", "v-9", "v-none"]);
    }

    proptest! {
        /// Distinct priorities always execute in ascending order, whatever the
        /// registration order.
        #[test]
        fn distinct_priorities_are_ordered(priorities in proptest::collection::hash_set(-1_000i64..1_000, 1..24)) {
            let candidates: Vec<_> = priorities
                .iter()
                .enumerate()
                .map(|(seq, p)| prio(&format!("i{p}"), *p, seq as u64))
                .collect();

            let sorted = PrioritySortingStrategy::new().sort(candidates).unwrap();
            let observed: Vec<i64> = sorted
                .iter()
                .map(|e| e.property(keys::PRIORITY).and_then(Value::as_int).unwrap())
                .collect();

            let mut expected: Vec<i64> = priorities.into_iter().collect();
            expected.sort_unstable();
            prop_assert_eq!(observed, expected);
        }
    }
}
