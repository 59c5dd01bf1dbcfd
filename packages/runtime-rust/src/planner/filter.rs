//! Filter strategies: select the registered interceptors that apply to an
//! exchange, given its hints.

use std::sync::Arc;

use dashmap::DashMap;
use esb_core::{keys, Hint, Value};
use regex::Regex;

use super::PlanningError;
use crate::registry::RegisteredInterceptor;

/// Selects the applicable subset of the registered interceptors.
///
/// Implementations must be deterministic for the same (interceptors, hints)
/// pair and must preserve the relative order of the interceptors they keep.
/// An empty hint set must select every interceptor.
pub trait FilterStrategy: Send + Sync {
    /// # Errors
    ///
    /// Returns [`PlanningError::Filter`] when interceptor metadata cannot be
    /// evaluated.
    fn filter(
        &self,
        registered: &[Arc<RegisteredInterceptor>],
        hints: &[Hint],
    ) -> Result<Vec<Arc<RegisteredInterceptor>>, PlanningError>;
}

// ---------------------------------------------------------------------------
// PassThroughFilter
// ---------------------------------------------------------------------------

/// Keeps every registered interceptor; hints are ignored.
#[derive(Debug, Clone, Default)]
pub struct PassThroughFilter;

impl FilterStrategy for PassThroughFilter {
    fn filter(
        &self,
        registered: &[Arc<RegisteredInterceptor>],
        _hints: &[Hint],
    ) -> Result<Vec<Arc<RegisteredInterceptor>>, PlanningError> {
        Ok(registered.to_vec())
    }
}

// ---------------------------------------------------------------------------
// HintFilterStrategy
// ---------------------------------------------------------------------------

/// Narrows interceptors using applicability and target hints.
///
/// - An interceptor explicitly mapped to `false` by an applicability hint is
///   dropped. Interceptors the hints do not mention are kept.
/// - When a target hint is present, an interceptor declaring
///   `esb.interceptor.services` is kept only if one of its patterns matches
///   the whole service name. Without a target hint the restriction is not
///   evaluated.
///
/// Compiled patterns are cached up to a limit; a full cache is cleared
/// before the next insert, so patterns of long-gone interceptors do not
/// accumulate.
#[derive(Debug)]
pub struct HintFilterStrategy {
    patterns: DashMap<String, Regex>,
    cache_limit: usize,
}

impl HintFilterStrategy {
    pub const DEFAULT_CACHE_LIMIT: usize = 256;

    #[must_use]
    pub fn new() -> Self {
        Self::with_cache_limit(Self::DEFAULT_CACHE_LIMIT)
    }

    /// Caches at most `limit` compiled patterns (at least one).
    #[must_use]
    pub fn with_cache_limit(limit: usize) -> Self {
        Self {
            patterns: DashMap::new(),
            cache_limit: limit.max(1),
        }
    }

    /// Number of compiled patterns currently cached.
    #[must_use]
    pub fn cached_patterns(&self) -> usize {
        self.patterns.len()
    }

    fn explicitly_disabled(entry: &RegisteredInterceptor, hints: &[Hint]) -> bool {
        hints
            .iter()
            .any(|hint| hint.applicability_of(entry.name()) == Some(false))
    }

    fn serves(&self, entry: &RegisteredInterceptor, service: &str) -> Result<bool, PlanningError> {
        let Some(restriction) = entry.property(keys::SERVICES) else {
            return Ok(true);
        };

        let patterns: Vec<&str> = match restriction {
            Value::String(single) => vec![single.as_str()],
            Value::Array(items) => items
                .iter()
                .map(|item| {
                    item.as_str().ok_or_else(|| {
                        PlanningError::Filter(format!(
                            "{} of {} must contain strings, got {}",
                            keys::SERVICES,
                            entry.name(),
                            item.kind()
                        ))
                    })
                })
                .collect::<Result<_, _>>()?,
            other => {
                return Err(PlanningError::Filter(format!(
                    "{} of {} must be a string or array, got {}",
                    keys::SERVICES,
                    entry.name(),
                    other.kind()
                )))
            }
        };

        for pattern in patterns {
            if self.compiled(pattern)?.is_match(service) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn compiled(&self, pattern: &str) -> Result<Regex, PlanningError> {
        if let Some(regex) = self.patterns.get(pattern) {
            return Ok(regex.value().clone());
        }
        let regex = Regex::new(&format!("^(?:{pattern})$"))
            .map_err(|e| PlanningError::Filter(format!("invalid service pattern {pattern:?}: {e}")))?;
        if self.patterns.len() >= self.cache_limit {
            tracing::debug!(limit = self.cache_limit, "service pattern cache full; cleared");
            self.patterns.clear();
        }
        self.patterns.insert(pattern.to_string(), regex.clone());
        Ok(regex)
    }
}

impl Default for HintFilterStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterStrategy for HintFilterStrategy {
    fn filter(
        &self,
        registered: &[Arc<RegisteredInterceptor>],
        hints: &[Hint],
    ) -> Result<Vec<Arc<RegisteredInterceptor>>, PlanningError> {
        if hints.is_empty() {
            return Ok(registered.to_vec());
        }

        let target = hints.iter().find_map(|hint| match hint {
            Hint::Target { service, .. } => Some(service.as_str()),
            _ => None,
        });

        let mut selected = Vec::with_capacity(registered.len());
        for entry in registered {
            if Self::explicitly_disabled(entry, hints) {
                tracing::debug!(interceptor = entry.name(), "interceptor disabled by hint");
                continue;
            }
            if let Some(service) = target {
                if !self.serves(entry, service)? {
                    tracing::debug!(
                        interceptor = entry.name(),
                        service,
                        "interceptor not bound to service"
                    );
                    continue;
                }
            }
            selected.push(Arc::clone(entry));
        }
        Ok(selected)
    }
}
