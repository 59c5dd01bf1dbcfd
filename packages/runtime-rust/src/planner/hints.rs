//! Hint extraction: derives advisory [`Hint`]s from an exchange.

use std::collections::BTreeMap;
use std::sync::Arc;

use esb_core::{keys, Exchange, Hint, Value};

use super::PlanningError;

/// Derives hints from an exchange's current state.
///
/// Implementations must be side-effect free and must return an empty list,
/// not an error, for exchanges that are only partially populated.
pub trait HintExtractor: Send + Sync {
    /// # Errors
    ///
    /// Returns [`PlanningError::HintExtraction`] when the exchange carries
    /// hint data that cannot be interpreted.
    fn extract_hints(&self, exchange: &Exchange) -> Result<Vec<Hint>, PlanningError>;
}

// ---------------------------------------------------------------------------
// PropertyHintExtractor
// ---------------------------------------------------------------------------

/// Reads the `esb.interceptors` exchange property (a map of interceptor name
/// to boolean) into a single [`Hint::Applicability`].
#[derive(Debug, Clone, Default)]
pub struct PropertyHintExtractor;

impl HintExtractor for PropertyHintExtractor {
    fn extract_hints(&self, exchange: &Exchange) -> Result<Vec<Hint>, PlanningError> {
        let Some(raw) = exchange.property(keys::APPLICABILITY) else {
            return Ok(Vec::new());
        };

        let Value::Map(entries) = raw else {
            return Err(PlanningError::HintExtraction(format!(
                "{} must be a map, got {}",
                keys::APPLICABILITY,
                raw.kind()
            )));
        };

        let mut applicability = BTreeMap::new();
        for (name, value) in entries {
            let Some(enabled) = value.as_bool() else {
                return Err(PlanningError::HintExtraction(format!(
                    "{}.{name} must be a bool, got {}",
                    keys::APPLICABILITY,
                    value.kind()
                )));
            };
            applicability.insert(name.clone(), enabled);
        }

        if applicability.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![Hint::Applicability(applicability)])
    }
}

// ---------------------------------------------------------------------------
// TargetHintExtractor
// ---------------------------------------------------------------------------

/// Emits a [`Hint::Target`] once the exchange names a service.
#[derive(Debug, Clone, Default)]
pub struct TargetHintExtractor;

impl HintExtractor for TargetHintExtractor {
    fn extract_hints(&self, exchange: &Exchange) -> Result<Vec<Hint>, PlanningError> {
        Ok(exchange
            .service()
            .map(|service| Hint::Target {
                service: service.to_string(),
                operation: exchange.operation().map(str::to_string),
            })
            .into_iter()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// CompositeHintExtractor
// ---------------------------------------------------------------------------

/// Concatenates the hints of several extractors, in order.
///
/// The first failing extractor aborts extraction.
#[derive(Default)]
pub struct CompositeHintExtractor {
    extractors: Vec<Arc<dyn HintExtractor>>,
}

impl CompositeHintExtractor {
    #[must_use]
    pub fn new(extractors: Vec<Arc<dyn HintExtractor>>) -> Self {
        Self { extractors }
    }

    /// Adds an extractor after construction.
    pub fn add(&mut self, extractor: Arc<dyn HintExtractor>) {
        self.extractors.push(extractor);
    }
}

impl HintExtractor for CompositeHintExtractor {
    fn extract_hints(&self, exchange: &Exchange) -> Result<Vec<Hint>, PlanningError> {
        let mut hints = Vec::new();
        for extractor in &self.extractors {
            hints.extend(extractor.extract_hints(exchange)?);
        }
        Ok(hints)
    }
}
