use std::collections::BTreeMap;

use crate::types::Value;

/// Advisory signal derived from an exchange, used to narrow the interceptors
/// that apply to it. Hints are never persisted.
#[derive(Debug, Clone, PartialEq)]
pub enum Hint {
    /// Interceptor name -> whether it applies to this exchange.
    Applicability(BTreeMap<String, bool>),
    /// The service (and operation) the exchange is addressed to.
    Target {
        service: String,
        operation: Option<String>,
    },
    /// Free-form key/value signal for custom filter strategies.
    Property { key: String, value: Value },
}

impl Hint {
    /// Applicability of the named interceptor, if this hint mentions it.
    #[must_use]
    pub fn applicability_of(&self, interceptor: &str) -> Option<bool> {
        match self {
            Self::Applicability(map) => map.get(interceptor).copied(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn applicability_lookup() {
        let hint = Hint::Applicability(BTreeMap::from([
            ("tracking".to_string(), false),
            ("validation".to_string(), true),
        ]));
        assert_eq!(hint.applicability_of("tracking"), Some(false));
        assert_eq!(hint.applicability_of("validation"), Some(true));
        assert_eq!(hint.applicability_of("monitoring"), None);
    }

    #[test]
    fn non_applicability_hints_never_answer() {
        let hint = Hint::Target {
            service: "orders".to_string(),
            operation: None,
        };
        assert_eq!(hint.applicability_of("tracking"), None);
    }
}
