//! Runtime configuration types.

use esb_core::{interceptor_types, keys};
use serde::{Deserialize, Serialize};

/// Top-level configuration for an [`EsbRuntime`](crate::EsbRuntime).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Identifier of this node, used in logs.
    pub node_id: String,
    /// Interceptor chain planning.
    pub planner: PlannerConfig,
    /// Records retained by the tracking store.
    pub tracking_capacity: usize,
    /// Exception events retained for management inspection.
    pub collected_exceptions: usize,
    /// Per-subscriber buffer of the asynchronous completion stream.
    pub completion_channel_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            node_id: "esb-node".to_string(),
            planner: PlannerConfig::default(),
            tracking_capacity: 10_000,
            collected_exceptions: 100,
            completion_channel_capacity: 256,
        }
    }
}

/// Strategy selection for the planner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Install the property and target hint extractors.
    pub hints_enabled: bool,
    pub filter: FilterMode,
    pub sorting: SortingMode,
    /// Property key read by the priority and type-order sorters.
    pub priority_key: String,
    /// Category order used by [`SortingMode::TypeOrder`].
    pub type_order: Vec<String>,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            hints_enabled: true,
            filter: FilterMode::Hints,
            sorting: SortingMode::Priority,
            priority_key: keys::PRIORITY.to_string(),
            type_order: interceptor_types::DEFAULT_ORDER
                .iter()
                .map(|kind| (*kind).to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum FilterMode {
    /// Keep every registered interceptor.
    PassThrough,
    /// Apply applicability and service-restriction hints.
    Hints,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SortingMode {
    /// Registration order.
    Registration,
    /// Ascending priority, unprioritized last.
    Priority,
    /// Category order first, then priority.
    TypeOrder,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_config_defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.node_id, "esb-node");
        assert_eq!(config.tracking_capacity, 10_000);
        assert_eq!(config.collected_exceptions, 100);
        assert_eq!(config.completion_channel_capacity, 256);
    }

    #[test]
    fn planner_config_defaults() {
        let config = PlannerConfig::default();
        assert!(config.hints_enabled);
        assert_eq!(config.filter, FilterMode::Hints);
        assert_eq!(config.sorting, SortingMode::Priority);
        assert_eq!(config.priority_key, "esb.interceptor.priority");
        assert_eq!(config.type_order.first().map(String::as_str), Some("endpoint-resolution"));
        assert_eq!(config.type_order.len(), 6);
    }

    #[test]
    fn modes_use_kebab_case_names() {
        let json = serde_json::to_string(&SortingMode::TypeOrder).unwrap();
        assert_eq!(json, "\"type-order\"");
        let mode: FilterMode = serde_json::from_str("\"pass-through\"").unwrap();
        assert_eq!(mode, FilterMode::PassThrough);
    }

    #[test]
    fn config_loads_from_json() {
        let config: RuntimeConfig = serde_json::from_value(serde_json::json!({
            "node_id": "edge-1",
            "planner": {
                "hints_enabled": false,
                "filter": "pass-through",
                "sorting": "registration",
                "priority_key": "rank",
                "type_order": []
            },
            "tracking_capacity": 5,
            "collected_exceptions": 1,
            "completion_channel_capacity": 8
        }))
        .unwrap();
        assert_eq!(config.node_id, "edge-1");
        assert!(!config.planner.hints_enabled);
        assert_eq!(config.planner.sorting, SortingMode::Registration);
    }
}
