// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use prometheus::{
    register_int_counter_vec_with_registry, register_int_gauge_vec_with_registry, IntCounterVec,
    IntGaugeVec, Registry,
};
use std::sync::Arc;

/// Prometheus metrics for the relay clients.
///
/// Labels use the chain id so one registry serves every client instance in
/// the process.
#[derive(Clone, Debug)]
pub struct RelayMetrics {
    /// RPC queries issued, by chain and method
    pub(crate) rpc_queries: IntCounterVec,
    /// Last block height a client has fully applied, by chain
    pub(crate) last_synced_block: IntGaugeVec,
    /// Typed events indexed, by chain and event kind
    pub(crate) indexed_events: IntCounterVec,
    /// Historical deposit lookups, by chain and outcome
    /// (memory / rpc / not_found)
    pub(crate) historical_deposit_lookups: IntCounterVec,
}

impl RelayMetrics {
    pub fn new(registry: &Registry) -> Self {
        Self {
            rpc_queries: register_int_counter_vec_with_registry!(
                "relay_rpc_queries",
                "Total number of RPC queries issued by relay clients",
                &["chain", "method"],
                registry,
            )
            .unwrap(),
            last_synced_block: register_int_gauge_vec_with_registry!(
                "relay_last_synced_block",
                "Last block height fully applied per chain",
                &["chain"],
                registry,
            )
            .unwrap(),
            indexed_events: register_int_counter_vec_with_registry!(
                "relay_indexed_events",
                "Total number of typed events indexed per chain and kind",
                &["chain", "kind"],
                registry,
            )
            .unwrap(),
            historical_deposit_lookups: register_int_counter_vec_with_registry!(
                "relay_historical_deposit_lookups",
                "Historical deposit lookups per chain and outcome",
                &["chain", "outcome"],
                registry,
            )
            .unwrap(),
        }
    }

    pub fn new_for_test() -> Arc<Self> {
        Arc::new(Self::new(&Registry::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_register_once() {
        let registry = Registry::new();
        let metrics = RelayMetrics::new(&registry);
        metrics
            .rpc_queries
            .with_label_values(&["1", "query_events"])
            .inc();
        metrics.last_synced_block.with_label_values(&["1"]).set(42);
        let families = registry.gather();
        assert!(families.iter().any(|f| f.get_name() == "relay_rpc_queries"));
        assert!(families
            .iter()
            .any(|f| f.get_name() == "relay_last_synced_block"));
    }

    #[test]
    fn test_duplicate_registration_panics_guard() {
        // Registering the same metric names twice in one registry is a
        // programmer error; use one RelayMetrics per registry.
        let registry = Registry::new();
        let _metrics = RelayMetrics::new(&registry);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            RelayMetrics::new(&registry)
        }));
        assert!(result.is_err());
    }
}
