//! # Prometheus Metrics
//!
//! Exposes operational metrics for the custody node. Scraped by Prometheus
//! at the `/metrics` HTTP endpoint on the configured metrics port.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] under
//! the `custody` namespace so they do not collide with any default global
//! registry consumers.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    Encoder, Gauge, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder,
};
use std::sync::Arc;

/// Holds all Prometheus metric handles for the node.
///
/// Prometheus handles are reference-counted internally, so clones share
/// the same underlying series.
#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    /// Deposits committed by the ledger.
    pub deposits_total: IntCounter,
    /// Withdrawals committed by the ledger (payout included).
    pub withdrawals_total: IntCounter,
    /// Calls that reverted, for any reason.
    pub rejected_operations_total: IntCounter,
    /// Accounts currently holding a non-zero balance.
    pub funded_accounts: IntGauge,
    /// Total custodied value, in whole coins.
    pub total_deposits_coins: Gauge,
    /// Time spent inside the ledger lock per mutating call.
    pub operation_latency_seconds: Histogram,
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("custody".into()), None)?;

        let deposits_total =
            IntCounter::new("deposits_total", "Total number of committed deposits")?;
        registry.register(Box::new(deposits_total.clone()))?;

        let withdrawals_total =
            IntCounter::new("withdrawals_total", "Total number of committed withdrawals")?;
        registry.register(Box::new(withdrawals_total.clone()))?;

        let rejected_operations_total = IntCounter::new(
            "rejected_operations_total",
            "Total number of deposit or withdraw calls that reverted",
        )?;
        registry.register(Box::new(rejected_operations_total.clone()))?;

        let funded_accounts = IntGauge::new(
            "funded_accounts",
            "Number of accounts with a non-zero balance",
        )?;
        registry.register(Box::new(funded_accounts.clone()))?;

        let total_deposits_coins = Gauge::new(
            "total_deposits_coins",
            "Total value held in custody, in whole coins",
        )?;
        registry.register(Box::new(total_deposits_coins.clone()))?;

        let operation_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "operation_latency_seconds",
                "Ledger call latency in seconds, payout included",
            )
            .buckets(vec![
                0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1,
            ]),
        )?;
        registry.register(Box::new(operation_latency_seconds.clone()))?;

        Ok(Self {
            registry,
            deposits_total,
            withdrawals_total,
            rejected_operations_total,
            funded_accounts,
            total_deposits_coins,
            operation_latency_seconds,
        })
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Shared metrics handle passed to axum handlers and the ledger service.
pub type SharedMetrics = Arc<NodeMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
///
/// Returns HTTP 500 if encoding fails.
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_are_namespaced() {
        let metrics = NodeMetrics::new().expect("metrics");
        metrics.deposits_total.inc();
        metrics.funded_accounts.set(3);

        let text = metrics.encode().expect("encode");
        assert!(text.contains("custody_deposits_total 1"));
        assert!(text.contains("custody_funded_accounts 3"));
        assert!(text.contains("custody_operation_latency_seconds_bucket"));
    }

    #[test]
    fn separate_instances_do_not_share_series() {
        let a = NodeMetrics::new().expect("metrics");
        let b = NodeMetrics::new().expect("metrics");
        a.withdrawals_total.inc_by(5);

        assert_eq!(a.withdrawals_total.get(), 5);
        assert_eq!(b.withdrawals_total.get(), 0);
    }
}
