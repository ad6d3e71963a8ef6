//! Prometheus-style metrics for the pool and gateway.
//!
//! Grounded on the teacher's `Metrics`/`PrometheusExporter` pair in
//! `src/metrics.rs`, pared down from screenshot-pipeline counters
//! (screenshots taken, queue size, retry count, ...) to what a pooled
//! resource manager actually emits: lease outcomes, launch outcomes, and
//! pool occupancy.

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::error::GatewayError;
use crate::browser_pool::BrowserPool;

const LEASES_GRANTED: &str = "gateway_leases_granted_total";
const LEASES_DENIED: &str = "gateway_leases_denied_total";
const LAUNCHES: &str = "gateway_browser_launches_total";
const LAUNCH_FAILURES: &str = "gateway_browser_launch_failures_total";
const ACTIVE_INSTANCES: &str = "gateway_active_instances";
const LEASED_INSTANCES: &str = "gateway_leased_instances";

/// Record that a lease request either succeeded or was turned away.
pub fn record_lease(granted: bool) {
    if granted {
        counter!(LEASES_GRANTED).increment(1);
    } else {
        counter!(LEASES_DENIED).increment(1);
    }
}

/// Record the outcome of a single launch attempt (cold start or restart).
pub fn record_launch(success: bool) {
    if success {
        counter!(LAUNCHES).increment(1);
    } else {
        counter!(LAUNCH_FAILURES).increment(1);
    }
}

/// Snapshot current pool occupancy into the active/leased gauges.
pub fn observe_pool(active: usize, leased: usize) {
    gauge!(ACTIVE_INSTANCES).set(active as f64);
    gauge!(LEASED_INSTANCES).set(leased as f64);
}

/// Install the global Prometheus recorder, returning a handle whose
/// `render()` produces the body for a `/metrics` endpoint.
pub fn install_recorder() -> Result<PrometheusHandle, GatewayError> {
    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();
    metrics::set_boxed_recorder(Box::new(recorder))
        .map_err(|e| GatewayError::Configuration(e.to_string()))?;
    Ok(handle)
}

/// Periodically snapshot pool occupancy into the gauges above. Companion to
/// the pool's own warm-pool/health loops, but metrics-only: it never mutates
/// the registry.
pub fn spawn_observer(pool: BrowserPool, interval: std::time::Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            observe_pool(pool.active_count().await, pool.leased_count().await);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_does_not_panic_without_an_installed_recorder() {
        record_lease(true);
        record_lease(false);
        record_launch(true);
        observe_pool(3, 1);
    }
}
