//! Prometheus counters for the order lifecycle.

use std::sync::OnceLock;

use metrics_exporter_prometheus::PrometheusHandle;
use tracing::info;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder. The rendered snapshot is exposed on the
/// router's `/metrics` route.
pub fn init() -> Result<(), Box<dyn std::error::Error>> {
    let handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))?;
    METRICS_HANDLE.set(handle).ok();
    info!("Metrics system initialized");
    Ok(())
}

/// Render the current metrics snapshot in Prometheus text format.
pub fn render() -> Option<String> {
    METRICS_HANDLE.get().map(|handle| handle.render())
}

pub fn record_order_placed() {
    ::metrics::counter!("gymshop_orders_placed_total").increment(1);
}

pub fn record_order_cancelled() {
    ::metrics::counter!("gymshop_orders_cancelled_total").increment(1);
}

pub fn record_stock_rejection() {
    ::metrics::counter!("gymshop_orders_rejected_insufficient_stock_total").increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    // Counters recorded through the `metrics` macros must land in the
    // installed Prometheus recorder; a version mismatch between the two
    // crates makes every counter a silent no-op and this snapshot empty.
    #[tokio::test]
    async fn recorded_counters_appear_in_the_rendered_snapshot() {
        init().expect("recorder installs");
        record_order_placed();
        record_order_cancelled();
        record_stock_rejection();

        let snapshot = render().expect("recorder handle available");
        assert!(snapshot.contains("gymshop_orders_placed_total"));
        assert!(snapshot.contains("gymshop_orders_cancelled_total"));
        assert!(snapshot.contains("gymshop_orders_rejected_insufficient_stock_total"));
    }
}
