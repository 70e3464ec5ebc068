use anyhow::Context;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus HTTP exporter on the given port.
/// After this call, any metrics recorded via the `metrics` crate
/// macros (counter!, histogram!) are automatically exported at /metrics.
pub fn init_metrics_server(port: u16) -> anyhow::Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("failed to start Prometheus metrics server")
}

// ── Inbound metrics ──────────────────────────────────────────────

/// `kind` is one of catalog / update / malformed.
pub fn record_message(kind: &'static str) {
    counter!("feed_messages_total", "kind" => kind).increment(1);
}

// ── Flush / merge metrics ────────────────────────────────────────

pub fn record_flush(batch_size: usize, rows: usize) {
    counter!("feed_flushes_total").increment(1);
    histogram!("feed_flush_batch_size").record(batch_size as f64);
    gauge!("feed_table_rows").set(rows as f64);
}

pub fn record_merge(updated: usize, deleted: usize) {
    counter!("feed_merge_updated_total").increment(updated as u64);
    counter!("feed_merge_deleted_total").increment(deleted as u64);
}

// ── Connection metrics ───────────────────────────────────────────

pub fn record_connection_transition(state: &'static str) {
    counter!("feed_connection_transitions_total", "state" => state).increment(1);
}

pub fn record_control_message(kind: &'static str) {
    counter!("feed_control_messages_total", "type" => kind).increment(1);
}
