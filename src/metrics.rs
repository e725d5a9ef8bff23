// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Prometheus metrics for the tunnel operator.
//!
//! All metrics carry the prefix `networking_cfargotunnel_com_` (prometheus-safe
//! version of "networking.cfargotunnel.com") and are served on `/metrics`.
//!
//! # Metrics Categories
//!
//! - **Reconciliation** - outcome and duration of each Service reconciliation
//! - **DNS** - record upserts and deletes against the DNS provider
//! - **Tunnel configuration** - `ConfigMap` writes and Deployment restart stamps
//!
//! # Example
//!
//! ```rust,no_run
//! use tunnel_operator::metrics::record_reconciliation_success;
//!
//! record_reconciliation_success(std::time::Duration::from_millis(120));
//! ```

use prometheus::{CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use std::sync::LazyLock;
use std::time::Duration;

/// Namespace prefix for all metrics (prometheus-safe)
const METRICS_NAMESPACE: &str = "networking_cfargotunnel_com";

/// Global Prometheus metrics registry
pub static METRICS_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// ============================================================================
// Reconciliation Metrics
// ============================================================================

/// Total number of Service reconciliations by status
///
/// Labels:
/// - `status`: `success` or `error`
/// - `reason`: error kind (see `Error::metric_label`), empty on success
pub static RECONCILIATION_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_reconciliations_total"),
        "Total number of Service reconciliations by status and error reason",
    );
    let counter = CounterVec::new(opts, &["status", "reason"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Duration of Service reconciliations in seconds
pub static RECONCILIATION_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        format!("{METRICS_NAMESPACE}_reconciliation_duration_seconds"),
        "Duration of Service reconciliations in seconds by status",
    )
    .buckets(vec![0.001, 0.01, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]);
    let histogram = HistogramVec::new(opts, &["status"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(histogram.clone()))
        .unwrap();
    histogram
});

// ============================================================================
// DNS Metrics
// ============================================================================

/// Total number of DNS provider calls
///
/// Labels:
/// - `operation`: `upsert` or `delete`
/// - `status`: `success` or `error`
pub static DNS_OPERATIONS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_dns_operations_total"),
        "Total number of DNS record operations by operation and status",
    );
    let counter = CounterVec::new(opts, &["operation", "status"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Tunnel Configuration Metrics
// ============================================================================

/// Total number of cloudflared `ConfigMap` writes
///
/// Labels:
/// - `tunnel`: `<namespace>/<name>` of the tunnel
pub static CONFIG_WRITES_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_config_writes_total"),
        "Total number of cloudflared configuration writes by tunnel",
    );
    let counter = CounterVec::new(opts, &["tunnel"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Total number of checksum stamps on cloudflared Deployments
///
/// Labels:
/// - `result`: `written` or `skipped` (digest unchanged)
pub static RESTART_STAMPS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_restart_stamps_total"),
        "Total number of configuration checksum stamps on cloudflared Deployments",
    );
    let counter = CounterVec::new(opts, &["result"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Record a successful reconciliation
pub fn record_reconciliation_success(duration: Duration) {
    RECONCILIATION_TOTAL
        .with_label_values(&["success", ""])
        .inc();
    RECONCILIATION_DURATION_SECONDS
        .with_label_values(&["success"])
        .observe(duration.as_secs_f64());
}

/// Record a failed reconciliation
///
/// # Arguments
/// * `reason` - Stable error kind
/// * `duration` - Duration of the reconciliation before failure
pub fn record_reconciliation_error(reason: &str, duration: Duration) {
    RECONCILIATION_TOTAL
        .with_label_values(&["error", reason])
        .inc();
    RECONCILIATION_DURATION_SECONDS
        .with_label_values(&["error"])
        .observe(duration.as_secs_f64());
}

/// Record a DNS provider call
pub fn record_dns_operation(operation: &str, success: bool) {
    let status = if success { "success" } else { "error" };
    DNS_OPERATIONS_TOTAL
        .with_label_values(&[operation, status])
        .inc();
}

/// Record a cloudflared configuration write for `tunnel` (`<namespace>/<name>`)
pub fn record_config_write(tunnel: &str) {
    CONFIG_WRITES_TOTAL.with_label_values(&[tunnel]).inc();
}

/// Record a Deployment checksum stamp, or its omission when the digest was unchanged
pub fn record_restart_stamp(written: bool) {
    let result = if written { "written" } else { "skipped" };
    RESTART_STAMPS_TOTAL.with_label_values(&[result]).inc();
}

/// Gather and encode all metrics in Prometheus text format
///
/// # Errors
/// Returns error if encoding fails
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = METRICS_REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(format!("UTF-8 error: {e}")))
}
