//! Prometheus metrics setup and metric definitions

use anyhow::{Context, Result};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and return a handle for rendering metrics.
pub fn install_prometheus_recorder() -> Result<PrometheusHandle> {
    // Latency buckets in seconds; the upper end covers large uploads
    let buckets = [
        0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
    ];

    PrometheusBuilder::new()
        .set_buckets(&buckets)
        .context("Failed to set histogram buckets")?
        .install_recorder()
        .context("Failed to install Prometheus recorder")
}

/// Register metric descriptions and emit initial zero values so Prometheus output
/// includes HELP/TYPE lines for all metrics from startup.
pub fn describe_metrics() {
    describe_counter!("jobgate_http_requests_total", "Total number of HTTP requests");
    describe_histogram!(
        "jobgate_http_request_duration_seconds",
        "HTTP request duration in seconds"
    );
    describe_gauge!(
        "jobgate_http_requests_in_flight",
        "Number of HTTP requests currently being processed"
    );

    describe_counter!(
        "jobgate_authz_decisions_total",
        "Authorization decisions by outcome (allow/deny/unclassified)"
    );
    describe_counter!(
        "jobgate_jobs_dispatched_total",
        "Asynchronous job dispatches by job type and result"
    );
    describe_counter!(
        "jobgate_blob_uploads_total",
        "Files staged to the blob store by result"
    );
    describe_counter!(
        "jobgate_consistency_wait_total",
        "Post-dispatch visibility waits by result (visible/exhausted)"
    );
    describe_counter!(
        "jobgate_proxy_requests_total",
        "Synchronous backend requests by job type and result"
    );

    // Counters gated behind specific code paths need an explicit zero
    for decision in ["allow", "deny", "unclassified"] {
        counter!("jobgate_authz_decisions_total", "decision" => decision).absolute(0);
    }
    counter!("jobgate_jobs_dispatched_total", "job_type" => "ingest", "result" => "success")
        .absolute(0);
    counter!("jobgate_blob_uploads_total", "result" => "success").absolute(0);
    counter!("jobgate_blob_uploads_total", "result" => "failure").absolute(0);
    counter!("jobgate_consistency_wait_total", "result" => "visible").absolute(0);
    counter!("jobgate_consistency_wait_total", "result" => "exhausted").absolute(0);
    counter!("jobgate_proxy_requests_total", "job_type" => "status", "result" => "success")
        .absolute(0);
    gauge!("jobgate_http_requests_in_flight").set(0.0);
}
