use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, Encoder, HistogramVec,
    IntCounter, IntCounterVec, TextEncoder,
};

lazy_static! {
    // HTTP Metrics
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .unwrap();

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .unwrap();

    // Key-value store metrics
    pub static ref KV_OPERATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "kv_operations_total",
        "Total number of key-value store operations",
        &["backend", "operation", "status"]
    )
    .unwrap();

    pub static ref KV_OPERATION_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "kv_operation_duration_seconds",
        "Key-value store operation duration in seconds",
        &["backend", "operation"],
        vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25]
    )
    .unwrap();

    // Business Metrics
    pub static ref ATTEMPTS_RECORDED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "attempts_recorded_total",
        "Total number of quiz attempts recorded",
        &["correct"]
    )
    .unwrap();

    pub static ref ATTEMPTS_DELETED_TOTAL: IntCounter = register_int_counter!(
        "attempts_deleted_total",
        "Total number of quiz attempts deleted"
    )
    .unwrap();

    pub static ref ATTEMPT_COMMIT_CONFLICTS_TOTAL: IntCounter = register_int_counter!(
        "attempt_commit_conflicts_total",
        "Attempt transactions aborted by a conflicting write"
    )
    .unwrap();

    pub static ref CHART_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "chart_requests_total",
        "Total number of attempt chart requests",
        &["duration"]
    )
    .unwrap();
}

/// Renders all metrics in Prometheus text format
pub fn render_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer)
        .map_err(|e| prometheus::Error::Msg(format!("Failed to convert metrics to UTF-8: {}", e)))
}

/// Helper: time a key-value store operation and count its outcome
pub async fn track_kv_operation<F, T, E>(backend: &str, operation: &str, future: F) -> Result<T, E>
where
    F: std::future::Future<Output = Result<T, E>>,
{
    let start = std::time::Instant::now();
    let result = future.await;
    let duration = start.elapsed().as_secs_f64();

    let status = if result.is_ok() { "success" } else { "error" };

    KV_OPERATIONS_TOTAL
        .with_label_values(&[backend, operation, status])
        .inc();

    KV_OPERATION_DURATION_SECONDS
        .with_label_values(&[backend, operation])
        .observe(duration);

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_metrics() {
        HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/test", "200"])
            .inc();

        let output = render_metrics().unwrap();
        assert!(output.contains("http_requests_total"));
    }

    #[tokio::test]
    async fn track_kv_operation_counts_outcomes() {
        let before = KV_OPERATIONS_TOTAL
            .with_label_values(&["test", "ping", "error"])
            .get();

        let res: Result<(), &str> = track_kv_operation("test", "ping", async { Err("boom") }).await;
        assert!(res.is_err());

        let after = KV_OPERATIONS_TOTAL
            .with_label_values(&["test", "ping", "error"])
            .get();
        assert_eq!(after, before + 1);
    }
}
