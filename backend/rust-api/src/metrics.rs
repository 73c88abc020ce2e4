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

    // Orchestration metrics
    pub static ref GENERATION_RUNS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "generation_runs_total",
        "Question-generation runs by content source",
        &["source"]
    )
    .unwrap();

    pub static ref ANALYSIS_RUNS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "analysis_runs_total",
        "Session-analysis runs by content source",
        &["source"]
    )
    .unwrap();

    pub static ref TOOL_CALLS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "tool_calls_total",
        "Tool invocations dispatched during orchestration runs",
        &["tool", "status"]
    )
    .unwrap();

    pub static ref QUOTA_RESETS_TOTAL: IntCounter = register_int_counter!(
        "quota_resets_total",
        "Daily quota counter resets at calendar-day boundaries"
    )
    .unwrap();

    // Business metrics
    pub static ref ATTEMPTS_STARTED_TOTAL: IntCounter = register_int_counter!(
        "attempts_started_total",
        "Total number of test attempts started"
    )
    .unwrap();

    pub static ref SESSIONS_SUBMITTED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "sessions_submitted_total",
        "Total number of session batches submitted",
        &["status"]
    )
    .unwrap();

    pub static ref ANSWERS_RECORDED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "answers_recorded_total",
        "Total number of answers recorded",
        &["correct"]
    )
    .unwrap();
}

pub fn render_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}
