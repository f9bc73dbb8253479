use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Encoder, Gauge, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry,
    TextEncoder,
};
use std::time::Duration;

/// Metric name prefix for all collector metrics
const PREFIX: &str = "artifact_collector";

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    pub static ref ARTIFACTS_CREATED_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_artifacts_created_total"), "Artifacts created from collected builds"),
        &["source_type"]
    ).expect("Failed to create artifacts_created_total metric");

    pub static ref COLLECTION_RUNS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_collection_runs_total"), "Collection runs by outcome"),
        &["outcome"]
    ).expect("Failed to create collection_runs_total metric");

    pub static ref DISPATCHES_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_dispatches_total"), "Tasks submitted to the worker fabric"),
        &["purpose"]
    ).expect("Failed to create dispatches_total metric");

    pub static ref DISPATCH_COMPLETIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_dispatch_completions_total"), "Dispatched task completions by outcome"),
        &["purpose", "outcome"]
    ).expect("Failed to create dispatch_completions_total metric");

    pub static ref DISPATCHES_IN_FLIGHT: Gauge = Gauge::new(
        format!("{PREFIX}_dispatches_in_flight"),
        "Correlations waiting for a worker response"
    ).expect("Failed to create dispatches_in_flight metric");

    pub static ref GC_ARTIFACTS_DELETED_TOTAL: Counter = Counter::new(
        format!("{PREFIX}_gc_artifacts_deleted_total"),
        "Artifacts removed by retention GC"
    ).expect("Failed to create gc_artifacts_deleted_total metric");

    pub static ref GC_FILE_DELETE_FAILURES_TOTAL: Counter = Counter::new(
        format!("{PREFIX}_gc_file_delete_failures_total"),
        "Stored files that could not be deleted"
    ).expect("Failed to create gc_file_delete_failures_total metric");

    pub static ref PERPETUAL_TASK_OPERATIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_perpetual_task_operations_total"), "Perpetual task client calls"),
        &["operation", "outcome"]
    ).expect("Failed to create perpetual_task_operations_total metric");

    pub static ref BACKGROUND_JOB_EXECUTIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_background_job_executions_total"), "Background job executions by status"),
        &["job_id", "status"]
    ).expect("Failed to create background_job_executions_total metric");

    pub static ref BACKGROUND_JOB_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new(format!("{PREFIX}_background_job_duration_seconds"), "Background job execution time")
            .buckets(vec![0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 300.0, 900.0]),
        &["job_id"]
    ).expect("Failed to create background_job_duration metric");

    pub static ref BACKGROUND_JOB_RUNNING: GaugeVec = GaugeVec::new(
        Opts::new(format!("{PREFIX}_background_job_running"), "Whether a background job is running"),
        &["job_id"]
    ).expect("Failed to create background_job_running metric");
}

pub fn init_metrics() {
    // Ignore errors if already registered (for tests)
    let _ = REGISTRY.register(Box::new(ARTIFACTS_CREATED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(COLLECTION_RUNS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(DISPATCHES_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(DISPATCH_COMPLETIONS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(DISPATCHES_IN_FLIGHT.clone()));
    let _ = REGISTRY.register(Box::new(GC_ARTIFACTS_DELETED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(GC_FILE_DELETE_FAILURES_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(PERPETUAL_TASK_OPERATIONS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(BACKGROUND_JOB_EXECUTIONS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(BACKGROUND_JOB_DURATION.clone()));
    let _ = REGISTRY.register(Box::new(BACKGROUND_JOB_RUNNING.clone()));

    tracing::info!("Metrics system initialized successfully");
}

pub fn record_artifacts_created(source_type: &str, count: usize) {
    if count > 0 {
        ARTIFACTS_CREATED_TOTAL
            .with_label_values(&[source_type])
            .inc_by(count as f64);
    }
}

/// Outcome is one of collected, skipped, failed, abandoned.
pub fn record_collection_run(outcome: &str) {
    COLLECTION_RUNS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_dispatch(purpose: &str) {
    DISPATCHES_TOTAL.with_label_values(&[purpose]).inc();
}

pub fn record_dispatch_completion(purpose: &str, outcome: &str) {
    DISPATCH_COMPLETIONS_TOTAL
        .with_label_values(&[purpose, outcome])
        .inc();
}

pub fn set_dispatches_in_flight(count: usize) {
    DISPATCHES_IN_FLIGHT.set(count as f64);
}

pub fn record_gc(artifacts_deleted: usize, file_failures: usize) {
    GC_ARTIFACTS_DELETED_TOTAL.inc_by(artifacts_deleted as f64);
    GC_FILE_DELETE_FAILURES_TOTAL.inc_by(file_failures as f64);
}

pub fn record_perpetual_task_op(operation: &str, success: bool) {
    PERPETUAL_TASK_OPERATIONS_TOTAL
        .with_label_values(&[operation, if success { "success" } else { "failure" }])
        .inc();
}

pub fn record_background_job_execution(job_id: &str, status: &str, duration: Duration) {
    BACKGROUND_JOB_EXECUTIONS_TOTAL
        .with_label_values(&[job_id, status])
        .inc();
    BACKGROUND_JOB_DURATION
        .with_label_values(&[job_id])
        .observe(duration.as_secs_f64());
}

pub fn set_background_job_running(job_id: &str, running: bool) {
    BACKGROUND_JOB_RUNNING
        .with_label_values(&[job_id])
        .set(if running { 1.0 } else { 0.0 });
}

/// Text exposition of every registered metric.
pub fn gather() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => String::from_utf8(buffer).unwrap_or_default(),
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            String::new()
        }
    }
}
