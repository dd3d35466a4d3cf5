//! Metrics for job engine monitoring.
//!
//! Recorded through the `metrics` facade; nothing is exported unless the host
//! application installs a recorder.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::time::Duration;

/// Metric names for the job engine.
pub mod names {
    /// Total items dispatched to a worker.
    pub const ITEMS_STARTED_TOTAL: &str = "morpho_job_items_started_total";
    /// Total items that completed successfully.
    pub const ITEMS_COMPLETED_TOTAL: &str = "morpho_job_items_completed_total";
    /// Total items that failed (error or panic).
    pub const ITEMS_FAILED_TOTAL: &str = "morpho_job_items_failed_total";
    /// Total items that panicked.
    pub const ITEMS_PANICKED_TOTAL: &str = "morpho_job_items_panicked_total";

    /// Total jobs submitted to an engine.
    pub const JOBS_SUBMITTED_TOTAL: &str = "morpho_jobs_submitted_total";
    /// Total jobs that finished without a fatal failure.
    pub const JOBS_COMPLETED_TOTAL: &str = "morpho_jobs_completed_total";
    /// Total jobs halted by a fatal failure.
    pub const JOBS_FAILED_TOTAL: &str = "morpho_jobs_failed_total";

    /// Item execution duration in seconds.
    pub const ITEM_DURATION_SECONDS: &str = "morpho_job_item_duration_seconds";
    /// Stages advanced.
    pub const STAGES_ADVANCED_TOTAL: &str = "morpho_job_stages_advanced_total";

    /// Workers currently executing an item.
    pub const WORKERS_BUSY: &str = "morpho_workers_busy";
    /// Worker threads alive.
    pub const WORKERS_LIVE: &str = "morpho_workers_live";
}

/// Register all metric descriptions.
pub fn register_metrics() {
    // Item counters
    describe_counter!(
        names::ITEMS_STARTED_TOTAL,
        "Total number of job items dispatched to a worker"
    );
    describe_counter!(
        names::ITEMS_COMPLETED_TOTAL,
        "Total number of job items completed successfully"
    );
    describe_counter!(
        names::ITEMS_FAILED_TOTAL,
        "Total number of job items that failed"
    );
    describe_counter!(
        names::ITEMS_PANICKED_TOTAL,
        "Total number of job items that panicked"
    );

    // Job counters
    describe_counter!(
        names::JOBS_SUBMITTED_TOTAL,
        "Total number of jobs submitted"
    );
    describe_counter!(
        names::JOBS_COMPLETED_TOTAL,
        "Total number of jobs finished successfully"
    );
    describe_counter!(
        names::JOBS_FAILED_TOTAL,
        "Total number of jobs halted by a fatal item failure"
    );
    describe_counter!(
        names::STAGES_ADVANCED_TOTAL,
        "Total number of stage transitions"
    );

    describe_histogram!(
        names::ITEM_DURATION_SECONDS,
        "Job item execution duration in seconds"
    );

    // Worker gauges
    describe_gauge!(
        names::WORKERS_BUSY,
        "Number of workers executing an item"
    );
    describe_gauge!(names::WORKERS_LIVE, "Number of live worker threads");
}

/// Job and item metrics recorder.
#[derive(Clone)]
pub struct JobMetrics;

impl JobMetrics {
    /// Record a job handed to an engine.
    pub fn job_submitted(mode: &'static str) {
        counter!(names::JOBS_SUBMITTED_TOTAL, "mode" => mode).increment(1);
    }

    /// Record a job reaching completion.
    pub fn job_finished(fatal: bool) {
        if fatal {
            counter!(names::JOBS_FAILED_TOTAL).increment(1);
        } else {
            counter!(names::JOBS_COMPLETED_TOTAL).increment(1);
        }
    }

    /// Record an item dispatch.
    pub fn item_started() {
        counter!(names::ITEMS_STARTED_TOTAL).increment(1);
    }

    /// Record an item outcome and its duration.
    pub fn item_finished(succeeded: bool, duration: Duration) {
        let status = if succeeded { "completed" } else { "failed" };
        if succeeded {
            counter!(names::ITEMS_COMPLETED_TOTAL).increment(1);
        } else {
            counter!(names::ITEMS_FAILED_TOTAL).increment(1);
        }
        histogram!(names::ITEM_DURATION_SECONDS, "status" => status)
            .record(duration.as_secs_f64());
    }

    /// Record an item panic.
    pub fn item_panicked() {
        counter!(names::ITEMS_PANICKED_TOTAL).increment(1);
    }

    /// Record a stage transition.
    pub fn stage_advanced() {
        counter!(names::STAGES_ADVANCED_TOTAL).increment(1);
    }
}

/// Worker pool metrics recorder.
#[derive(Clone)]
pub struct WorkerMetrics;

impl WorkerMetrics {
    /// Set the number of workers executing an item.
    pub fn set_busy(count: usize) {
        gauge!(names::WORKERS_BUSY).set(count as f64);
    }

    /// Set the number of live worker threads.
    pub fn set_live(count: usize) {
        gauge!(names::WORKERS_LIVE).set(count as f64);
    }
}
