//! Delta service metrics.
//!
//! Complements the structured logging emitted by the orchestrator.

use std::time::Duration;

use metrics::{counter, describe_counter, describe_histogram, histogram};

/// Operations executed, labelled by `operation` and `outcome`.
pub const DELTA_OPERATIONS: &str = "dtm_delta_operations_total";

/// Operation latency histogram, labelled by `operation`.
pub const DELTA_OPERATION_DURATION: &str = "dtm_delta_operation_duration_seconds";

/// Read-check-write attempts lost to a concurrent writer, labelled by `operation`.
pub const CAS_RETRY: &str = "dtm_delta_cas_retry_total";

/// Registers all delta metric descriptions.
///
/// Call this once at application startup after installing a metrics recorder.
pub fn register_metrics() {
    describe_counter!(DELTA_OPERATIONS, "Total delta operations by outcome");
    describe_histogram!(
        DELTA_OPERATION_DURATION,
        "Duration of delta operations in seconds"
    );
    describe_counter!(CAS_RETRY, "Total delta CAS retry attempts");
}

/// Records a finished operation. `outcome` is `ok` or a [`crate::DeltaError::kind`].
pub fn record_operation(operation: &'static str, outcome: &'static str, elapsed: Duration) {
    counter!(DELTA_OPERATIONS, "operation" => operation, "outcome" => outcome).increment(1);
    histogram!(DELTA_OPERATION_DURATION, "operation" => operation).record(elapsed.as_secs_f64());
}

/// Records a CAS retry attempt.
pub fn record_cas_retry(operation: &'static str) {
    counter!(CAS_RETRY, "operation" => operation).increment(1);
}
