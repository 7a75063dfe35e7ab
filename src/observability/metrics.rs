//! Metric helpers for the integrator.
//!
//! Every metric name lives in [`MetricName`] so call sites never spell out
//! strings. Nothing here installs a recorder: without one the calls are no-ops,
//! and an embedding process can attach whichever exporter it uses.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Source requests
    SourcesRequestsSuccess,
    SourcesRequestsError,
    SourcesRequestDuration,

    // IPED pulls
    IpedResponsesRejected,
    IpedPagesFetched,
    IpedSummariesFetched,

    // Table transform
    TransformStageDuration,
    TransformStageFailures,
    TransformRowsProcessed,

    // Send buffer
    SenderRecordsAppended,
    SenderBatchesDelivered,
    SenderDeliveryFailures,
    SenderBatchBytes,

    // Run loop
    UsersProcessed,
    UsersFailed,
    RunDuration,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::SourcesRequestsSuccess => "integrator_sources_requests_success_total",
            MetricName::SourcesRequestsError => "integrator_sources_requests_error_total",
            MetricName::SourcesRequestDuration => "integrator_sources_request_duration_seconds",
            MetricName::IpedResponsesRejected => "integrator_iped_responses_rejected_total",
            MetricName::IpedPagesFetched => "integrator_iped_pages_fetched_total",
            MetricName::IpedSummariesFetched => "integrator_iped_summaries_fetched_total",
            MetricName::TransformStageDuration => "integrator_transform_stage_duration_seconds",
            MetricName::TransformStageFailures => "integrator_transform_stage_failures_total",
            MetricName::TransformRowsProcessed => "integrator_transform_rows_processed_total",
            MetricName::SenderRecordsAppended => "integrator_sender_records_appended_total",
            MetricName::SenderBatchesDelivered => "integrator_sender_batches_delivered_total",
            MetricName::SenderDeliveryFailures => "integrator_sender_delivery_failures_total",
            MetricName::SenderBatchBytes => "integrator_sender_batch_bytes",
            MetricName::UsersProcessed => "integrator_users_processed_total",
            MetricName::UsersFailed => "integrator_users_failed_total",
            MetricName::RunDuration => "integrator_run_duration_seconds",
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub mod sources {
    use super::MetricName;
    use metrics::{counter, histogram};

    pub fn request_success() {
        counter!(MetricName::SourcesRequestsSuccess.as_str()).increment(1);
    }

    pub fn request_error() {
        counter!(MetricName::SourcesRequestsError.as_str()).increment(1);
    }

    pub fn request_duration(secs: f64) {
        histogram!(MetricName::SourcesRequestDuration.as_str()).record(secs);
    }
}

pub mod iped {
    use super::MetricName;
    use metrics::counter;

    pub fn response_rejected(endpoint: &str) {
        counter!(MetricName::IpedResponsesRejected.as_str(), "endpoint" => endpoint.to_string())
            .increment(1);
    }

    pub fn page_fetched() {
        counter!(MetricName::IpedPagesFetched.as_str()).increment(1);
    }

    pub fn summary_fetched() {
        counter!(MetricName::IpedSummariesFetched.as_str()).increment(1);
    }
}

pub mod transform {
    use super::MetricName;
    use metrics::{counter, histogram};

    pub fn stage_duration(stage: &'static str, secs: f64) {
        histogram!(MetricName::TransformStageDuration.as_str(), "stage" => stage).record(secs);
    }

    pub fn stage_failed(stage: &'static str) {
        counter!(MetricName::TransformStageFailures.as_str(), "stage" => stage).increment(1);
    }

    pub fn rows_processed(rows: usize) {
        counter!(MetricName::TransformRowsProcessed.as_str()).increment(rows as u64);
    }
}

pub mod sender {
    use super::MetricName;
    use metrics::{counter, histogram};

    pub fn record_appended() {
        counter!(MetricName::SenderRecordsAppended.as_str()).increment(1);
    }

    pub fn batch_delivered(bytes: usize) {
        counter!(MetricName::SenderBatchesDelivered.as_str()).increment(1);
        histogram!(MetricName::SenderBatchBytes.as_str()).record(bytes as f64);
    }

    pub fn delivery_failed() {
        counter!(MetricName::SenderDeliveryFailures.as_str()).increment(1);
    }
}

pub mod run {
    use super::MetricName;
    use metrics::{counter, histogram};

    pub fn user_processed() {
        counter!(MetricName::UsersProcessed.as_str()).increment(1);
    }

    pub fn user_failed() {
        counter!(MetricName::UsersFailed.as_str()).increment(1);
    }

    pub fn duration(secs: f64) {
        histogram!(MetricName::RunDuration.as_str()).record(secs);
    }
}
