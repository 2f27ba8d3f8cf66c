//! # Application State Management
//!
//! Shared state handed to every request handler through `web::Data<AppState>`.
//!
//! ## What is shared:
//! - **config**: the loaded configuration. Read-only after startup, so a plain
//!   `Arc` is enough.
//! - **pipeline**: the transcription pipeline with its injected transcoder and
//!   recognizer. Also read-only; each request drives its own `process` call.
//! - **metrics**: counters updated by the middleware and by the upload handler,
//!   kept behind `Arc<RwLock<...>>`.
//!
//! ## Locking:
//! Metric updates hold the write lock only for a few additions and never across
//! an `.await`. A poisoned lock still yields its data; a counter left
//! half-updated by a panicking thread is not worth failing every later request.

use crate::config::AppConfig;
use crate::transcription::{PipelineReport, TranscriptionPipeline};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub pipeline: Arc<TranscriptionPipeline>,
    pub metrics: Arc<RwLock<AppMetrics>>,
    /// Instant is Copy and never changes, so no lock is needed.
    pub start_time: Instant,
}

/// Counters collected across all HTTP requests.
#[derive(Debug, Default, Clone)]
pub struct AppMetrics {
    /// Total number of HTTP requests processed since server start
    pub request_count: u64,

    /// Requests answered with a 4xx/5xx status
    pub error_count: u64,

    /// Outcomes of the transcription pipeline
    pub transcription: TranscriptionStats,

    /// Key: endpoint name (e.g., "POST /api/v1/speech-to-text")
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

/// Pipeline outcome counters.
///
/// `failed` counts uploads that ended with `success: false`, including those
/// rejected before reaching the pipeline (missing field, oversized body).
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TranscriptionStats {
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Runs that needed the repackage-and-retry fallback
    pub fallback_attempts: u64,
    /// Runs whose upload went through the transcoder
    pub transcoded: u64,
    pub total_processing_ms: u64,
}

impl TranscriptionStats {
    pub fn average_processing_ms(&self) -> f64 {
        if self.total > 0 {
            self.total_processing_ms as f64 / self.total as f64
        } else {
            0.0
        }
    }
}

/// Per-endpoint request statistics.
///
/// ## Derived values:
/// - **Average response time**: total_duration_ms / request_count
/// - **Error rate**: error_count / request_count
#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,
    pub total_duration_ms: u64,
    pub error_count: u64,
}

impl AppState {
    /// Build the shared state around an already validated configuration and
    /// a fully wired pipeline.
    pub fn new(config: AppConfig, pipeline: TranscriptionPipeline) -> Self {
        Self {
            config: Arc::new(config),
            pipeline: Arc::new(pipeline),
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            start_time: Instant::now(),
        }
    }

    fn metrics_read(&self) -> RwLockReadGuard<'_, AppMetrics> {
        self.metrics.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn metrics_write(&self) -> RwLockWriteGuard<'_, AppMetrics> {
        self.metrics.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Called by the metrics middleware for every request.
    pub fn increment_request_count(&self) {
        self.metrics_write().request_count += 1;
    }

    pub fn increment_error_count(&self) {
        self.metrics_write().error_count += 1;
    }

    /// Record detailed metrics for a specific endpoint.
    ///
    /// The first request to an endpoint creates its entry with zeroed counters.
    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.metrics_write();
        let endpoint_metric = metrics.endpoint_metrics.entry(endpoint.to_string()).or_default();

        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;
        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    /// Fold one pipeline run into the transcription counters.
    pub fn record_transcription(&self, report: &PipelineReport) {
        let mut metrics = self.metrics_write();
        let stats = &mut metrics.transcription;

        stats.total += 1;
        if report.result.is_success() {
            stats.succeeded += 1;
        } else {
            stats.failed += 1;
        }
        if report.recognition_attempts > 1 {
            stats.fallback_attempts += 1;
        }
        if report.transcoded {
            stats.transcoded += 1;
        }
        stats.total_processing_ms += report.processing_time_ms;
    }

    /// Count an upload that was rejected before the pipeline ran.
    pub fn record_rejected_upload(&self) {
        let mut metrics = self.metrics_write();
        metrics.transcription.total += 1;
        metrics.transcription.failed += 1;
    }

    /// Snapshot of the current metrics, so the lock is not held while
    /// serializing a response.
    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        self.metrics_read().clone()
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl EndpointMetric {
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    /// Error rate between 0.0 and 1.0.
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::audio::format::PcmSpec;
    use crate::audio::transcoder::Transcoder;
    use crate::transcription::client::Recognizer;
    use crate::transcription::result::{PipelineError, TranscriptionResult};
    use async_trait::async_trait;

    struct Unused;

    #[async_trait]
    impl Transcoder for Unused {
        async fn transcode(&self, _input: &[u8]) -> Result<Vec<u8>, PipelineError> {
            Err(PipelineError::ConversionFailed("not wired".to_string()))
        }
    }

    #[async_trait]
    impl Recognizer for Unused {
        async fn recognize(&self, _wav: &[u8]) -> Result<String, PipelineError> {
            Err(PipelineError::Unintelligible)
        }
    }

    /// State whose pipeline fails every run; enough for counter tests.
    pub fn idle_state() -> AppState {
        let pipeline = TranscriptionPipeline::new(PcmSpec::default(), Arc::new(Unused), Arc::new(Unused));
        AppState::new(AppConfig::default(), pipeline)
    }

    fn report(result: TranscriptionResult, transcoded: bool, attempts: u8) -> PipelineReport {
        PipelineReport {
            result,
            transcoded,
            recognition_attempts: attempts,
            processing_time_ms: 10,
        }
    }

    #[test]
    fn test_record_transcription_counts_outcomes() {
        let state = idle_state();

        state.record_transcription(&report(TranscriptionResult::success("hi"), true, 1));
        state.record_transcription(&report(PipelineError::Unintelligible.into(), false, 2));
        state.record_rejected_upload();

        let stats = state.get_metrics_snapshot().transcription;
        assert_eq!(stats.total, 3);
        assert_eq!(stats.succeeded, 1);
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.fallback_attempts, 1);
        assert_eq!(stats.transcoded, 1);
        assert_eq!(stats.average_processing_ms(), 20.0 / 3.0);
    }

    #[test]
    fn test_endpoint_metrics() {
        let state = idle_state();

        state.record_endpoint_request("GET /health", 4, false);
        state.record_endpoint_request("GET /health", 6, true);

        let snapshot = state.get_metrics_snapshot();
        let metric = &snapshot.endpoint_metrics["GET /health"];
        assert_eq!(metric.request_count, 2);
        assert_eq!(metric.average_duration_ms(), 5.0);
        assert_eq!(metric.error_rate(), 0.5);
    }
}
