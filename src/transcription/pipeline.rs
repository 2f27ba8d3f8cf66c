//! # Transcription Pipeline
//!
//! Orchestrates one upload from raw bytes to a [`TranscriptionResult`].
//!
//! ## Stages:
//! ```text
//! Received ──empty──────────────────────────────▶ Done(Failure: EmptyInput)
//!    │
//!    ▼
//! Transcoding (only for webm/opus) ──fails──────▶ Done(Failure: ConversionFailed)
//!    │
//!    ▼
//! Recognizing ──ok──────────────────────────────▶ Done(Success)
//!    │ any failure
//!    ▼
//! Repackaging ─▶ RecognizingRetry ──ok──────────▶ Done(Success)
//!                      │ repackage or retry fails
//!                      ▼
//!                Done(Failure: both attempts)
//! ```
//!
//! There are at most two recognition attempts per upload. The retry is a
//! plain second call, so it can never trigger a further fallback.
//!
//! ## Concurrency:
//! A pipeline holds only read-only configuration and shared collaborators.
//! Each request runs its own `process` call; nothing is shared between runs.

use crate::audio::format::{needs_transcode, AudioBlob, PcmSpec};
use crate::audio::repackager::repackage;
use crate::audio::transcoder::Transcoder;
use crate::transcription::client::Recognizer;
use crate::transcription::result::{PipelineError, TranscriptionResult};
use std::borrow::Cow;
use std::sync::Arc;
use std::time::Instant;

/// Named pipeline stages, used for structured logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Transcoding,
    Recognizing,
    Repackaging,
    RecognizingRetry,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Received => "received",
            Stage::Transcoding => "transcoding",
            Stage::Recognizing => "recognizing",
            Stage::Repackaging => "repackaging",
            Stage::RecognizingRetry => "recognizing_retry",
        }
    }
}

/// Everything the caller learns about one run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineReport {
    pub result: TranscriptionResult,
    /// Whether the upload went through the transcoder.
    pub transcoded: bool,
    /// Number of recognition calls made (0, 1 or 2).
    pub recognition_attempts: u8,
    pub processing_time_ms: u64,
}

/// Audio normalization and transcription pipeline.
///
/// ## Dependencies:
/// The transcoder and recognizer are injected at construction, so tests and
/// alternative deployments can swap them without touching the stages.
#[derive(Clone)]
pub struct TranscriptionPipeline {
    spec: PcmSpec,
    transcoder: Arc<dyn Transcoder>,
    recognizer: Arc<dyn Recognizer>,
}

/// Per-run bookkeeping kept on the stack of `process`.
#[derive(Debug, Default)]
struct RunTrace {
    transcoded: bool,
    recognition_attempts: u8,
}

impl TranscriptionPipeline {
    pub fn new(spec: PcmSpec, transcoder: Arc<dyn Transcoder>, recognizer: Arc<dyn Recognizer>) -> Self {
        Self {
            spec,
            transcoder,
            recognizer,
        }
    }

    pub fn spec(&self) -> &PcmSpec {
        &self.spec
    }

    /// Run the full pipeline for one upload.
    ///
    /// Never fails: every stage error is folded into the returned report.
    pub async fn process(&self, blob: &AudioBlob) -> PipelineReport {
        let start_time = Instant::now();
        let mut trace = RunTrace::default();

        let outcome = self.run(blob, &mut trace).await;
        if let Err(err) = &outcome {
            tracing::error!(kind = %err.kind(), error = %err, "Audio processing failed");
        }

        PipelineReport {
            result: outcome.into(),
            transcoded: trace.transcoded,
            recognition_attempts: trace.recognition_attempts,
            processing_time_ms: start_time.elapsed().as_millis() as u64,
        }
    }

    async fn run(&self, blob: &AudioBlob, trace: &mut RunTrace) -> Result<String, PipelineError> {
        tracing::info!(
            stage = Stage::Received.as_str(),
            bytes = blob.len(),
            content_type = %blob.content_type(),
            "Processing audio upload"
        );
        if blob.is_empty() {
            return Err(PipelineError::EmptyInput);
        }

        let wav = self.normalize(blob, trace).await?;

        let first = match self.recognize(Stage::Recognizing, &wav, trace).await {
            Ok(text) => return Ok(text),
            Err(err) => err,
        };
        tracing::warn!(
            stage = Stage::Recognizing.as_str(),
            kind = %first.kind(),
            error = %first,
            "Direct recognition failed, retrying with repackaged audio"
        );

        self.retry_repackaged(&wav, first, trace).await
    }

    /// Transcode when the declared type asks for it; otherwise borrow the upload as-is.
    async fn normalize<'a>(&self, blob: &'a AudioBlob, trace: &mut RunTrace) -> Result<Cow<'a, [u8]>, PipelineError> {
        if !needs_transcode(blob.content_type()) {
            return Ok(Cow::Borrowed(blob.bytes()));
        }

        tracing::info!(stage = Stage::Transcoding.as_str(), "Converting WebM/Opus audio to WAV format");
        trace.transcoded = true;
        let wav = self.transcoder.transcode(blob.bytes()).await?;
        Ok(Cow::Owned(wav))
    }

    async fn recognize(&self, stage: Stage, wav: &[u8], trace: &mut RunTrace) -> Result<String, PipelineError> {
        trace.recognition_attempts += 1;
        tracing::debug!(stage = stage.as_str(), attempt = trace.recognition_attempts, bytes = wav.len(), "Recognizing audio");
        self.recognizer.recognize(wav).await
    }

    async fn retry_repackaged(
        &self,
        wav: &[u8],
        first: PipelineError,
        trace: &mut RunTrace,
    ) -> Result<String, PipelineError> {
        tracing::debug!(stage = Stage::Repackaging.as_str(), "Repackaging WAV frames");
        let outcome = match repackage(wav, &self.spec) {
            Ok(repackaged) => self.recognize(Stage::RecognizingRetry, &repackaged, trace).await,
            Err(err) => Err(err),
        };

        outcome.map_err(|retry| PipelineError::FallbackExhausted {
            first: Box::new(first),
            retry: Box::new(retry),
        })
    }
}
