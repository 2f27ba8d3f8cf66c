//! # Transcription Results and Failures
//!
//! Every stage of the pipeline reports failure through [`PipelineError`].
//! The orchestrator folds the final outcome into a [`TranscriptionResult`],
//! and only the HTTP layer turns that into the `{text, success, error}` body.
//!
//! ## Consistency:
//! The wire struct is always built from a `TranscriptionResult`, so a
//! response with `success: true` always carries text and no error, and a
//! response with `success: false` always carries an error and empty text.

use serde::Serialize;

/// Machine-readable category of a pipeline failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    EmptyInput,
    ConversionFailed,
    MalformedAudio,
    Unintelligible,
    BackendUnavailable,
    RepackagingFailed,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::EmptyInput => "empty_input",
            FailureKind::ConversionFailed => "conversion_failed",
            FailureKind::MalformedAudio => "malformed_audio",
            FailureKind::Unintelligible => "unintelligible",
            FailureKind::BackendUnavailable => "backend_unavailable",
            FailureKind::RepackagingFailed => "repackaging_failed",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed error propagated through each pipeline stage.
///
/// ## Variants:
/// - **EmptyInput**: the upload had zero bytes
/// - **ConversionFailed**: the external transcoder could not be launched or exited nonzero
/// - **MalformedAudio**: the WAV container could not be read
/// - **Unintelligible**: the backend accepted the audio but produced no transcript
/// - **BackendUnavailable**: network, timeout or service-side failure
/// - **RepackagingFailed**: the fallback repackaging step could not parse its input
/// - **FallbackExhausted**: the first attempt and the repackaged retry both failed
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Empty audio file")]
    EmptyInput,

    #[error("Audio conversion failed: {0}")]
    ConversionFailed(String),

    #[error("Malformed audio: {0}")]
    MalformedAudio(String),

    #[error("Could not understand audio")]
    Unintelligible,

    #[error("Recognition service unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Audio repackaging failed: {0}")]
    RepackagingFailed(String),

    #[error("{first}; retry after repackaging also failed: {retry}")]
    FallbackExhausted {
        first: Box<PipelineError>,
        retry: Box<PipelineError>,
    },
}

impl PipelineError {
    /// Failure category reported to callers.
    ///
    /// A `FallbackExhausted` error reports the kind of the retry, since that
    /// is the attempt that ended the run.
    pub fn kind(&self) -> FailureKind {
        match self {
            PipelineError::EmptyInput => FailureKind::EmptyInput,
            PipelineError::ConversionFailed(_) => FailureKind::ConversionFailed,
            PipelineError::MalformedAudio(_) => FailureKind::MalformedAudio,
            PipelineError::Unintelligible => FailureKind::Unintelligible,
            PipelineError::BackendUnavailable(_) => FailureKind::BackendUnavailable,
            PipelineError::RepackagingFailed(_) => FailureKind::RepackagingFailed,
            PipelineError::FallbackExhausted { retry, .. } => retry.kind(),
        }
    }
}

/// Outcome of one pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub enum TranscriptionResult {
    Success { text: String },
    Failure { kind: FailureKind, message: String },
}

impl TranscriptionResult {
    pub fn success(text: impl Into<String>) -> Self {
        TranscriptionResult::Success { text: text.into() }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TranscriptionResult::Success { .. })
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            TranscriptionResult::Success { .. } => None,
            TranscriptionResult::Failure { kind, .. } => Some(*kind),
        }
    }
}

impl From<PipelineError> for TranscriptionResult {
    fn from(err: PipelineError) -> Self {
        TranscriptionResult::Failure {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl From<Result<String, PipelineError>> for TranscriptionResult {
    fn from(result: Result<String, PipelineError>) -> Self {
        match result {
            Ok(text) => TranscriptionResult::success(text),
            Err(err) => err.into(),
        }
    }
}

/// JSON body returned by `POST /api/v1/speech-to-text`.
///
/// ```json
/// { "text": "hello world", "success": true, "error": null }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpeechToTextResponse {
    pub text: String,
    pub success: bool,
    pub error: Option<String>,
}

impl SpeechToTextResponse {
    /// In-body failure for problems found before the pipeline runs
    /// (missing file field, oversized upload, broken multipart stream).
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            text: String::new(),
            success: false,
            error: Some(message.into()),
        }
    }
}

impl From<TranscriptionResult> for SpeechToTextResponse {
    fn from(result: TranscriptionResult) -> Self {
        match result {
            TranscriptionResult::Success { text } => Self {
                text,
                success: true,
                error: None,
            },
            TranscriptionResult::Failure { message, .. } => Self::rejected(message),
        }
    }
}
