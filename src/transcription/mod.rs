//! # Transcription Module
//!
//! Turns normalized audio into text through a remote speech-recognition
//! service, with one deterministic fallback when direct recognition fails.
//!
//! ## Key Components:
//! - **result**: failure kinds, the typed pipeline error, and the wire response
//! - **client**: the `Recognizer` seam and its HTTP implementation
//! - **pipeline**: the orchestrator sequencing sniff, transcode, recognize and retry

pub mod client;    // Remote recognition backend
pub mod pipeline;  // Stage orchestration and fallback
pub mod result;    // Result, error and response types

pub use client::HttpRecognizer;
pub use pipeline::{PipelineReport, TranscriptionPipeline};
pub use result::SpeechToTextResponse;
