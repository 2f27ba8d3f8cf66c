//! # Audio Normalization
//!
//! Everything needed to turn an uploaded file into audio the recognition
//! backend will accept.
//!
//! ## Key Components:
//! - **format**: canonical PCM spec, the upload blob, and the content-type heuristic
//! - **transcoder**: ffmpeg-based conversion of WebM/Opus uploads to PCM WAV
//! - **repackager**: header-rewriting fallback for WAV files the recognizer rejected
//!
//! ## Canonical Format:
//! - **Sample Rate**: 16kHz (16,000 Hz)
//! - **Bit Depth**: 16-bit PCM
//! - **Channels**: Mono (1 channel)
//! - **Encoding**: Little-endian signed integers

pub mod format;      // PcmSpec, AudioBlob, needs_transcode
pub mod repackager;  // WAV header rewrite fallback
pub mod transcoder;  // External ffmpeg invocation

#[cfg(test)]
pub mod fixtures;

pub use format::{AudioBlob, PcmSpec};
pub use transcoder::FfmpegTranscoder;
