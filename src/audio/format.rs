//! # Audio Formats
//!
//! Canonical PCM target, the uploaded audio blob, and the content-type
//! heuristic that decides whether an upload must be transcoded first.

use serde::{Deserialize, Serialize};

/// Canonical PCM layout handed to the recognition backend.
///
/// ## Defaults:
/// - **sample_rate_hz**: 16000
/// - **channels**: 1 (mono)
/// - **sample_width_bytes**: 2 (16-bit little-endian)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PcmSpec {
    pub sample_rate_hz: u32,
    pub channels: u16,
    pub sample_width_bytes: u16,
}

impl Default for PcmSpec {
    fn default() -> Self {
        Self {
            sample_rate_hz: 16000,
            channels: 1,
            sample_width_bytes: 2,
        }
    }
}

impl PcmSpec {
    /// Bytes per frame (one sample for every channel).
    pub fn block_align(&self) -> u16 {
        self.channels * self.sample_width_bytes
    }

    pub fn byte_rate(&self) -> u32 {
        self.sample_rate_hz * self.block_align() as u32
    }

    pub fn bits_per_sample(&self) -> u16 {
        self.sample_width_bytes * 8
    }
}

/// Raw upload bytes plus the caller-declared content type.
///
/// Immutable once received; the pipeline only ever borrows it.
#[derive(Debug, Clone)]
pub struct AudioBlob {
    bytes: Vec<u8>,
    content_type: String,
}

impl AudioBlob {
    pub fn new(bytes: Vec<u8>, content_type: impl Into<String>) -> Self {
        Self {
            bytes,
            content_type: content_type.into(),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Decide whether the declared content type needs transcoding to WAV.
///
/// ## Policy:
/// A case-insensitive match on `webm` or `opus` anywhere in the declared type
/// sends the upload through the transcoder. Everything else, including an
/// empty type, goes straight to recognition as if it were a WAV container.
///
/// ## Limitation:
/// This trusts the caller's MIME type and never inspects the bytes. An Ogg
/// upload declared as `audio/wav` will reach the recognizer untouched and
/// fail there as malformed audio.
pub fn needs_transcode(content_type: &str) -> bool {
    let declared = content_type.to_ascii_lowercase();
    declared.contains("webm") || declared.contains("opus")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_webm_and_opus_need_transcode() {
        assert!(needs_transcode("audio/webm"));
        assert!(needs_transcode("audio/webm;codecs=opus"));
        assert!(needs_transcode("AUDIO/WEBM"));
        assert!(needs_transcode("audio/ogg; codecs=Opus"));
    }

    #[test]
    fn test_other_types_skip_transcode() {
        assert!(!needs_transcode("audio/wav"));
        assert!(!needs_transcode("audio/x-wav"));
        assert!(!needs_transcode("application/octet-stream"));
        assert!(!needs_transcode(""));
    }

    #[test]
    fn test_default_pcm_spec() {
        let spec = PcmSpec::default();
        assert_eq!(spec.block_align(), 2);
        assert_eq!(spec.byte_rate(), 32000);
        assert_eq!(spec.bits_per_sample(), 16);
    }
}
