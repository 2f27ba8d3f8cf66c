//! # Configuration Management
//!
//! This module handles loading and managing application configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. `HOST` / `PORT` (deployment platform conventions)
//! 2. Environment variables (`APP_SERVER__PORT`, `APP_RECOGNIZER__ENDPOINT`, ...)
//! 3. Configuration file (config.toml)
//! 4. Default values (defined in the Default impl)
//!
//! Nested keys are separated by a double underscore so that field names
//! containing single underscores (`sample_rate_hz`, `timeout_secs`) survive.
//!
//! ## Read-only at runtime:
//! The loaded configuration is shared by every request and never mutated after
//! startup.

use crate::audio::PcmSpec;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

/// Main application configuration that contains all settings.
///
/// ## Sections:
/// - **server**: where the HTTP listener binds
/// - **audio**: the canonical PCM format for transcoding and repackaging
/// - **transcoder**: the external ffmpeg tool and its scratch space
/// - **recognizer**: the remote speech-recognition backend
/// - **upload**: limits and debug copies for incoming files
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub audio: PcmSpec,
    pub transcoder: TranscoderConfig,
    pub recognizer: RecognizerConfig,
    pub upload: UploadConfig,
}

/// Server-specific configuration settings.
///
/// ## Common values:
/// - `host = "127.0.0.1"`: Only accept connections from localhost (development)
/// - `host = "0.0.0.0"`: Accept connections from any IP address (production)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// External transcoder settings.
///
/// ## Fields:
/// - `ffmpeg_path`: binary name (looked up on `PATH`) or absolute path
/// - `scratch_dir`: parent directory for per-request scratch workspaces
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscoderConfig {
    pub ffmpeg_path: String,
    pub scratch_dir: String,
}

/// Remote speech-recognition backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognizerConfig {
    /// Full URL the WAV payload is POSTed to
    pub endpoint: String,
    /// Optional API key sent as the `key` query parameter
    pub api_key: Option<String>,
    /// Recognition language (BCP-47, e.g. "en-US")
    pub language: String,
    /// Whole-request timeout, including connect and body transfer
    pub timeout_secs: u64,
}

/// Upload handling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Largest accepted upload in bytes
    pub max_upload_bytes: usize,
    /// When set, every raw upload is copied here for troubleshooting
    pub debug_audio_dir: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8000,
            },
            audio: PcmSpec::default(),
            transcoder: TranscoderConfig {
                ffmpeg_path: "ffmpeg".to_string(),
                scratch_dir: "temp".to_string(),
            },
            recognizer: RecognizerConfig {
                endpoint: "http://www.google.com/speech-api/v2/recognize".to_string(),
                api_key: None,
                language: "en-US".to_string(),
                timeout_secs: 30,
            },
            upload: UploadConfig {
                max_upload_bytes: 50 * 1024 * 1024,
                debug_audio_dir: None,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER__HOST=0.0.0.0`: Override server host
    /// - `APP_RECOGNIZER__ENDPOINT=http://asr.internal/recognize`: Point at another backend
    /// - `APP_UPLOAD__DEBUG_AUDIO_DIR=debug_audio`: Keep copies of raw uploads
    /// - `HOST=0.0.0.0` / `PORT=3000`: Special cases for deployment platforms
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// ## What this checks:
    /// - Server port is not 0
    /// - The PCM spec has a rate and channel count, and 16-bit samples
    ///   (the transcoder always asks ffmpeg for `pcm_s16le`)
    /// - The recognizer has an endpoint, a language and a nonzero timeout
    /// - Uploads are allowed to have at least one byte
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.audio.sample_rate_hz == 0 {
            return Err(anyhow::anyhow!("Audio sample rate must be greater than 0"));
        }

        if self.audio.channels == 0 {
            return Err(anyhow::anyhow!("Audio channel count must be greater than 0"));
        }

        if self.audio.sample_width_bytes != 2 {
            return Err(anyhow::anyhow!(
                "Audio sample width must be 2 bytes (16-bit PCM), got {}",
                self.audio.sample_width_bytes
            ));
        }

        if self.transcoder.ffmpeg_path.trim().is_empty() {
            return Err(anyhow::anyhow!("Transcoder ffmpeg_path cannot be empty"));
        }

        if self.recognizer.endpoint.trim().is_empty() {
            return Err(anyhow::anyhow!("Recognizer endpoint cannot be empty"));
        }

        if self.recognizer.language.trim().is_empty() {
            return Err(anyhow::anyhow!("Recognizer language cannot be empty"));
        }

        if self.recognizer.timeout_secs == 0 {
            return Err(anyhow::anyhow!("Recognizer timeout must be greater than 0"));
        }

        if self.upload.max_upload_bytes == 0 {
            return Err(anyhow::anyhow!("Max upload size must be greater than 0"));
        }

        Ok(())
    }

    /// Configuration as exposed by `GET /api/v1/config`, with secrets redacted.
    pub fn redacted(&self) -> AppConfig {
        let mut config = self.clone();
        if config.recognizer.api_key.is_some() {
            config.recognizer.api_key = Some("***".to_string());
        }
        config
    }
}
