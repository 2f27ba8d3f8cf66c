//! # External Transcoding
//!
//! Converts compressed or containerized uploads (WebM/Opus and friends) into
//! canonical PCM WAV by shelling out to ffmpeg.
//!
//! ## Scratch Workspace:
//! Each call gets its own uniquely named directory under the configured
//! scratch root. The directory is a `tempfile::TempDir`, so it is removed
//! when the call returns on every path: success, nonzero exit, launch
//! failure, or an I/O error while staging the input.
//!
//! If the caller drops the future mid-conversion, the child is killed
//! along with it.

use crate::audio::format::PcmSpec;
use crate::transcription::result::PipelineError;
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

const INPUT_FILE: &str = "input.webm";
const OUTPUT_FILE: &str = "output.wav";

/// Anything that can turn arbitrary audio bytes into PCM WAV bytes.
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn transcode(&self, input: &[u8]) -> Result<Vec<u8>, PipelineError>;
}

/// Transcoder backed by an ffmpeg-compatible command-line tool.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    program: PathBuf,
    scratch_root: PathBuf,
    spec: PcmSpec,
}

impl FfmpegTranscoder {
    /// ## Parameters:
    /// - **program**: path or name of the ffmpeg binary
    /// - **scratch_root**: directory under which per-call workspaces are created
    /// - **spec**: target rate and channel count passed to `-ar` / `-ac`
    pub fn new(program: impl Into<PathBuf>, scratch_root: impl Into<PathBuf>, spec: PcmSpec) -> Self {
        Self {
            program: program.into(),
            scratch_root: scratch_root.into(),
            spec,
        }
    }

    /// Argument list for one invocation. The codec is pinned to signed
    /// 16-bit little-endian PCM.
    fn command_args(&self, input: &Path, output: &Path) -> Vec<OsString> {
        vec![
            "-i".into(),
            input.into(),
            "-acodec".into(),
            "pcm_s16le".into(),
            "-ar".into(),
            self.spec.sample_rate_hz.to_string().into(),
            "-ac".into(),
            self.spec.channels.to_string().into(),
            "-y".into(),
            "-loglevel".into(),
            "error".into(),
            output.into(),
        ]
    }

    async fn acquire_workspace(&self) -> Result<tempfile::TempDir, PipelineError> {
        tokio::fs::create_dir_all(&self.scratch_root).await.map_err(|e| {
            PipelineError::ConversionFailed(format!(
                "cannot create scratch root {}: {}",
                self.scratch_root.display(),
                e
            ))
        })?;

        tempfile::Builder::new()
            .prefix("transcode-")
            .tempdir_in(&self.scratch_root)
            .map_err(|e| PipelineError::ConversionFailed(format!("cannot create scratch workspace: {}", e)))
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(&self, input: &[u8]) -> Result<Vec<u8>, PipelineError> {
        let workspace = self.acquire_workspace().await?;
        let input_path = workspace.path().join(INPUT_FILE);
        let output_path = workspace.path().join(OUTPUT_FILE);

        tokio::fs::write(&input_path, input)
            .await
            .map_err(|e| PipelineError::ConversionFailed(format!("cannot stage input: {}", e)))?;

        tracing::debug!(
            program = %self.program.display(),
            workspace = %workspace.path().display(),
            input_bytes = input.len(),
            "Launching transcoder"
        );

        let output = Command::new(&self.program)
            .args(self.command_args(&input_path, &output_path))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                PipelineError::ConversionFailed(format!(
                    "cannot launch {}: {}",
                    self.program.display(),
                    e
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            tracing::error!(status = %output.status, stderr = %stderr, "Transcoder exited with failure");
            return Err(PipelineError::ConversionFailed(if stderr.is_empty() {
                format!("transcoder exited with {}", output.status)
            } else {
                stderr
            }));
        }

        let wav = tokio::fs::read(&output_path)
            .await
            .map_err(|e| PipelineError::ConversionFailed(format!("cannot read transcoder output: {}", e)))?;

        tracing::info!(input_bytes = input.len(), output_bytes = wav.len(), "Transcoded upload to PCM WAV");

        // `workspace` drops here and removes the directory.
        Ok(wav)
    }
}
