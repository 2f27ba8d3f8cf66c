//! # Speech-to-Text Upload Endpoint
//!
//! `POST /api/v1/speech-to-text` accepts a multipart form with one audio file
//! and answers with `{text, success, error}`.
//!
//! ## Always 200:
//! Every outcome, including a missing file field or an oversized upload, is
//! reported in the body with `success: false`. Clients only need to look at
//! the JSON.

use crate::audio::AudioBlob;
use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::transcription::SpeechToTextResponse;
use actix_multipart::{Field, Multipart};
use actix_web::{web, HttpResponse};
use futures_util::stream::StreamExt;
use std::path::{Path, PathBuf};

/// Field names accepted for the audio file, in order of preference.
const FILE_FIELDS: [&str; 2] = ["audio_file", "audio"];

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// One audio file pulled out of a multipart body.
#[derive(Debug)]
pub struct Upload {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub filename: Option<String>,
}

pub async fn speech_to_text(state: web::Data<AppState>, payload: Multipart) -> HttpResponse {
    let upload = match read_upload(payload, state.config.upload.max_upload_bytes).await {
        Ok(upload) => upload,
        Err(err) => {
            tracing::warn!(error_type = err.error_type(), error = %err, "Rejected speech-to-text upload");
            state.record_rejected_upload();
            return HttpResponse::Ok().json(SpeechToTextResponse::rejected(err.message()));
        }
    };

    tracing::info!(
        filename = upload.filename.as_deref().unwrap_or("unknown"),
        content_type = %upload.content_type,
        bytes = upload.bytes.len(),
        "Received audio file"
    );

    if let Some(dir) = &state.config.upload.debug_audio_dir {
        if !upload.bytes.is_empty() {
            save_debug_copy(Path::new(dir), &upload).await;
        }
    }

    let blob = AudioBlob::new(upload.bytes, upload.content_type);
    let report = state.pipeline.process(&blob).await;
    state.record_transcription(&report);

    tracing::info!(
        success = report.result.is_success(),
        failure_kind = report.result.failure_kind().map(|k| k.as_str()).unwrap_or("none"),
        transcoded = report.transcoded,
        attempts = report.recognition_attempts,
        processing_time_ms = report.processing_time_ms,
        "Speech-to-text request finished"
    );

    HttpResponse::Ok().json(SpeechToTextResponse::from(report.result))
}

/// Read the first accepted file field, enforcing `max_bytes` while streaming.
///
/// Other fields are drained and ignored.
pub async fn read_upload(mut payload: Multipart, max_bytes: usize) -> AppResult<Upload> {
    let mut upload: Option<Upload> = None;

    while let Some(item) = payload.next().await {
        let mut field: Field = item?;

        let Some(disposition) = field.content_disposition() else {
            continue;
        };
        let is_file_field = disposition
            .get_name()
            .map(|name| FILE_FIELDS.contains(&name))
            .unwrap_or(false);

        if !is_file_field || upload.is_some() {
            while let Some(chunk) = field.next().await {
                chunk?;
            }
            continue;
        }

        let filename = disposition.get_filename().map(str::to_string);
        let content_type = field
            .content_type()
            .map(|mime| mime.to_string())
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());

        let mut bytes = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk?;
            if bytes.len() + chunk.len() > max_bytes {
                return Err(AppError::PayloadTooLarge(format!(
                    "Upload exceeds {} bytes",
                    max_bytes
                )));
            }
            bytes.extend_from_slice(&chunk);
        }

        upload = Some(Upload {
            bytes,
            content_type,
            filename,
        });
    }

    upload.ok_or_else(|| AppError::BadRequest("No audio file provided".to_string()))
}

/// Extension for the debug copy: the upload's own, else one derived from
/// the declared type.
fn debug_extension(upload: &Upload) -> String {
    let from_name = upload
        .filename
        .as_deref()
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()));
    if let Some(ext) = from_name {
        return ext.to_ascii_lowercase();
    }

    let declared = upload.content_type.to_ascii_lowercase();
    if declared.contains("webm") {
        "webm".to_string()
    } else if declared.contains("ogg") || declared.contains("opus") {
        "ogg".to_string()
    } else if declared.contains("wav") {
        "wav".to_string()
    } else {
        "bin".to_string()
    }
}

fn debug_copy_path(dir: &Path, upload: &Upload) -> PathBuf {
    let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
    dir.join(format!("{}_{}.{}", timestamp, uuid::Uuid::new_v4(), debug_extension(upload)))
}

/// Copy the raw upload for troubleshooting. Failures are logged only.
async fn save_debug_copy(dir: &Path, upload: &Upload) {
    let path = debug_copy_path(dir, upload);

    let written = async {
        tokio::fs::create_dir_all(dir).await?;
        tokio::fs::write(&path, &upload.bytes).await
    }
    .await;

    match written {
        Ok(()) => tracing::debug!(path = %path.display(), "Saved debug copy of upload"),
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to save debug copy of upload"),
    }
}
