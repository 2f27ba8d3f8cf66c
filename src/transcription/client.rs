//! # Recognition Backend Client
//!
//! Sends canonical WAV audio to a remote speech-recognition service and maps
//! its answer onto the pipeline's failure kinds.
//!
//! ## Wire Format:
//! The request is a single `POST` whose body is the whole WAV file
//! (`Content-Type: audio/wav`) with `client`, `lang`, `output` and optional
//! `key` query parameters. The service answers with newline-delimited JSON:
//!
//! ```json
//! {"result":[]}
//! {"result":[{"alternative":[{"transcript":"hello world","confidence":0.92}],"final":true}],"result_index":0}
//! ```
//!
//! ## Failure Mapping:
//! - **MalformedAudio**: the payload is not a readable WAV container (checked before any network I/O)
//! - **BackendUnavailable**: connection errors, timeouts, non-2xx status, unparseable body
//! - **Unintelligible**: the service answered but produced no transcript
//!
//! The client never retries; the pipeline owns the fallback.

use crate::config::RecognizerConfig;
use crate::transcription::result::PipelineError;
use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use std::io::Cursor;
use std::time::Duration;

/// Anything that can turn WAV bytes into text.
#[async_trait]
pub trait Recognizer: Send + Sync {
    async fn recognize(&self, wav: &[u8]) -> Result<String, PipelineError>;
}

/// Basic facts about a WAV payload, read before it is sent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipInfo {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    pub frames: usize,
}

impl ClipInfo {
    pub fn duration_seconds(&self) -> f64 {
        self.frames as f64 / self.sample_rate as f64
    }
}

/// Read `wav` as a WAV container, treating the whole file as one segment.
pub fn inspect_wav(wav: &[u8]) -> Result<ClipInfo, PipelineError> {
    let reader = hound::WavReader::new(Cursor::new(wav))
        .map_err(|e| PipelineError::MalformedAudio(format!("unreadable WAV container: {}", e)))?;
    let spec = reader.spec();

    if spec.channels == 0 || spec.sample_rate == 0 {
        return Err(PipelineError::MalformedAudio(format!(
            "invalid WAV header: {} channels at {} Hz",
            spec.channels, spec.sample_rate
        )));
    }

    let frames = reader.duration() as usize;
    if frames == 0 {
        return Err(PipelineError::MalformedAudio("WAV container holds no audio frames".to_string()));
    }

    Ok(ClipInfo {
        sample_rate: spec.sample_rate,
        channels: spec.channels,
        bits_per_sample: spec.bits_per_sample,
        frames,
    })
}

#[derive(Debug, Deserialize)]
struct RecognitionChunk {
    #[serde(default)]
    result: Vec<Hypothesis>,
}

#[derive(Debug, Deserialize)]
struct Hypothesis {
    #[serde(default)]
    alternative: Vec<Alternative>,
}

#[derive(Debug, Deserialize)]
struct Alternative {
    #[serde(default)]
    transcript: String,
    confidence: Option<f64>,
}

/// Pick the transcript out of a newline-delimited response body.
///
/// The first line with a non-empty `result` wins. Within it, the most
/// confident alternative is chosen; without confidences, the first one.
fn best_transcript(body: &str) -> Result<Option<String>, serde_json::Error> {
    for line in body.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let chunk: RecognitionChunk = serde_json::from_str(line)?;
        let Some(hypothesis) = chunk.result.into_iter().next() else {
            continue;
        };

        let best = if hypothesis.alternative.iter().any(|a| a.confidence.is_some()) {
            hypothesis.alternative.into_iter().max_by(|a, b| {
                a.confidence
                    .unwrap_or(0.0)
                    .total_cmp(&b.confidence.unwrap_or(0.0))
            })
        } else {
            hypothesis.alternative.into_iter().next()
        };

        return Ok(best
            .map(|a| a.transcript.trim().to_string())
            .filter(|t| !t.is_empty()));
    }
    Ok(None)
}

/// Recognizer that talks HTTP to a remote speech service.
pub struct HttpRecognizer {
    client: reqwest::Client,
    endpoint: String,
    language: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl HttpRecognizer {
    /// Build the client from configuration.
    ///
    /// ## Errors:
    /// Fails only if the underlying HTTP client cannot be constructed
    /// (for example when no TLS backend is available).
    pub fn from_config(config: &RecognizerConfig) -> anyhow::Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create recognition HTTP client")?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            language: config.language.clone(),
            api_key: config.api_key.clone(),
            timeout,
        })
    }

    fn query(&self) -> Vec<(&'static str, &str)> {
        let mut query = vec![
            ("client", "chromium"),
            ("lang", self.language.as_str()),
            ("output", "json"),
        ];
        if let Some(key) = &self.api_key {
            query.push(("key", key.as_str()));
        }
        query
    }
}

#[async_trait]
impl Recognizer for HttpRecognizer {
    async fn recognize(&self, wav: &[u8]) -> Result<String, PipelineError> {
        let clip = inspect_wav(wav)?;

        tracing::debug!(
            endpoint = %self.endpoint,
            sample_rate = clip.sample_rate,
            channels = clip.channels,
            duration_secs = clip.duration_seconds(),
            "Sending audio to recognition backend"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .query(&self.query())
            .header(reqwest::header::CONTENT_TYPE, "audio/wav")
            .body(wav.to_vec())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PipelineError::BackendUnavailable(format!(
                        "request timed out after {}s",
                        self.timeout.as_secs()
                    ))
                } else {
                    PipelineError::BackendUnavailable(format!("request failed: {}", e))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PipelineError::BackendUnavailable(format!("failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(PipelineError::BackendUnavailable(format!("status {}: {}", status, body.trim())));
        }

        let transcript = best_transcript(&body)
            .map_err(|e| PipelineError::BackendUnavailable(format!("unparseable response: {}", e)))?;

        match transcript {
            Some(text) => {
                tracing::info!(chars = text.len(), "Recognition backend returned transcript");
                Ok(text)
            }
            None => Err(PipelineError::Unintelligible),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::fixtures::{tone_16k_mono, wav_bytes};
    use actix_web::{http::StatusCode, web, App, HttpRequest, HttpResponse, HttpServer};

    const HELLO: &str = concat!(
        "{\"result\":[]}\n",
        "{\"result\":[{\"alternative\":[{\"transcript\":\"hello world\",\"confidence\":0.92},",
        "{\"transcript\":\"yellow world\"}],\"final\":true}],\"result_index\":0}\n"
    );

    fn config(endpoint: String) -> RecognizerConfig {
        RecognizerConfig {
            endpoint,
            api_key: None,
            language: "en-US".to_string(),
            timeout_secs: 5,
        }
    }

    /// Start an in-process stand-in for the recognition service and return its URL.
    ///
    /// Requests without `Content-Type: audio/wav` or a `lang` parameter get a 400.
    fn spawn_backend(status: u16, body: &'static str) -> String {
        let server = HttpServer::new(move || {
            App::new().default_service(web::to(move |req: HttpRequest| async move {
                let is_wav = req
                    .headers()
                    .get("content-type")
                    .map(|v| v == "audio/wav")
                    .unwrap_or(false);
                if !is_wav || !req.query_string().contains("lang=en-US") {
                    return HttpResponse::BadRequest().body("bad request");
                }
                HttpResponse::build(StatusCode::from_u16(status).unwrap()).body(body)
            }))
        })
        .workers(1)
        .bind(("127.0.0.1", 0))
        .unwrap();

        let addr = server.addrs()[0];
        actix_web::rt::spawn(server.run());
        format!("http://{}/recognize", addr)
    }

    #[test]
    fn test_best_transcript_prefers_confident_alternative() {
        assert_eq!(best_transcript(HELLO).unwrap(), Some("hello world".to_string()));
    }

    #[test]
    fn test_best_transcript_without_confidence_takes_first() {
        let body = r#"{"result":[{"alternative":[{"transcript":"first"},{"transcript":"second"}]}]}"#;
        assert_eq!(best_transcript(body).unwrap(), Some("first".to_string()));
    }

    #[test]
    fn test_best_transcript_empty_results() {
        assert_eq!(best_transcript("{\"result\":[]}\n").unwrap(), None);
        assert_eq!(best_transcript("").unwrap(), None);
    }

    #[test]
    fn test_inspect_wav_reads_layout() {
        let info = inspect_wav(&wav_bytes(8000, 2, &[1, 2, 3, 4, 5, 6])).unwrap();
        assert_eq!(info.sample_rate, 8000);
        assert_eq!(info.channels, 2);
        assert_eq!(info.frames, 3);
    }

    #[test]
    fn test_inspect_wav_rejects_garbage() {
        let err = inspect_wav(b"\x1aE\xdf\xa3 webm bytes").unwrap_err();
        assert!(matches!(err, PipelineError::MalformedAudio(_)));
    }

    #[actix_web::test]
    async fn test_recognize_returns_transcript() {
        let recognizer = HttpRecognizer::from_config(&config(spawn_backend(200, HELLO))).unwrap();

        let text = recognizer.recognize(&tone_16k_mono()).await.unwrap();

        assert_eq!(text, "hello world");
    }

    #[actix_web::test]
    async fn test_recognize_without_transcript_is_unintelligible() {
        let recognizer =
            HttpRecognizer::from_config(&config(spawn_backend(200, "{\"result\":[]}\n"))).unwrap();

        let err = recognizer.recognize(&tone_16k_mono()).await.unwrap_err();

        assert!(matches!(err, PipelineError::Unintelligible));
    }

    #[actix_web::test]
    async fn test_recognize_server_error_is_backend_unavailable() {
        let recognizer = HttpRecognizer::from_config(&config(spawn_backend(503, "overloaded"))).unwrap();

        let err = recognizer.recognize(&tone_16k_mono()).await.unwrap_err();

        match err {
            PipelineError::BackendUnavailable(message) => assert!(message.contains("503")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[actix_web::test]
    async fn test_recognize_unreachable_backend_is_backend_unavailable() {
        let recognizer =
            HttpRecognizer::from_config(&config("http://127.0.0.1:1/recognize".to_string())).unwrap();

        let err = recognizer.recognize(&tone_16k_mono()).await.unwrap_err();

        assert!(matches!(err, PipelineError::BackendUnavailable(_)));
    }

    #[actix_web::test]
    async fn test_recognize_malformed_audio_never_hits_network() {
        let recognizer =
            HttpRecognizer::from_config(&config("http://127.0.0.1:1/recognize".to_string())).unwrap();

        let err = recognizer.recognize(b"not a wav file").await.unwrap_err();

        assert!(matches!(err, PipelineError::MalformedAudio(_)));
    }
}
