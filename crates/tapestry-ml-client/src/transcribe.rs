//! Speech-to-text over an OpenAI-compatible transcription endpoint.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{ContentError, ContentResult};

/// Turns a WAV file into text.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe `wav_path`. Audio without speech yields an empty string.
    async fn transcribe(&self, wav_path: &Path) -> ContentResult<String>;
}

/// Configuration for the transcription client.
#[derive(Debug, Clone)]
pub struct WhisperConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout: Duration,
    pub max_retries: u32,
}

impl Default for WhisperConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".to_string(),
            api_key: None,
            model: "whisper-1".to_string(),
            timeout: Duration::from_secs(300),
            max_retries: 2,
        }
    }
}

impl WhisperConfig {
    /// Create config from environment variables.
    ///
    /// The key is read from `WHISPER_API_KEY`, then `OPENAI_API_KEY`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("WHISPER_API_URL").unwrap_or(defaults.base_url),
            api_key: std::env::var("WHISPER_API_KEY")
                .or_else(|_| std::env::var("OPENAI_API_KEY"))
                .ok()
                .filter(|k| !k.is_empty()),
            model: std::env::var("WHISPER_MODEL").unwrap_or(defaults.model),
            timeout: Duration::from_secs(
                std::env::var("WHISPER_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(300),
            ),
            max_retries: defaults.max_retries,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    #[serde(default)]
    text: String,
}

/// Client for `POST /v1/audio/transcriptions`.
pub struct WhisperClient {
    http: Client,
    config: WhisperConfig,
}

impl WhisperClient {
    pub fn new(config: WhisperConfig) -> ContentResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(ContentError::Network)?;

        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> ContentResult<Self> {
        Self::new(WhisperConfig::from_env())
    }

    async fn send_once(&self, audio: &[u8], file_name: &str) -> ContentResult<String> {
        let url = format!(
            "{}/v1/audio/transcriptions",
            self.config.base_url.trim_end_matches('/')
        );

        let part = Part::bytes(audio.to_vec())
            .file_name(file_name.to_string())
            .mime_str("audio/wav")?;
        let form = Form::new()
            .text("model", self.config.model.clone())
            .text("response_format", "json")
            .part("file", part);

        let mut request = self.http.post(&url).multipart(form);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ContentError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ContentError::Service {
                status: status.as_u16(),
                message: body,
            });
        }

        let parsed: TranscriptionResponse = response.json().await?;
        Ok(parsed.text.trim().to_string())
    }
}

#[async_trait]
impl Transcriber for WhisperClient {
    async fn transcribe(&self, wav_path: &Path) -> ContentResult<String> {
        let audio = tokio::fs::read(wav_path).await?;
        let file_name = wav_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("audio.wav")
            .to_string();

        debug!(path = %wav_path.display(), bytes = audio.len(), "Transcribing audio");

        let mut attempt = 0;
        loop {
            match self.send_once(&audio, &file_name).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let delay = Duration::from_millis(500 * 2u64.pow(attempt));
                    warn!(
                        "Transcription failed (attempt {}), retrying in {:?}: {}",
                        attempt + 1,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> WhisperClient {
        WhisperClient::new(
            WhisperConfig::default()
                .with_base_url(server.uri())
                .with_api_key("sk-test"),
        )
        .unwrap()
    }

    fn wav_file() -> tempfile::NamedTempFile {
        let file = tempfile::Builder::new().suffix(".wav").tempfile().unwrap();
        std::fs::write(file.path(), b"RIFF....WAVEfmt ").unwrap();
        file
    }

    #[test]
    fn test_config_defaults() {
        let config = WhisperConfig::default();
        assert_eq!(config.model, "whisper-1");
        assert_eq!(config.base_url, "https://api.openai.com");
    }

    #[tokio::test]
    async fn test_transcribe_returns_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/transcriptions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "text": " Stop scrolling. This changed everything. "
            })))
            .expect(1)
            .mount(&server)
            .await;

        let file = wav_file();
        let text = client(&server).transcribe(file.path()).await.unwrap();
        assert_eq!(text, "Stop scrolling. This changed everything.");
    }

    #[tokio::test]
    async fn test_no_speech_is_empty_string() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "text": "" })))
            .mount(&server)
            .await;

        let file = wav_file();
        assert_eq!(client(&server).transcribe(file.path()).await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_service_error_surfaces() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad audio"))
            .expect(1)
            .mount(&server)
            .await;

        let file = wav_file();
        let result = client(&server).transcribe(file.path()).await;
        assert!(matches!(result, Err(ContentError::Service { status: 400, .. })));
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let server = MockServer::start().await;
        let result = client(&server)
            .transcribe(Path::new("/nonexistent/speech.wav"))
            .await;
        assert!(matches!(result, Err(ContentError::Io(_))));
    }
}
