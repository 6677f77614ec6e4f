//! Anthropic messages API client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tapestry_media::Frame;
use tracing::{debug, warn};

use crate::error::{ContentError, ContentResult};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-3-haiku-20240307";
const DEFAULT_VISION_MODEL: &str = "claude-3-sonnet-20240229";
const DEFAULT_STYLE_MODEL: &str = "claude-3-5-haiku-20241022";

/// JPEG quality for frames sent as image blocks.
pub const FRAME_JPEG_QUALITY: u8 = 95;

/// Which configured model a request runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelTier {
    /// Cheap model for short text answers
    Base,
    /// Stronger model for multi-frame visual reasoning
    Vision,
    /// Model for per-chunk style classification
    Style,
}

/// One block of a user message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    Image { source: ImageSource },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageSource {
    #[serde(rename = "type")]
    pub source_type: String,
    pub media_type: String,
    pub data: String,
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Image block from base64-encoded JPEG data.
    pub fn jpeg(data: impl Into<String>) -> Self {
        Self::Image {
            source: ImageSource {
                source_type: "base64".to_string(),
                media_type: "image/jpeg".to_string(),
                data: data.into(),
            },
        }
    }

    /// Encode a decoded frame as an image block.
    pub fn frame(frame: &Frame) -> ContentResult<Self> {
        Ok(Self::jpeg(frame.to_base64_jpeg(FRAME_JPEG_QUALITY)?))
    }
}

/// Turns prompts and frames into text or JSON judgments.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate_text(&self, tier: ModelTier, content: Vec<ContentBlock>) -> ContentResult<String>;

    /// Like `generate_text`, but the reply must contain a JSON object.
    async fn generate_json(&self, tier: ModelTier, content: Vec<ContentBlock>) -> ContentResult<Value>;
}

/// Configuration for the Anthropic client.
#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub vision_model: String,
    pub style_model: String,
    pub max_tokens: u32,
    pub timeout: Duration,
    /// Total attempts per call, shared between rate-limit and parse retries
    pub max_attempts: u32,
    pub rate_limit_backoff: Duration,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            vision_model: DEFAULT_VISION_MODEL.to_string(),
            style_model: DEFAULT_STYLE_MODEL.to_string(),
            max_tokens: 1500,
            timeout: Duration::from_secs(120),
            max_attempts: 5,
            rate_limit_backoff: Duration::from_secs(60),
        }
    }
}

impl AnthropicConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("CLAUDE_API_URL").unwrap_or(defaults.base_url),
            api_key: std::env::var("CLAUDE_API_KEY").ok().filter(|k| !k.is_empty()),
            model: std::env::var("CLAUDE_MODEL").unwrap_or(defaults.model),
            vision_model: std::env::var("CLAUDE_VISION_MODEL").unwrap_or(defaults.vision_model),
            style_model: std::env::var("CLAUDE_STYLE_MODEL").unwrap_or(defaults.style_model),
            max_tokens: defaults.max_tokens,
            timeout: defaults.timeout,
            max_attempts: std::env::var("LLM_MAX_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_attempts),
            rate_limit_backoff: Duration::from_secs(
                std::env::var("LLM_RATE_LIMIT_BACKOFF_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60),
            ),
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

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_rate_limit_backoff(mut self, backoff: Duration) -> Self {
        self.rate_limit_backoff = backoff;
        self
    }

    pub fn model_for(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::Base => &self.model,
            ModelTier::Vision => &self.vision_model,
            ModelTier::Style => &self.style_model,
        }
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: [Message<'a>; 1],
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a [ContentBlock],
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ResponseBlock>,
}

#[derive(Deserialize)]
struct ResponseBlock {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    #[serde(rename = "type")]
    error_type: String,
    #[serde(default)]
    message: String,
}

/// Client for the Anthropic messages API.
pub struct AnthropicClient {
    http: Client,
    config: AnthropicConfig,
}

impl AnthropicClient {
    /// Create a new client. An API key is required.
    pub fn new(config: AnthropicConfig) -> ContentResult<Self> {
        if config.api_key.is_none() {
            return Err(ContentError::config("CLAUDE_API_KEY is not set"));
        }

        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(ContentError::Network)?;

        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> ContentResult<Self> {
        Self::new(AnthropicConfig::from_env())
    }

    pub fn config(&self) -> &AnthropicConfig {
        &self.config
    }

    /// One request with no retries.
    async fn send_once(&self, model: &str, content: &[ContentBlock]) -> ContentResult<String> {
        let url = format!("{}/v1/messages", self.config.base_url.trim_end_matches('/'));
        let body = MessagesRequest {
            model,
            max_tokens: self.config.max_tokens,
            messages: [Message {
                role: "user",
                content,
            }],
        };

        let response = self
            .http
            .post(&url)
            .header("x-api-key", self.config.api_key.as_deref().unwrap_or_default())
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ContentError::RateLimited);
        }

        let text = response.text().await?;
        if !status.is_success() {
            return Err(match serde_json::from_str::<ErrorEnvelope>(&text) {
                Ok(envelope) if envelope.error.error_type == "rate_limit_error" => {
                    ContentError::RateLimited
                }
                Ok(envelope) => ContentError::Service {
                    status: status.as_u16(),
                    message: format!("{}: {}", envelope.error.error_type, envelope.error.message),
                },
                Err(_) => ContentError::Service {
                    status: status.as_u16(),
                    message: text,
                },
            });
        }

        let parsed: MessagesResponse = serde_json::from_str(&text)
            .map_err(|e| ContentError::malformed(format!("unexpected response shape: {}", e)))?;

        parsed
            .content
            .into_iter()
            .find_map(|block| block.text)
            .ok_or_else(|| ContentError::malformed("response has no text block"))
    }

    /// Send until `parse` accepts the reply.
    ///
    /// Rate limits wait `rate_limit_backoff`; malformed replies are retried
    /// at once. Both draw from the same attempt budget.
    async fn with_retry<T, P>(
        &self,
        tier: ModelTier,
        content: &[ContentBlock],
        parse: P,
    ) -> ContentResult<T>
    where
        P: Fn(String) -> ContentResult<T>,
    {
        let model = self.config.model_for(tier);
        let mut last_error = None;

        for attempt in 1..=self.config.max_attempts {
            match self.send_once(model, content).await.and_then(&parse) {
                Ok(value) => return Ok(value),
                Err(ContentError::RateLimited) => {
                    warn!(
                        model,
                        attempt,
                        "Rate limited, retrying in {:?}",
                        self.config.rate_limit_backoff
                    );
                    last_error = Some(ContentError::RateLimited);
                    if attempt < self.config.max_attempts {
                        tokio::time::sleep(self.config.rate_limit_backoff).await;
                    }
                }
                Err(e @ ContentError::MalformedResponse(_)) => {
                    warn!(model, attempt, "Malformed reply, retrying: {}", e);
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(ContentError::RetriesExhausted {
            attempts: self.config.max_attempts,
            last: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no attempts made".to_string()),
        })
    }
}

#[async_trait]
impl ContentGenerator for AnthropicClient {
    async fn generate_text(&self, tier: ModelTier, content: Vec<ContentBlock>) -> ContentResult<String> {
        debug!(?tier, blocks = content.len(), "Generating text");
        self.with_retry(tier, &content, |text| Ok(text)).await
    }

    async fn generate_json(&self, tier: ModelTier, content: Vec<ContentBlock>) -> ContentResult<Value> {
        debug!(?tier, blocks = content.len(), "Generating JSON");
        self.with_retry(tier, &content, |text| extract_json(&text)).await
    }
}

/// Parse the span from the first `{` to the last `}` of a reply.
pub fn extract_json(text: &str) -> ContentResult<Value> {
    let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) else {
        return Err(ContentError::malformed("no JSON object in reply"));
    };
    if end < start {
        return Err(ContentError::malformed("no JSON object in reply"));
    }

    serde_json::from_str(text[start..=end].trim())
        .map_err(|e| ContentError::malformed(format!("invalid JSON in reply: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(server: &MockServer) -> AnthropicClient {
        let config = AnthropicConfig::default()
            .with_base_url(server.uri())
            .with_api_key("test-key")
            .with_max_attempts(3)
            .with_rate_limit_backoff(Duration::from_millis(5));
        AnthropicClient::new(config).unwrap()
    }

    fn reply(text: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "id": "msg_1",
            "type": "message",
            "content": [{ "type": "text", "text": text }]
        }))
    }

    #[test]
    fn test_extract_json_with_prose() {
        let value = extract_json("Here you go:\n{\"face_visible\": true}\nThanks").unwrap();
        assert_eq!(value, json!({ "face_visible": true }));
    }

    #[test]
    fn test_extract_json_nested() {
        let value = extract_json("{\"a\": {\"b\": 1}} trailing").unwrap();
        assert_eq!(value["a"]["b"], 1);
    }

    #[test]
    fn test_extract_json_rejects_missing_object() {
        assert!(matches!(
            extract_json("no braces here"),
            Err(ContentError::MalformedResponse(_))
        ));
        assert!(matches!(
            extract_json("} backwards {"),
            Err(ContentError::MalformedResponse(_))
        ));
        assert!(matches!(
            extract_json("{not json}"),
            Err(ContentError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_image_block_shape() {
        let block = serde_json::to_value(ContentBlock::jpeg("abc")).unwrap();
        assert_eq!(
            block,
            json!({
                "type": "image",
                "source": { "type": "base64", "media_type": "image/jpeg", "data": "abc" }
            })
        );
        assert_eq!(
            serde_json::to_value(ContentBlock::text("hi")).unwrap(),
            json!({ "type": "text", "text": "hi" })
        );
    }

    #[test]
    fn test_missing_api_key_rejected() {
        assert!(matches!(
            AnthropicClient::new(AnthropicConfig::default()),
            Err(ContentError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_generate_text_sends_headers_and_model() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "test-key"))
            .and(header("anthropic-version", "2023-06-01"))
            .and(body_partial_json(json!({
                "model": "claude-3-haiku-20240307",
                "max_tokens": 1500,
                "messages": [{ "role": "user", "content": [{ "type": "text", "text": "hello" }] }]
            })))
            .respond_with(reply("world"))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server);
        let text = client
            .generate_text(ModelTier::Base, vec![ContentBlock::text("hello")])
            .await
            .unwrap();
        assert_eq!(text, "world");
    }

    #[tokio::test]
    async fn test_rate_limit_then_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(reply("ok"))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let text = client
            .generate_text(ModelTier::Vision, vec![ContentBlock::text("x")])
            .await
            .unwrap();
        assert_eq!(text, "ok");
    }

    #[tokio::test]
    async fn test_rate_limit_error_body_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(529).set_body_json(json!({
                "type": "error",
                "error": { "type": "rate_limit_error", "message": "slow down" }
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(reply("done"))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let text = client
            .generate_text(ModelTier::Base, vec![ContentBlock::text("x")])
            .await
            .unwrap();
        assert_eq!(text, "done");
    }

    #[tokio::test]
    async fn test_rate_limit_retries_are_bounded() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .expect(3)
            .mount(&server)
            .await;

        let client = test_client(&server);
        let result = client
            .generate_text(ModelTier::Base, vec![ContentBlock::text("x")])
            .await;
        assert!(matches!(
            result,
            Err(ContentError::RetriesExhausted { attempts: 3, .. })
        ));
    }

    #[tokio::test]
    async fn test_service_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "type": "error",
                "error": { "type": "invalid_request_error", "message": "bad image" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server);
        let result = client
            .generate_text(ModelTier::Base, vec![ContentBlock::text("x")])
            .await;
        match result {
            Err(ContentError::Service { status, message }) => {
                assert_eq!(status, 400);
                assert!(message.contains("bad image"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_generate_json_retries_malformed_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(reply("I cannot answer in JSON"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(reply("Sure: {\"product_visible\": true}"))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let value = client
            .generate_json(ModelTier::Style, vec![ContentBlock::text("x")])
            .await
            .unwrap();
        assert_eq!(value["product_visible"], true);
    }

    #[tokio::test]
    async fn test_generate_json_malformed_retries_are_bounded() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(reply("never json"))
            .expect(3)
            .mount(&server)
            .await;

        let client = test_client(&server);
        let result = client
            .generate_json(ModelTier::Style, vec![ContentBlock::text("x")])
            .await;
        assert!(matches!(
            result,
            Err(ContentError::RetriesExhausted { attempts: 3, .. })
        ));
    }
}
