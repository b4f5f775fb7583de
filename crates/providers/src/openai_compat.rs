//! OpenAI-compatible vision-language provider.
//!
//! Works with any endpoint exposing `/chat/completions` with multimodal
//! content parts: OpenAI, DashScope's compatible mode (Qwen-VL, QVQ), vLLM,
//! and similar servers.
//!
//! Every request is a single user message holding the prompt text followed
//! by one `image_url` part per image, encoded as a data URL.

use async_trait::async_trait;
use futures::StreamExt;
use rustedlens_core::error::ProviderError;
use rustedlens_core::image::ImageHandle;
use rustedlens_core::provider::{TextGenerator, TextStream};
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// A vision-language model behind an OpenAI-compatible API.
pub struct OpenAiCompatVlm {
    name: String,
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAiCompatVlm {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        // No overall timeout: streamed answers can run long, and the agent
        // bounds every chunk wait itself.
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Falling back to default HTTP client");
                reqwest::Client::new()
            });

        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            client,
        }
    }

    /// OpenAI's public endpoint.
    pub fn openai(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::new("openai", "https://api.openai.com/v1", api_key, model)
    }

    /// Alibaba DashScope's OpenAI-compatible endpoint (Qwen-VL family).
    pub fn dashscope(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::new(
            "dashscope",
            "https://dashscope.aliyuncs.com/compatible-mode/v1",
            api_key,
            model,
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Build the request body: one user message, text part first.
    fn request_body(&self, prompt: &str, images: &[ImageHandle], stream: bool) -> Value {
        let mut content = vec![json!({ "type": "text", "text": prompt })];
        content.extend(images.iter().map(|image| {
            json!({
                "type": "image_url",
                "image_url": { "url": image.to_data_url() },
            })
        }));

        json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": content }],
            "stream": stream,
        })
    }

    /// POST the body and map HTTP failures onto [`ProviderError`].
    async fn send(&self, body: &Value, stream: bool) -> Result<reqwest::Response, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut request = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body);
        if stream {
            request = request.header("Accept", "text/event-stream");
        }

        let response = request.send().await.map_err(map_reqwest_error)?;
        let status = response.status().as_u16();

        if status == 429 {
            return Err(ProviderError::RateLimited {
                retry_after_secs: 5,
            });
        }

        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }

        if status == 404 {
            return Err(ProviderError::ModelNotFound(self.model.clone()));
        }

        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Provider returned error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        Ok(response)
    }
}

fn map_reqwest_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(e.to_string())
    } else {
        ProviderError::Network(e.to_string())
    }
}

#[async_trait]
impl TextGenerator for OpenAiCompatVlm {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, prompt: &str, images: &[ImageHandle]) -> Result<String, ProviderError> {
        let body = self.request_body(prompt, images, false);
        debug!(
            provider = %self.name,
            model = %self.model,
            images = images.len(),
            "Sending completion request"
        );

        let response = self.send(&body, false).await?;
        let api_response: ApiResponse =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status_code: 200,
                message: format!("Failed to parse response: {e}"),
            })?;

        let choice =
            api_response
                .choices
                .into_iter()
                .next()
                .ok_or_else(|| ProviderError::ApiError {
                    status_code: 200,
                    message: "No choices in response".into(),
                })?;

        Ok(choice.message.content.unwrap_or_default())
    }

    async fn generate_stream(
        &self,
        prompt: &str,
        images: &[ImageHandle],
    ) -> Result<TextStream, ProviderError> {
        let body = self.request_body(prompt, images, true);
        debug!(
            provider = %self.name,
            model = %self.model,
            images = images.len(),
            "Sending streaming request"
        );

        let response = self.send(&body, true).await?;
        let provider_name = self.name.clone();

        let stream = async_stream::stream! {
            let mut byte_stream = response.bytes_stream();
            let mut decoder = SseDecoder::default();

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        yield Err(ProviderError::StreamInterrupted(e.to_string()));
                        return;
                    }
                };

                for event in decoder.push(&bytes) {
                    match event {
                        SseEvent::Content(text) => yield Ok(text),
                        SseEvent::Done => return,
                    }
                }
            }

            trace!(provider = %provider_name, "Stream ended without [DONE]");
        };

        Ok(stream.boxed())
    }
}

/// One decoded server-sent event.
#[derive(Debug, Clone, PartialEq)]
enum SseEvent {
    /// A non-empty `delta.content` fragment
    Content(String),
    /// The `[DONE]` sentinel
    Done,
}

/// Incremental SSE line decoder.
///
/// Bytes arrive in arbitrary slices, possibly splitting a UTF-8 character;
/// only complete lines are decoded and interpreted.
#[derive(Default)]
struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(line_end) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=line_end).collect();
            let line = match std::str::from_utf8(&raw[..line_end]) {
                Ok(line) => line.trim_end_matches('\r'),
                Err(e) => {
                    warn!(error = %e, "Skipping SSE line with invalid UTF-8");
                    continue;
                }
            };

            // Skip blank separators and SSE comments
            if line.is_empty() || line.starts_with(':') {
                continue;
            }

            let Some(data) = line.strip_prefix("data:") else {
                continue;
            };
            let data = data.trim();

            if data == "[DONE]" {
                events.push(SseEvent::Done);
                break;
            }

            match serde_json::from_str::<StreamResponse>(data) {
                Ok(stream_resp) => {
                    let content = stream_resp
                        .choices
                        .into_iter()
                        .next()
                        .and_then(|choice| choice.delta.content)
                        .filter(|c| !c.is_empty());
                    if let Some(content) = content {
                        events.push(SseEvent::Content(content));
                    }
                }
                Err(e) => {
                    trace!(data = %data, error = %e, "Ignoring unparseable SSE chunk");
                }
            }
        }
        events
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    content: Option<String>,
}

/// A single SSE `data: {...}` chunk from a streaming response.
#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}
