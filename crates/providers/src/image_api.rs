//! HTTP image generation backend.
//!
//! Talks to Stable-Diffusion-style `txt2img` endpoints: the request is a
//! small JSON payload, the response carries base64 images under `images`
//! (list) or `image` (single).

use async_trait::async_trait;
use rustedlens_core::image::ImageHandle;
use rustedlens_core::provider::{ImageGeneration, ImageGenerator};
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, warn};

/// Sampling steps sent with every request.
const STEPS: u32 = 20;
/// Output width and height in pixels.
const IMAGE_SIZE: u32 = 512;

/// Image generator posting to a `txt2img` URL.
pub struct HttpImageGenerator {
    model_name: String,
    url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl HttpImageGenerator {
    pub fn new(
        model_name: impl Into<String>,
        url: impl Into<String>,
        token: Option<String>,
    ) -> Self {
        Self::with_timeout(model_name, url, token, Duration::from_secs(60))
    }

    pub fn with_timeout(
        model_name: impl Into<String>,
        url: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Falling back to default HTTP client");
                reqwest::Client::new()
            });

        Self {
            model_name: model_name.into(),
            url: url.into(),
            token,
            client,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn payload(prompt: &str) -> Value {
        json!({
            "prompt": prompt,
            "steps": STEPS,
            "width": IMAGE_SIZE,
            "height": IMAGE_SIZE,
        })
    }

    async fn call(&self, prompt: &str) -> Result<Value, String> {
        let mut request = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .json(&Self::payload(prompt));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| e.to_string())?;
        let response = response.error_for_status().map_err(|e| e.to_string())?;
        response.json::<Value>().await.map_err(|e| e.to_string())
    }
}

/// Interpret a backend response body.
///
/// `{images: [b64, ...]}` and `{image: b64}` succeed; an `error` field or
/// any other shape is a failure.
pub fn decode_generation(body: &Value) -> ImageGeneration {
    if let Some(images) = body.get("images") {
        let Some(items) = images.as_array() else {
            return ImageGeneration::Error("`images` is not a list".into());
        };
        let mut decoded = Vec::with_capacity(items.len());
        for item in items {
            match item.as_str().map(ImageHandle::from_base64) {
                Some(Ok(image)) => decoded.push(image),
                Some(Err(e)) => return ImageGeneration::Error(format!("Invalid image data: {e}")),
                None => return ImageGeneration::Error("Image entry is not a string".into()),
            }
        }
        return ImageGeneration::Images(decoded);
    }

    if let Some(image) = body.get("image") {
        return match image.as_str().map(ImageHandle::from_base64) {
            Some(Ok(image)) => ImageGeneration::Image(image),
            Some(Err(e)) => ImageGeneration::Error(format!("Invalid image data: {e}")),
            None => ImageGeneration::Error("Image entry is not a string".into()),
        };
    }

    match body.get("error") {
        Some(Value::String(message)) => ImageGeneration::Error(message.clone()),
        Some(other) => ImageGeneration::Error(other.to_string()),
        None => ImageGeneration::Error(format!("Unexpected response: {body}")),
    }
}

#[async_trait]
impl ImageGenerator for HttpImageGenerator {
    fn name(&self) -> &str {
        &self.model_name
    }

    async fn generate(&self, prompt: &str) -> ImageGeneration {
        debug!(model = %self.model_name, url = %self.url, "Requesting image");
        match self.call(prompt).await {
            Ok(body) => decode_generation(&body),
            Err(e) => {
                warn!(model = %self.model_name, error = %e, "Image request failed");
                ImageGeneration::Error(e)
            }
        }
    }
}

/// Stand-in used when no endpoint is configured for the image model.
/// Every request fails with the stored reason.
pub struct UnavailableImageGenerator {
    model_name: String,
    reason: String,
}

impl UnavailableImageGenerator {
    pub fn new(model_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl ImageGenerator for UnavailableImageGenerator {
    fn name(&self) -> &str {
        &self.model_name
    }

    async fn generate(&self, _prompt: &str) -> ImageGeneration {
        ImageGeneration::Error(self.reason.clone())
    }
}
