//! Generator traits: the abstraction over model backends.
//!
//! A [`TextGenerator`] turns a prompt plus images into text, either in one
//! piece or as a stream of fragments. An [`ImageGenerator`] turns a prompt
//! into images.
//!
//! Implementations: OpenAI-compatible vision endpoints, txt2img HTTP APIs,
//! and scripted mocks in tests.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::image::ImageHandle;

/// A lazily consumed stream of text fragments.
///
/// Dropping the stream abandons the generation.
pub type TextStream = BoxStream<'static, Result<String, ProviderError>>;

/// The core text generation trait.
///
/// The agent loop calls `generate_stream()` without knowing which backend
/// is behind it.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// A human-readable name (e.g. the model id).
    fn name(&self) -> &str;

    /// Generate the full completion for `prompt`.
    async fn generate(&self, prompt: &str, images: &[ImageHandle])
    -> Result<String, ProviderError>;

    /// Generate the completion as a stream of fragments.
    ///
    /// Default implementation calls `generate()` and yields the result as a
    /// single fragment.
    async fn generate_stream(
        &self,
        prompt: &str,
        images: &[ImageHandle],
    ) -> Result<TextStream, ProviderError> {
        let text = self.generate(prompt, images).await?;
        Ok(Box::pin(futures::stream::once(async move { Ok(text) })))
    }
}

/// Outcome of an image generation request.
///
/// Backends answer with either a list or a single image; failures are data,
/// not errors, so callers decide how loud to be.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageGeneration {
    Images(Vec<ImageHandle>),
    Image(ImageHandle),
    Error(String),
}

impl ImageGeneration {
    /// All returned images in order, regardless of singular/plural form.
    pub fn images(&self) -> Vec<ImageHandle> {
        match self {
            Self::Images(images) => images.clone(),
            Self::Image(image) => vec![image.clone()],
            Self::Error(_) => Vec::new(),
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Error(message) => Some(message),
            _ => None,
        }
    }
}

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, prompt: &str) -> ImageGeneration;
}
