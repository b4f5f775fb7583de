//! Shared test doubles for the agent's unit tests.

use async_trait::async_trait;
use futures::StreamExt;
use rustedlens_core::error::ProviderError;
use rustedlens_core::image::ImageHandle;
use rustedlens_core::provider::{ImageGeneration, ImageGenerator, TextGenerator, TextStream};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// One scripted answer from the text generator.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Stream these fragments, then end
    Chunks(Vec<String>),
    /// Fail the request itself
    Fail(ProviderError),
    /// Stream these fragments, then never finish
    Stall(Vec<String>),
}

impl Reply {
    pub fn chunks(parts: &[&str]) -> Self {
        Self::Chunks(parts.iter().map(|s| s.to_string()).collect())
    }

    /// Whole text as a single fragment.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Chunks(vec![text.into()])
    }
}

/// A text generator that plays back a queue of replies and records every
/// request it sees.
pub struct ScriptedGenerator {
    script: Mutex<VecDeque<Reply>>,
    fallback: Option<Reply>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
    image_counts: Mutex<Vec<usize>>,
}

impl ScriptedGenerator {
    pub fn new(replies: Vec<Reply>) -> Self {
        Self {
            script: Mutex::new(replies.into()),
            fallback: None,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
            image_counts: Mutex::new(Vec::new()),
        }
    }

    /// Answer with `reply` once the queue is empty.
    pub fn with_fallback(mut self, reply: Reply) -> Self {
        self.fallback = Some(reply);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    /// Number of images attached to each request, in call order.
    pub fn image_counts(&self) -> Vec<usize> {
        self.image_counts.lock().unwrap().clone()
    }

    fn next_reply(&self, prompt: &str, images: &[ImageHandle]) -> Reply {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.image_counts.lock().unwrap().push(images.len());

        self.script
            .lock()
            .unwrap()
            .pop_front()
            .or_else(|| self.fallback.clone())
            .unwrap_or_else(|| {
                Reply::Fail(ProviderError::ApiError {
                    status_code: 500,
                    message: "script exhausted".into(),
                })
            })
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, prompt: &str, images: &[ImageHandle]) -> Result<String, ProviderError> {
        match self.next_reply(prompt, images) {
            Reply::Chunks(parts) => Ok(parts.concat()),
            Reply::Fail(e) => Err(e),
            Reply::Stall(_) => futures::future::pending().await,
        }
    }

    async fn generate_stream(
        &self,
        prompt: &str,
        images: &[ImageHandle],
    ) -> Result<TextStream, ProviderError> {
        match self.next_reply(prompt, images) {
            Reply::Chunks(parts) => Ok(futures::stream::iter(parts.into_iter().map(Ok)).boxed()),
            Reply::Fail(e) => Err(e),
            Reply::Stall(parts) => Ok(futures::stream::iter(parts.into_iter().map(Ok))
                .chain(futures::stream::pending())
                .boxed()),
        }
    }
}

/// An image generator returning a fixed result and counting calls.
pub struct FixedImages {
    reply: ImageGeneration,
    calls: AtomicUsize,
}

impl FixedImages {
    pub fn new(reply: ImageGeneration) -> Self {
        Self {
            reply,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageGenerator for FixedImages {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn generate(&self, _prompt: &str) -> ImageGeneration {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.reply.clone()
    }
}

/// A tiny PNG-signed image.
pub fn png(tag: u8) -> ImageHandle {
    ImageHandle::from_bytes(vec![0x89, b'P', b'N', b'G', tag])
}

/// A decision JSON string.
pub fn decision(skill: &str, stage: &str, message: &str, tools: &str) -> String {
    format!(
        r#"{{"SkillSelection": "{skill}", "Stage": "{stage}", "Message": "{message}", "tool_list": {tools}}}"#
    )
}
