//! Image generation tool.

use async_trait::async_trait;
use rustedlens_core::error::ToolError;
use rustedlens_core::provider::{ImageGeneration, ImageGenerator};
use rustedlens_core::tool::{Tool, ToolContext, ToolOutput, ToolParams};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Renders an image from a prompt through an [`ImageGenerator`].
///
/// The backend reports failures in-band; an `Error` generation becomes a
/// tool error so the dispatcher records it like any other failed call.
pub struct GenerateImageTool {
    generator: Arc<dyn ImageGenerator>,
}

impl GenerateImageTool {
    pub fn new(generator: Arc<dyn ImageGenerator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl Tool for GenerateImageTool {
    fn category(&self) -> &str {
        "image_service"
    }

    fn name(&self) -> &str {
        "generate_image"
    }

    fn description(&self) -> &str {
        "Generate an image illustrating the problem. Call it once per image, \
         with a different prompt for each request."
    }

    fn default_params(&self) -> ToolParams {
        let mut params = ToolParams::new();
        params.insert("prompt".into(), Value::String(String::new()));
        params
    }

    async fn invoke(
        &self,
        params: ToolParams,
        _context: &ToolContext,
    ) -> Result<ToolOutput, ToolError> {
        let prompt = match params.get("prompt") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };

        debug!(
            backend = self.generator.name(),
            prompt_len = prompt.len(),
            "Generating image"
        );

        match self.generator.generate(&prompt).await {
            ImageGeneration::Error(reason) => Err(ToolError::ExecutionFailed {
                tool_name: self.name().into(),
                reason,
            }),
            generation => Ok(ToolOutput::Image(generation)),
        }
    }
}
