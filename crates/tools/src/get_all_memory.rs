//! Full-history memory tool.

use async_trait::async_trait;
use rustedlens_core::error::ToolError;
use rustedlens_core::tool::{Tool, ToolContext, ToolOutput, ToolParams};

/// Returns the complete memory snapshot the dispatcher captured before the
/// call. The agent uses it to replace the round's context message with the
/// numbered history of every turn.
pub struct GetAllMemoryTool;

#[async_trait]
impl Tool for GetAllMemoryTool {
    fn category(&self) -> &str {
        "memory"
    }

    fn name(&self) -> &str {
        "get_all_memory"
    }

    fn description(&self) -> &str {
        "Read every message of the conversation so far, numbered in order. \
         Use this when the latest message alone is not enough context."
    }

    fn default_params(&self) -> ToolParams {
        ToolParams::new()
    }

    async fn invoke(
        &self,
        _params: ToolParams,
        context: &ToolContext,
    ) -> Result<ToolOutput, ToolError> {
        Ok(ToolOutput::Memory(context.memory.clone()))
    }
}
