//! Tool trait: the abstraction over agent capabilities.
//!
//! Tools are addressed by a two-level key: a category (`memory`,
//! `image_service`, ...) and a name within it. The model requests them by
//! that key in its decision JSON; the registry resolves the key to a typed
//! implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::ToolError;
use crate::memory::MemorySnapshot;
use crate::provider::ImageGeneration;

/// Tool parameters, as decoded from model output.
pub type ToolParams = Map<String, Value>;

/// A request to execute a tool.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub category: String,

    pub name: String,

    #[serde(default)]
    pub params: ToolParams,
}

impl ToolCall {
    pub fn new(category: impl Into<String>, name: impl Into<String>, params: ToolParams) -> Self {
        Self {
            category: category.into(),
            name: name.into(),
            params,
        }
    }

    /// `category.name`, for logs and error messages.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.category, self.name)
    }
}

/// Typed payload of a successful tool call.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    /// Full-history memory snapshot
    Memory(MemorySnapshot),

    /// Images from the image backend
    Image(ImageGeneration),
}

/// The outcome of one tool call. Exactly one of `result`/`error` is set.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub tool_name: String,

    pub result: Option<ToolOutput>,

    pub error: Option<String>,
}

impl ToolResult {
    pub fn ok(tool_name: impl Into<String>, output: ToolOutput) -> Self {
        Self {
            tool_name: tool_name.into(),
            result: Some(output),
            error: None,
        }
    }

    pub fn err(tool_name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            result: None,
            error: Some(error.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Read-only state a tool may look at while it runs.
///
/// Tools run concurrently and never touch the live memory log; they receive
/// an owned snapshot taken before dispatch.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    pub memory: MemorySnapshot,
}

/// The core Tool trait.
#[async_trait]
pub trait Tool: Send + Sync {
    /// First-level key (e.g. "memory").
    fn category(&self) -> &str;

    /// Second-level key (e.g. "get_all_memory").
    fn name(&self) -> &str;

    /// One-line description shown to the model.
    fn description(&self) -> &str;

    /// Parameters the tool accepts, with their defaults.
    ///
    /// Only keys listed here may be overridden by a call.
    fn default_params(&self) -> ToolParams;

    /// Execute with merged parameters.
    async fn invoke(
        &self,
        params: ToolParams,
        context: &ToolContext,
    ) -> std::result::Result<ToolOutput, ToolError>;
}

/// A registry of available tools, keyed by category then name.
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, BTreeMap<String, Arc<dyn Tool>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Replaces any existing tool with the same key.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools
            .entry(tool.category().to_string())
            .or_default()
            .insert(tool.name().to_string(), tool);
    }

    /// Look up a tool by its two-level key.
    pub fn get(&self, category: &str, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(category)?.get(name).cloned()
    }

    /// All registered `(category, name)` pairs.
    pub fn names(&self) -> Vec<(&str, &str)> {
        self.tools
            .iter()
            .flat_map(|(category, tools)| {
                tools.keys().map(move |name| (category.as_str(), name.as_str()))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Render the registry as the JSON catalog shown to the model.
    ///
    /// Shape: `{category: {name: {"function": name, "description": .., "params": {..}}}}`.
    pub fn describe(&self) -> Value {
        let mut root = Map::new();
        for (category, tools) in &self.tools {
            let mut entries = Map::new();
            for (name, tool) in tools {
                entries.insert(
                    name.clone(),
                    serde_json::json!({
                        "function": name,
                        "description": tool.description(),
                        "params": Value::Object(tool.default_params()),
                    }),
                );
            }
            root.insert(category.clone(), Value::Object(entries));
        }
        Value::Object(root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A simple test tool for unit tests.
    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn category(&self) -> &str {
            "debug"
        }
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes the text param back as memory"
        }
        fn default_params(&self) -> ToolParams {
            let mut params = ToolParams::new();
            params.insert("text".into(), Value::String(String::new()));
            params
        }
        async fn invoke(
            &self,
            params: ToolParams,
            _context: &ToolContext,
        ) -> std::result::Result<ToolOutput, ToolError> {
            let text = params["text"].as_str().unwrap_or("").to_string();
            Ok(ToolOutput::Memory(MemorySnapshot {
                message: text,
                ..MemorySnapshot::default()
            }))
        }
    }

    #[test]
    fn registry_two_level_lookup() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));

        assert!(registry.get("debug", "echo").is_some());
        assert!(registry.get("debug", "missing").is_none());
        assert!(registry.get("echo", "debug").is_none());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.names(), vec![("debug", "echo")]);
    }

    #[test]
    fn describe_lists_params() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));

        let described = registry.describe();
        assert_eq!(described["debug"]["echo"]["function"], "echo");
        assert_eq!(described["debug"]["echo"]["params"]["text"], "");
    }

    #[tokio::test]
    async fn invoke_through_registry() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));

        let tool = registry.get("debug", "echo").unwrap();
        let mut params = tool.default_params();
        params.insert("text".into(), Value::String("hello".into()));

        let output = tool.invoke(params, &ToolContext::default()).await.unwrap();
        match output {
            ToolOutput::Memory(snapshot) => assert_eq!(snapshot.message, "hello"),
            other => panic!("unexpected output: {other:?}"),
        }
    }

    #[test]
    fn tool_call_decodes_without_params() {
        let call: ToolCall =
            serde_json::from_str(r#"{"category":"memory","name":"get_all_memory"}"#).unwrap();
        assert!(call.params.is_empty());
        assert_eq!(call.qualified_name(), "memory.get_all_memory");
    }

    #[test]
    fn tool_result_constructors() {
        assert!(ToolResult::err("x", "boom").is_error());
        assert!(!ToolResult::ok("x", ToolOutput::Memory(MemorySnapshot::default())).is_error());
    }
}
