//! Structured response parsing for the skill-selection phase.
//!
//! The model is asked for a JSON object but free text around it, fenced
//! code blocks, and odd field types are all common. [`parse_decision`]
//! recovers what it can; [`StructuredParser`] regenerates on failure and
//! falls back to a degraded record once its attempts run out.

use crate::generation::timed_generation;
use futures::{Stream, StreamExt, pin_mut};
use rustedlens_core::error::ProviderError;
use rustedlens_core::image::ImageHandle;
use rustedlens_core::provider::TextGenerator;
use rustedlens_core::tool::{ToolCall, ToolParams};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Skill used when no decision could be parsed.
pub const DEGRADED_SKILL: &str = "reasoning";
/// Stage used when no decision could be parsed.
pub const DEGRADED_STAGE: &str = "Thinking";

/// The model's skill-selection decision, normalized.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub skill_selection: String,
    pub stage: String,
    pub message: String,
    pub tool_list: Vec<ToolCall>,
}

impl DecisionRecord {
    /// Stand-in decision carrying the last raw output as its message.
    pub fn degraded(raw: impl Into<String>) -> Self {
        Self {
            skill_selection: DEGRADED_SKILL.into(),
            stage: DEGRADED_STAGE.into(),
            message: raw.into(),
            tool_list: Vec::new(),
        }
    }

    fn from_object(object: &Map<String, Value>) -> Self {
        let text = |keys: &[&str]| {
            keys.iter()
                .find_map(|key| object.get(*key))
                .map(value_to_text)
                .unwrap_or_default()
        };

        Self {
            skill_selection: text(&["SkillSelection", "skill_selection"]),
            stage: text(&["Stage", "stage"]),
            message: text(&["Message", "message"]),
            tool_list: object
                .get("tool_list")
                .map(tool_calls)
                .unwrap_or_default(),
        }
    }
}

/// Render a JSON value as plain text.
///
/// Strings pass through, arrays become newline-joined lines (recursively),
/// null is empty, and everything else is its JSON text.
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Array(items) => items.iter().map(value_to_text).collect::<Vec<_>>().join("\n"),
        other => other.to_string(),
    }
}

/// Decode the `tool_list` entries that name a category and a tool.
fn tool_calls(value: &Value) -> Vec<ToolCall> {
    let Some(items) = value.as_array() else {
        debug!("tool_list is not a list, ignoring");
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let category = item.get("category")?.as_str()?;
            let name = item.get("name")?.as_str()?;
            let params = match item.get("params") {
                Some(Value::Object(params)) => params.clone(),
                _ => ToolParams::new(),
            };
            Some(ToolCall::new(category, name, params))
        })
        .collect()
}

/// Interiors of ```` ``` ```` fenced blocks, in order. Any language tag is
/// accepted and stripped.
fn fenced_blocks(text: &str) -> Vec<&str> {
    let mut blocks = Vec::new();
    let mut rest = text;

    while let Some(open) = rest.find("```") {
        let after = &rest[open + 3..];
        let tag_len = after
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '-'))
            .unwrap_or(after.len());
        let body = &after[tag_len..];
        let Some(close) = body.find("```") else {
            break;
        };
        blocks.push(body[..close].trim());
        rest = &body[close + 3..];
    }

    blocks
}

fn decode_object(text: &str) -> Option<DecisionRecord> {
    match serde_json::from_str::<Value>(text.trim()) {
        Ok(Value::Object(object)) => Some(DecisionRecord::from_object(&object)),
        _ => None,
    }
}

/// Parse a decision from raw model output.
///
/// Tries the whole text as JSON first, then the first fenced block whose
/// interior is a JSON object. Non-object JSON does not count.
pub fn parse_decision(text: &str) -> Option<DecisionRecord> {
    decode_object(text).or_else(|| fenced_blocks(text).into_iter().find_map(decode_object))
}

/// Events from one structured generation.
#[derive(Debug, Clone)]
pub enum ParseEvent {
    /// Raw text to show the user (model output or a retry notice)
    Chunk(String),
    /// The final decision, parsed or degraded
    Parsed(DecisionRecord),
    /// Generation itself failed; no decision follows
    Failed(ProviderError),
}

/// Drives generate → parse → regenerate until a decision parses.
#[derive(Debug, Clone)]
pub struct StructuredParser {
    max_attempts: u32,
    timeout: Duration,
}

impl Default for StructuredParser {
    fn default() -> Self {
        Self::new(3)
    }
}

impl StructuredParser {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            timeout: Duration::from_secs(120),
        }
    }

    /// Deadline for the request and for each streamed chunk.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Run the retry loop as a stream.
    ///
    /// Every attempt re-issues the full generation and forwards its chunks.
    /// The stream ends with exactly one `Parsed` or one `Failed`.
    pub fn stream(
        &self,
        generator: Arc<dyn TextGenerator>,
        prompt: String,
        images: Vec<ImageHandle>,
    ) -> impl Stream<Item = ParseEvent> + Send + 'static {
        let max_attempts = self.max_attempts;
        let timeout = self.timeout;

        async_stream::stream! {
            let mut last_raw = String::new();

            for attempt in 1..=max_attempts {
                if attempt > 1 {
                    yield ParseEvent::Chunk(format!("\nRetrying attempt {attempt}/{max_attempts}\n"));
                }

                let chunks = timed_generation(
                    Arc::clone(&generator),
                    prompt.clone(),
                    images.clone(),
                    timeout,
                );
                pin_mut!(chunks);

                let mut raw = String::new();
                while let Some(item) = chunks.next().await {
                    match item {
                        Ok(chunk) => {
                            raw.push_str(&chunk);
                            yield ParseEvent::Chunk(chunk);
                        }
                        Err(e) => {
                            yield ParseEvent::Failed(e);
                            return;
                        }
                    }
                }

                if let Some(record) = parse_decision(&raw) {
                    debug!(attempt, skill = %record.skill_selection, stage = %record.stage, "Decision parsed");
                    yield ParseEvent::Parsed(record);
                    return;
                }

                warn!(attempt, max_attempts, raw_len = raw.len(), "Unparseable decision");
                last_raw = raw;
            }

            warn!(max_attempts, "Falling back to degraded decision");
            yield ParseEvent::Parsed(DecisionRecord::degraded(last_raw));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{Reply, ScriptedGenerator, decision};
    use serde_json::json;

    #[test]
    fn parses_plain_json() {
        let text = decision("response", "Response", "Solve 2+2", "[]");
        let record = parse_decision(&text).unwrap();
        assert_eq!(record.skill_selection, "response");
        assert_eq!(record.stage, "Response");
        assert_eq!(record.message, "Solve 2+2");
        assert!(record.tool_list.is_empty());
    }

    #[test]
    fn parses_fenced_block_with_any_tag() {
        let body = decision("reasoning", "Thinking", "plan", "[]");
        for text in [
            format!("Sure!\n```json\n{body}\n```\nDone."),
            format!("```\n{body}\n```"),
            format!("```JSON {body}```"),
        ] {
            let record = parse_decision(&text).unwrap();
            assert_eq!(record.stage, "Thinking", "{text}");
        }
    }

    #[test]
    fn skips_fenced_blocks_that_are_not_objects() {
        let body = decision("reasoning", "Thinking", "plan", "[]");
        let text = format!("```python\nprint(1)\n```\n```json\n[1, 2]\n```\n```json\n{body}\n```");
        assert_eq!(parse_decision(&text).unwrap().message, "plan");
    }

    #[test]
    fn non_object_json_is_unparsed() {
        assert!(parse_decision("[1, 2, 3]").is_none());
        assert!(parse_decision("\"just a string\"").is_none());
        assert!(parse_decision("I think the answer is 4.").is_none());
        assert!(parse_decision("```json\n{broken\n```").is_none());
    }

    #[test]
    fn normalizes_field_types() {
        let text = json!({
            "SkillSelection": null,
            "Stage": 3,
            "Message": ["step one", ["nested", "lines"], 42],
        })
        .to_string();
        let record = parse_decision(&text).unwrap();
        assert_eq!(record.skill_selection, "");
        assert_eq!(record.stage, "3");
        assert_eq!(record.message, "step one\nnested\nlines\n42");
    }

    #[test]
    fn value_to_text_objects_render_as_json() {
        assert_eq!(value_to_text(&json!({"a": 1})), r#"{"a":1}"#);
        assert_eq!(value_to_text(&json!(true)), "true");
        assert_eq!(value_to_text(&json!("x")), "x");
    }

    #[test]
    fn decodes_tool_list() {
        let text = json!({
            "SkillSelection": "reasoning",
            "Stage": "Thinking",
            "Message": "draw it",
            "tool_list": [
                { "category": "image_service", "name": "generate_image", "params": { "prompt": "a square" } },
                { "category": "memory", "name": "get_all_memory" },
                { "name": "missing_category" },
                { "category": "memory", "name": "bad_params", "params": "oops" },
            ]
        })
        .to_string();

        let record = parse_decision(&text).unwrap();
        assert_eq!(record.tool_list.len(), 3);
        assert_eq!(record.tool_list[0].params["prompt"], "a square");
        assert!(record.tool_list[1].params.is_empty());
        assert!(record.tool_list[2].params.is_empty());
    }

    #[test]
    fn degraded_record_shape() {
        let record = DecisionRecord::degraded("raw text");
        assert_eq!(record.message, "raw text");
        assert_eq!(record.stage, "Thinking");
        assert_eq!(record.skill_selection, "reasoning");
        assert!(record.tool_list.is_empty());
    }

    async fn run_parser(parser: &StructuredParser, generator: Arc<ScriptedGenerator>) -> Vec<ParseEvent> {
        parser
            .stream(generator, "prompt".into(), vec![])
            .collect()
            .await
    }

    #[tokio::test]
    async fn first_attempt_success_needs_one_call() {
        let text = decision("response", "Response", "ok", "[]");
        let generator = Arc::new(ScriptedGenerator::new(vec![Reply::chunks(&[
            &text[..10],
            &text[10..],
        ])]));

        let events = run_parser(&StructuredParser::new(3), generator.clone()).await;

        assert_eq!(generator.call_count(), 1);
        assert_eq!(events.len(), 3);
        assert!(matches!(&events[2], ParseEvent::Parsed(r) if r.message == "ok"));
    }

    #[tokio::test]
    async fn retries_then_succeeds() {
        let text = decision("response", "Response", "ok", "[]");
        let generator = Arc::new(ScriptedGenerator::new(vec![
            Reply::text("not json"),
            Reply::text(text),
        ]));

        let events = run_parser(&StructuredParser::new(3), generator.clone()).await;

        assert_eq!(generator.call_count(), 2);
        assert!(
            events
                .iter()
                .any(|e| matches!(e, ParseEvent::Chunk(c) if c == "\nRetrying attempt 2/3\n"))
        );
        assert!(matches!(events.last(), Some(ParseEvent::Parsed(r)) if r.stage == "Response"));
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let generator = Arc::new(
            ScriptedGenerator::new(vec![Reply::text("first"), Reply::text("second")])
                .with_fallback(Reply::text("last garbage")),
        );

        let events = run_parser(&StructuredParser::new(3), generator.clone()).await;

        assert_eq!(generator.call_count(), 3);
        let retries = events
            .iter()
            .filter(|e| matches!(e, ParseEvent::Chunk(c) if c.contains("Retrying attempt")))
            .count();
        assert_eq!(retries, 2);
        match events.last() {
            Some(ParseEvent::Parsed(record)) => {
                assert_eq!(*record, DecisionRecord::degraded("last garbage"));
            }
            other => panic!("expected degraded decision, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn generation_fault_is_not_retried() {
        let generator = Arc::new(ScriptedGenerator::new(vec![Reply::Fail(
            ProviderError::RateLimited {
                retry_after_secs: 5,
            },
        )]));

        let events = run_parser(&StructuredParser::new(3), generator.clone()).await;

        assert_eq!(generator.call_count(), 1);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], ParseEvent::Failed(ProviderError::RateLimited { .. })));
    }

    #[tokio::test]
    async fn zero_attempts_means_one() {
        let generator = Arc::new(ScriptedGenerator::new(vec![]).with_fallback(Reply::text("x")));
        let parser = StructuredParser::new(0);
        assert_eq!(parser.max_attempts(), 1);

        let events = run_parser(&parser, generator.clone()).await;
        assert_eq!(generator.call_count(), 1);
        assert!(matches!(events.last(), Some(ParseEvent::Parsed(_))));
    }
}
