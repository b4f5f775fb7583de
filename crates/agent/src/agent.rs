//! The vision-language agent and its two-phase round protocol.
//!
//! Every round runs two model calls:
//!
//! 1. **Select**: the model reads the current context, picks a skill and a
//!    stage, and may request tools. Tools run concurrently; generated images
//!    join the current turn and a full-memory result replaces the context.
//! 2. **Execute**: the selected skill's instructions plus the context go
//!    back to the model, and its answer becomes a new turn.
//!
//! Both phases stream their text as it arrives. See [`crate::run`] for the
//! loop that drives rounds.

use crate::dispatcher::{ToolDispatcher, UnmatchedToolPolicy};
use crate::generation::timed_generation;
use crate::parser::{DecisionRecord, ParseEvent, StructuredParser};
use crate::prompt;
use crate::run::Run;
use futures::{Stream, StreamExt, pin_mut};
use rustedlens_config::AgentSettings;
use rustedlens_core::event::{DomainEvent, EventBus};
use rustedlens_core::image::ImageHandle;
use rustedlens_core::memory::{MemoryLog, MemorySnapshot};
use rustedlens_core::provider::{ImageGenerator, TextGenerator};
use rustedlens_core::skill::SkillCatalog;
use rustedlens_core::tool::{ToolContext, ToolOutput, ToolRegistry};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Stage reported while the model picks a skill.
pub const SELECTING_SKILL_STAGE: &str = "Selecting Skill";
/// Stage that ends a run.
pub const RESPONSE_STAGE: &str = "Response";

/// What the caller asks.
#[derive(Debug, Clone, Default)]
pub struct AgentInput {
    pub text: String,
    pub images: Vec<ImageHandle>,
}

impl AgentInput {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            images: Vec::new(),
        }
    }

    pub fn with_images(mut self, images: Vec<ImageHandle>) -> Self {
        self.images = images;
        self
    }
}

impl From<&str> for AgentInput {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

/// Output of a phase stream: text as it arrives, then one result.
#[derive(Debug, Clone)]
pub enum PhaseEvent<T> {
    Chunk(String),
    Finished(T),
}

/// Everything the execute phase needs from the select phase.
#[derive(Debug, Clone, Default)]
pub struct RoundContext {
    /// Latest turn after tools ran, possibly with the full history as its
    /// message
    pub snapshot: MemorySnapshot,
    /// Images produced by tools this round
    pub generated_images: Vec<ImageHandle>,
    /// The parsed decision; `None` when generation failed
    pub decision: Option<DecisionRecord>,
}

impl RoundContext {
    fn unchanged(snapshot: MemorySnapshot) -> Self {
        Self {
            snapshot,
            generated_images: Vec::new(),
            decision: None,
        }
    }
}

/// A multimodal reasoning agent.
///
/// Owns its memory log; one run at a time.
pub struct Agent {
    text: Arc<dyn TextGenerator>,
    skills: Arc<dyn SkillCatalog>,
    dispatcher: ToolDispatcher,
    memory: MemoryLog,
    max_rounds: u32,
    max_parse_attempts: u32,
    model_timeout: Duration,
    event_bus: Option<Arc<EventBus>>,
}

impl Agent {
    /// Create an agent with the built-in tools wired to `image`.
    pub fn new(
        text: Arc<dyn TextGenerator>,
        image: Arc<dyn ImageGenerator>,
        skills: Arc<dyn SkillCatalog>,
    ) -> Self {
        let registry = rustedlens_tools::default_registry(image);
        Self {
            text,
            skills,
            dispatcher: ToolDispatcher::new(Arc::new(registry)),
            memory: MemoryLog::default(),
            max_rounds: 10,
            max_parse_attempts: 3,
            model_timeout: Duration::from_secs(120),
            event_bus: None,
        }
    }

    /// Replace the tool registry.
    pub fn with_tools(mut self, registry: ToolRegistry) -> Self {
        self.dispatcher = self.dispatcher.with_registry(Arc::new(registry));
        self
    }

    pub fn with_max_rounds(mut self, max: u32) -> Self {
        self.max_rounds = max;
        self
    }

    pub fn with_max_parse_attempts(mut self, attempts: u32) -> Self {
        self.max_parse_attempts = attempts;
        self
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.dispatcher = self.dispatcher.with_timeout(timeout);
        self
    }

    /// Deadline for a model request and for each streamed chunk.
    pub fn with_model_timeout(mut self, timeout: Duration) -> Self {
        self.model_timeout = timeout;
        self
    }

    pub fn with_unmatched_policy(mut self, policy: UnmatchedToolPolicy) -> Self {
        self.dispatcher = self.dispatcher.with_unmatched_policy(policy);
        self
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.dispatcher = self.dispatcher.with_event_bus(Arc::clone(&bus));
        self.event_bus = Some(bus);
        self
    }

    /// Apply the `[agent]` section of the config file.
    pub fn with_settings(self, settings: &AgentSettings) -> Self {
        self.with_max_rounds(settings.max_rounds)
            .with_max_parse_attempts(settings.max_parse_attempts)
            .with_tool_timeout(settings.tool_timeout())
            .with_model_timeout(settings.model_timeout())
            .with_unmatched_policy(UnmatchedToolPolicy::from_report_flag(
                settings.report_unknown_tools,
            ))
    }

    pub fn memory(&self) -> &MemoryLog {
        &self.memory
    }

    pub fn max_rounds(&self) -> u32 {
        self.max_rounds
    }

    pub fn skills(&self) -> &dyn SkillCatalog {
        self.skills.as_ref()
    }

    /// Start a run. The memory log is reseeded with the input; no model
    /// call happens until the returned stream is polled.
    pub fn run(&mut self, input: AgentInput) -> Run<'_> {
        self.memory = MemoryLog::seeded(input.text, input.images);
        Run::new(self)
    }

    pub(crate) fn publish(&self, event: DomainEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event);
        }
    }

    /// Phase 1: select a skill and stage, run any requested tools.
    ///
    /// On a generation fault the stream emits an `Error: ...` chunk and
    /// finishes with `last` unchanged; memory is left as it was.
    pub fn select_skill_and_tools(
        &mut self,
        last: MemorySnapshot,
    ) -> impl Stream<Item = PhaseEvent<RoundContext>> + Send + '_ {
        let agent = self;

        async_stream::stream! {
            let prompt = prompt::selection_prompt(
                &last.message,
                &agent.dispatcher.registry().describe(),
                &agent.skills.list_categories(),
            );
            debug!(prompt_len = prompt.len(), images = last.images.len(), "Selecting skill");

            let parser = StructuredParser::new(agent.max_parse_attempts)
                .with_timeout(agent.model_timeout);
            let events = parser.stream(Arc::clone(&agent.text), prompt, last.images.clone());
            pin_mut!(events);

            let mut decision = None;
            while let Some(event) = events.next().await {
                match event {
                    ParseEvent::Chunk(text) => yield PhaseEvent::Chunk(text),
                    ParseEvent::Parsed(record) => decision = Some(record),
                    ParseEvent::Failed(e) => {
                        warn!(error = %e, "Skill selection failed");
                        yield PhaseEvent::Chunk(format!("Error: {e}"));
                        break;
                    }
                }
            }

            let Some(decision) = decision else {
                yield PhaseEvent::Finished(RoundContext::unchanged(last));
                return;
            };

            agent
                .memory
                .update_skill_stage(decision.skill_selection.clone(), decision.stage.clone());

            let context = ToolContext { memory: agent.memory.all() };
            let results = agent.dispatcher.dispatch(&decision.tool_list, context).await;
            debug!(requested = decision.tool_list.len(), completed = results.len(), "Tools finished");

            let mut generated_images = Vec::new();
            let mut context_message = None;
            for result in results {
                match result.result {
                    Some(ToolOutput::Image(generation)) => {
                        for image in generation.images() {
                            agent.memory.append_image(image.clone());
                            generated_images.push(image);
                        }
                    }
                    Some(ToolOutput::Memory(snapshot)) => context_message = Some(snapshot.message),
                    None => {}
                }
            }

            let mut snapshot = agent.memory.latest();
            if let Some(message) = context_message {
                snapshot.message = message;
            }

            yield PhaseEvent::Finished(RoundContext {
                snapshot,
                generated_images,
                decision: Some(decision),
            });
        }
    }

    /// Phase 2: run the selected skill against the round's context.
    ///
    /// The full answer is appended to memory as a new turn. On a generation
    /// fault the result is `Error: ...` and memory is not touched.
    pub fn execute_skill(
        &mut self,
        context: RoundContext,
        skill_text: String,
    ) -> impl Stream<Item = PhaseEvent<String>> + Send + '_ {
        let agent = self;

        async_stream::stream! {
            let prompt = prompt::execution_prompt(&skill_text, &context.snapshot.message);
            debug!(
                prompt_len = prompt.len(),
                skill = %context.snapshot.skill_selection,
                "Executing skill"
            );

            let chunks = timed_generation(
                Arc::clone(&agent.text),
                prompt,
                context.snapshot.images,
                agent.model_timeout,
            );
            pin_mut!(chunks);

            let mut answer = String::new();
            while let Some(item) = chunks.next().await {
                match item {
                    Ok(chunk) => {
                        answer.push_str(&chunk);
                        yield PhaseEvent::Chunk(chunk);
                    }
                    Err(e) => {
                        warn!(error = %e, "Skill execution failed");
                        yield PhaseEvent::Finished(format!("Error: {e}"));
                        return;
                    }
                }
            }

            agent.memory.append_message(answer.clone());
            yield PhaseEvent::Finished(answer);
        }
    }
}
