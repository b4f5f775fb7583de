//! The agent loop: the heart of RustedLens.
//!
//! A run proceeds in **rounds**, each made of two phases:
//!
//! 1. **Select**: the model picks a skill and a stage and may request tools
//!    (run concurrently, results folded into memory)
//! 2. **Execute**: the selected skill's instructions are applied to the
//!    current context and the answer is appended to memory
//!
//! The run ends when the model reaches the `Response` stage or the round
//! budget runs out. Progress is exposed as a pull-based stream of steps.

pub mod agent;
pub mod dispatcher;
pub mod generation;
pub mod parser;
pub mod prompt;
pub mod run;
pub mod step;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use agent::{
    Agent, AgentInput, PhaseEvent, RESPONSE_STAGE, RoundContext, SELECTING_SKILL_STAGE,
};
pub use dispatcher::{ToolDispatcher, UnmatchedToolPolicy};
pub use parser::{DecisionRecord, ParseEvent, StructuredParser, parse_decision};
pub use run::{MAX_ROUNDS_MESSAGE, Run, RunState};
pub use step::Step;
