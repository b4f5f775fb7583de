//! # RustedLens Core
//!
//! Domain types, traits, and error definitions for the RustedLens
//! vision-language agent. This crate has **no backend dependencies**; it
//! defines the model that every other crate implements against.
//!
//! ## Design Philosophy
//!
//! Every external capability (text generation, image generation, skill
//! lookup, tools) is a trait here. Implementations live in their own crates,
//! which keeps the agent loop testable with scripted mocks.

pub mod error;
pub mod event;
pub mod image;
pub mod memory;
pub mod provider;
pub mod skill;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{ProviderError, SkillError, ToolError};
pub use event::{DomainEvent, EventBus, FinishReason};
pub use image::ImageHandle;
pub use memory::{MemoryLog, MemorySnapshot, Turn};
pub use provider::{ImageGeneration, ImageGenerator, TextGenerator, TextStream};
pub use skill::{SkillCatalog, StaticSkillCatalog};
pub use tool::{Tool, ToolCall, ToolContext, ToolOutput, ToolParams, ToolRegistry, ToolResult};
