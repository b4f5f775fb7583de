//! Conversation memory: an append-only log of turns.
//!
//! Each round of the agent leaves its trace here: the skill and stage the
//! model picked, the text it produced and any images generated along the way.
//! Only the last turn is ever mutated; appending a new turn freezes every
//! earlier one.

use crate::image::ImageHandle;
use serde::{Deserialize, Serialize};

/// Stage label carried by the seed turn.
pub const INITIAL_STAGE: &str = "Initializing";

/// A single entry in the memory log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// Skill chosen for this turn (empty until set)
    #[serde(default)]
    pub skill_selection: String,

    /// Stage label (empty until set)
    #[serde(default)]
    pub stage: String,

    /// Message text
    #[serde(default)]
    pub message: String,

    /// Images attached to this turn, in arrival order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ImageHandle>,
}

impl Turn {
    /// A turn holding only a message.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }
}

/// A point-in-time view of memory handed to phases and tools.
pub type MemorySnapshot = Turn;

/// The ordered turn log owned by one agent.
#[derive(Debug, Clone, Default)]
pub struct MemoryLog {
    turns: Vec<Turn>,
}

impl MemoryLog {
    /// Create a log seeded with the user's input.
    pub fn seeded(text: impl Into<String>, images: Vec<ImageHandle>) -> Self {
        Self {
            turns: vec![Turn {
                skill_selection: String::new(),
                stage: INITIAL_STAGE.into(),
                message: text.into(),
                images,
            }],
        }
    }

    /// Append a new turn, freezing the previous last turn.
    pub fn append(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// Append a turn carrying only a message.
    pub fn append_message(&mut self, message: impl Into<String>) {
        self.append(Turn::message(message));
    }

    pub fn update_skill_stage(&mut self, skill: impl Into<String>, stage: impl Into<String>) {
        if let Some(last) = self.turns.last_mut() {
            last.skill_selection = skill.into();
            last.stage = stage.into();
        }
    }

    pub fn append_image(&mut self, image: ImageHandle) {
        if let Some(last) = self.turns.last_mut() {
            last.images.push(image);
        }
    }

    pub fn update_message(&mut self, message: impl Into<String>) {
        if let Some(last) = self.turns.last_mut() {
            last.message = message.into();
        }
    }

    /// Snapshot of the last turn.
    pub fn latest(&self) -> MemorySnapshot {
        self.turns.last().cloned().unwrap_or_default()
    }

    /// Snapshot of the whole history.
    ///
    /// Messages are prefixed with their index (`No.<i>: `) and joined with
    /// newlines; images are flattened in order. Skill and stage come from the
    /// last turn.
    pub fn all(&self) -> MemorySnapshot {
        let Some(last) = self.turns.last() else {
            return MemorySnapshot::default();
        };

        let message = self
            .turns
            .iter()
            .enumerate()
            .map(|(i, turn)| format!("No.{i}: {}", turn.message))
            .collect::<Vec<_>>()
            .join("\n");

        let images = self
            .turns
            .iter()
            .flat_map(|turn| turn.images.iter().cloned())
            .collect();

        MemorySnapshot {
            skill_selection: last.skill_selection.clone(),
            stage: last.stage.clone(),
            message,
            images,
        }
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
