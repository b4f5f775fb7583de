//! Skill catalog trait.
//!
//! A skill is a named instruction template. The catalog lists skills with a
//! short description (for the selection prompt) and hands out the full text
//! of the chosen one.

use std::collections::BTreeMap;

pub trait SkillCatalog: Send + Sync {
    /// Skill name → short description.
    fn list_categories(&self) -> BTreeMap<String, String>;

    /// Full instruction text, or an empty string for unknown skills.
    fn skill_text(&self, name: &str) -> String;
}

/// A catalog held entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct StaticSkillCatalog {
    skills: BTreeMap<String, (String, String)>,
}

impl StaticSkillCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a skill. Replaces any existing skill with the same name.
    pub fn with_skill(
        mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        self.skills
            .insert(name.into(), (description.into(), text.into()));
        self
    }
}

impl SkillCatalog for StaticSkillCatalog {
    fn list_categories(&self) -> BTreeMap<String, String> {
        self.skills
            .iter()
            .map(|(name, (description, _))| (name.clone(), description.clone()))
            .collect()
    }

    fn skill_text(&self, name: &str) -> String {
        self.skills
            .get(name)
            .map(|(_, text)| text.clone())
            .unwrap_or_default()
    }
}
