//! Filesystem skill catalog.
//!
//! A skill is a directory under the catalog root holding a `skill.md` file:
//!
//! ```text
//! skills/
//!   reasoning/skill.md
//!   response/skill.md
//! ```
//!
//! The first four lines of `skill.md` are the description shown to the model
//! during skill selection; the whole file is the instruction text used when
//! the skill executes. The directory is read on every call, so skills can be
//! edited while the process runs.

use rustedlens_core::error::SkillError;
use rustedlens_core::skill::SkillCatalog;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// File name holding a skill's instructions.
pub const SKILL_FILE: &str = "skill.md";

/// Lines of `skill.md` used as the skill's description.
const DESCRIPTION_LINES: usize = 4;

/// A skill catalog backed by a directory tree.
#[derive(Debug, Clone)]
pub struct FsSkillCatalog {
    root: PathBuf,
}

impl FsSkillCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Read every skill's description.
    ///
    /// A missing root is an empty catalog, not an error.
    pub fn scan(&self) -> Result<BTreeMap<String, String>, SkillError> {
        let mut skills = BTreeMap::new();
        if !self.root.is_dir() {
            debug!(root = %self.root.display(), "Skill directory not found");
            return Ok(skills);
        }

        let entries = std::fs::read_dir(&self.root).map_err(|e| SkillError::Io {
            path: self.root.clone(),
            reason: e.to_string(),
        })?;

        for entry in entries {
            let entry = entry.map_err(|e| SkillError::Io {
                path: self.root.clone(),
                reason: e.to_string(),
            })?;
            let skill_path = entry.path().join(SKILL_FILE);
            if !skill_path.is_file() {
                continue;
            }

            let content = std::fs::read_to_string(&skill_path).map_err(|e| SkillError::Io {
                path: skill_path.clone(),
                reason: e.to_string(),
            })?;
            let name = entry.file_name().to_string_lossy().into_owned();
            skills.insert(name, describe(&content));
        }

        debug!(root = %self.root.display(), count = skills.len(), "Skill catalog scanned");
        Ok(skills)
    }

    /// Path of a skill's instruction file, or `None` when the name would
    /// leave the catalog root.
    fn skill_path(&self, name: &str) -> Option<PathBuf> {
        if name.is_empty()
            || name.contains('/')
            || name.contains('\\')
            || name.contains("..")
        {
            return None;
        }
        Some(self.root.join(name).join(SKILL_FILE))
    }
}

/// The first lines of a skill file.
fn describe(content: &str) -> String {
    content
        .lines()
        .take(DESCRIPTION_LINES)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

impl SkillCatalog for FsSkillCatalog {
    fn list_categories(&self) -> BTreeMap<String, String> {
        self.scan().unwrap_or_else(|e| {
            warn!(error = %e, "Failed to read skill catalog");
            BTreeMap::new()
        })
    }

    fn skill_text(&self, name: &str) -> String {
        let Some(path) = self.skill_path(name) else {
            warn!(skill = name, "Rejected skill name");
            return String::new();
        };

        match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) => {
                debug!(skill = name, error = %e, "Skill not found");
                String::new()
            }
        }
    }
}
