//! Progress units emitted by a run.

use rustedlens_core::image::ImageHandle;
use serde::{Deserialize, Serialize};

/// One unit of run progress.
///
/// Intermediate steps carry the text streamed so far for the current phase;
/// a final step closes the phase with its complete result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub stage: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ImageHandle>,
    pub is_final: bool,
}

impl Step {
    /// A streaming update.
    pub fn progress(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            message: message.into(),
            images: Vec::new(),
            is_final: false,
        }
    }

    /// A phase result.
    pub fn finished(
        stage: impl Into<String>,
        message: impl Into<String>,
        images: Vec<ImageHandle>,
    ) -> Self {
        Self {
            stage: stage.into(),
            message: message.into(),
            images,
            is_final: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_json_shape() {
        let step = Step::progress("Selecting Skill", "{\"Skill");
        let json = serde_json::to_value(&step).unwrap();
        assert_eq!(json["stage"], "Selecting Skill");
        assert_eq!(json["is_final"], false);
        assert!(json.get("images").is_none());

        let image = ImageHandle::from_bytes(vec![0x89, b'P', b'N', b'G']);
        let step = Step::finished("Response", "4", vec![image]);
        let json = serde_json::to_value(&step).unwrap();
        assert_eq!(json["is_final"], true);
        assert_eq!(json["images"][0], "iVBORw==");
    }
}
