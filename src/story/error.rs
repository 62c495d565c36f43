use std::fmt;
use std::time::Duration;

use crate::llm::CapabilityError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Input,
    Character,
    Story,
    Segmentation,
    Prompt,
    Render,
}

impl Stage {
    pub const fn as_str(self) -> &'static str {
        match self {
            Stage::Input => "input",
            Stage::Character => "character",
            Stage::Story => "story",
            Stage::Segmentation => "segmentation",
            Stage::Prompt => "prompt",
            Stage::Render => "render",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoryError {
    #[error("invalid input: {0}")]
    Input(String),

    #[error("{stage} stage failed{}: {source}", scene_suffix(.scene_index))]
    Capability {
        stage: Stage,
        scene_index: Option<usize>,
        #[source]
        source: CapabilityError,
    },

    #[error(
        "no scenes produced from story text ({marker_count} '{marker}' marker(s) found); check the scene-break formatting. Story preview: {preview:?}"
    )]
    NoScenes {
        marker: String,
        marker_count: usize,
        preview: String,
    },

    #[error("prompt stage failed for scene {scene_index}: composed prompt is missing the {}", .missing.join(" and "))]
    ConsistencyViolation {
        scene_index: usize,
        missing: Vec<&'static str>,
    },

    #[error("scene task failed{}: {reason}", scene_suffix(.scene_index))]
    SceneTask {
        scene_index: Option<usize>,
        reason: String,
    },

    #[error("storybook generation timed out after {0:?}")]
    Timeout(Duration),

    #[error("storybook generation cancelled before scene {scene_index}")]
    Cancelled { scene_index: usize },
}

fn scene_suffix(scene_index: &Option<usize>) -> String {
    scene_index
        .map(|index| format!(" for scene {index}"))
        .unwrap_or_default()
}

impl StoryError {
    pub fn capability(stage: Stage, source: CapabilityError) -> Self {
        StoryError::Capability {
            stage,
            scene_index: None,
            source,
        }
    }

    pub fn scene_capability(stage: Stage, scene_index: usize, source: CapabilityError) -> Self {
        StoryError::Capability {
            stage,
            scene_index: Some(scene_index),
            source,
        }
    }

    /// The pipeline stage the failure belongs to, for status reporting.
    pub fn stage(&self) -> &'static str {
        match self {
            StoryError::Input(_) => Stage::Input.as_str(),
            StoryError::Capability { stage, .. } => stage.as_str(),
            StoryError::NoScenes { .. } => Stage::Segmentation.as_str(),
            StoryError::ConsistencyViolation { .. } => Stage::Prompt.as_str(),
            StoryError::SceneTask { .. } => "scene",
            StoryError::Timeout(_) => "timeout",
            StoryError::Cancelled { .. } => "cancelled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_errors_name_stage_and_scene() {
        let err = StoryError::scene_capability(Stage::Render, 4, CapabilityError::Empty);
        assert_eq!(
            err.to_string(),
            "render stage failed for scene 4: capability returned an empty response"
        );
        assert_eq!(err.stage(), "render");

        let err = StoryError::capability(Stage::Character, CapabilityError::Timeout);
        assert_eq!(err.to_string(), "character stage failed: capability call timed out");
    }

    #[test]
    fn no_scenes_error_carries_diagnostics() {
        let err = StoryError::NoScenes {
            marker: "[SCENE_BREAK]".to_string(),
            marker_count: 0,
            preview: "   ".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("0 '[SCENE_BREAK]' marker(s)"));
        assert_eq!(err.stage(), "segmentation");
    }

    #[test]
    fn consistency_violation_lists_missing_blocks() {
        let err = StoryError::ConsistencyViolation {
            scene_index: 2,
            missing: vec!["character description", "style block"],
        };
        assert_eq!(
            err.to_string(),
            "prompt stage failed for scene 2: composed prompt is missing the character description and style block"
        );
    }
}
