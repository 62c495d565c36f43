use std::sync::Arc;

use tracing::info;

use crate::config::{SCENE_BREAK, STORY_WRITER_SYSTEM_PROMPT};
use crate::llm::{CapabilityError, TextCompletion};
use crate::story::error::{Stage, StoryError};
use crate::story::prompts::build_story_prompt;

#[derive(Clone)]
pub struct StoryDrafter {
    completion: Arc<dyn TextCompletion>,
}

impl StoryDrafter {
    pub fn new(completion: Arc<dyn TextCompletion>) -> Self {
        Self { completion }
    }

    /// Returns the raw story text with its scene markers untouched.
    pub async fn draft_story(
        &self,
        name: &str,
        age: u32,
        keywords: &str,
    ) -> Result<String, StoryError> {
        let prompt = build_story_prompt(name, age, keywords);
        let raw = self
            .completion
            .complete(STORY_WRITER_SYSTEM_PROMPT, &prompt)
            .await
            .map_err(|err| StoryError::capability(Stage::Story, err))?;

        let story = raw.trim();
        if story.is_empty() {
            return Err(StoryError::capability(Stage::Story, CapabilityError::Empty));
        }
        info!(
            "Story drafted: {} words, {} scene markers",
            story.split_whitespace().count(),
            story.matches(SCENE_BREAK).count()
        );
        Ok(story.to_string())
    }
}
