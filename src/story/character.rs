use std::sync::Arc;

use tracing::{info, warn};

use crate::config::{MAX_CHARACTER_WORDS, PROMPT_WRITER_SYSTEM_PROMPT};
use crate::llm::{CapabilityError, TextCompletion};
use crate::story::error::{Stage, StoryError};
use crate::story::prompts::build_character_prompt;
use crate::story::types::CharacterDescription;

/// Produces the one visual description of the protagonist that every
/// illustration reuses.
#[derive(Clone)]
pub struct CharacterLocker {
    completion: Arc<dyn TextCompletion>,
}

impl CharacterLocker {
    pub fn new(completion: Arc<dyn TextCompletion>) -> Self {
        Self { completion }
    }

    pub async fn describe_character(
        &self,
        name: &str,
        age: u32,
        keywords: &str,
    ) -> Result<CharacterDescription, StoryError> {
        let prompt = build_character_prompt(name, age, keywords);
        let raw = self
            .completion
            .complete(PROMPT_WRITER_SYSTEM_PROMPT, &prompt)
            .await
            .map_err(|err| StoryError::capability(Stage::Character, err))?;

        let description = CharacterDescription::new(&raw)
            .ok_or_else(|| StoryError::capability(Stage::Character, CapabilityError::Empty))?;

        let words = description.as_str().split_whitespace().count();
        if words > MAX_CHARACTER_WORDS {
            warn!(
                "Character description has {} words (limit {}), keeping it as is",
                words, MAX_CHARACTER_WORDS
            );
        }
        info!(
            "Character locked with model={} ({} words)",
            self.completion.model_name(),
            words
        );
        Ok(description)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedCompletion;

    #[tokio::test]
    async fn returns_trimmed_description_from_one_request() {
        let completion = Arc::new(ScriptedCompletion::new(|_, _| {
            Ok("\n A cheerful child in a red knitted sweater and green boots. \n".to_string())
        }));
        let locker = CharacterLocker::new(completion.clone());

        let description = locker.describe_character("Mia", 6, "snow").await.unwrap();

        assert_eq!(
            description.as_str(),
            "A cheerful child in a red knitted sweater and green boots."
        );
        let calls = completion.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, PROMPT_WRITER_SYSTEM_PROMPT);
        assert!(calls[0].1.contains("Exact numeric age: 6 years old"));
    }

    #[tokio::test]
    async fn blank_output_fails_character_stage() {
        let locker = CharacterLocker::new(Arc::new(ScriptedCompletion::new(|_, _| Ok("   ".to_string()))));
        let err = locker.describe_character("Mia", 6, "snow").await.unwrap_err();
        assert!(matches!(
            err,
            StoryError::Capability {
                stage: Stage::Character,
                scene_index: None,
                source: CapabilityError::Empty
            }
        ));
    }

    #[tokio::test]
    async fn capability_failure_is_tagged() {
        let locker = CharacterLocker::new(Arc::new(ScriptedCompletion::new(|_, _| {
            Err(CapabilityError::Timeout)
        })));
        let err = locker.describe_character("Mia", 6, "snow").await.unwrap_err();
        assert_eq!(err.stage(), "character");
    }
}
