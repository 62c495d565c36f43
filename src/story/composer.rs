use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::{ConsistencyPolicy, MAX_PROMPT_WORDS, PROMPT_WRITER_SYSTEM_PROMPT};
use crate::llm::{CapabilityError, TextCompletion};
use crate::story::error::{Stage, StoryError};
use crate::story::prompts::build_illustration_prompt;
use crate::story::types::{CharacterDescription, IllustrationPrompt, Scene};

pub const CHARACTER_BLOCK: &str = "character description";
pub const STYLE_BLOCK: &str = "style block";

/// Turns a scene into an image prompt that must carry the locked character
/// description and the style block word for word.
///
/// Under [`ConsistencyPolicy::Trust`] the model's answer is used as is.
/// Otherwise the answer is checked (whitespace-insensitive) and one retry is
/// made with a correction; if the blocks are still missing, `Strict` fails
/// the scene and `Repair` puts the missing blocks back around the model's
/// phrasing.
#[derive(Clone)]
pub struct PromptComposer {
    completion: Arc<dyn TextCompletion>,
    policy: ConsistencyPolicy,
}

impl PromptComposer {
    pub fn new(completion: Arc<dyn TextCompletion>, policy: ConsistencyPolicy) -> Self {
        Self { completion, policy }
    }

    pub async fn compose_prompt(
        &self,
        scene: &Scene,
        character: &CharacterDescription,
        style_block: &str,
    ) -> Result<IllustrationPrompt, StoryError> {
        let first = self.request(scene, character, style_block, None).await?;
        if self.policy == ConsistencyPolicy::Trust {
            return Ok(finish(scene, first, false));
        }

        let missing = missing_blocks(&first, character.as_str(), style_block);
        if missing.is_empty() {
            return Ok(finish(scene, first, false));
        }
        warn!(
            "Prompt for scene {} is missing the {}, retrying once",
            scene.index,
            missing.join(" and ")
        );

        let correction = format!(
            "Your previous answer left out the {}. Restate it exactly as given above.",
            missing.join(" and ")
        );
        let second = self
            .request(scene, character, style_block, Some(&correction))
            .await?;
        let missing = missing_blocks(&second, character.as_str(), style_block);
        if missing.is_empty() {
            return Ok(finish(scene, second, false));
        }

        match self.policy {
            ConsistencyPolicy::Strict => Err(StoryError::ConsistencyViolation {
                scene_index: scene.index,
                missing,
            }),
            ConsistencyPolicy::Repair | ConsistencyPolicy::Trust => {
                warn!(
                    "Prompt for scene {} still missing the {} after retry, restoring locally",
                    scene.index,
                    missing.join(" and ")
                );
                let repaired = restore_blocks(&second, character.as_str(), style_block, &missing);
                Ok(finish(scene, repaired, true))
            }
        }
    }

    async fn request(
        &self,
        scene: &Scene,
        character: &CharacterDescription,
        style_block: &str,
        correction: Option<&str>,
    ) -> Result<String, StoryError> {
        let prompt = build_illustration_prompt(&scene.text, character.as_str(), style_block, correction);
        let raw = self
            .completion
            .complete(PROMPT_WRITER_SYSTEM_PROMPT, &prompt)
            .await
            .map_err(|err| StoryError::scene_capability(Stage::Prompt, scene.index, err))?;
        let text = raw.trim();
        if text.is_empty() {
            return Err(StoryError::scene_capability(
                Stage::Prompt,
                scene.index,
                CapabilityError::Empty,
            ));
        }
        Ok(text.to_string())
    }
}

fn finish(scene: &Scene, text: String, repaired: bool) -> IllustrationPrompt {
    let prompt = IllustrationPrompt {
        scene_index: scene.index,
        text,
        repaired,
    };
    let words = prompt.word_count();
    if words > MAX_PROMPT_WORDS {
        debug!(
            "Prompt for scene {} has {} words (requested under {})",
            scene.index, words, MAX_PROMPT_WORDS
        );
    }
    prompt
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn contains_verbatim(haystack: &str, needle: &str) -> bool {
    normalize_whitespace(haystack).contains(&normalize_whitespace(needle))
}

pub fn missing_blocks(prompt: &str, character: &str, style_block: &str) -> Vec<&'static str> {
    let mut missing = Vec::new();
    if !contains_verbatim(prompt, character) {
        missing.push(CHARACTER_BLOCK);
    }
    if !contains_verbatim(prompt, style_block) {
        missing.push(STYLE_BLOCK);
    }
    missing
}

/// Character description first, then the model's scene phrasing, then the
/// style block.
fn restore_blocks(prompt: &str, character: &str, style_block: &str, missing: &[&str]) -> String {
    let mut text = String::new();
    if missing.contains(&CHARACTER_BLOCK) {
        text.push_str(character.trim());
        text.push(' ');
    }
    text.push_str(prompt.trim().trim_end_matches(','));
    if missing.contains(&STYLE_BLOCK) {
        text.push_str(", ");
        text.push_str(style_block.trim());
    }
    text
}
