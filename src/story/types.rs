use std::fmt;

use serde::{Deserialize, Serialize};

use crate::story::error::StoryError;

pub const MIN_AGE: u32 = 1;
pub const MAX_AGE: u32 = 120;

/// Who the storybook is for and what it should be about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryRequest {
    pub name: String,
    pub age: u32,
    pub keywords: String,
}

impl StoryRequest {
    pub fn new(name: impl Into<String>, age: u32, keywords: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            age,
            keywords: keywords.into(),
        }
    }

    pub fn validate(&self) -> Result<(), StoryError> {
        if self.name.trim().is_empty() {
            return Err(StoryError::Input("the child's name is required".to_string()));
        }
        if !(MIN_AGE..=MAX_AGE).contains(&self.age) {
            return Err(StoryError::Input(format!(
                "age must be between {MIN_AGE} and {MAX_AGE}, got {}",
                self.age
            )));
        }
        if self.keywords.trim().is_empty() {
            return Err(StoryError::Input(
                "at least one theme or keyword is required".to_string(),
            ));
        }
        Ok(())
    }

    pub fn display_title(&self, storybook_id: &str) -> String {
        format!(
            "{} ({}): {} - {}",
            self.name, self.age, self.keywords, storybook_id
        )
    }
}

/// The locked appearance of the protagonist. Built once per storybook and
/// only ever read afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CharacterDescription(String);

impl CharacterDescription {
    /// Returns `None` for blank text.
    pub fn new(text: &str) -> Option<Self> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CharacterDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scene {
    /// 1-based position in narrative order.
    pub index: usize,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IllustrationPrompt {
    pub scene_index: usize,
    pub text: String,
    /// Set when the locked blocks had to be restored locally.
    pub repaired: bool,
}

impl IllustrationPrompt {
    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_request_fields() {
        assert!(StoryRequest::new("Tommaso", 8, "train, snow").validate().is_ok());
        assert!(matches!(
            StoryRequest::new("  ", 8, "snow").validate(),
            Err(StoryError::Input(_))
        ));
        assert!(matches!(
            StoryRequest::new("Tommaso", 0, "snow").validate(),
            Err(StoryError::Input(_))
        ));
        assert!(matches!(
            StoryRequest::new("Tommaso", 121, "snow").validate(),
            Err(StoryError::Input(_))
        ));
        assert!(matches!(
            StoryRequest::new("Tommaso", 8, " \n ").validate(),
            Err(StoryError::Input(_))
        ));
    }

    #[test]
    fn display_title_matches_record_format() {
        let request = StoryRequest::new("Tommaso", 8, "train, snow");
        assert_eq!(request.display_title("1a2b3c4d"), "Tommaso (8): train, snow - 1a2b3c4d");
    }

    #[test]
    fn character_description_rejects_blank_text() {
        assert!(CharacterDescription::new(" \n").is_none());
        let description = CharacterDescription::new("  A small boy in a red scarf. ").unwrap();
        assert_eq!(description.as_str(), "A small boy in a red scarf.");
    }

    #[test]
    fn character_description_serializes_as_plain_string() {
        let description = CharacterDescription::new("A girl with freckles.").unwrap();
        assert_eq!(
            serde_json::to_string(&description).unwrap(),
            "\"A girl with freckles.\""
        );
    }
}
