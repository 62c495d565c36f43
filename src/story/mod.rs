//! Story-to-scene decomposition and prompt consistency.

pub mod character;
pub mod composer;
pub mod drafter;
pub mod error;
pub mod prompts;
pub mod sanitizer;
pub mod segmenter;
pub mod types;

pub use character::CharacterLocker;
pub use composer::PromptComposer;
pub use drafter::StoryDrafter;
pub use error::{Stage, StoryError};
pub use sanitizer::{ContentSanitizer, SubstitutionTable};
pub use segmenter::SceneSegmenter;
pub use types::{CharacterDescription, IllustrationPrompt, Scene, StoryRequest};
