//! Capability seams for the black-box backends the pipeline talks to, plus
//! the HTTP adapters that implement them.

pub mod chat;
pub mod diffusion;
pub mod gemini;
pub mod media;

use async_trait::async_trait;

pub use chat::ChatCompletionClient;
pub use diffusion::DiffusionClient;
pub use gemini::GeminiImageClient;

#[derive(Debug, thiserror::Error)]
pub enum CapabilityError {
    #[error("capability returned an empty response")]
    Empty,
    #[error("capability call timed out")]
    Timeout,
    #[error("capability returned an unusable response: {0}")]
    Malformed(String),
    #[error(transparent)]
    Request(#[from] anyhow::Error),
}

/// Text completion: one system prompt, one user prompt, one answer.
#[async_trait]
pub trait TextCompletion: Send + Sync {
    async fn complete(&self, system_prompt: &str, user_prompt: &str)
        -> Result<String, CapabilityError>;

    fn model_name(&self) -> &str;
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderRequest {
    pub prompt: String,
    pub negative_prompt: String,
    pub width: u32,
    pub height: u32,
    pub steps: u32,
    pub guidance_scale: f32,
}

/// Image rendering. Returns encoded image bytes in whatever format and
/// resolution the backend produced.
#[async_trait]
pub trait ImageRenderer: Send + Sync {
    async fn render(&self, request: &RenderRequest) -> Result<Vec<u8>, CapabilityError>;

    fn model_name(&self) -> &str;
}
