use std::sync::Arc;

use anyhow::anyhow;
use tokio::task;
use tracing::debug;

use crate::config::{GUIDANCE, HEIGHT, NEGATIVE_PROMPT, STEPS, WIDTH};
use crate::llm::media::fit_to_geometry;
use crate::llm::{CapabilityError, ImageRenderer, RenderRequest};
use crate::story::{IllustrationPrompt, Stage, StoryError};

/// Fixed render parameters shared by every scene of a storybook.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderSettings {
    pub negative_prompt: String,
    pub width: u32,
    pub height: u32,
    pub steps: u32,
    pub guidance_scale: f32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            negative_prompt: NEGATIVE_PROMPT.to_string(),
            width: WIDTH,
            height: HEIGHT,
            steps: STEPS,
            guidance_scale: GUIDANCE,
        }
    }
}

/// One PNG page, always at the configured geometry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Illustration {
    pub scene_index: usize,
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

#[derive(Clone)]
pub struct IllustrationRenderer {
    renderer: Arc<dyn ImageRenderer>,
    settings: Arc<RenderSettings>,
}

impl IllustrationRenderer {
    pub fn new(renderer: Arc<dyn ImageRenderer>, settings: RenderSettings) -> Self {
        Self {
            renderer,
            settings: Arc::new(settings),
        }
    }

    pub async fn render(&self, prompt: &IllustrationPrompt) -> Result<Illustration, StoryError> {
        let request = RenderRequest {
            prompt: prompt.text.clone(),
            negative_prompt: self.settings.negative_prompt.clone(),
            width: self.settings.width,
            height: self.settings.height,
            steps: self.settings.steps,
            guidance_scale: self.settings.guidance_scale,
        };
        let scene_index = prompt.scene_index;
        let raw = self
            .renderer
            .render(&request)
            .await
            .map_err(|err| StoryError::scene_capability(Stage::Render, scene_index, err))?;
        debug!(
            "Scene {} rendered by {}: {} bytes",
            scene_index,
            self.renderer.model_name(),
            raw.len()
        );

        let (width, height) = (self.settings.width, self.settings.height);
        let png = task::spawn_blocking(move || fit_to_geometry(&raw, width, height))
            .await
            .map_err(|err| CapabilityError::Request(anyhow!("image fitting task failed: {err}")))
            .and_then(|fitted| fitted)
            .map_err(|err| StoryError::scene_capability(Stage::Render, scene_index, err))?;

        Ok(Illustration {
            scene_index,
            png,
            width,
            height,
        })
    }
}
