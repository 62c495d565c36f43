//! Deterministic stand-ins for the capability traits.

use std::io::Cursor;
use std::time::Duration;

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use parking_lot::Mutex;

use crate::llm::{CapabilityError, ImageRenderer, RenderRequest, TextCompletion};

type Responder = dyn Fn(&str, &str) -> Result<String, CapabilityError> + Send + Sync;

/// Text completion driven by a closure over `(system_prompt, user_prompt)`.
pub struct ScriptedCompletion {
    responder: Box<Responder>,
    delay: Option<Duration>,
    calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedCompletion {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&str, &str) -> Result<String, CapabilityError> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl TextCompletion for ScriptedCompletion {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, CapabilityError> {
        self.calls
            .lock()
            .push((system_prompt.to_string(), user_prompt.to_string()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.responder)(system_prompt, user_prompt)
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// Pulls the scene text back out of an illustration request.
pub fn scene_of(user_prompt: &str) -> Option<&str> {
    let start = user_prompt.find("Scene:\n\"\"\"")? + "Scene:\n\"\"\"".len();
    let rest = &user_prompt[start..];
    let end = rest.find("\"\"\"")?;
    Some(&rest[..end])
}

pub fn is_character_request(user_prompt: &str) -> bool {
    user_prompt.contains("recurring character")
}

pub fn is_story_request(user_prompt: &str) -> bool {
    user_prompt.contains("story split into scenes")
}

/// Renders a solid-color JPEG at the requested size (or a fixed size),
/// optionally failing for one prompt.
pub struct SolidRenderer {
    native_size: Option<(u32, u32)>,
    fail_when: Option<String>,
    delay_for: Mutex<Vec<(String, Duration)>>,
    requests: Mutex<Vec<RenderRequest>>,
}

impl SolidRenderer {
    pub fn new() -> Self {
        Self {
            native_size: None,
            fail_when: None,
            delay_for: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_native_size(mut self, width: u32, height: u32) -> Self {
        self.native_size = Some((width, height));
        self
    }

    /// Returns `Empty` for any prompt containing `needle`.
    pub fn failing_when(mut self, needle: &str) -> Self {
        self.fail_when = Some(needle.to_string());
        self
    }

    /// Sleeps before answering prompts containing `needle`.
    pub fn slow_when(self, needle: &str, delay: Duration) -> Self {
        self.delay_for.lock().push((needle.to_string(), delay));
        self
    }

    pub fn requests(&self) -> Vec<RenderRequest> {
        self.requests.lock().clone()
    }
}

impl Default for SolidRenderer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageRenderer for SolidRenderer {
    async fn render(&self, request: &RenderRequest) -> Result<Vec<u8>, CapabilityError> {
        self.requests.lock().push(request.clone());
        let delay = self
            .delay_for
            .lock()
            .iter()
            .find(|(needle, _)| request.prompt.contains(needle.as_str()))
            .map(|(_, delay)| *delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(needle) = &self.fail_when {
            if request.prompt.contains(needle.as_str()) {
                return Err(CapabilityError::Empty);
            }
        }
        let (width, height) = self.native_size.unwrap_or((request.width, request.height));
        Ok(solid_jpeg(width, height))
    }

    fn model_name(&self) -> &str {
        "solid"
    }
}

pub fn solid_jpeg(width: u32, height: u32) -> Vec<u8> {
    let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([230, 160, 70])));
    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, ImageFormat::Jpeg)
        .expect("encode test jpeg");
    buffer.into_inner()
}
