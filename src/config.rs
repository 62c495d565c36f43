use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tracing::warn;
use url::Url;

pub const STEPS: u32 = 10;
pub const GUIDANCE: f32 = 7.5;
pub const WIDTH: u32 = 576;
pub const HEIGHT: u32 = 768;
pub const MIN_SCENES: usize = 10;
pub const MAX_SCENES: usize = 15;
pub const MAX_WORDS: usize = 200;
pub const MAX_CHARS_PER_SCENE: usize = 300;
pub const MAX_CHARACTER_WORDS: usize = 45;
pub const MAX_PROMPT_WORDS: usize = 70;
pub const SCENE_BREAK: &str = "[SCENE_BREAK]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageProvider {
    Diffusion,
    Gemini,
}

impl ImageProvider {
    pub fn from_str(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "gemini" => ImageProvider::Gemini,
            "diffusion" | "sd" | "stable-diffusion" => ImageProvider::Diffusion,
            other => {
                warn!("Unknown IMAGE_PROVIDER value '{}'; defaulting to diffusion.", other);
                ImageProvider::Diffusion
            }
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            ImageProvider::Diffusion => "diffusion",
            ImageProvider::Gemini => "gemini",
        }
    }
}

/// What the prompt composer does when the character description or the
/// style block did not survive into the composed prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsistencyPolicy {
    Trust,
    Strict,
    Repair,
}

impl ConsistencyPolicy {
    pub fn from_str(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "trust" | "off" | "none" => ConsistencyPolicy::Trust,
            "strict" => ConsistencyPolicy::Strict,
            "repair" => ConsistencyPolicy::Repair,
            other => {
                warn!(
                    "Unknown PROMPT_CONSISTENCY value '{}'; defaulting to repair.",
                    other
                );
                ConsistencyPolicy::Repair
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub logs_dir: PathBuf,
    pub output_dir: PathBuf,
    pub text_api_key: String,
    pub text_base_url: String,
    pub text_model: String,
    pub text_temperature: f32,
    pub text_top_p: f32,
    pub text_timeout_seconds: u64,
    pub image_provider: ImageProvider,
    pub diffusion_base_url: String,
    pub diffusion_api_key: String,
    pub diffusion_model: String,
    pub gemini_api_key: String,
    pub gemini_image_model: String,
    pub image_timeout_seconds: u64,
    pub capability_max_attempts: usize,
    pub scene_concurrency: usize,
    pub request_timeout_seconds: u64,
    pub prompt_consistency: ConsistencyPolicy,
    pub sanitizer_table_path: Option<PathBuf>,
}

fn env_string(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_f32(name: &str, default: f32) -> f32 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<f32>().ok())
        .unwrap_or(default)
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_usize(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(default)
}

fn env_optional_path(name: &str) -> Option<PathBuf> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

fn validated_base_url(name: &str, value: String) -> Result<String> {
    let trimmed = value.trim().trim_end_matches('/').to_string();
    Url::parse(&trimmed).map_err(|err| anyhow!("Invalid {} '{}': {}", name, trimmed, err))?;
    Ok(trimmed)
}

impl Config {
    pub fn load() -> Result<Self> {
        let text_api_key = env::var("TEXT_API_KEY")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| env_string("GROQ_API_KEY", ""));

        Ok(Config {
            log_level: env_string("LOG_LEVEL", "info").to_lowercase(),
            logs_dir: PathBuf::from(env_string("LOGS_DIR", "logs")),
            output_dir: PathBuf::from(env_string("OUTPUT_DIR", "outputs")),
            text_api_key,
            text_base_url: validated_base_url(
                "TEXT_BASE_URL",
                env_string("TEXT_BASE_URL", "https://api.groq.com/openai/v1"),
            )?,
            text_model: env_string("TEXT_MODEL", "llama-3.3-70b-versatile"),
            text_temperature: env_f32("TEXT_TEMPERATURE", 0.7),
            text_top_p: env_f32("TEXT_TOP_P", 0.95),
            text_timeout_seconds: env_u64("TEXT_TIMEOUT_SECONDS", 60).max(1),
            image_provider: ImageProvider::from_str(&env_string("IMAGE_PROVIDER", "diffusion")),
            diffusion_base_url: validated_base_url(
                "DIFFUSION_BASE_URL",
                env_string("DIFFUSION_BASE_URL", "http://127.0.0.1:7860"),
            )?,
            diffusion_api_key: env_string("DIFFUSION_API_KEY", ""),
            diffusion_model: env_string("DIFFUSION_MODEL", "stable-diffusion-xl-base-1.0"),
            gemini_api_key: env_string("GEMINI_API_KEY", ""),
            gemini_image_model: env_string("GEMINI_IMAGE_MODEL", "gemini-2.5-flash-image"),
            image_timeout_seconds: env_u64("IMAGE_TIMEOUT_SECONDS", 300).max(1),
            capability_max_attempts: env_usize("CAPABILITY_MAX_ATTEMPTS", 2).max(1),
            scene_concurrency: env_usize("SCENE_CONCURRENCY", 1).max(1),
            request_timeout_seconds: env_u64("REQUEST_TIMEOUT_SECONDS", 1800),
            prompt_consistency: ConsistencyPolicy::from_str(&env_string(
                "PROMPT_CONSISTENCY",
                "repair",
            )),
            sanitizer_table_path: env_optional_path("SANITIZER_TABLE_PATH"),
        })
    }

    pub fn text_timeout(&self) -> Duration {
        Duration::from_secs(self.text_timeout_seconds)
    }

    pub fn image_timeout(&self) -> Duration {
        Duration::from_secs(self.image_timeout_seconds)
    }

    /// `None` when the request-level timeout is disabled.
    pub fn request_timeout(&self) -> Option<Duration> {
        if self.request_timeout_seconds == 0 {
            None
        } else {
            Some(Duration::from_secs(self.request_timeout_seconds))
        }
    }

    /// Checks that the selected capability backends have the credentials they need.
    pub fn missing_credentials(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.text_api_key.trim().is_empty() {
            missing.push("TEXT_API_KEY (or GROQ_API_KEY)");
        }
        if self.image_provider == ImageProvider::Gemini && self.gemini_api_key.trim().is_empty() {
            missing.push("GEMINI_API_KEY");
        }
        missing
    }
}

pub const STORY_WRITER_SYSTEM_PROMPT: &str = "You write short Christmas stories with a magical, warm, cozy tone. You strictly follow formatting rules given by the user.";

pub const PROMPT_WRITER_SYSTEM_PROMPT: &str = "You create Stable Diffusion prompts for 2D children storybook illustrations. You follow constraints exactly and you output only the final prompt.";

pub const STYLE_PRESET: &str = "cozy warm children's storybook illustration, highly detailed watercolor and gouache on soft textured paper, \
clean black ink outlines with subtle pencil linework, smooth shading, \
soft warm golden hour lighting, gentle fireplace and candlelight glow, \
rich amber, honey, and soft orange color palette, muted cool tones only in the distant background, \
Scandinavian hygge atmosphere, comfortable, peaceful, whimsical, friendly mood, \
hand-painted 2D illustration, slightly soft edges, slight vignette around the image borders, \
no motion blur, no grain, no noise, \
NOT realistic, NOT photorealistic, NOT 3D render, NOT CGI, NOT cold blue lighting";

pub const NEGATIVE_PROMPT: &str = "photorealistic, realistic, photograph, photo, hyperrealistic, high detail skin, skin pores, \
dslr, film grain, bokeh, depth of field, lens flare, studio lighting, flash, hdr, \
3d render, cgi, octane render, unreal engine, sharp focus, ultra-detailed, \
cold colors, blue tones, gray, dark, gloomy, harsh lighting, \
text, letters, watermark, logo, signature, low quality, blurry, deformed, ugly";

pub const DEFAULT_SUBSTITUTIONS: &[(&str, &str)] = &[
    ("gun", "snowball blaster"),
    ("guns", "snowball blasters"),
    ("weapon", "magic snow wand"),
    ("weapons", "magic snow wands"),
    ("knife", "carving knife for gingerbread"),
    ("knives", "carving knives for gingerbread"),
    ("sword", "candy cane sword"),
    ("swords", "candy cane swords"),
    ("war", "snowball tournament"),
    ("battle", "snowball battle"),
    ("battles", "snowball battles"),
    ("fight", "playful snowball fight"),
    ("fights", "playful snowball fights"),
    ("fighting", "playing with snowballs"),
    ("monster", "friendly monster"),
    ("monsters", "friendly monsters"),
    ("demon", "grumpy snow spirit"),
    ("demons", "grumpy snow spirits"),
    ("ghost", "shy winter ghost"),
    ("ghosts", "shy winter ghosts"),
    ("zombie", "sleepy snowwalker"),
    ("zombies", "sleepy snowwalkers"),
    ("blood", "red cranberry sauce"),
    ("gore", "messy frosting"),
    ("killing", "defeating in a snowball game"),
    ("kill", "defeat in a snowball game"),
    ("alcohol", "hot chocolate"),
    ("beer", "gingerbread soda"),
    ("wine", "sparkling cranberry juice"),
    ("vodka", "extra-strong hot chocolate"),
    ("whisky", "spiced apple cider"),
    ("whiskey", "spiced apple cider"),
    ("rum", "vanilla sugar syrup"),
    ("drugs", "magic Christmas candies"),
    ("drug", "magic Christmas candy"),
    ("smoke", "chimney smoke from cozy houses"),
    ("smoking", "chimney smoke from cozy houses"),
    ("death", "the end of winter"),
    ("dead", "fast asleep after a long snow day"),
];

pub const THEME_POOL: &[&str] = &[
    // winter & weather
    "snow", "blizzard", "snowstorm", "first snowfall", "frozen lake",
    "icicles", "snowy forest", "mountain village",
    // transport & travel
    "train", "night train", "toy train", "sleigh ride", "flying sleigh",
    "hot air balloon", "Christmas cruise",
    // classic symbols
    "Christmas tree", "Christmas market", "Christmas lights", "wreaths",
    "stockings by the fireplace", "nativity scene", "advent calendar",
    // characters & creatures
    "friendly monster", "talking snowman", "tiny dragon", "polar bear",
    "penguins", "wise old owl", "magic fox", "reindeer", "baby reindeer",
    "elves", "toy soldier", "gingerbread man",
    // Santa & workshop
    "Santa's workshop", "Santa's office", "busy elves", "gift wrapping room",
    "reindeer stables", "lost present", "letter to Santa",
    // hygge
    "hot chocolate", "cozy fireplace", "warm blanket", "fluffy socks",
    "marshmallows", "gingerbread cookies", "cinnamon rolls",
    "family dinner", "board games night",
    // places
    "gingerbread house", "enchanted forest", "hidden attic",
    "snowy lighthouse", "ice castle", "tiny mountain cabin",
    "secret library", "frozen waterfall",
    // sky & magic
    "aurora borealis", "shooting star", "full moon", "starry night sky",
    "magic sled", "time-traveling snow globe", "magic bell",
    "talking Christmas ornament",
    // emotions
    "friendship", "kindness", "sharing gifts", "forgiveness",
    "finding courage", "helping a stranger", "missing someone at Christmas",
    "first Christmas away from home",
    // activities
    "snowball fight", "building a snowman", "ice skating", "sledding",
    "decorating the tree", "baking cookies", "carol singing",
    // details
    "snowman", "mistletoe", "twinkling fairy lights",
    "handmade gifts", "secret wish", "lost mitten",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_consistency_policy_with_fallback() {
        assert_eq!(ConsistencyPolicy::from_str("Strict"), ConsistencyPolicy::Strict);
        assert_eq!(ConsistencyPolicy::from_str(" off "), ConsistencyPolicy::Trust);
        assert_eq!(ConsistencyPolicy::from_str("whatever"), ConsistencyPolicy::Repair);
    }

    #[test]
    fn parses_image_provider_with_fallback() {
        assert_eq!(ImageProvider::from_str("GEMINI"), ImageProvider::Gemini);
        assert_eq!(ImageProvider::from_str("sd"), ImageProvider::Diffusion);
        assert_eq!(ImageProvider::from_str("dall-e"), ImageProvider::Diffusion);
        assert_eq!(ImageProvider::Gemini.as_str(), "gemini");
    }

    #[test]
    fn rejects_malformed_base_url() {
        assert!(validated_base_url("TEXT_BASE_URL", "not a url".to_string()).is_err());
        let url = validated_base_url("TEXT_BASE_URL", "https://api.example.com/v1/".to_string())
            .unwrap();
        assert_eq!(url, "https://api.example.com/v1");
    }

    #[test]
    fn style_preset_is_a_single_paragraph() {
        assert!(!STYLE_PRESET.contains('\n'));
        assert!(STYLE_PRESET.contains("rich amber, honey, and soft orange color palette"));
        assert!(!NEGATIVE_PROMPT.contains('\n'));
    }
}
