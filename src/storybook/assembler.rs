use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;
use tokio::task::{self, JoinError, JoinSet};
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::{ConsistencyPolicy, STYLE_PRESET};
use crate::llm::{ImageRenderer, TextCompletion};
use crate::story::{
    CharacterDescription, CharacterLocker, ContentSanitizer, IllustrationPrompt, PromptComposer,
    Scene, SceneSegmenter, StoryDrafter, StoryError, StoryRequest,
};
use crate::storybook::renderer::{Illustration, IllustrationRenderer, RenderSettings};
use crate::utils::logging::{SCENE_SPAN, STORYBOOK_SPAN};

const STORYBOOK_ID_LEN: usize = 8;

/// Short random id used for the storybook's directory and title.
pub fn new_storybook_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(STORYBOOK_ID_LEN);
    id
}

/// Shared cancellation switch, checked before each scene starts.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct AssemblyOptions {
    /// Scenes processed at once; 1 keeps the work strictly sequential.
    pub concurrency: usize,
    pub timeout: Option<Duration>,
    pub cancel: CancelFlag,
}

impl Default for AssemblyOptions {
    fn default() -> Self {
        Self {
            concurrency: 1,
            timeout: None,
            cancel: CancelFlag::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScenePage {
    pub scene: Scene,
    pub prompt: IllustrationPrompt,
    pub illustration: Illustration,
}

#[derive(Debug, Clone)]
pub struct Storybook {
    pub id: String,
    pub request: StoryRequest,
    pub sanitized_keywords: String,
    pub character: CharacterDescription,
    pub story: String,
    /// Ordered by scene index.
    pub pages: Vec<ScenePage>,
    pub created_at: DateTime<Utc>,
}

impl Storybook {
    pub fn display_title(&self) -> String {
        self.request.display_title(&self.id)
    }

    pub fn scene_texts(&self) -> Vec<String> {
        self.pages.iter().map(|page| page.scene.text.clone()).collect()
    }
}

/// Runs the whole pipeline for one request: sanitize, lock the character,
/// draft, segment, then compose and render every scene.
pub struct StorybookAssembler {
    sanitizer: ContentSanitizer,
    locker: CharacterLocker,
    drafter: StoryDrafter,
    segmenter: SceneSegmenter,
    composer: PromptComposer,
    renderer: IllustrationRenderer,
    style_block: Arc<str>,
}

impl StorybookAssembler {
    pub fn new(
        text: Arc<dyn TextCompletion>,
        image: Arc<dyn ImageRenderer>,
        sanitizer: ContentSanitizer,
        policy: ConsistencyPolicy,
    ) -> Self {
        Self {
            sanitizer,
            locker: CharacterLocker::new(text.clone()),
            drafter: StoryDrafter::new(text.clone()),
            segmenter: SceneSegmenter::default(),
            composer: PromptComposer::new(text, policy),
            renderer: IllustrationRenderer::new(image, RenderSettings::default()),
            style_block: Arc::from(STYLE_PRESET),
        }
    }

    pub async fn assemble(
        &self,
        id: &str,
        request: &StoryRequest,
        options: &AssemblyOptions,
    ) -> Result<Storybook, StoryError> {
        request.validate()?;
        let span = info_span!(STORYBOOK_SPAN, id = %id);
        let run = self.run(id, request, options).instrument(span);
        match options.timeout {
            Some(limit) => tokio::time::timeout(limit, run)
                .await
                .map_err(|_| StoryError::Timeout(limit))?,
            None => run.await,
        }
    }

    async fn run(
        &self,
        id: &str,
        request: &StoryRequest,
        options: &AssemblyOptions,
    ) -> Result<Storybook, StoryError> {
        let sanitized_keywords = self.sanitizer.sanitize(&request.keywords);
        if sanitized_keywords != request.keywords {
            info!("Storybook {}: keywords sanitized to {:?}", id, sanitized_keywords);
        }

        let character = self
            .locker
            .describe_character(&request.name, request.age, &sanitized_keywords)
            .await?;
        let story = self
            .drafter
            .draft_story(&request.name, request.age, &sanitized_keywords)
            .await?;
        let scenes = self.segmenter.segment(&story)?;
        info!(
            "Storybook {}: {} scenes, concurrency={}",
            id,
            scenes.len(),
            options.concurrency.max(1)
        );

        let pages = self.process_scenes(id, scenes, &character, options).await?;

        Ok(Storybook {
            id: id.to_string(),
            request: request.clone(),
            sanitized_keywords,
            character,
            story,
            pages,
            created_at: Utc::now(),
        })
    }

    /// Scenes start in narrative order, at most `concurrency` at a time, and
    /// are reassembled by index. The first failure aborts the rest.
    async fn process_scenes(
        &self,
        id: &str,
        scenes: Vec<Scene>,
        character: &CharacterDescription,
        options: &AssemblyOptions,
    ) -> Result<Vec<ScenePage>, StoryError> {
        let total = scenes.len();
        let character = Arc::new(character.clone());
        let semaphore = Arc::new(Semaphore::new(options.concurrency.max(1)));
        let mut join_set: JoinSet<Result<ScenePage, StoryError>> = JoinSet::new();
        let mut task_scenes: HashMap<task::Id, usize> = HashMap::new();
        let mut pages = Vec::with_capacity(total);

        for scene in scenes {
            let permit = loop {
                tokio::select! {
                    permit = semaphore.clone().acquire_owned() => {
                        break permit.map_err(|_| StoryError::Cancelled { scene_index: scene.index })?;
                    }
                    Some(joined) = join_set.join_next() => {
                        match flatten_join(joined, &task_scenes) {
                            Ok(page) => pages.push(page),
                            Err(err) => {
                                join_set.abort_all();
                                return Err(err);
                            }
                        }
                    }
                }
            };

            if options.cancel.is_cancelled() {
                warn!("Storybook {}: cancelled before scene {}", id, scene.index);
                join_set.abort_all();
                return Err(StoryError::Cancelled {
                    scene_index: scene.index,
                });
            }

            let composer = self.composer.clone();
            let renderer = self.renderer.clone();
            let style_block = self.style_block.clone();
            let character = character.clone();
            let storybook_id = id.to_string();
            let scene_index = scene.index;
            let handle = join_set.spawn(async move {
                let _permit = permit;
                let prompt = composer
                    .compose_prompt(&scene, &character, &style_block)
                    .await?;
                let illustration = renderer.render(&prompt).await?;
                info!(
                    "Storybook {}: scene {}/{} illustrated{}",
                    storybook_id,
                    scene.index,
                    total,
                    if prompt.repaired { " (prompt repaired)" } else { "" }
                );
                Ok::<_, StoryError>(ScenePage {
                    scene,
                    prompt,
                    illustration,
                })
            }
            .instrument(info_span!(SCENE_SPAN, index = scene_index)));
            task_scenes.insert(handle.id(), scene_index);
        }

        while let Some(joined) = join_set.join_next().await {
            match flatten_join(joined, &task_scenes) {
                Ok(page) => pages.push(page),
                Err(err) => {
                    join_set.abort_all();
                    return Err(err);
                }
            }
        }

        pages.sort_by_key(|page| page.scene.index);
        Ok(pages)
    }
}

fn flatten_join(
    joined: Result<Result<ScenePage, StoryError>, JoinError>,
    task_scenes: &HashMap<task::Id, usize>,
) -> Result<ScenePage, StoryError> {
    joined.map_err(|err| StoryError::SceneTask {
        scene_index: task_scenes.get(&err.id()).copied(),
        reason: if err.is_panic() {
            "task panicked".to_string()
        } else {
            err.to_string()
        },
    })?
}
