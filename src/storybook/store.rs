use std::cmp::Reverse;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{info, warn};

use crate::storybook::assembler::Storybook;
use crate::storybook::export::{export_storybook_pdf, pdf_file_name};
use crate::storybook::gallery::render_gallery;

pub const RECORD_FILE: &str = "story.json";
pub const GALLERY_FILE: &str = "gallery.html";

/// Everything needed to show a finished storybook again without calling
/// any capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorybookRecord {
    pub id: String,
    pub display_title: String,
    pub name: String,
    pub age: u32,
    pub keywords: String,
    pub character_desc: String,
    pub story: String,
    pub scenes: Vec<String>,
    pub image_paths: Vec<String>,
    #[serde(default)]
    pub sanitized_keywords: String,
    #[serde(default)]
    pub prompts_used: Vec<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Export input: the title plus scenes and illustration files in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportContent<'a> {
    pub title: String,
    pub scenes: &'a [String],
    pub image_paths: &'a [String],
}

impl StorybookRecord {
    pub fn export_content(&self) -> ExportContent<'_> {
        ExportContent {
            title: format!("{}'s AI Christmas Storybook", self.name),
            scenes: &self.scenes,
            image_paths: &self.image_paths,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SavedStorybook {
    pub record: StorybookRecord,
    pub record_path: PathBuf,
    pub gallery_path: PathBuf,
    /// `None` when the PDF export failed; the failure is logged and the
    /// record stays valid.
    pub pdf_path: Option<PathBuf>,
}

/// One directory per storybook under `root`: the record, `NN.png` pages, the
/// gallery page and the PDF storybook.
#[derive(Debug, Clone)]
pub struct StorybookStore {
    root: PathBuf,
}

impl StorybookStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn storybook_dir(&self, id: &str) -> Result<PathBuf> {
        validate_id(id)?;
        Ok(self.root.join(id))
    }

    pub async fn save(&self, storybook: &Storybook) -> Result<SavedStorybook> {
        let dir = self.storybook_dir(&storybook.id)?;
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create storybook directory {}", dir.display()))?;

        let mut image_paths = Vec::with_capacity(storybook.pages.len());
        for page in &storybook.pages {
            let path = dir.join(format!("{:02}.png", page.scene.index));
            fs::write(&path, &page.illustration.png)
                .await
                .with_context(|| format!("Failed to write illustration {}", path.display()))?;
            image_paths.push(path.to_string_lossy().replace('\\', "/"));
        }

        let record = StorybookRecord {
            id: storybook.id.clone(),
            display_title: storybook.display_title(),
            name: storybook.request.name.clone(),
            age: storybook.request.age,
            keywords: storybook.request.keywords.clone(),
            character_desc: storybook.character.as_str().to_string(),
            story: storybook.story.clone(),
            scenes: storybook.scene_texts(),
            image_paths,
            sanitized_keywords: storybook.sanitized_keywords.clone(),
            prompts_used: storybook
                .pages
                .iter()
                .map(|page| page.prompt.text.clone())
                .collect(),
            created_at: Some(storybook.created_at),
        };

        let record_path = dir.join(RECORD_FILE);
        let serialized = serde_json::to_string_pretty(&record)?;
        fs::write(&record_path, serialized)
            .await
            .with_context(|| format!("Failed to write record {}", record_path.display()))?;

        let gallery_path = dir.join(GALLERY_FILE);
        fs::write(&gallery_path, render_gallery(storybook))
            .await
            .with_context(|| format!("Failed to write gallery {}", gallery_path.display()))?;

        let pdf_path = match self.export_pdf(&record).await {
            Ok(path) => Some(path),
            Err(err) => {
                warn!("Storybook {}: PDF export failed: {:#}", record.id, err);
                None
            }
        };

        info!(
            "Storybook {} saved to {} ({} pages)",
            record.id,
            dir.display(),
            record.scenes.len()
        );
        Ok(SavedStorybook {
            record,
            record_path,
            gallery_path,
            pdf_path,
        })
    }

    /// Writes `<name>_christmas_storybook.pdf` next to the record.
    pub async fn export_pdf(&self, record: &StorybookRecord) -> Result<PathBuf> {
        let path = self
            .storybook_dir(&record.id)?
            .join(pdf_file_name(&record.name));
        export_storybook_pdf(&record.export_content(), &path).await?;
        Ok(path)
    }

    pub async fn load(&self, id: &str) -> Result<StorybookRecord> {
        let path = self.storybook_dir(id)?.join(RECORD_FILE);
        read_record(&path).await
    }

    /// All readable records, newest first. Entries that fail to load are
    /// skipped with a warning.
    pub async fn list(&self) -> Result<Vec<StorybookRecord>> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(anyhow!(
                    "Failed to read storybook directory '{}': {}",
                    self.root.display(),
                    err
                ))
            }
        };

        let mut records = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            match entry.file_type().await {
                Ok(file_type) if file_type.is_dir() => {}
                Ok(_) => continue,
                Err(err) => {
                    warn!("Skipping unreadable entry {}: {}", entry.path().display(), err);
                    continue;
                }
            }
            let path = entry.path().join(RECORD_FILE);
            match read_record(&path).await {
                Ok(record) => records.push(record),
                Err(err) => warn!("Skipping storybook entry {}: {:#}", entry.path().display(), err),
            }
        }

        records.sort_by_key(|record| (Reverse(record.created_at), record.id.clone()));
        Ok(records)
    }
}

async fn read_record(path: &Path) -> Result<StorybookRecord> {
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read record {}", path.display()))?;
    let record = serde_json::from_str::<StorybookRecord>(&content)
        .with_context(|| format!("Invalid record {}", path.display()))?;
    Ok(record)
}

fn validate_id(id: &str) -> Result<()> {
    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(anyhow!("Invalid storybook id '{}'", id))
    }
}
