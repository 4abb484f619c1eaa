//! On-disk project store.
//!
//! Layout under the store root:
//!
//! ```text
//! <root>/
//!   <slug>/
//!     project.json
//!     assets/
//!       characters/<slug>/portrait.png
//!       characters/<slug>/portrait.png.json   (generation sidecar)
//!       locations/<slug>/reference.png
//!       chapters/ch<NNN>/s<NN>_p<NN>.png
//! ```
//!
//! Every operation loads a full snapshot, transforms it, and saves it back.
//! Writes replace `project.json` via a temp file and rename so a crashed
//! write never leaves a truncated graph. There is no cross-process locking;
//! concurrent writers are last-write-wins (see DESIGN.md).

use crate::project::{Project, ProjectFormat};
use gemini::ResponseMeta;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

const PROJECT_FILE: &str = "project.json";
const ASSETS_DIR: &str = "assets";

/// Errors from the project store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Project {0} already exists")]
    AlreadyExists(String),

    #[error("Project {0} not found")]
    NotFound(String),

    #[error("Invalid project name: {0}")]
    InvalidName(String),

    #[error("Corrupt project file {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Generation provenance written next to each asset as `<asset>.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetSidecar {
    pub prompt: String,
    pub parameters: serde_json::Value,
    pub response: ResponseMeta,
    pub created_at: u64,
}

/// A project visible in `list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSummary {
    pub slug: String,
    pub name: String,
    pub chapter_count: usize,
}

/// Filesystem-backed store of projects.
#[derive(Debug, Clone)]
pub struct ProjectStore {
    root: PathBuf,
}

impl ProjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn project_dir(&self, slug: &str) -> PathBuf {
        self.root.join(slug)
    }

    fn project_file(&self, slug: &str) -> PathBuf {
        self.project_dir(slug).join(PROJECT_FILE)
    }

    /// Directory all relative asset paths are resolved against.
    pub fn asset_root(&self, slug: &str) -> PathBuf {
        self.project_dir(slug).join(ASSETS_DIR)
    }

    /// Absolute path for a recorded relative asset path.
    pub fn asset_path(&self, slug: &str, relative: &str) -> PathBuf {
        self.asset_root(slug).join(relative)
    }

    /// Create a new empty project. The slug is derived from the name.
    pub async fn create(
        &self,
        name: &str,
        format: ProjectFormat,
    ) -> Result<(String, Project), StoreError> {
        let slug = slugify(name);
        if slug.is_empty() {
            return Err(StoreError::InvalidName(name.to_string()));
        }
        if self.project_file(&slug).exists() {
            return Err(StoreError::AlreadyExists(slug));
        }

        let project = Project::new(name, format);
        tokio::fs::create_dir_all(self.asset_root(&slug)).await?;
        self.save(&slug, &project).await?;
        Ok((slug, project))
    }

    /// Load a snapshot of the project graph.
    pub async fn load(&self, slug: &str) -> Result<Project, StoreError> {
        let path = self.project_file(slug);
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(slug.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&text).map_err(|e| StoreError::Corrupt {
            path,
            reason: e.to_string(),
        })
    }

    /// Persist the project graph, replacing the previous version atomically.
    pub async fn save(&self, slug: &str, project: &Project) -> Result<(), StoreError> {
        let dir = self.project_dir(slug);
        tokio::fs::create_dir_all(&dir).await?;

        let text = serde_json::to_string_pretty(project).map_err(|e| StoreError::Corrupt {
            path: self.project_file(slug),
            reason: e.to_string(),
        })?;

        let tmp = dir.join(format!("{PROJECT_FILE}.tmp"));
        tokio::fs::write(&tmp, text).await?;
        tokio::fs::rename(&tmp, self.project_file(slug)).await?;
        Ok(())
    }

    /// List all projects under the store root.
    pub async fn list(&self) -> Result<Vec<ProjectSummary>, StoreError> {
        let mut summaries = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(summaries),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let slug = entry.file_name().to_string_lossy().to_string();
            if !self.project_file(&slug).exists() {
                continue;
            }
            match self.load(&slug).await {
                Ok(project) => summaries.push(ProjectSummary {
                    slug,
                    name: project.name,
                    chapter_count: project.chapters.len(),
                }),
                // Unreadable projects are skipped rather than failing the
                // whole listing.
                Err(StoreError::Corrupt { .. }) => continue,
                Err(e) => return Err(e),
            }
        }

        summaries.sort_by(|a, b| a.slug.cmp(&b.slug));
        Ok(summaries)
    }

    /// True when a recorded relative asset path exists on disk.
    pub fn asset_exists(&self, slug: &str, relative: &str) -> bool {
        self.asset_path(slug, relative).exists()
    }

    /// Write an asset's bytes plus its generation sidecar, returning the
    /// relative path that should be recorded in the graph.
    pub async fn save_asset(
        &self,
        slug: &str,
        relative: &str,
        bytes: &[u8],
        sidecar: &AssetSidecar,
    ) -> Result<String, StoreError> {
        let path = self.asset_path(slug, relative);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::write(&path, bytes).await?;

        let sidecar_text =
            serde_json::to_string_pretty(sidecar).map_err(|e| StoreError::Corrupt {
                path: path.clone(),
                reason: e.to_string(),
            })?;
        let sidecar_path = self.asset_path(slug, &format!("{relative}.json"));
        tokio::fs::write(&sidecar_path, sidecar_text).await?;

        Ok(relative.to_string())
    }
}

/// Lowercase the name and collapse runs of non-alphanumerics to single
/// hyphens.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_hyphen = true;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_hyphen = false;
        } else if !last_hyphen {
            slug.push('-');
            last_hyphen = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}
