//! Core engine for AI-assisted webtoon production.
//!
//! The engine turns a one-line premise into a produced webtoon in stages:
//! story expansion, character and location asset generation, chapter
//! generation (beat by beat, with continuity context), and panel
//! rendering. Every stage validates its prerequisites up front, is
//! idempotent over existing output, and persists through a
//! snapshot-per-operation project store.
//!
//! Entry points:
//! - [`store::ProjectStore`]: project persistence and asset files
//! - [`expand::StoryService`]: premise to story structure
//! - [`assets::AssetService`]: character portraits and location references
//! - [`chapters::ChapterService`]: beat-ordered chapter generation
//! - [`panels::PanelService`]: panel rendering with reference images
//! - [`jobs::JobRegistry`]: background job tracking

// The chapter response schema is one large `json!` literal.
#![recursion_limit = "256"]

pub mod assets;
pub mod chapters;
pub mod continuity;
pub mod deps;
pub mod error;
pub mod events;
pub mod expand;
pub mod generate;
pub mod jobs;
pub mod panels;
pub mod project;
pub mod store;
pub mod testing;

pub use error::ServiceError;
pub use events::{ChapterHooks, ProgressEvent, PromptDecision, ReviewDecision};
pub use project::{Project, ProjectFormat};
pub use store::ProjectStore;
