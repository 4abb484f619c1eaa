//! Panel rendering orchestration.
//!
//! Panels render scene by scene, panel by panel. Each panel is an
//! independent unit of work: an existing image is skipped (unless
//! `overwrite`), a backend failure is recorded and the run continues, so
//! one bad panel never costs the rest of the chapter. The graph is saved
//! once at the end of the run with every new image path recorded.

use crate::continuity;
use crate::deps;
use crate::error::ServiceError;
use crate::events::{emit, ProgressEvent, ProgressSender};
use crate::generate::{panel, GenerationBackend};
use crate::project::{unix_now, Panel, Project, Scene};
use crate::store::{AssetSidecar, ProjectStore};
use gemini::ImageRequest;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// A single panel that failed to render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelError {
    pub scene: u32,
    pub panel: u32,
    pub message: String,
}

/// Outcome of a panel run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PanelRunSummary {
    pub generated: usize,
    pub skipped: usize,
    pub errors: Vec<PanelError>,
}

impl PanelRunSummary {
    pub fn failed(&self) -> usize {
        self.errors.len()
    }
}

pub struct PanelService {
    store: ProjectStore,
    backend: Arc<dyn GenerationBackend>,
    progress: Option<ProgressSender>,
}

impl PanelService {
    pub fn new(store: ProjectStore, backend: Arc<dyn GenerationBackend>) -> Self {
        Self {
            store,
            backend,
            progress: None,
        }
    }

    pub fn with_progress(mut self, sender: ProgressSender) -> Self {
        self.progress = Some(sender);
        self
    }

    /// Render the panels of one chapter, or of one scene within it.
    pub async fn generate(
        &self,
        project_slug: &str,
        chapter_number: u32,
        scene_number: Option<u32>,
        overwrite: bool,
    ) -> Result<PanelRunSummary, ServiceError> {
        let mut project = self.load(project_slug).await?;
        let asset_root = self.store.asset_root(project_slug);

        let missing = deps::missing_for_panels(&project, chapter_number, scene_number, &asset_root);
        if !missing.is_empty() {
            return Err(ServiceError::Dependency(missing));
        }

        // The cross-chapter reference only applies to a chapter's opening
        // panel, so scene-scoped runs never attach it.
        let tail = if scene_number.is_none() {
            continuity::previous_chapter_tail(&project, chapter_number, &asset_root)
        } else {
            None
        };

        let mut summary = PanelRunSummary::default();
        let snapshot = project.clone();
        let chapter = project
            .chapter_mut(chapter_number)
            .ok_or_else(|| ServiceError::NotFound(format!("chapter {chapter_number}")))?;

        let mut first_in_run = true;
        for scene in chapter
            .scenes
            .iter_mut()
            .filter(|s| scene_number.map_or(true, |n| s.number == n))
        {
            let scene_id = scene.number;
            let mut previous_image: Option<PathBuf> = None;
            emit(&self.progress, ProgressEvent::SceneStarted { scene: scene_id });

            for index in 0..scene.panels.len() {
                let panel = &scene.panels[index];
                emit(
                    &self.progress,
                    ProgressEvent::PanelStarted {
                        scene: scene_id,
                        panel: panel.number,
                    },
                );

                if !overwrite {
                    if let Some(existing) = panel.image_path.as_deref() {
                        if asset_root.join(existing).exists() {
                            summary.skipped += 1;
                            previous_image = Some(asset_root.join(existing));
                            emit(
                                &self.progress,
                                ProgressEvent::PanelSkipped {
                                    scene: scene_id,
                                    panel: panel.number,
                                },
                            );
                            first_in_run = false;
                            continue;
                        }
                    }
                }

                let request = self.build_request(
                    &snapshot,
                    scene,
                    panel,
                    &asset_root,
                    previous_image.clone(),
                    if first_in_run { tail.clone() } else { None },
                    overwrite,
                );
                first_in_run = false;

                match self.backend.image(request).await {
                    Ok(image) => {
                        let relative = format!(
                            "chapters/ch{chapter_number:03}/s{scene_id:02}_p{:02}.{}",
                            panel.number,
                            extension_for_mime(&image.mime_type)
                        );
                        let sidecar = AssetSidecar {
                            prompt: panel::build_prompt(&snapshot, scene, panel),
                            parameters: serde_json::json!({
                                "chapter": chapter_number,
                                "scene": scene_id,
                                "panel": panel.number,
                                "model": self.backend.image_model(),
                            }),
                            response: image.meta.clone(),
                            created_at: unix_now(),
                        };
                        self.store
                            .save_asset(project_slug, &relative, &image.bytes, &sidecar)
                            .await
                            .map_err(|e| ServiceError::Store(e.to_string()))?;

                        previous_image = Some(asset_root.join(&relative));
                        let panel_number = panel.number;
                        scene.panels[index].image_path = Some(relative.clone());
                        summary.generated += 1;
                        emit(
                            &self.progress,
                            ProgressEvent::PanelGenerated {
                                scene: scene_id,
                                panel: panel_number,
                                path: relative,
                            },
                        );
                    }
                    Err(e) => {
                        warn!(
                            scene = scene_id,
                            panel = panel.number,
                            error = %e,
                            "panel render failed"
                        );
                        summary.errors.push(PanelError {
                            scene: scene_id,
                            panel: panel.number,
                            message: e.to_string(),
                        });
                        emit(
                            &self.progress,
                            ProgressEvent::PanelFailed {
                                scene: scene_id,
                                panel: panel.number,
                                error: e.to_string(),
                            },
                        );
                    }
                }
            }
        }

        project.touch();
        self.save(project_slug, &project).await?;

        info!(
            chapter = chapter_number,
            generated = summary.generated,
            skipped = summary.skipped,
            failed = summary.failed(),
            "panel run finished"
        );
        Ok(summary)
    }

    #[allow(clippy::too_many_arguments)]
    fn build_request(
        &self,
        project: &Project,
        scene: &Scene,
        panel: &Panel,
        asset_root: &std::path::Path,
        previous_panel: Option<PathBuf>,
        chapter_tail: Option<PathBuf>,
        overwrite: bool,
    ) -> ImageRequest {
        let prompt = panel::build_prompt(project, scene, panel);
        let mut request = ImageRequest::new(prompt).with_overwrite_cache(overwrite);

        if let Some(tail) = chapter_tail {
            // A scene that picks up mid-moment treats the previous
            // chapter's final panel as a continuation, not just a style
            // anchor.
            let note = if scene.continues_from_previous_chapter {
                panel::continuation_reference_note()
            } else {
                panel::style_reference_note()
            };
            request = request.with_reference(tail, note);
        }
        if panel.continues_from_previous {
            if let Some(previous) = previous_panel {
                request = request.with_reference(previous, "the immediately preceding panel");
            }
        }

        for placement in &panel.characters {
            if let Some(character) = project.character(placement.character_id) {
                if let Some(reference) = continuity::character_reference(character, asset_root) {
                    request =
                        request.with_reference(reference, format!("appearance of {}", character.name));
                }
            }
        }

        if let Some(location) = scene.location_id.and_then(|id| project.location(id)) {
            // Prefer the variation matching the scene's lighting.
            let variation = location
                .assets
                .variations
                .get(scene.time_of_day.name())
                .map(|p| asset_root.join(p))
                .filter(|p| p.exists());
            let reference =
                variation.or_else(|| continuity::location_reference(location, asset_root));
            if let Some(reference) = reference {
                request = request.with_reference(reference, format!("setting: {}", location.name));
            }
        }

        request
    }

    async fn load(&self, slug: &str) -> Result<Project, ServiceError> {
        self.store
            .load(slug)
            .await
            .map_err(|e| ServiceError::Store(e.to_string()))
    }

    async fn save(&self, slug: &str, project: &Project) -> Result<(), ServiceError> {
        self.store
            .save(slug, project)
            .await
            .map_err(|e| ServiceError::Store(e.to_string()))
    }
}

fn extension_for_mime(mime: &str) -> &'static str {
    match mime {
        "image/jpeg" => "jpg",
        "image/webp" => "webp",
        _ => "png",
    }
}
