//! Character and location asset generation.
//!
//! Every single-asset operation is gated on an existing file: if the
//! graph records the asset and the file is on disk, regeneration requires
//! `overwrite`. The batch operation skips existing assets instead of
//! failing so a partially generated project can always be topped up.

use crate::error::ServiceError;
use crate::events::{emit, ProgressEvent, ProgressSender};
use crate::generate::{character, location, GenerationBackend};
use crate::project::{unix_now, CharacterId, LocationId, TimeOfDay};
use crate::store::{slugify, AssetSidecar, ProjectStore};
use gemini::{GeneratedImage, ImageRequest};
use std::sync::Arc;
use tracing::info;

/// Outcome counts of a batch asset run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssetBatchSummary {
    pub generated: usize,
    pub skipped: usize,
}

pub struct AssetService {
    store: ProjectStore,
    backend: Arc<dyn GenerationBackend>,
    progress: Option<ProgressSender>,
}

impl AssetService {
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

    /// Generate a character's portrait. Fails with `AssetExists` when the
    /// portrait is already on disk and `overwrite` is false.
    pub async fn character_portrait(
        &self,
        project_slug: &str,
        character_id: CharacterId,
        overwrite: bool,
    ) -> Result<String, ServiceError> {
        let mut project = self.load(project_slug).await?;
        let character = project
            .character(character_id)
            .ok_or_else(|| ServiceError::NotFound(format!("character {character_id}")))?;

        if !overwrite {
            if let Some(existing) = character.assets.portrait.as_deref() {
                if self.store.asset_exists(project_slug, existing) {
                    return Err(ServiceError::AssetExists {
                        path: existing.to_string(),
                    });
                }
            }
        }

        let name = character.name.clone();
        let prompt = character::portrait_prompt(character);
        let request = ImageRequest::new(&prompt)
            .with_aspect_ratio(character::PORTRAIT_ASPECT)
            .with_overwrite_cache(overwrite);
        let image = self.backend.image(request).await?;

        let relative = format!(
            "characters/{}/portrait.{}",
            slugify(&name),
            extension_for_mime(&image.mime_type)
        );
        self.persist(project_slug, &relative, &prompt, character::PORTRAIT_ASPECT, &image)
            .await?;

        let character = project
            .character_mut(character_id)
            .ok_or_else(|| ServiceError::NotFound(format!("character {character_id}")))?;
        character.assets.portrait = Some(relative.clone());
        project.touch();
        self.save(project_slug, &project).await?;

        info!(character = %name, path = %relative, "generated portrait");
        emit(
            &self.progress,
            ProgressEvent::AssetGenerated {
                label: format!("portrait of {name}"),
                path: relative.clone(),
            },
        );
        Ok(relative)
    }

    /// Generate a character's front/side/back model sheet, conditioned on
    /// the portrait when one exists.
    pub async fn character_sheet(
        &self,
        project_slug: &str,
        character_id: CharacterId,
        overwrite: bool,
    ) -> Result<String, ServiceError> {
        let mut project = self.load(project_slug).await?;
        let character = project
            .character(character_id)
            .ok_or_else(|| ServiceError::NotFound(format!("character {character_id}")))?;

        if !overwrite {
            if let Some(existing) = character.assets.three_view.get("sheet") {
                if self.store.asset_exists(project_slug, existing) {
                    return Err(ServiceError::AssetExists {
                        path: existing.clone(),
                    });
                }
            }
        }

        let name = character.name.clone();
        let prompt = character::three_view_prompt(character);
        let mut request = ImageRequest::new(&prompt)
            .with_aspect_ratio(character::THREE_VIEW_ASPECT)
            .with_overwrite_cache(overwrite);
        if let Some(portrait) = crate::continuity::character_reference(
            character,
            &self.store.asset_root(project_slug),
        ) {
            request = request.with_reference(portrait, format!("established look of {name}"));
        }
        let image = self.backend.image(request).await?;

        let relative = format!(
            "characters/{}/sheet.{}",
            slugify(&name),
            extension_for_mime(&image.mime_type)
        );
        self.persist(
            project_slug,
            &relative,
            &prompt,
            character::THREE_VIEW_ASPECT,
            &image,
        )
        .await?;

        let character = project
            .character_mut(character_id)
            .ok_or_else(|| ServiceError::NotFound(format!("character {character_id}")))?;
        character
            .assets
            .three_view
            .insert("sheet".to_string(), relative.clone());
        project.touch();
        self.save(project_slug, &project).await?;

        info!(character = %name, path = %relative, "generated model sheet");
        emit(
            &self.progress,
            ProgressEvent::AssetGenerated {
                label: format!("model sheet of {name}"),
                path: relative.clone(),
            },
        );
        Ok(relative)
    }

    /// Generate a location's establishing reference image.
    pub async fn location_reference(
        &self,
        project_slug: &str,
        location_id: LocationId,
        overwrite: bool,
    ) -> Result<String, ServiceError> {
        let mut project = self.load(project_slug).await?;
        let location = project
            .location(location_id)
            .ok_or_else(|| ServiceError::NotFound(format!("location {location_id}")))?;

        if !overwrite {
            if let Some(existing) = location.assets.reference.as_deref() {
                if self.store.asset_exists(project_slug, existing) {
                    return Err(ServiceError::AssetExists {
                        path: existing.to_string(),
                    });
                }
            }
        }

        let name = location.name.clone();
        let prompt = location::reference_prompt(location);
        let request = ImageRequest::new(&prompt)
            .with_aspect_ratio(location::REFERENCE_ASPECT)
            .with_overwrite_cache(overwrite);
        let image = self.backend.image(request).await?;

        let relative = format!(
            "locations/{}/reference.{}",
            slugify(&name),
            extension_for_mime(&image.mime_type)
        );
        self.persist(
            project_slug,
            &relative,
            &prompt,
            location::REFERENCE_ASPECT,
            &image,
        )
        .await?;

        let location = project
            .location_mut(location_id)
            .ok_or_else(|| ServiceError::NotFound(format!("location {location_id}")))?;
        location.assets.reference = Some(relative.clone());
        project.touch();
        self.save(project_slug, &project).await?;

        info!(location = %name, path = %relative, "generated reference");
        emit(
            &self.progress,
            ProgressEvent::AssetGenerated {
                label: format!("reference of {name}"),
                path: relative.clone(),
            },
        );
        Ok(relative)
    }

    /// Generate a time-of-day variation of a location, conditioned on its
    /// reference image.
    pub async fn location_variation(
        &self,
        project_slug: &str,
        location_id: LocationId,
        time: TimeOfDay,
        overwrite: bool,
    ) -> Result<String, ServiceError> {
        let mut project = self.load(project_slug).await?;
        let location = project
            .location(location_id)
            .ok_or_else(|| ServiceError::NotFound(format!("location {location_id}")))?;

        if !overwrite {
            if let Some(existing) = location.assets.variations.get(time.name()) {
                if self.store.asset_exists(project_slug, existing) {
                    return Err(ServiceError::AssetExists {
                        path: existing.clone(),
                    });
                }
            }
        }

        let name = location.name.clone();
        let prompt = location::variation_prompt(location, time);
        let mut request = ImageRequest::new(&prompt)
            .with_aspect_ratio(location::REFERENCE_ASPECT)
            .with_overwrite_cache(overwrite);
        if let Some(reference) = crate::continuity::location_reference(
            location,
            &self.store.asset_root(project_slug),
        ) {
            request = request.with_reference(reference, format!("daytime reference of {name}"));
        }
        let image = self.backend.image(request).await?;

        let relative = format!(
            "locations/{}/{}.{}",
            slugify(&name),
            time.name(),
            extension_for_mime(&image.mime_type)
        );
        self.persist(
            project_slug,
            &relative,
            &prompt,
            location::REFERENCE_ASPECT,
            &image,
        )
        .await?;

        let location = project
            .location_mut(location_id)
            .ok_or_else(|| ServiceError::NotFound(format!("location {location_id}")))?;
        location
            .assets
            .variations
            .insert(time.name().to_string(), relative.clone());
        project.touch();
        self.save(project_slug, &project).await?;

        emit(
            &self.progress,
            ProgressEvent::AssetGenerated {
                label: format!("{} variation of {name}", time.name()),
                path: relative.clone(),
            },
        );
        Ok(relative)
    }

    /// Generate every missing portrait and location reference. Existing
    /// assets are skipped rather than failing.
    pub async fn generate_all(
        &self,
        project_slug: &str,
        overwrite: bool,
    ) -> Result<AssetBatchSummary, ServiceError> {
        let project = self.load(project_slug).await?;
        let mut summary = AssetBatchSummary::default();

        let character_ids: Vec<_> = project.characters.iter().map(|c| c.id).collect();
        for id in character_ids {
            match self.character_portrait(project_slug, id, overwrite).await {
                Ok(_) => summary.generated += 1,
                Err(ServiceError::AssetExists { path }) => {
                    summary.skipped += 1;
                    emit(
                        &self.progress,
                        ProgressEvent::AssetSkipped {
                            label: format!("character {id}"),
                            path,
                        },
                    );
                }
                Err(e) => return Err(e),
            }
        }

        let location_ids: Vec<_> = project.locations.iter().map(|l| l.id).collect();
        for id in location_ids {
            match self.location_reference(project_slug, id, overwrite).await {
                Ok(_) => summary.generated += 1,
                Err(ServiceError::AssetExists { path }) => {
                    summary.skipped += 1;
                    emit(
                        &self.progress,
                        ProgressEvent::AssetSkipped {
                            label: format!("location {id}"),
                            path,
                        },
                    );
                }
                Err(e) => return Err(e),
            }
        }

        Ok(summary)
    }

    async fn load(&self, slug: &str) -> Result<crate::project::Project, ServiceError> {
        self.store
            .load(slug)
            .await
            .map_err(|e| ServiceError::Store(e.to_string()))
    }

    async fn save(
        &self,
        slug: &str,
        project: &crate::project::Project,
    ) -> Result<(), ServiceError> {
        self.store
            .save(slug, project)
            .await
            .map_err(|e| ServiceError::Store(e.to_string()))
    }

    async fn persist(
        &self,
        slug: &str,
        relative: &str,
        prompt: &str,
        aspect_ratio: &str,
        image: &GeneratedImage,
    ) -> Result<(), ServiceError> {
        let sidecar = AssetSidecar {
            prompt: prompt.to_string(),
            parameters: serde_json::json!({
                "aspect_ratio": aspect_ratio,
                "model": self.backend.image_model(),
            }),
            response: image.meta.clone(),
            created_at: unix_now(),
        };
        self.store
            .save_asset(slug, relative, &image.bytes, &sidecar)
            .await
            .map_err(|e| ServiceError::Store(e.to_string()))?;
        Ok(())
    }
}

fn extension_for_mime(mime: &str) -> &'static str {
    match mime {
        "image/jpeg" => "jpg",
        "image/webp" => "webp",
        _ => "png",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::{Character, CharacterRole, Location, LocationType, ProjectFormat};
    use crate::testing::MockBackend;

    async fn setup() -> (tempfile::TempDir, ProjectStore, String, CharacterId, LocationId) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ProjectStore::new(dir.path());
        let (slug, mut project) = store
            .create("Test", ProjectFormat::Webtoon)
            .await
            .expect("create");

        let mira = Character::new("Mira", CharacterRole::Protagonist);
        let mira_id = mira.id;
        project.characters.push(mira);
        let rooftop = Location::new("Rooftop", LocationType::Exterior);
        let rooftop_id = rooftop.id;
        project.locations.push(rooftop);
        store.save(&slug, &project).await.expect("save");

        (dir, store, slug, mira_id, rooftop_id)
    }

    #[tokio::test]
    async fn test_portrait_generates_and_records() {
        let (_dir, store, slug, mira_id, _) = setup().await;
        let backend = Arc::new(MockBackend::new());
        let service = AssetService::new(store.clone(), backend.clone());

        let relative = service
            .character_portrait(&slug, mira_id, false)
            .await
            .expect("generate");
        assert_eq!(relative, "characters/mira/portrait.png");
        assert!(store.asset_exists(&slug, &relative));
        assert!(store.asset_exists(&slug, &format!("{relative}.json")));

        let project = store.load(&slug).await.expect("load");
        assert_eq!(
            project.character(mira_id).unwrap().assets.portrait.as_deref(),
            Some("characters/mira/portrait.png")
        );
        assert_eq!(backend.image_calls(), 1);
    }

    #[tokio::test]
    async fn test_portrait_gate_requires_overwrite() {
        let (_dir, store, slug, mira_id, _) = setup().await;
        let backend = Arc::new(MockBackend::new());
        let service = AssetService::new(store.clone(), backend.clone());

        service
            .character_portrait(&slug, mira_id, false)
            .await
            .expect("generate");
        let err = service
            .character_portrait(&slug, mira_id, false)
            .await
            .expect_err("gated");
        assert!(matches!(err, ServiceError::AssetExists { .. }));
        assert_eq!(backend.image_calls(), 1);

        service
            .character_portrait(&slug, mira_id, true)
            .await
            .expect("overwrite");
        assert_eq!(backend.image_calls(), 2);
    }

    #[tokio::test]
    async fn test_gate_ignores_stale_record() {
        let (_dir, store, slug, mira_id, _) = setup().await;
        let backend = Arc::new(MockBackend::new());
        let service = AssetService::new(store.clone(), backend.clone());

        // Record a portrait path without any file behind it.
        let mut project = store.load(&slug).await.expect("load");
        project.character_mut(mira_id).unwrap().assets.portrait =
            Some("characters/mira/portrait.png".to_string());
        store.save(&slug, &project).await.expect("save");

        service
            .character_portrait(&slug, mira_id, false)
            .await
            .expect("regenerates over stale record");
        assert_eq!(backend.image_calls(), 1);
    }

    #[tokio::test]
    async fn test_unknown_character() {
        let (_dir, store, slug, _, _) = setup().await;
        let service = AssetService::new(store, Arc::new(MockBackend::new()));
        let err = service
            .character_portrait(&slug, CharacterId::new(), false)
            .await
            .expect_err("missing");
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_location_reference_and_variation() {
        let (_dir, store, slug, _, rooftop_id) = setup().await;
        let service = AssetService::new(store.clone(), Arc::new(MockBackend::new()));

        let reference = service
            .location_reference(&slug, rooftop_id, false)
            .await
            .expect("reference");
        assert_eq!(reference, "locations/rooftop/reference.png");

        let night = service
            .location_variation(&slug, rooftop_id, TimeOfDay::Night, false)
            .await
            .expect("variation");
        assert_eq!(night, "locations/rooftop/night.png");

        let project = store.load(&slug).await.expect("load");
        let rooftop = project.location(rooftop_id).unwrap();
        assert_eq!(rooftop.assets.variations.get("night"), Some(&night));
    }

    #[tokio::test]
    async fn test_generate_all_skips_existing() {
        let (_dir, store, slug, mira_id, _) = setup().await;
        let backend = Arc::new(MockBackend::new());
        let service = AssetService::new(store.clone(), backend.clone());

        service
            .character_portrait(&slug, mira_id, false)
            .await
            .expect("portrait");

        let summary = service.generate_all(&slug, false).await.expect("batch");
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.generated, 1); // the location reference

        // Second run is a no-op.
        let summary = service.generate_all(&slug, false).await.expect("batch");
        assert_eq!(summary, AssetBatchSummary {
            generated: 0,
            skipped: 2
        });
    }

    #[test]
    fn test_extension_for_mime() {
        assert_eq!(extension_for_mime("image/png"), "png");
        assert_eq!(extension_for_mime("image/jpeg"), "jpg");
        assert_eq!(extension_for_mime("image/webp"), "webp");
        assert_eq!(extension_for_mime("application/octet-stream"), "png");
    }
}
