//! Story expansion service.

use crate::error::ServiceError;
use crate::generate::{story, GenerationBackend};
use crate::project::{NameMatch, Project, ProjectStatus};
use crate::store::ProjectStore;
use gemini::StructuredRequest;
use std::sync::Arc;
use tracing::info;

/// Sampling temperature for creative structured generation.
pub const STRUCTURED_TEMPERATURE: f32 = 0.8;

pub struct StoryService {
    store: ProjectStore,
    backend: Arc<dyn GenerationBackend>,
}

impl StoryService {
    pub fn new(store: ProjectStore, backend: Arc<dyn GenerationBackend>) -> Self {
        Self { store, backend }
    }

    /// Expand a premise into a story structure with characters and
    /// locations, and merge it into the project.
    ///
    /// The story itself is replaced wholesale. Characters and locations
    /// merge by name so re-expansion never orphans generated assets:
    /// entities whose names already resolve keep their record, new ones
    /// are appended.
    pub async fn expand(
        &self,
        project_slug: &str,
        premise: &str,
        genre_hint: Option<&str>,
        tone_hint: Option<&str>,
        episode_count: u32,
    ) -> Result<Project, ServiceError> {
        if premise.trim().is_empty() {
            return Err(ServiceError::Validation("premise is empty".to_string()));
        }
        if episode_count == 0 {
            return Err(ServiceError::Validation(
                "episode count must be at least 1".to_string(),
            ));
        }

        let mut project = self
            .store
            .load(project_slug)
            .await
            .map_err(|e| ServiceError::Store(e.to_string()))?;

        let prompt = story::build_prompt(premise, genre_hint, tone_hint, episode_count);
        let request = StructuredRequest::new(prompt, story::schema())
            .with_system_instruction(story::system_instruction())
            .with_temperature(STRUCTURED_TEMPERATURE);
        let (value, _meta) = self.backend.structured(request).await?;
        let response: story::StoryResponse = serde_json::from_value(value)
            .map_err(|e| ServiceError::Backend(format!("malformed story response: {e}")))?;

        let expansion = story::convert(response, episode_count);
        info!(
            title = %expansion.story.title,
            beats = expansion.story.story_beats.len(),
            characters = expansion.characters.len(),
            locations = expansion.locations.len(),
            "story expanded"
        );

        project.story = Some(expansion.story);
        for character in expansion.characters {
            if let NameMatch::Unresolved = project.character_by_name(&character.name) {
                project.characters.push(character);
            }
        }
        for location in expansion.locations {
            if let NameMatch::Unresolved = project.location_by_name(&location.name) {
                project.locations.push(location);
            }
        }
        if project.status == ProjectStatus::Draft {
            project.status = ProjectStatus::InProgress;
        }
        project.touch();

        self.store
            .save(project_slug, &project)
            .await
            .map_err(|e| ServiceError::Store(e.to_string()))?;
        Ok(project)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::{Character, CharacterRole, ProjectFormat};
    use crate::testing::MockBackend;

    fn story_json() -> serde_json::Value {
        serde_json::json!({
            "title": "Latte Telepathy",
            "logline": "A barista hears every order before it is spoken.",
            "genre": "slice of life",
            "tone": "heartwarming",
            "story_beats": [
                {"beat": "Hook", "description": "First overheard thought."},
                {"beat": "Resolution", "description": "The gift becomes a bond."}
            ],
            "characters": [
                {"name": "June", "role": "protagonist"},
                {"name": "Theo", "role": "love interest"}
            ],
            "locations": [
                {"name": "Corner Cafe", "type": "interior"}
            ]
        })
    }

    async fn setup() -> (tempfile::TempDir, ProjectStore, String) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ProjectStore::new(dir.path());
        let (slug, _) = store
            .create("Test", ProjectFormat::Webtoon)
            .await
            .expect("create");
        (dir, store, slug)
    }

    #[tokio::test]
    async fn test_expand_populates_project() {
        let (_dir, store, slug) = setup().await;
        let backend = Arc::new(MockBackend::new());
        backend.push_structured(story_json());

        let service = StoryService::new(store.clone(), backend.clone());
        let project = service
            .expand(&slug, "a barista who reads minds", None, None, 2)
            .await
            .expect("expand");
        assert_eq!(
            backend.structured_temperatures(),
            vec![Some(STRUCTURED_TEMPERATURE)]
        );

        let story = project.story.as_ref().expect("story");
        assert_eq!(story.title, "Latte Telepathy");
        assert_eq!(story.episode_count, 2);
        assert_eq!(project.characters.len(), 2);
        assert_eq!(project.characters[1].role, CharacterRole::Deuteragonist);
        assert_eq!(project.locations.len(), 1);
        assert_eq!(project.status, ProjectStatus::InProgress);

        let reloaded = store.load(&slug).await.expect("load");
        assert!(reloaded.story.is_some());
    }

    #[tokio::test]
    async fn test_expand_merges_existing_characters() {
        let (_dir, store, slug) = setup().await;

        let mut project = store.load(&slug).await.expect("load");
        let mut june = Character::new("June", CharacterRole::Protagonist);
        june.assets.portrait = Some("characters/june/portrait.png".to_string());
        let june_id = june.id;
        project.characters.push(june);
        store.save(&slug, &project).await.expect("save");

        let backend = Arc::new(MockBackend::new());
        backend.push_structured(story_json());
        let service = StoryService::new(store, backend);
        let project = service
            .expand(&slug, "a barista who reads minds", None, None, 2)
            .await
            .expect("expand");

        // June kept her id and assets; only Theo was added.
        assert_eq!(project.characters.len(), 2);
        let june = project.character(june_id).expect("june survived");
        assert!(june.assets.portrait.is_some());
    }

    #[tokio::test]
    async fn test_expand_rejects_empty_premise() {
        let (_dir, store, slug) = setup().await;
        let service = StoryService::new(store, Arc::new(MockBackend::new()));
        let err = service
            .expand(&slug, "  ", None, None, 2)
            .await
            .expect_err("empty premise");
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn test_expand_rejects_zero_episodes() {
        let (_dir, store, slug) = setup().await;
        let service = StoryService::new(store, Arc::new(MockBackend::new()));
        let err = service
            .expand(&slug, "premise", None, None, 0)
            .await
            .expect_err("zero episodes");
        assert!(matches!(err, ServiceError::Validation(_)));
    }
}
