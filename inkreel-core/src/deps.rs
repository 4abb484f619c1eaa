//! Dependency validation.
//!
//! Before a generation step runs, these checks report everything that is
//! missing, each with a human-readable resolution hint. A recorded asset
//! path whose file is gone from disk counts as missing.

use crate::project::Project;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

/// What kind of prerequisite is missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyKind {
    PreviousChapter,
    Chapter,
    Scenes,
    Scene,
    Character,
    CharacterAsset,
    Location,
    LocationAsset,
}

/// One missing prerequisite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingDependency {
    pub kind: DependencyKind,
    pub message: String,
    pub resolution: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_name: Option<String>,
}

/// Prerequisites for generating the chapter at `beat_number`.
///
/// Chapters build on one another, so every chapter after the first needs
/// its predecessor to exist. Beat range itself is validated by the
/// chapter service, not here.
pub fn missing_for_chapter(project: &Project, beat_number: u32) -> Vec<MissingDependency> {
    let mut missing = Vec::new();

    if beat_number > 1 && project.chapter(beat_number - 1).is_none() {
        let previous = beat_number - 1;
        missing.push(MissingDependency {
            kind: DependencyKind::PreviousChapter,
            message: format!("Chapter {previous} must be generated first"),
            resolution: format!("Generate chapter {previous} first for story continuity"),
            chapter_number: Some(previous),
            entity_name: None,
        });
    }

    missing
}

/// Prerequisites for rendering panels of `chapter_number`.
///
/// Structural failures (missing chapter, no scenes, missing scene) end
/// the check early since nothing further can be inspected. Otherwise all
/// entity and asset gaps across the selected scenes are collected in one
/// pass, deduplicated per entity.
pub fn missing_for_panels(
    project: &Project,
    chapter_number: u32,
    scene_number: Option<u32>,
    asset_root: &Path,
) -> Vec<MissingDependency> {
    let mut missing = Vec::new();

    let Some(chapter) = project.chapter(chapter_number) else {
        missing.push(MissingDependency {
            kind: DependencyKind::Chapter,
            message: format!("Chapter {chapter_number} does not exist"),
            resolution: format!("Generate chapter {chapter_number} first"),
            chapter_number: Some(chapter_number),
            entity_name: None,
        });
        return missing;
    };

    if chapter.scenes.is_empty() {
        missing.push(MissingDependency {
            kind: DependencyKind::Scenes,
            message: format!("Chapter {chapter_number} has no scenes"),
            resolution: format!("Regenerate chapter {chapter_number} to produce scenes"),
            chapter_number: Some(chapter_number),
            entity_name: None,
        });
        return missing;
    }

    let scenes: Vec<_> = match scene_number {
        Some(number) => match chapter.scenes.iter().find(|s| s.number == number) {
            Some(scene) => vec![scene],
            None => {
                missing.push(MissingDependency {
                    kind: DependencyKind::Scene,
                    message: format!("Scene {number} does not exist in chapter {chapter_number}"),
                    resolution: format!(
                        "Choose a scene between 1 and {}",
                        chapter.scenes.len()
                    ),
                    chapter_number: Some(chapter_number),
                    entity_name: None,
                });
                return missing;
            }
        },
        None => chapter.scenes.iter().collect(),
    };

    if chapter_number > 1 && project.chapter(chapter_number - 1).is_none() {
        let previous = chapter_number - 1;
        missing.push(MissingDependency {
            kind: DependencyKind::PreviousChapter,
            message: format!("Chapter {previous} must be generated first"),
            resolution: format!("Generate chapter {previous} first for story continuity"),
            chapter_number: Some(previous),
            entity_name: None,
        });
    }

    let mut character_ids = BTreeSet::new();
    let mut location_ids = BTreeSet::new();
    for scene in &scenes {
        for panel in &scene.panels {
            for placement in &panel.characters {
                character_ids.insert(placement.character_id);
            }
        }
        if let Some(location_id) = scene.location_id {
            location_ids.insert(location_id);
        }
    }

    for id in character_ids {
        let Some(character) = project.character(id) else {
            missing.push(MissingDependency {
                kind: DependencyKind::Character,
                message: format!("Character {id} referenced by panels does not exist"),
                resolution: "Re-expand the story or fix the chapter's character references"
                    .to_string(),
                chapter_number: Some(chapter_number),
                entity_name: None,
            });
            continue;
        };
        let has_portrait = character
            .assets
            .portrait
            .as_deref()
            .is_some_and(|p| asset_on_disk(asset_root, p));
        if !has_portrait {
            missing.push(MissingDependency {
                kind: DependencyKind::CharacterAsset,
                message: format!("Character {} has no portrait", character.name),
                resolution: format!("Generate a portrait for {} first", character.name),
                chapter_number: Some(chapter_number),
                entity_name: Some(character.name.clone()),
            });
        }
    }

    for id in location_ids {
        let Some(location) = project.location(id) else {
            missing.push(MissingDependency {
                kind: DependencyKind::Location,
                message: format!("Location {id} referenced by scenes does not exist"),
                resolution: "Re-expand the story or fix the chapter's location references"
                    .to_string(),
                chapter_number: Some(chapter_number),
                entity_name: None,
            });
            continue;
        };
        let has_reference = location
            .assets
            .reference
            .as_deref()
            .is_some_and(|p| asset_on_disk(asset_root, p));
        if !has_reference {
            missing.push(MissingDependency {
                kind: DependencyKind::LocationAsset,
                message: format!("Location {} has no reference image", location.name),
                resolution: format!("Generate a reference image for {} first", location.name),
                chapter_number: Some(chapter_number),
                entity_name: Some(location.name.clone()),
            });
        }
    }

    missing
}

/// True when a recorded relative asset path is present on disk.
pub fn asset_on_disk(asset_root: &Path, relative: &str) -> bool {
    asset_root.join(relative).exists()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::{
        CameraAngle, Chapter, ChapterId, ChapterStatus, Character, CharacterRole, Location,
        LocationType, Panel, PanelCharacter, PanelComposition, Project, ProjectFormat, Scene,
        ShotType, TimeOfDay,
    };

    fn chapter(number: u32, scenes: Vec<Scene>) -> Chapter {
        Chapter {
            id: ChapterId::new(),
            number,
            title: format!("Chapter {number}"),
            summary: String::new(),
            status: ChapterStatus::Completed,
            scenes,
        }
    }

    fn scene_with_panel(number: u32, characters: Vec<PanelCharacter>) -> Scene {
        Scene {
            number,
            location_id: None,
            time_of_day: TimeOfDay::Day,
            mood: String::new(),
            description: String::new(),
            character_ids: Vec::new(),
            panels: vec![Panel {
                number: 1,
                composition: PanelComposition {
                    shot_type: ShotType::Medium,
                    angle: CameraAngle::EyeLevel,
                },
                characters,
                action: String::new(),
                dialogue: Vec::new(),
                sfx: Vec::new(),
                image_path: None,
                continues_from_previous: false,
                continuity_note: String::new(),
            }],
            continues_from_previous_chapter: false,
        }
    }

    #[test]
    fn test_first_chapter_has_no_dependencies() {
        let project = Project::new("Test", ProjectFormat::Webtoon);
        assert!(missing_for_chapter(&project, 1).is_empty());
    }

    #[test]
    fn test_chapter_requires_predecessor() {
        let project = Project::new("Test", ProjectFormat::Webtoon);
        let missing = missing_for_chapter(&project, 3);
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].kind, DependencyKind::PreviousChapter);
        assert_eq!(missing[0].chapter_number, Some(2));
        assert_eq!(missing[0].message, "Chapter 2 must be generated first");
    }

    #[test]
    fn test_chapter_dependency_satisfied() {
        let mut project = Project::new("Test", ProjectFormat::Webtoon);
        project.upsert_chapter(chapter(1, Vec::new()));
        assert!(missing_for_chapter(&project, 2).is_empty());
    }

    #[test]
    fn test_panels_missing_chapter_short_circuits() {
        let project = Project::new("Test", ProjectFormat::Webtoon);
        let missing = missing_for_panels(&project, 1, None, Path::new("/nonexistent"));
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].kind, DependencyKind::Chapter);
    }

    #[test]
    fn test_panels_empty_scenes_short_circuits() {
        let mut project = Project::new("Test", ProjectFormat::Webtoon);
        project.upsert_chapter(chapter(1, Vec::new()));
        let missing = missing_for_panels(&project, 1, None, Path::new("/nonexistent"));
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].kind, DependencyKind::Scenes);
    }

    #[test]
    fn test_panels_missing_scene_short_circuits() {
        let mut project = Project::new("Test", ProjectFormat::Webtoon);
        project.upsert_chapter(chapter(1, vec![scene_with_panel(1, Vec::new())]));
        let missing = missing_for_panels(&project, 1, Some(7), Path::new("/nonexistent"));
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].kind, DependencyKind::Scene);
    }

    #[test]
    fn test_panels_collect_asset_gaps() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut project = Project::new("Test", ProjectFormat::Webtoon);

        // Portrait recorded but never written to disk.
        let mut mira = Character::new("Mira", CharacterRole::Protagonist);
        mira.assets.portrait = Some("characters/mira/portrait.png".to_string());
        let mira_id = mira.id;
        project.characters.push(mira);

        let location = Location::new("Rooftop", LocationType::Exterior);
        let location_id = location.id;
        project.locations.push(location);

        let mut scene = scene_with_panel(
            1,
            vec![PanelCharacter {
                character_id: mira_id,
                expression: "calm".to_string(),
                position: "center".to_string(),
            }],
        );
        scene.location_id = Some(location_id);
        project.upsert_chapter(chapter(1, vec![scene]));

        let missing = missing_for_panels(&project, 1, None, dir.path());
        let kinds: Vec<_> = missing.iter().map(|m| m.kind).collect();
        assert!(kinds.contains(&DependencyKind::CharacterAsset));
        assert!(kinds.contains(&DependencyKind::LocationAsset));
        assert_eq!(missing.len(), 2);
    }

    #[test]
    fn test_panels_dedup_entity_gaps_across_scenes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut project = Project::new("Test", ProjectFormat::Webtoon);
        let mira = Character::new("Mira", CharacterRole::Protagonist);
        let mira_id = mira.id;
        project.characters.push(mira);

        let placement = || PanelCharacter {
            character_id: mira_id,
            expression: "calm".to_string(),
            position: "center".to_string(),
        };
        let mut first = scene_with_panel(1, vec![placement()]);
        first.panels.push(Panel {
            number: 2,
            ..first.panels[0].clone()
        });
        first.panels.push(Panel {
            number: 3,
            ..first.panels[0].clone()
        });
        let second = scene_with_panel(2, vec![placement(), placement()]);
        project.upsert_chapter(chapter(1, vec![first, second]));

        // Five placements of the same unportraited character report once.
        let missing = missing_for_panels(&project, 1, None, dir.path());
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].kind, DependencyKind::CharacterAsset);
        assert_eq!(missing[0].entity_name.as_deref(), Some("Mira"));
    }

    #[test]
    fn test_panels_satisfied_when_assets_exist() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(dir.path().join("characters/mira")).expect("mkdir");
        std::fs::write(dir.path().join("characters/mira/portrait.png"), b"png").expect("write");

        let mut project = Project::new("Test", ProjectFormat::Webtoon);
        let mut mira = Character::new("Mira", CharacterRole::Protagonist);
        mira.assets.portrait = Some("characters/mira/portrait.png".to_string());
        let mira_id = mira.id;
        project.characters.push(mira);

        project.upsert_chapter(chapter(
            1,
            vec![scene_with_panel(
                1,
                vec![PanelCharacter {
                    character_id: mira_id,
                    expression: "calm".to_string(),
                    position: "center".to_string(),
                }],
            )],
        ));

        assert!(missing_for_panels(&project, 1, None, dir.path()).is_empty());
    }

    #[test]
    fn test_panels_require_previous_chapter() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut project = Project::new("Test", ProjectFormat::Webtoon);
        project.upsert_chapter(chapter(2, vec![scene_with_panel(1, Vec::new())]));

        let missing = missing_for_panels(&project, 2, None, dir.path());
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].kind, DependencyKind::PreviousChapter);
        assert_eq!(missing[0].chapter_number, Some(1));
    }
}
