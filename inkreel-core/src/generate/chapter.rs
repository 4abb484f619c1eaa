//! Chapter generation: one story beat into a scene-and-panel breakdown.
//!
//! The model references characters and locations by name. Conversion
//! resolves those names against the project graph; anything ambiguous or
//! unknown is reported to the caller instead of silently guessed.

use crate::continuity;
use crate::project::{
    CameraAngle, Chapter, ChapterId, ChapterStatus, Dialogue, DialogueKind, NameMatch, Panel,
    PanelCharacter, PanelComposition, Project, Scene, ShotType, TimeOfDay,
};
use serde::Deserialize;
use serde_json::json;

const CHAPTER_SYSTEM: &str = "You are a webtoon episode writer. You break a story \
beat into scenes and panels with concrete visual direction: shot types, camera \
angles, character expressions, and sparse purposeful dialogue. Respond only with \
JSON matching the provided schema.";

/// Build the full generation prompt for the chapter at `beat_number`.
///
/// Returns `None` when the project has no story or the beat is out of
/// range; the service layer turns that into a validation error.
pub fn build_prompt(project: &Project, beat_number: u32) -> Option<String> {
    let story = project.story.as_ref()?;
    let beat = story.story_beats.get(beat_number as usize - 1)?;

    let mut prompt = format!(
        "Write chapter {beat_number} of \"{}\", a {} webtoon.\n\nLOGLINE: {}\n",
        story.title,
        story.genre.name(),
        story.logline
    );
    if !story.synopsis.is_empty() {
        prompt.push_str(&format!("SYNOPSIS: {}\n", story.synopsis));
    }

    let context = continuity::for_chapter(project, beat_number);
    let context_block = continuity::render(&context);
    if !context_block.is_empty() {
        prompt.push('\n');
        prompt.push_str(&context_block);
    }

    prompt.push_str(&format!(
        "\nTHIS CHAPTER covers story beat {beat_number} ({}): {}\n",
        beat.beat, beat.description
    ));

    if !project.characters.is_empty() {
        prompt.push_str("\nCAST (reference characters by these exact names):\n");
        for character in &project.characters {
            prompt.push_str(&format!(
                "- {} ({}): {}\n",
                character.name,
                character.role.name(),
                character.description.personality
            ));
        }
    }

    if !project.locations.is_empty() {
        prompt.push_str("\nLOCATIONS (reference locations by these exact names):\n");
        for location in &project.locations {
            prompt.push_str(&format!(
                "- {} ({}): {}\n",
                location.name,
                location.kind.name(),
                location.description
            ));
        }
    }

    prompt.push_str(
        "\nBreak the chapter into 3-5 scenes of 4-8 panels each. If the chapter \
picks up the previous chapter's final moment, mark scene 1 with \
continues_from_previous_chapter. Every panel needs a shot type, camera angle, \
and an action line describing what is visible in the frame.",
    );

    Some(prompt)
}

/// System instruction for chapter generation.
pub fn system_instruction() -> &'static str {
    CHAPTER_SYSTEM
}

/// JSON response schema for chapter generation.
pub fn schema() -> serde_json::Value {
    json!({
        "type": "object",
        "required": ["title", "summary", "scenes"],
        "properties": {
            "title": {"type": "string"},
            "summary": {"type": "string"},
            "scenes": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["number", "description", "panels"],
                    "properties": {
                        "number": {"type": "integer"},
                        "location": {"type": "string"},
                        "time_of_day": {"type": "string"},
                        "mood": {"type": "string"},
                        "description": {"type": "string"},
                        "continues_from_previous_chapter": {"type": "boolean"},
                        "panels": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "required": ["number", "shot_type", "camera_angle", "action"],
                                "properties": {
                                    "number": {"type": "integer"},
                                    "shot_type": {"type": "string"},
                                    "camera_angle": {"type": "string"},
                                    "action": {"type": "string"},
                                    "continues_from_previous": {"type": "boolean"},
                                    "continuity_note": {"type": "string"},
                                    "characters": {
                                        "type": "array",
                                        "items": {
                                            "type": "object",
                                            "required": ["name"],
                                            "properties": {
                                                "name": {"type": "string"},
                                                "expression": {"type": "string"},
                                                "position": {"type": "string"}
                                            }
                                        }
                                    },
                                    "dialogue": {
                                        "type": "array",
                                        "items": {
                                            "type": "object",
                                            "required": ["text"],
                                            "properties": {
                                                "speaker": {"type": "string"},
                                                "text": {"type": "string"},
                                                "type": {"type": "string"}
                                            }
                                        }
                                    },
                                    "sfx": {"type": "array", "items": {"type": "string"}}
                                }
                            }
                        }
                    }
                }
            }
        }
    })
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ChapterResponse {
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub scenes: Vec<SceneResponse>,
}

#[derive(Debug, Deserialize)]
pub struct SceneResponse {
    pub number: u32,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub time_of_day: String,
    #[serde(default)]
    pub mood: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub continues_from_previous_chapter: bool,
    #[serde(default)]
    pub panels: Vec<PanelResponse>,
}

#[derive(Debug, Deserialize)]
pub struct PanelResponse {
    pub number: u32,
    #[serde(default)]
    pub shot_type: String,
    #[serde(default)]
    pub camera_angle: String,
    #[serde(default)]
    pub characters: Vec<PanelCharacterResponse>,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub dialogue: Vec<DialogueResponse>,
    #[serde(default)]
    pub sfx: Vec<String>,
    #[serde(default)]
    pub continues_from_previous: bool,
    #[serde(default)]
    pub continuity_note: String,
}

#[derive(Debug, Deserialize)]
pub struct PanelCharacterResponse {
    pub name: String,
    #[serde(default)]
    pub expression: String,
    #[serde(default)]
    pub position: String,
}

#[derive(Debug, Deserialize)]
pub struct DialogueResponse {
    #[serde(default)]
    pub speaker: String,
    pub text: String,
    #[serde(default, rename = "type")]
    pub kind: String,
}

// ============================================================================
// Conversion
// ============================================================================

/// A name in the model's output that could not be resolved to exactly
/// one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionIssue {
    /// Where the name appeared, e.g. "scene 2 location".
    pub context: String,
    pub name: String,
    /// Candidate entity names when the match was ambiguous; empty when
    /// nothing matched at all.
    pub candidates: Vec<String>,
}

/// Output of converting a chapter response.
#[derive(Debug)]
pub struct ConvertedChapter {
    pub chapter: Chapter,
    /// Names that were dropped rather than guessed at.
    pub issues: Vec<ResolutionIssue>,
}

/// Convert a parsed response into a chapter.
///
/// Duplicate scene numbers keep the variant with the most panels; scenes
/// come out sorted by number. Character and location names that resolve
/// ambiguously or not at all are reported and left unset.
pub fn convert(response: ChapterResponse, project: &Project, chapter_number: u32) -> ConvertedChapter {
    let mut issues = Vec::new();

    let mut scenes: Vec<Scene> = Vec::new();
    for scene_response in response.scenes {
        let scene = convert_scene(scene_response, project, &mut issues);
        match scenes.iter_mut().find(|s| s.number == scene.number) {
            Some(existing) => {
                if scene.panels.len() > existing.panels.len() {
                    *existing = scene;
                }
            }
            None => scenes.push(scene),
        }
    }
    scenes.sort_by_key(|s| s.number);

    ConvertedChapter {
        chapter: Chapter {
            id: ChapterId::new(),
            number: chapter_number,
            title: response.title,
            summary: response.summary,
            status: ChapterStatus::Completed,
            scenes,
        },
        issues,
    }
}

fn convert_scene(
    response: SceneResponse,
    project: &Project,
    issues: &mut Vec<ResolutionIssue>,
) -> Scene {
    let scene_number = response.number;

    let location_id = if response.location.is_empty() {
        None
    } else {
        match project.location_by_name(&response.location) {
            NameMatch::Resolved(id) => Some(id),
            NameMatch::Ambiguous(ids) => {
                issues.push(ResolutionIssue {
                    context: format!("scene {scene_number} location"),
                    name: response.location.clone(),
                    candidates: ids
                        .iter()
                        .filter_map(|id| project.location(*id))
                        .map(|l| l.name.clone())
                        .collect(),
                });
                None
            }
            NameMatch::Unresolved => {
                issues.push(ResolutionIssue {
                    context: format!("scene {scene_number} location"),
                    name: response.location.clone(),
                    candidates: Vec::new(),
                });
                None
            }
        }
    };

    let panels: Vec<Panel> = response
        .panels
        .into_iter()
        .map(|p| convert_panel(p, scene_number, project, issues))
        .collect();

    let mut character_ids: Vec<_> = panels
        .iter()
        .flat_map(|p| p.characters.iter().map(|c| c.character_id))
        .collect();
    character_ids.sort();
    character_ids.dedup();

    Scene {
        number: scene_number,
        location_id,
        time_of_day: TimeOfDay::from_loose(&response.time_of_day),
        mood: response.mood,
        description: response.description,
        character_ids,
        panels,
        continues_from_previous_chapter: response.continues_from_previous_chapter,
    }
}

fn convert_panel(
    response: PanelResponse,
    scene_number: u32,
    project: &Project,
    issues: &mut Vec<ResolutionIssue>,
) -> Panel {
    let panel_number = response.number;

    let mut characters = Vec::new();
    for placement in response.characters {
        match project.character_by_name(&placement.name) {
            NameMatch::Resolved(id) => characters.push(PanelCharacter {
                character_id: id,
                expression: placement.expression,
                position: placement.position,
            }),
            NameMatch::Ambiguous(ids) => issues.push(ResolutionIssue {
                context: format!("scene {scene_number} panel {panel_number} character"),
                name: placement.name,
                candidates: ids
                    .iter()
                    .filter_map(|id| project.character(*id))
                    .map(|c| c.name.clone())
                    .collect(),
            }),
            NameMatch::Unresolved => issues.push(ResolutionIssue {
                context: format!("scene {scene_number} panel {panel_number} character"),
                name: placement.name,
                candidates: Vec::new(),
            }),
        }
    }

    let dialogue = response
        .dialogue
        .into_iter()
        .map(|line| Dialogue {
            // A speaker that does not resolve cleanly becomes anonymous
            // rather than an issue; balloons still render.
            speaker: if line.speaker.is_empty() {
                None
            } else {
                project.character_by_name(&line.speaker).resolved()
            },
            text: line.text,
            kind: DialogueKind::from_loose(&line.kind),
        })
        .collect();

    Panel {
        number: panel_number,
        composition: PanelComposition {
            shot_type: ShotType::from_loose(&response.shot_type),
            angle: CameraAngle::from_loose(&response.camera_angle),
        },
        characters,
        action: response.action,
        dialogue,
        sfx: response.sfx,
        image_path: None,
        continues_from_previous: response.continues_from_previous,
        continuity_note: response.continuity_note,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::{
        Character, CharacterRole, Genre, Location, LocationType, ProjectFormat, Story, StoryBeat,
        Tone,
    };

    fn project_with_story() -> Project {
        let mut project = Project::new("Test", ProjectFormat::Webtoon);
        project.story = Some(Story {
            title: "Latte Telepathy".to_string(),
            logline: "A barista hears every order before it is spoken.".to_string(),
            genre: Genre::SliceOfLife,
            tone: Tone::Heartwarming,
            themes: Vec::new(),
            target_audience: String::new(),
            episode_count: 2,
            synopsis: String::new(),
            story_beats: vec![
                StoryBeat {
                    beat: "Hook".to_string(),
                    description: "First overheard thought.".to_string(),
                },
                StoryBeat {
                    beat: "Fallout".to_string(),
                    description: "The secret slips out.".to_string(),
                },
            ],
        });
        project
            .characters
            .push(Character::new("June", CharacterRole::Protagonist));
        project
            .locations
            .push(Location::new("Corner Cafe", LocationType::Interior));
        project
    }

    fn scene_json(number: u32, panel_count: usize) -> serde_json::Value {
        let panels: Vec<_> = (1..=panel_count)
            .map(|n| {
                serde_json::json!({
                    "number": n,
                    "shot_type": "medium",
                    "camera_angle": "eye level",
                    "action": "June pours a latte."
                })
            })
            .collect();
        serde_json::json!({
            "number": number,
            "location": "Corner Cafe",
            "time_of_day": "morning",
            "description": "Opening rush.",
            "panels": panels
        })
    }

    #[test]
    fn test_build_prompt_requires_story_and_beat() {
        let empty = Project::new("Test", ProjectFormat::Webtoon);
        assert!(build_prompt(&empty, 1).is_none());

        let project = project_with_story();
        assert!(build_prompt(&project, 1).is_some());
        assert!(build_prompt(&project, 3).is_none());
    }

    #[test]
    fn test_build_prompt_contents() {
        let project = project_with_story();
        let prompt = build_prompt(&project, 1).expect("prompt");
        assert!(prompt.contains("Latte Telepathy"));
        assert!(prompt.contains("story beat 1 (Hook)"));
        assert!(prompt.contains("- June (protagonist)"));
        assert!(prompt.contains("- Corner Cafe (interior)"));
        // No previous chapters yet, so no continuity block.
        assert!(!prompt.contains("STORY SO FAR"));
    }

    #[test]
    fn test_build_prompt_includes_continuity() {
        let mut project = project_with_story();
        let converted = convert(
            serde_json::from_value::<ChapterResponse>(serde_json::json!({
                "title": "The First Thought",
                "summary": "June hears a customer's mind.",
                "scenes": [scene_json(1, 2)]
            }))
            .expect("parse"),
            &project,
            1,
        );
        project.upsert_chapter(converted.chapter);

        let prompt = build_prompt(&project, 2).expect("prompt");
        assert!(prompt.contains("STORY SO FAR"));
        assert!(prompt.contains("Chapter 1: The First Thought"));
    }

    #[test]
    fn test_convert_resolves_names() {
        let project = project_with_story();
        let response: ChapterResponse = serde_json::from_value(serde_json::json!({
            "title": "T",
            "summary": "S",
            "scenes": [{
                "number": 1,
                "location": "corner cafe",
                "time_of_day": "night",
                "description": "d",
                "panels": [{
                    "number": 1,
                    "shot_type": "close-up",
                    "camera_angle": "low",
                    "action": "a",
                    "characters": [{"name": "june", "expression": "surprised", "position": "left"}],
                    "dialogue": [{"speaker": "June", "text": "Oh no.", "type": "thought"}]
                }]
            }]
        }))
        .expect("parse");

        let converted = convert(response, &project, 1);
        assert!(converted.issues.is_empty());

        let scene = &converted.chapter.scenes[0];
        assert_eq!(scene.location_id, Some(project.locations[0].id));
        assert_eq!(scene.time_of_day, TimeOfDay::Night);
        assert_eq!(scene.character_ids, vec![project.characters[0].id]);

        let panel = &scene.panels[0];
        assert_eq!(panel.composition.shot_type, ShotType::CloseUp);
        assert_eq!(panel.composition.angle, CameraAngle::Low);
        assert_eq!(panel.characters[0].character_id, project.characters[0].id);
        assert_eq!(panel.dialogue[0].speaker, Some(project.characters[0].id));
        assert_eq!(panel.dialogue[0].kind, DialogueKind::Thought);
    }

    #[test]
    fn test_convert_reports_unresolved_and_ambiguous() {
        let mut project = project_with_story();
        project
            .characters
            .push(Character::new("Junia", CharacterRole::Supporting));

        let response: ChapterResponse = serde_json::from_value(serde_json::json!({
            "title": "T",
            "summary": "S",
            "scenes": [{
                "number": 1,
                "location": "The Moon",
                "description": "d",
                "panels": [{
                    "number": 1,
                    "shot_type": "wide",
                    "camera_angle": "high",
                    "action": "a",
                    "characters": [
                        {"name": "Jun"},
                        {"name": "Nobody"}
                    ]
                }]
            }]
        }))
        .expect("parse");

        let converted = convert(response, &project, 1);
        // Ambiguous "Jun", unresolved "Nobody", unresolved "The Moon".
        assert_eq!(converted.issues.len(), 3);
        assert!(converted.chapter.scenes[0].panels[0].characters.is_empty());
        assert!(converted.chapter.scenes[0].location_id.is_none());

        let ambiguous = converted
            .issues
            .iter()
            .find(|i| i.name == "Jun")
            .expect("issue");
        assert_eq!(ambiguous.candidates.len(), 2);
    }

    #[test]
    fn test_convert_dedupes_scenes_keeping_most_panels() {
        let project = project_with_story();
        let response: ChapterResponse = serde_json::from_value(serde_json::json!({
            "title": "T",
            "summary": "S",
            "scenes": [scene_json(2, 1), scene_json(1, 3), scene_json(2, 4)]
        }))
        .expect("parse");

        let converted = convert(response, &project, 1);
        let numbers: Vec<u32> = converted.chapter.scenes.iter().map(|s| s.number).collect();
        assert_eq!(numbers, vec![1, 2]);
        assert_eq!(converted.chapter.scenes[1].panels.len(), 4);
    }
}
