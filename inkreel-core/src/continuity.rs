//! Continuity context assembly.
//!
//! Chapter generation is conditioned on two tiers of prior-story context:
//! a one-line headline for every previous chapter, and a richer detail
//! digest for the most recent two. Panel generation additionally reuses
//! the previous chapter's final rendered panel as a visual reference.

use crate::project::{Character, Location, Project};
use std::path::{Path, PathBuf};

/// How many trailing chapters get the detail tier.
const DETAIL_CHAPTERS: usize = 2;
/// Scene descriptions are clipped to this many characters in the digest.
const SCENE_CLIP: usize = 100;
/// Dialogue lines are clipped to this many characters in the digest.
const DIALOGUE_CLIP: usize = 60;
/// Per scene, only the leading panels contribute dialogue to the digest.
const DIGEST_PANELS: usize = 2;

/// Two-tier summary of everything before a chapter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContinuityContext {
    /// One line per previous chapter, oldest first.
    pub headlines: Vec<String>,
    /// Multi-line digests of the most recent chapters, oldest first.
    pub details: Vec<String>,
}

impl ContinuityContext {
    pub fn is_empty(&self) -> bool {
        self.headlines.is_empty()
    }
}

/// Build the continuity context for generating chapter `chapter_number`.
pub fn for_chapter(project: &Project, chapter_number: u32) -> ContinuityContext {
    let mut previous: Vec<_> = project
        .chapters
        .iter()
        .filter(|c| c.number < chapter_number)
        .collect();
    previous.sort_by_key(|c| c.number);

    let headlines = previous
        .iter()
        .map(|c| format!("Chapter {}: {} - {}", c.number, c.title, c.summary))
        .collect();

    let detail_start = previous.len().saturating_sub(DETAIL_CHAPTERS);
    let details = previous[detail_start..]
        .iter()
        .map(|chapter| {
            let mut lines = vec![format!("Chapter {} ({}):", chapter.number, chapter.title)];
            for scene in &chapter.scenes {
                lines.push(format!("- Scene: {}", clip(&scene.description, SCENE_CLIP)));
                for panel in scene.panels.iter().take(DIGEST_PANELS) {
                    if let Some(line) = panel.dialogue.first() {
                        lines.push(format!("  \"{}\"", clip(&line.text, DIALOGUE_CLIP)));
                    }
                }
            }
            lines.join("\n")
        })
        .collect();

    ContinuityContext { headlines, details }
}

/// Render the context as the prompt block consumed by chapter generation.
pub fn render(context: &ContinuityContext) -> String {
    if context.is_empty() {
        return String::new();
    }

    let mut block = String::from("STORY SO FAR (maintain continuity with these events):\n");
    for headline in &context.headlines {
        block.push_str(headline);
        block.push('\n');
    }

    if !context.details.is_empty() {
        block.push_str("\nRECENT CHAPTER DETAILS (pick up directly from here):\n");
        for detail in &context.details {
            block.push_str(detail);
            block.push('\n');
        }
    }

    block
}

/// Clip to at most `max` characters, appending an ellipsis when clipped.
fn clip(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let clipped: String = text.chars().take(max).collect();
        format!("{clipped}...")
    }
}

/// The best visual reference for a character, if any exists on disk.
///
/// The multi-view sheet is preferred over the portrait since it shows the
/// character from several angles.
pub fn character_reference(character: &Character, asset_root: &Path) -> Option<PathBuf> {
    if let Some(sheet) = character.assets.three_view.get("sheet") {
        let path = asset_root.join(sheet);
        if path.exists() {
            return Some(path);
        }
    }
    character
        .assets
        .portrait
        .as_deref()
        .map(|p| asset_root.join(p))
        .filter(|p| p.exists())
}

/// The location's establishing reference, if it exists on disk.
pub fn location_reference(location: &Location, asset_root: &Path) -> Option<PathBuf> {
    location
        .assets
        .reference
        .as_deref()
        .map(|p| asset_root.join(p))
        .filter(|p| p.exists())
}

/// The previous chapter's final rendered panel, used as a style reference
/// when rendering chapter `chapter_number`. Requires the image to be both
/// recorded in the graph and present on disk.
pub fn previous_chapter_tail(
    project: &Project,
    chapter_number: u32,
    asset_root: &Path,
) -> Option<PathBuf> {
    if chapter_number <= 1 {
        return None;
    }
    let previous = project.chapter(chapter_number - 1)?;
    let scene = previous.scenes.last()?;
    let panel = scene.panels.last()?;
    let relative = panel.image_path.as_deref()?;
    let path = asset_root.join(relative);
    path.exists().then_some(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::{
        CameraAngle, Chapter, ChapterId, ChapterStatus, CharacterRole, Dialogue, DialogueKind,
        Panel, PanelComposition, Project, ProjectFormat, Scene, ShotType, TimeOfDay,
    };

    fn panel(number: u32, dialogue: Vec<&str>, image_path: Option<&str>) -> Panel {
        Panel {
            number,
            composition: PanelComposition {
                shot_type: ShotType::Medium,
                angle: CameraAngle::EyeLevel,
            },
            characters: Vec::new(),
            action: String::new(),
            dialogue: dialogue
                .into_iter()
                .map(|text| Dialogue {
                    speaker: None,
                    text: text.to_string(),
                    kind: DialogueKind::Speech,
                })
                .collect(),
            sfx: Vec::new(),
            image_path: image_path.map(|p| p.to_string()),
            continues_from_previous: false,
            continuity_note: String::new(),
        }
    }

    fn chapter(number: u32, title: &str, summary: &str, scenes: Vec<Scene>) -> Chapter {
        Chapter {
            id: ChapterId::new(),
            number,
            title: title.to_string(),
            summary: summary.to_string(),
            status: ChapterStatus::Completed,
            scenes,
        }
    }

    fn scene(number: u32, description: &str, panels: Vec<Panel>) -> Scene {
        Scene {
            number,
            location_id: None,
            time_of_day: TimeOfDay::Day,
            mood: String::new(),
            description: description.to_string(),
            character_ids: Vec::new(),
            panels,
            continues_from_previous_chapter: false,
        }
    }

    #[test]
    fn test_empty_for_first_chapter() {
        let project = Project::new("Test", ProjectFormat::Webtoon);
        let context = for_chapter(&project, 1);
        assert!(context.is_empty());
        assert_eq!(render(&context), "");
    }

    #[test]
    fn test_headlines_cover_all_previous_chapters() {
        let mut project = Project::new("Test", ProjectFormat::Webtoon);
        for n in 1..=4 {
            project.upsert_chapter(chapter(n, &format!("T{n}"), &format!("S{n}"), Vec::new()));
        }

        let context = for_chapter(&project, 4);
        assert_eq!(context.headlines.len(), 3);
        assert_eq!(context.headlines[0], "Chapter 1: T1 - S1");
        assert_eq!(context.headlines[2], "Chapter 3: T3 - S3");
        // Detail tier only covers the two most recent.
        assert_eq!(context.details.len(), 2);
        assert!(context.details[0].starts_with("Chapter 2"));
        assert!(context.details[1].starts_with("Chapter 3"));
    }

    #[test]
    fn test_detail_digest_clips_and_limits_panels() {
        let long_description = "x".repeat(150);
        let long_line = "y".repeat(80);
        let mut project = Project::new("Test", ProjectFormat::Webtoon);
        project.upsert_chapter(chapter(
            1,
            "One",
            "summary",
            vec![scene(
                1,
                &long_description,
                vec![
                    panel(1, vec![&long_line], None),
                    panel(2, vec!["short"], None),
                    panel(3, vec!["never included"], None),
                ],
            )],
        ));

        let context = for_chapter(&project, 2);
        let detail = &context.details[0];
        assert!(detail.contains(&format!("- Scene: {}...", "x".repeat(100))));
        assert!(detail.contains(&format!("\"{}...\"", "y".repeat(60))));
        assert!(detail.contains("\"short\""));
        assert!(!detail.contains("never included"));
    }

    #[test]
    fn test_render_sections() {
        let mut project = Project::new("Test", ProjectFormat::Webtoon);
        project.upsert_chapter(chapter(1, "One", "The beginning", Vec::new()));

        let block = render(&for_chapter(&project, 2));
        assert!(block.starts_with("STORY SO FAR"));
        assert!(block.contains("RECENT CHAPTER DETAILS"));
        assert!(block.contains("Chapter 1: One - The beginning"));
    }

    #[test]
    fn test_character_reference_prefers_sheet() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(dir.path().join("characters/mira")).expect("mkdir");
        std::fs::write(dir.path().join("characters/mira/portrait.png"), b"p").expect("write");
        std::fs::write(dir.path().join("characters/mira/sheet.png"), b"s").expect("write");

        let mut mira = Character::new("Mira", CharacterRole::Protagonist);
        mira.assets.portrait = Some("characters/mira/portrait.png".to_string());
        mira.assets
            .three_view
            .insert("sheet".to_string(), "characters/mira/sheet.png".to_string());

        let reference = character_reference(&mira, dir.path()).expect("reference");
        assert!(reference.ends_with("characters/mira/sheet.png"));

        // Fall back to the portrait when the sheet file is gone.
        std::fs::remove_file(dir.path().join("characters/mira/sheet.png")).expect("rm");
        let reference = character_reference(&mira, dir.path()).expect("reference");
        assert!(reference.ends_with("characters/mira/portrait.png"));
    }

    #[test]
    fn test_character_reference_none_without_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut mira = Character::new("Mira", CharacterRole::Protagonist);
        mira.assets.portrait = Some("characters/mira/portrait.png".to_string());
        assert!(character_reference(&mira, dir.path()).is_none());
    }

    #[test]
    fn test_previous_chapter_tail() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(dir.path().join("chapters/ch001")).expect("mkdir");
        std::fs::write(dir.path().join("chapters/ch001/s01_p02.png"), b"img").expect("write");

        let mut project = Project::new("Test", ProjectFormat::Webtoon);
        project.upsert_chapter(chapter(
            1,
            "One",
            "s",
            vec![scene(
                1,
                "desc",
                vec![
                    panel(1, Vec::new(), None),
                    panel(2, Vec::new(), Some("chapters/ch001/s01_p02.png")),
                ],
            )],
        ));

        assert!(previous_chapter_tail(&project, 1, dir.path()).is_none());
        let tail = previous_chapter_tail(&project, 2, dir.path()).expect("tail");
        assert!(tail.ends_with("chapters/ch001/s01_p02.png"));
    }

    #[test]
    fn test_previous_chapter_tail_requires_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut project = Project::new("Test", ProjectFormat::Webtoon);
        project.upsert_chapter(chapter(
            1,
            "One",
            "s",
            vec![scene(
                1,
                "desc",
                vec![panel(1, Vec::new(), Some("chapters/ch001/s01_p01.png"))],
            )],
        ));
        assert!(previous_chapter_tail(&project, 2, dir.path()).is_none());
    }
}
