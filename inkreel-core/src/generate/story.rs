//! Story expansion: a one-line premise into a full story structure with
//! characters and locations.

use crate::project::{
    Character, CharacterDescription, CharacterRole, Genre, Location, LocationType, Story,
    StoryBeat, Tone,
};
use serde::Deserialize;
use serde_json::json;

const STORY_SYSTEM: &str = "You are a story architect for serialized visual fiction. \
You expand premises into tightly structured stories with a clear arc, a small \
memorable cast, and concrete visual settings. Respond only with JSON matching \
the provided schema.";

/// Build the expansion prompt from a premise and optional hints.
pub fn build_prompt(
    premise: &str,
    genre_hint: Option<&str>,
    tone_hint: Option<&str>,
    episode_count: u32,
) -> String {
    let mut prompt = format!(
        "Expand the following premise into a complete story structure for a \
serialized webtoon.\n\nPREMISE: {premise}\n"
    );
    if let Some(genre) = genre_hint {
        prompt.push_str(&format!("GENRE: {genre}\n"));
    }
    if let Some(tone) = tone_hint {
        prompt.push_str(&format!("TONE: {tone}\n"));
    }
    prompt.push_str(&format!(
        "\nProduce exactly {episode_count} story beats, one per episode, covering \
a complete arc from hook to resolution. Each beat must advance the story; no \
filler episodes. Introduce every major character and recurring location the \
story needs, each with enough visual detail to draw consistently."
    ));
    prompt
}

/// JSON response schema for story expansion.
pub fn schema() -> serde_json::Value {
    json!({
        "type": "object",
        "required": ["title", "logline", "genre", "tone", "story_beats", "characters", "locations"],
        "properties": {
            "title": {"type": "string"},
            "logline": {"type": "string"},
            "genre": {"type": "string"},
            "tone": {"type": "string"},
            "themes": {"type": "array", "items": {"type": "string"}},
            "target_audience": {"type": "string"},
            "episode_count": {"type": "integer"},
            "synopsis": {"type": "string"},
            "story_beats": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["beat", "description"],
                    "properties": {
                        "beat": {"type": "string"},
                        "description": {"type": "string"}
                    }
                }
            },
            "characters": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["name", "role"],
                    "properties": {
                        "name": {"type": "string"},
                        "role": {"type": "string"},
                        "age": {"type": "string"},
                        "physical": {"type": "string"},
                        "personality": {"type": "string"},
                        "background": {"type": "string"},
                        "motivation": {"type": "string"},
                        "visual_tags": {"type": "array", "items": {"type": "string"}}
                    }
                }
            },
            "locations": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["name", "type"],
                    "properties": {
                        "name": {"type": "string"},
                        "type": {"type": "string"},
                        "description": {"type": "string"},
                        "visual_tags": {"type": "array", "items": {"type": "string"}}
                    }
                }
            }
        }
    })
}

/// System instruction for story expansion.
pub fn system_instruction() -> &'static str {
    STORY_SYSTEM
}

// Wire types: enums arrive as free text and are parsed leniently.

#[derive(Debug, Deserialize)]
pub struct StoryResponse {
    pub title: String,
    pub logline: String,
    pub genre: String,
    pub tone: String,
    #[serde(default)]
    pub themes: Vec<String>,
    #[serde(default)]
    pub target_audience: String,
    #[serde(default)]
    pub episode_count: u32,
    #[serde(default)]
    pub synopsis: String,
    #[serde(default)]
    pub story_beats: Vec<BeatResponse>,
    #[serde(default)]
    pub characters: Vec<CharacterResponse>,
    #[serde(default)]
    pub locations: Vec<LocationResponse>,
}

#[derive(Debug, Deserialize)]
pub struct BeatResponse {
    pub beat: String,
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct CharacterResponse {
    pub name: String,
    pub role: String,
    #[serde(default)]
    pub age: String,
    #[serde(default)]
    pub physical: String,
    #[serde(default)]
    pub personality: String,
    #[serde(default)]
    pub background: String,
    #[serde(default)]
    pub motivation: String,
    #[serde(default)]
    pub visual_tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct LocationResponse {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub visual_tags: Vec<String>,
}

/// Expansion output ready to merge into a project.
#[derive(Debug)]
pub struct Expansion {
    pub story: Story,
    pub characters: Vec<Character>,
    pub locations: Vec<Location>,
}

/// Convert a parsed response into graph entities. The requested episode
/// count wins over whatever the model echoed back.
pub fn convert(response: StoryResponse, requested_episodes: u32) -> Expansion {
    let story = Story {
        title: response.title,
        logline: response.logline,
        genre: Genre::from_loose(&response.genre),
        tone: Tone::from_loose(&response.tone),
        themes: response.themes,
        target_audience: response.target_audience,
        episode_count: requested_episodes,
        synopsis: response.synopsis,
        story_beats: response
            .story_beats
            .into_iter()
            .map(|b| StoryBeat {
                beat: b.beat,
                description: b.description,
            })
            .collect(),
    };

    let characters = response
        .characters
        .into_iter()
        .map(|c| {
            let mut character = Character::new(c.name, CharacterRole::from_loose(&c.role));
            character.age = c.age;
            character.description = CharacterDescription {
                physical: c.physical,
                personality: c.personality,
                background: c.background,
                motivation: c.motivation,
            };
            character.visual_tags = c.visual_tags;
            character
        })
        .collect();

    let locations = response
        .locations
        .into_iter()
        .map(|l| {
            let mut location = Location::new(l.name, LocationType::from_loose(&l.kind));
            location.description = l.description;
            location.visual_tags = l.visual_tags;
            location
        })
        .collect();

    Expansion {
        story,
        characters,
        locations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_includes_hints() {
        let prompt = build_prompt("a barista who reads minds", Some("romance"), None, 12);
        assert!(prompt.contains("PREMISE: a barista who reads minds"));
        assert!(prompt.contains("GENRE: romance"));
        assert!(!prompt.contains("TONE:"));
        assert!(prompt.contains("exactly 12 story beats"));
    }

    #[test]
    fn test_convert_parses_loose_enums() {
        let response: StoryResponse = serde_json::from_value(serde_json::json!({
            "title": "Latte Telepathy",
            "logline": "A barista hears every order before it is spoken.",
            "genre": "Slice of Life",
            "tone": "Heartwarming",
            "story_beats": [
                {"beat": "Hook", "description": "First overheard thought."}
            ],
            "characters": [
                {"name": "June", "role": "main", "physical": "short curly hair"}
            ],
            "locations": [
                {"name": "Corner Cafe", "type": "indoor"}
            ]
        }))
        .expect("parse");

        let expansion = convert(response, 8);
        assert_eq!(expansion.story.genre, Genre::SliceOfLife);
        assert_eq!(expansion.story.tone, Tone::Heartwarming);
        assert_eq!(expansion.story.episode_count, 8);
        assert_eq!(expansion.characters[0].role, CharacterRole::Protagonist);
        assert_eq!(expansion.characters[0].description.physical, "short curly hair");
        assert_eq!(expansion.locations[0].kind, LocationType::Interior);
    }

    #[test]
    fn test_schema_is_object() {
        let schema = schema();
        assert_eq!(schema["type"], "object");
        assert!(schema["properties"]["story_beats"].is_object());
    }
}
