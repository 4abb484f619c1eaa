//! Project entity graph.
//!
//! Contains all types for representing a production project: the story
//! outline, characters, locations, and the chapter → scene → panel tree,
//! along with the asset records attached to each entity.
//!
//! The graph is loaded as an immutable snapshot per operation, transformed,
//! and re-persisted (see `store`); nothing in this module touches disk.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

// ============================================================================
// ID Types
// ============================================================================

/// Unique identifier for characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CharacterId(pub Uuid);

impl CharacterId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CharacterId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CharacterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for locations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocationId(pub Uuid);

impl LocationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for LocationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for chapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChapterId(pub Uuid);

impl ChapterId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ChapterId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ChapterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Story
// ============================================================================

/// Target output format for a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectFormat {
    Webtoon,
    ShortDrama,
}

/// Overall project lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Draft,
    InProgress,
    Completed,
}

/// Story genre. Parsed leniently from model output; unknown values fall
/// back to `Drama`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Genre {
    Romance,
    Action,
    Fantasy,
    Thriller,
    Comedy,
    Drama,
    Horror,
    SliceOfLife,
    Mystery,
    SciFi,
}

impl Genre {
    pub fn from_loose(value: &str) -> Self {
        match normalize(value).as_str() {
            "romance" => Genre::Romance,
            "action" => Genre::Action,
            "fantasy" => Genre::Fantasy,
            "thriller" => Genre::Thriller,
            "comedy" => Genre::Comedy,
            "horror" => Genre::Horror,
            "slice_of_life" => Genre::SliceOfLife,
            "mystery" => Genre::Mystery,
            "sci_fi" | "scifi" | "science_fiction" => Genre::SciFi,
            _ => Genre::Drama,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Genre::Romance => "romance",
            Genre::Action => "action",
            Genre::Fantasy => "fantasy",
            Genre::Thriller => "thriller",
            Genre::Comedy => "comedy",
            Genre::Drama => "drama",
            Genre::Horror => "horror",
            Genre::SliceOfLife => "slice of life",
            Genre::Mystery => "mystery",
            Genre::SciFi => "sci-fi",
        }
    }
}

/// Story tone. Unknown values fall back to `Dramatic`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    Comedic,
    Dramatic,
    Dark,
    Lighthearted,
    Suspenseful,
    Heartwarming,
}

impl Tone {
    pub fn from_loose(value: &str) -> Self {
        match normalize(value).as_str() {
            "comedic" => Tone::Comedic,
            "dark" => Tone::Dark,
            "lighthearted" => Tone::Lighthearted,
            "suspenseful" => Tone::Suspenseful,
            "heartwarming" => Tone::Heartwarming,
            _ => Tone::Dramatic,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Tone::Comedic => "comedic",
            Tone::Dramatic => "dramatic",
            Tone::Dark => "dark",
            Tone::Lighthearted => "lighthearted",
            Tone::Suspenseful => "suspenseful",
            Tone::Heartwarming => "heartwarming",
        }
    }
}

fn normalize(value: &str) -> String {
    value.trim().to_lowercase().replace([' ', '-'], "_")
}

/// One structural unit of the story outline, mapping 1:1 to a chapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoryBeat {
    /// Short beat label, e.g. "Inciting incident".
    pub beat: String,
    /// What happens in this beat.
    pub description: String,
}

/// The expanded story structure. Replaced wholesale on re-expansion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Story {
    pub title: String,
    pub logline: String,
    pub genre: Genre,
    pub tone: Tone,
    pub themes: Vec<String>,
    #[serde(default)]
    pub target_audience: String,
    #[serde(default)]
    pub episode_count: u32,
    #[serde(default)]
    pub synopsis: String,
    pub story_beats: Vec<StoryBeat>,
}

// ============================================================================
// Characters
// ============================================================================

/// Narrative role of a character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CharacterRole {
    Protagonist,
    Deuteragonist,
    Supporting,
    Antagonist,
    Minor,
}

impl CharacterRole {
    pub fn from_loose(value: &str) -> Self {
        match normalize(value).as_str() {
            "protagonist" | "main" | "lead" => CharacterRole::Protagonist,
            "deuteragonist" | "love_interest" => CharacterRole::Deuteragonist,
            "antagonist" | "villain" => CharacterRole::Antagonist,
            "minor" => CharacterRole::Minor,
            _ => CharacterRole::Supporting,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CharacterRole::Protagonist => "protagonist",
            CharacterRole::Deuteragonist => "deuteragonist",
            CharacterRole::Supporting => "supporting",
            CharacterRole::Antagonist => "antagonist",
            CharacterRole::Minor => "minor",
        }
    }
}

/// Free-text description fields for a character.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CharacterDescription {
    #[serde(default)]
    pub physical: String,
    #[serde(default)]
    pub personality: String,
    #[serde(default)]
    pub background: String,
    #[serde(default)]
    pub motivation: String,
}

/// Asset record for a character.
///
/// Paths are relative to the project asset root. A recorded path whose
/// file is missing on disk counts as absent (see `deps`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CharacterAssets {
    /// Portrait image, the baseline visual reference.
    #[serde(default)]
    pub portrait: Option<String>,
    /// Multi-view sheet images by view name ("sheet", "front", "side", "back").
    #[serde(default)]
    pub three_view: BTreeMap<String, String>,
    /// User-supplied reference input, if any.
    #[serde(default)]
    pub reference_input: Option<String>,
}

/// A character in the project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Character {
    #[serde(default)]
    pub id: CharacterId,
    pub name: String,
    pub role: CharacterRole,
    #[serde(default)]
    pub age: String,
    #[serde(default)]
    pub description: CharacterDescription,
    #[serde(default)]
    pub visual_tags: Vec<String>,
    #[serde(default)]
    pub assets: CharacterAssets,
}

impl Character {
    pub fn new(name: impl Into<String>, role: CharacterRole) -> Self {
        Self {
            id: CharacterId::new(),
            name: name.into(),
            role,
            age: String::new(),
            description: CharacterDescription::default(),
            visual_tags: Vec::new(),
            assets: CharacterAssets::default(),
        }
    }
}

// ============================================================================
// Locations
// ============================================================================

/// Kind of location. Unknown values fall back to `Interior`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationType {
    Interior,
    Exterior,
    Mixed,
}

impl LocationType {
    pub fn from_loose(value: &str) -> Self {
        match normalize(value).as_str() {
            "exterior" | "outdoor" => LocationType::Exterior,
            "mixed" => LocationType::Mixed,
            _ => LocationType::Interior,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            LocationType::Interior => "interior",
            LocationType::Exterior => "exterior",
            LocationType::Mixed => "mixed",
        }
    }
}

/// Asset record for a location.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocationAssets {
    /// Establishing reference image.
    #[serde(default)]
    pub reference: Option<String>,
    /// Variations by time of day ("morning", "day", "evening", "night").
    #[serde(default)]
    pub variations: BTreeMap<String, String>,
}

/// A location in the project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    #[serde(default)]
    pub id: LocationId,
    pub name: String,
    pub kind: LocationType,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub visual_tags: Vec<String>,
    #[serde(default)]
    pub assets: LocationAssets,
}

impl Location {
    pub fn new(name: impl Into<String>, kind: LocationType) -> Self {
        Self {
            id: LocationId::new(),
            name: name.into(),
            kind,
            description: String::new(),
            visual_tags: Vec::new(),
            assets: LocationAssets::default(),
        }
    }
}

// ============================================================================
// Chapters, scenes, panels
// ============================================================================

/// Chapter production status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChapterStatus {
    Outlined,
    Completed,
}

/// Scene time of day, used for lighting in panel generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeOfDay {
    Morning,
    Day,
    Evening,
    Night,
}

impl TimeOfDay {
    pub fn from_loose(value: &str) -> Self {
        match normalize(value).as_str() {
            "morning" | "dawn" => TimeOfDay::Morning,
            "evening" | "sunset" | "dusk" => TimeOfDay::Evening,
            "night" | "midnight" => TimeOfDay::Night,
            _ => TimeOfDay::Day,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TimeOfDay::Morning => "morning",
            TimeOfDay::Day => "day",
            TimeOfDay::Evening => "evening",
            TimeOfDay::Night => "night",
        }
    }

    pub fn all() -> [TimeOfDay; 4] {
        [
            TimeOfDay::Morning,
            TimeOfDay::Day,
            TimeOfDay::Evening,
            TimeOfDay::Night,
        ]
    }
}

/// Camera distance for a panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShotType {
    Wide,
    Medium,
    CloseUp,
    ExtremeCloseUp,
}

impl ShotType {
    pub fn from_loose(value: &str) -> Self {
        match normalize(value).as_str() {
            "wide" | "establishing" => ShotType::Wide,
            "close_up" | "closeup" => ShotType::CloseUp,
            "extreme_close_up" | "extreme_closeup" => ShotType::ExtremeCloseUp,
            _ => ShotType::Medium,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ShotType::Wide => "wide shot showing the full environment",
            ShotType::Medium => "medium shot, waist-up framing",
            ShotType::CloseUp => "close-up on the face",
            ShotType::ExtremeCloseUp => "extreme close-up on a single detail",
        }
    }
}

/// Camera angle for a panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraAngle {
    EyeLevel,
    High,
    Low,
    Dutch,
}

impl CameraAngle {
    pub fn from_loose(value: &str) -> Self {
        match normalize(value).as_str() {
            "high" | "overhead" | "birds_eye" => CameraAngle::High,
            "low" | "worms_eye" => CameraAngle::Low,
            "dutch" | "tilted" => CameraAngle::Dutch,
            _ => CameraAngle::EyeLevel,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            CameraAngle::EyeLevel => "eye-level angle",
            CameraAngle::High => "high angle looking down",
            CameraAngle::Low => "low angle looking up",
            CameraAngle::Dutch => "tilted dutch angle",
        }
    }
}

/// Kind of dialogue balloon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialogueKind {
    Speech,
    Thought,
    Narration,
}

impl DialogueKind {
    pub fn from_loose(value: &str) -> Self {
        match normalize(value).as_str() {
            "thought" => DialogueKind::Thought,
            "narration" | "narrator" => DialogueKind::Narration,
            _ => DialogueKind::Speech,
        }
    }
}

/// One dialogue line in a panel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dialogue {
    /// Speaking character, if the speaker resolved to a known character.
    #[serde(default)]
    pub speaker: Option<CharacterId>,
    pub text: String,
    pub kind: DialogueKind,
}

/// Shot composition of a panel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PanelComposition {
    pub shot_type: ShotType,
    pub angle: CameraAngle,
}

/// A character placement within a panel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PanelCharacter {
    pub character_id: CharacterId,
    pub expression: String,
    pub position: String,
}

/// One illustrated frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Panel {
    pub number: u32,
    pub composition: PanelComposition,
    #[serde(default)]
    pub characters: Vec<PanelCharacter>,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub dialogue: Vec<Dialogue>,
    #[serde(default)]
    pub sfx: Vec<String>,
    /// Rendered image, relative to the asset root. Set once generated.
    #[serde(default)]
    pub image_path: Option<String>,
    /// True when this panel directly continues the previous panel's moment.
    #[serde(default)]
    pub continues_from_previous: bool,
    /// What must stay consistent with the previous panel.
    #[serde(default)]
    pub continuity_note: String,
}

/// A location/time-bounded unit within a chapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scene {
    pub number: u32,
    #[serde(default)]
    pub location_id: Option<LocationId>,
    pub time_of_day: TimeOfDay,
    #[serde(default)]
    pub mood: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub character_ids: Vec<CharacterId>,
    #[serde(default)]
    pub panels: Vec<Panel>,
    /// Meaningful only on scene 1: the scene picks up the previous
    /// chapter's final moment rather than opening fresh.
    #[serde(default)]
    pub continues_from_previous_chapter: bool,
}

/// A generated narrative unit for one story beat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chapter {
    #[serde(default)]
    pub id: ChapterId,
    /// 1-indexed; equals the story beat index it was generated from.
    pub number: u32,
    pub title: String,
    #[serde(default)]
    pub summary: String,
    pub status: ChapterStatus,
    #[serde(default)]
    pub scenes: Vec<Scene>,
}

impl Chapter {
    /// Total panel count across all scenes.
    pub fn panel_count(&self) -> usize {
        self.scenes.iter().map(|s| s.panels.len()).sum()
    }
}

// ============================================================================
// Name resolution
// ============================================================================

/// Outcome of resolving a free-text name from model output against the
/// known entity list.
///
/// Matching is case-insensitive bidirectional substring containment, which
/// cannot distinguish overlapping names ("Max" vs "Maxine"). Rather than
/// guessing, ambiguous and unresolved outcomes are surfaced to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameMatch<Id> {
    Resolved(Id),
    Ambiguous(Vec<Id>),
    Unresolved,
}

impl<Id> NameMatch<Id> {
    pub fn resolved(self) -> Option<Id> {
        match self {
            NameMatch::Resolved(id) => Some(id),
            _ => None,
        }
    }
}

fn match_name<'a, Id: Copy, I>(query: &str, entities: I) -> NameMatch<Id>
where
    I: Iterator<Item = (&'a str, Id)>,
{
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return NameMatch::Unresolved;
    }

    let mut candidates = Vec::new();
    for (name, id) in entities {
        let name = name.to_lowercase();
        if name == query {
            // Exact match wins outright even when substrings also match.
            return NameMatch::Resolved(id);
        }
        if name.contains(&query) || query.contains(&name) {
            candidates.push(id);
        }
    }

    match candidates.len() {
        0 => NameMatch::Unresolved,
        1 => NameMatch::Resolved(candidates[0]),
        _ => NameMatch::Ambiguous(candidates),
    }
}

// ============================================================================
// Project
// ============================================================================

/// The complete entity graph for one production project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    pub format: ProjectFormat,
    pub status: ProjectStatus,
    #[serde(default)]
    pub created_at: u64,
    #[serde(default)]
    pub updated_at: u64,
    #[serde(default)]
    pub story: Option<Story>,
    #[serde(default)]
    pub characters: Vec<Character>,
    #[serde(default)]
    pub locations: Vec<Location>,
    #[serde(default)]
    pub chapters: Vec<Chapter>,
}

impl Project {
    /// Create an empty project.
    pub fn new(name: impl Into<String>, format: ProjectFormat) -> Self {
        let now = unix_now();
        Self {
            name: name.into(),
            format,
            status: ProjectStatus::Draft,
            created_at: now,
            updated_at: now,
            story: None,
            characters: Vec::new(),
            locations: Vec::new(),
            chapters: Vec::new(),
        }
    }

    pub fn character(&self, id: CharacterId) -> Option<&Character> {
        self.characters.iter().find(|c| c.id == id)
    }

    pub fn character_mut(&mut self, id: CharacterId) -> Option<&mut Character> {
        self.characters.iter_mut().find(|c| c.id == id)
    }

    /// Resolve a character by (fuzzy) name.
    pub fn character_by_name(&self, name: &str) -> NameMatch<CharacterId> {
        match_name(name, self.characters.iter().map(|c| (c.name.as_str(), c.id)))
    }

    pub fn location(&self, id: LocationId) -> Option<&Location> {
        self.locations.iter().find(|l| l.id == id)
    }

    pub fn location_mut(&mut self, id: LocationId) -> Option<&mut Location> {
        self.locations.iter_mut().find(|l| l.id == id)
    }

    /// Resolve a location by (fuzzy) name.
    pub fn location_by_name(&self, name: &str) -> NameMatch<LocationId> {
        match_name(name, self.locations.iter().map(|l| (l.name.as_str(), l.id)))
    }

    pub fn chapter(&self, number: u32) -> Option<&Chapter> {
        self.chapters.iter().find(|c| c.number == number)
    }

    pub fn chapter_by_id(&self, id: ChapterId) -> Option<&Chapter> {
        self.chapters.iter().find(|c| c.id == id)
    }

    pub fn chapter_mut(&mut self, number: u32) -> Option<&mut Chapter> {
        self.chapters.iter_mut().find(|c| c.number == number)
    }

    /// Insert or replace a chapter, keeping the list sorted by number.
    pub fn upsert_chapter(&mut self, chapter: Chapter) {
        if let Some(existing) = self.chapters.iter_mut().find(|c| c.number == chapter.number) {
            *existing = chapter;
        } else {
            self.chapters.push(chapter);
            self.chapters.sort_by_key(|c| c.number);
        }
        self.touch();
    }

    /// Beat numbers (1-indexed) that do not yet have a chapter, ascending.
    pub fn remaining_beats(&self) -> Vec<u32> {
        let Some(ref story) = self.story else {
            return Vec::new();
        };
        let existing: std::collections::HashSet<u32> =
            self.chapters.iter().map(|c| c.number).collect();
        (1..=story.story_beats.len() as u32)
            .filter(|n| !existing.contains(n))
            .collect()
    }

    /// Update the modification timestamp.
    pub fn touch(&mut self) {
        self.updated_at = unix_now();
    }
}

/// Current unix timestamp in seconds.
pub fn unix_now() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
