//! Character asset prompts: the portrait and the multi-view sheet.

use crate::project::Character;

const PORTRAIT_BASE: &str = "Full-body character portrait in clean webtoon style: \
crisp lineart, flat cel shading, plain light background. The character stands \
in a relaxed neutral pose, facing the viewer, full figure visible head to toe.";

const THREE_VIEW_BASE: &str = "Character model sheet in clean webtoon style on a \
plain light background, showing the exact same character in the exact same \
outfit from three angles side by side: front view, side profile view, and back \
view. Identical height and proportions across all three views.";

/// Portrait aspect ratio (vertical, matching the reading format).
pub const PORTRAIT_ASPECT: &str = "9:16";
/// Multi-view sheet aspect ratio (wider to fit three figures).
pub const THREE_VIEW_ASPECT: &str = "3:4";

fn describe(character: &Character) -> String {
    let mut description = format!("\n\nCHARACTER: {}", character.name);
    if !character.age.is_empty() {
        description.push_str(&format!("\nAGE: {}", character.age));
    }
    if !character.description.physical.is_empty() {
        description.push_str(&format!("\nAPPEARANCE: {}", character.description.physical));
    }
    if !character.visual_tags.is_empty() {
        description.push_str(&format!(
            "\nVISUAL TAGS: {}",
            character.visual_tags.join(", ")
        ));
    }
    if !character.description.personality.is_empty() {
        description.push_str(&format!(
            "\nPERSONALITY (reflect in posture and expression): {}",
            character.description.personality
        ));
    }
    description
}

/// Prompt for the character's portrait.
pub fn portrait_prompt(character: &Character) -> String {
    format!("{PORTRAIT_BASE}{}", describe(character))
}

/// Prompt for the front/side/back model sheet. Built on top of the
/// portrait so the sheet matches the established look.
pub fn three_view_prompt(character: &Character) -> String {
    format!("{THREE_VIEW_BASE}{}", describe(character))
}
