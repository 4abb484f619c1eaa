//! Panel render prompts.
//!
//! A panel prompt combines the scene's setting and lighting, the shot
//! composition, the characters in frame, and the action line. Reference
//! images (character sheets, location reference, previous panel) are
//! attached by the panel service; this module only builds text.

use crate::generate::location::lighting;
use crate::project::{Panel, Project, Scene};

const STYLE: &str = "Clean webtoon panel: crisp lineart, flat cel shading, \
expressive faces, vertical composition.";

const ANATOMY_NOTE: &str = "Correct human anatomy and proportions, hands drawn \
carefully with five fingers.";

const BLEED_NOTE: &str = "FULL BLEED artwork filling the entire frame. No speech \
bubbles, no text, no sound effect lettering, no panel borders.";

/// Build the render prompt for one panel.
pub fn build_prompt(project: &Project, scene: &Scene, panel: &Panel) -> String {
    let mut prompt = format!("{STYLE}\n");

    if let Some(location) = scene.location_id.and_then(|id| project.location(id)) {
        prompt.push_str(&format!(
            "SETTING: {} ({}). {}\n",
            location.name,
            location.kind.name(),
            location.description
        ));
    }
    prompt.push_str(&format!("LIGHTING: {}\n", lighting(scene.time_of_day)));
    if !scene.mood.is_empty() {
        prompt.push_str(&format!("MOOD: {}\n", scene.mood));
    }

    prompt.push_str(&format!(
        "SHOT: {}, {}\n",
        panel.composition.shot_type.description(),
        panel.composition.angle.description()
    ));

    if !panel.characters.is_empty() {
        prompt.push_str("CHARACTERS IN FRAME:\n");
        for placement in &panel.characters {
            if let Some(character) = project.character(placement.character_id) {
                let mut line = format!("- {}", character.name);
                if !placement.expression.is_empty() {
                    line.push_str(&format!(", {} expression", placement.expression));
                }
                if !placement.position.is_empty() {
                    line.push_str(&format!(", positioned {}", placement.position));
                }
                prompt.push_str(&line);
                prompt.push('\n');
            }
        }
        prompt.push_str(ANATOMY_NOTE);
        prompt.push('\n');
    }

    prompt.push_str(&format!("ACTION: {}\n", panel.action));

    if panel.continues_from_previous {
        prompt.push_str(
            "CONTINUITY: this panel directly continues the previous panel's \
moment. Keep each character's appearance, outfit, and the setting identical; \
only pose, expression, and framing change.\n",
        );
        if !panel.continuity_note.is_empty() {
            prompt.push_str(&format!("CONTINUITY NOTE: {}\n", panel.continuity_note));
        }
    }

    prompt.push_str(BLEED_NOTE);
    prompt
}

/// Note attached to the previous chapter's final panel when it is passed
/// as a reference image.
pub fn style_reference_note() -> &'static str {
    "Previous panel, provided for art style and character appearance only. Do \
not copy its content; draw the new action described below."
}

/// Note for the same reference when the new chapter opens mid-moment
/// rather than after a time skip.
pub fn continuation_reference_note() -> &'static str {
    "Previous panel; this panel continues the same scene and moment. Keep the \
setting, character positions, outfits, and lighting consistent, advancing \
only the action described below."
}
