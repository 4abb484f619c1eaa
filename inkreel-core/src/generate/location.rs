//! Location asset prompts: the establishing reference and its time-of-day
//! variations.

use crate::project::{Location, TimeOfDay};

const REFERENCE_BASE: &str = "Establishing background illustration in clean \
webtoon style: crisp lineart, flat cel shading, rich environmental detail, no \
people present.";

/// Location reference aspect ratio (wide establishing frame).
pub const REFERENCE_ASPECT: &str = "16:9";

/// Lighting direction for each time of day.
pub fn lighting(time: TimeOfDay) -> &'static str {
    match time {
        TimeOfDay::Morning => "soft golden morning light, long cool shadows, clear sky",
        TimeOfDay::Day => "bright neutral daylight, short shadows, vivid colors",
        TimeOfDay::Evening => "warm orange sunset light, long dramatic shadows",
        TimeOfDay::Night => "deep blue night, artificial light sources glowing, high contrast",
    }
}

/// Default weather and atmosphere for each time of day.
pub fn weather(time: TimeOfDay) -> &'static str {
    match time {
        TimeOfDay::Morning => "light morning haze, dew on surfaces",
        TimeOfDay::Day => "clear weather, crisp air",
        TimeOfDay::Evening => "scattered clouds catching the sunset",
        TimeOfDay::Night => "still night air, faint atmospheric glow around lights",
    }
}

fn describe(location: &Location) -> String {
    let mut description = format!(
        "\n\nLOCATION: {} ({})",
        location.name,
        location.kind.name()
    );
    if !location.description.is_empty() {
        description.push_str(&format!("\nDESCRIPTION: {}", location.description));
    }
    if !location.visual_tags.is_empty() {
        description.push_str(&format!(
            "\nVISUAL TAGS: {}",
            location.visual_tags.join(", ")
        ));
    }
    description
}

/// Prompt for the location's establishing reference, lit for daytime.
pub fn reference_prompt(location: &Location) -> String {
    format!(
        "{REFERENCE_BASE}{}\nLIGHTING: {}",
        describe(location),
        lighting(TimeOfDay::Day)
    )
}

/// Prompt for a time-of-day variation of the reference.
pub fn variation_prompt(location: &Location, time: TimeOfDay) -> String {
    format!(
        "{REFERENCE_BASE}{}\nLIGHTING: {}\nWEATHER: {}\nSame place and camera \
framing as the reference image, changed only in lighting and atmosphere.",
        describe(location),
        lighting(time),
        weather(time)
    )
}
