//! Location relevance detection
//!
//! Decides whether a prompt is about the user's current surroundings, in which
//! case the nearby place hint is worth injecting as system context.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref DEICTIC_MARKERS: Regex =
        Regex::new(r"\b(here|this place|nearby|current location)\b").expect("static pattern");
}

/// Returns true if `prompt` refers to the place the user is at.
///
/// A missing or blank `nearby_place` never matches. Otherwise the prompt
/// matches if it contains one of the deictic markers ("here", "this place",
/// "nearby", "current location") as whole words, or contains the place string
/// exactly as given. Both checks are case-insensitive.
pub fn is_location_related(prompt: &str, nearby_place: Option<&str>) -> bool {
    let place = match nearby_place {
        Some(place) if !place.trim().is_empty() => place,
        _ => return false,
    };

    let prompt_lower = prompt.to_lowercase();
    DEICTIC_MARKERS.is_match(&prompt_lower) || prompt_lower.contains(&place.to_lowercase())
}
