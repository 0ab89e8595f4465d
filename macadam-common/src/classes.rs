//! OSM road-class vocabulary and fuzzy matching
//!
//! The `highway` tag vocabulary used for validating accepted-class lists and
//! for suggesting corrections when a caller mistypes one. The list is the
//! stable core of the OSM wiki vocabulary; exotic regional values are rare
//! enough that rejecting them with a suggestion beats silently matching
//! nothing.

use strsim::{jaro_winkler, normalized_levenshtein};

use crate::error::{Error, Result};

/// Values of the OSM `highway` tag recognized by the toolkit.
pub const ALL_CLASSES: &[&str] = &[
    // Principal road network
    "motorway",
    "trunk",
    "primary",
    "secondary",
    "tertiary",
    "unclassified",
    "residential",
    // Link roads (ramps, slip roads)
    "motorway_link",
    "trunk_link",
    "primary_link",
    "secondary_link",
    "tertiary_link",
    // Special road types
    "living_street",
    "service",
    "pedestrian",
    "track",
    "bus_guideway",
    "busway",
    "escape",
    "raceway",
    "road",
    // Non-motorized ways
    "footway",
    "bridleway",
    "steps",
    "corridor",
    "path",
    "cycleway",
    // Lifecycle values that still appear in extracts
    "construction",
    "proposed",
];

/// Default accepted classes for extraction: the drivable inter-urban network.
pub const DEFAULT_ACCEPTED: &[&str] = &[
    "motorway",
    "motorway_link",
    "trunk",
    "trunk_link",
    "primary",
    "primary_link",
    "secondary",
    "secondary_link",
    "tertiary",
    "tertiary_link",
];

/// Whether `class` is part of the recognized vocabulary.
pub fn is_known(class: &str) -> bool {
    ALL_CLASSES.iter().any(|c| c.eq_ignore_ascii_case(class))
}

/// Validate a caller-supplied accepted-class list, normalizing case.
///
/// The first unknown entry aborts with an `UnknownRoadClass` error carrying
/// a fuzzy suggestion, so a typo in a long `--classes` list is caught before
/// any parsing work starts.
pub fn validate<'a, I>(classes: I) -> Result<Vec<String>>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut out = Vec::new();
    for class in classes {
        let trimmed = class.trim();
        if trimmed.is_empty() {
            continue;
        }
        if !is_known(trimmed) {
            return Err(Error::unknown_class(trimmed));
        }
        out.push(trimmed.to_ascii_lowercase());
    }
    if out.is_empty() {
        return Err(Error::InvalidInput(
            "accepted road-class list is empty".to_string(),
        ));
    }
    Ok(out)
}

/// Find the best fuzzy match for `input` among the vocabulary.
///
/// Hybrid scoring: Jaro-Winkler (70%) for transposition/prefix typos plus
/// normalized Levenshtein (30%) for insertions/deletions, with two
/// vocabulary-specific bonuses:
/// - Prefix bonus: highway classes share long stems ("motorway" /
///   "motorway_link"), so a strong match on the first 7 chars is a strong
///   signal.
/// - Compound bonus: for `*_link` style compounds, a near-exact match on one
///   underscore-separated part lifts the whole candidate.
///
/// Minimum threshold 0.65, below which no suggestion is made.
fn find_best_fuzzy_match(input: &str, candidates: &[&str]) -> Option<String> {
    let input_lower = input.to_lowercase();
    let mut best_match = None;
    let mut best_score = 0.0f64;

    let min_threshold = 0.65;

    for candidate in candidates {
        let jw_score = jaro_winkler(&input_lower, candidate);
        let lev_score = normalized_levenshtein(&input_lower, candidate);
        let combined_score = (jw_score * 0.7) + (lev_score * 0.3);

        let mut bonus = 0.0;

        let prefix_len = input_lower.chars().count().min(7);
        if prefix_len >= 4 {
            let input_prefix: String = input_lower.chars().take(prefix_len).collect();
            let candidate_prefix: String = candidate.chars().take(prefix_len).collect();
            let prefix_similarity = normalized_levenshtein(&input_prefix, &candidate_prefix);
            if prefix_similarity > 0.7 {
                bonus += 0.2 * prefix_similarity;
            }
        }

        if candidate.contains('_') {
            for part in candidate.split('_') {
                if part.len() >= 4 {
                    let part_similarity = jaro_winkler(&input_lower, part);
                    if part_similarity > 0.85 {
                        bonus += 0.12 * part_similarity;
                    }
                }
            }
        }

        let final_score = combined_score + bonus;
        if final_score >= min_threshold && final_score > best_score {
            best_score = final_score;
            best_match = Some(candidate.to_string());
        }
    }

    best_match
}

/// Suggest a correction for a potentially misspelled road class.
///
/// Returns `None` when the class is already valid (case-insensitive) or when
/// nothing in the vocabulary is close enough to be a safe suggestion.
pub fn suggest_correction(class: &str) -> Option<String> {
    if is_known(class) {
        return None;
    }
    find_best_fuzzy_match(class, ALL_CLASSES)
}
