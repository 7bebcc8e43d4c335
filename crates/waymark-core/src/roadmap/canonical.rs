//! Mapping of free-form upstream labels onto the closed enums.

use waymark_db::models::{Difficulty, ResourceType};

/// Canonicalize a resource type label. Total: unknown labels are articles.
pub fn canonical_resource_type(raw: &str) -> ResourceType {
    match raw.trim().to_ascii_lowercase().as_str() {
        "video" | "youtube" | "playlist" => ResourceType::Video,
        "practice" | "problem" => ResourceType::Practice,
        _ => ResourceType::Article,
    }
}

/// Canonicalize a difficulty label, case-insensitively. Unknown labels are
/// medium.
pub fn canonical_difficulty(raw: &str) -> Difficulty {
    match raw.trim().to_ascii_lowercase().as_str() {
        "easy" => Difficulty::Easy,
        "hard" => Difficulty::Hard,
        _ => Difficulty::Medium,
    }
}
