//! Roadmap normalization and read models.

pub mod canonical;
pub mod normalize;
pub mod view;

use serde::{Deserialize, Serialize};
use waymark_db::models::Difficulty;

pub use normalize::{NormalizeError, normalize, truncate_title};
pub use view::{RoadmapStats, RoadmapView};

/// One value per difficulty, serialized as `{easy, medium, hard}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByDifficulty<T> {
    pub easy: T,
    pub medium: T,
    pub hard: T,
}

impl<T> ByDifficulty<T> {
    pub fn get(&self, difficulty: Difficulty) -> &T {
        match difficulty {
            Difficulty::Easy => &self.easy,
            Difficulty::Medium => &self.medium,
            Difficulty::Hard => &self.hard,
        }
    }

    pub fn get_mut(&mut self, difficulty: Difficulty) -> &mut T {
        match difficulty {
            Difficulty::Easy => &mut self.easy,
            Difficulty::Medium => &mut self.medium,
            Difficulty::Hard => &mut self.hard,
        }
    }
}
