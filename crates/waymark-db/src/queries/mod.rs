//! Query functions, one module per table group.

pub mod messages;
pub mod progress;
pub mod roadmaps;
pub mod sessions;
