pub mod conversation;
pub mod error;
pub mod generation;
pub mod progress;
pub mod roadmap;
pub mod trigger;

pub use error::{CoreError, CoreResult};
