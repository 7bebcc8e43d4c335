//! Wire types of the Generation Service.

use serde::{Deserialize, Serialize};
use waymark_db::models::MessageRole;

use crate::trigger::AdvisorySignal;

/// Body of `POST /rag/generate`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerateRequest {
    pub query: String,
    pub domain: Option<String>,
    pub num_topics: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: MessageRole,
    pub content: String,
}

/// Body of `POST /rag/chat`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub message: String,
    pub conversation_history: Vec<ChatTurn>,
}

/// Reply of `POST /rag/chat`. A service that omits the advisory fields is
/// treated as not asking for generation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    #[serde(default)]
    pub should_generate_roadmap: bool,
    #[serde(default)]
    pub context_completeness: f64,
}

impl ChatResponse {
    pub fn signal(&self) -> AdvisorySignal {
        AdvisorySignal {
            should_generate_roadmap: self.should_generate_roadmap,
            context_completeness: self.context_completeness.clamp(0.0, 1.0),
        }
    }
}
