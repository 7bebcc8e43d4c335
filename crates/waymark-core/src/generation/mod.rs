//! Integration with the external Generation Service.
//!
//! [`GenerationService`] is the seam the orchestrator talks to;
//! [`HttpGenerationClient`] is the production implementation. Tests
//! substitute scripted implementations.

pub mod client;
pub mod types;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub use client::HttpGenerationClient;
pub use types::{ChatRequest, ChatResponse, ChatTurn, GenerateRequest};

/// How a call to the Generation Service failed. No variant is retried by
/// the client.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("cannot reach {0}")]
    Unavailable(String),

    #[error("status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Unknown(String),
}

/// Adapter interface for the Generation Service.
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Request a roadmap. Returns the raw payload; normalization is the
    /// caller's job.
    async fn generate(&self, request: &GenerateRequest) -> Result<Value, GenerationError>;

    /// Relay one conversational turn to the advisory endpoint.
    async fn converse(&self, request: &ChatRequest) -> Result<ChatResponse, GenerationError>;
}

const _: () = {
    fn _assert_object_safe(_: &dyn GenerationService) {}
};
