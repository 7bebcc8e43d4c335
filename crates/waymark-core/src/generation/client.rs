//! reqwest-based [`GenerationService`] implementation.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use super::types::{ChatRequest, ChatResponse, GenerateRequest};
use super::{GenerationError, GenerationService};

pub const DEFAULT_GENERATE_TIMEOUT: Duration = Duration::from_secs(90);
pub const DEFAULT_CHAT_TIMEOUT: Duration = Duration::from_secs(30);

const GENERATE_PATH: &str = "/rag/generate";
const CHAT_PATH: &str = "/rag/chat";

/// HTTP client for the Generation Service.
///
/// Every call is a single attempt bounded by its own timeout: generation is
/// slow (retrieval plus an LLM call), the conversational endpoint is not.
#[derive(Debug, Clone)]
pub struct HttpGenerationClient {
    client: reqwest::Client,
    base_url: String,
    generate_timeout: Duration,
    chat_timeout: Duration,
}

impl HttpGenerationClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| GenerationError::Unknown(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            generate_timeout: DEFAULT_GENERATE_TIMEOUT,
            chat_timeout: DEFAULT_CHAT_TIMEOUT,
        })
    }

    pub fn with_timeouts(mut self, generate: Duration, chat: Duration) -> Self {
        self.generate_timeout = generate;
        self.chat_timeout = chat;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<B, R>(&self, path: &str, body: &B, timeout: Duration) -> Result<R, GenerationError>
    where
        B: Serialize + Sync + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}{path}", self.base_url);
        debug!(url = %url, timeout_secs = timeout.as_secs(), "calling generation service");

        let response = self
            .client
            .post(&url)
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| self.classify(e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = rejection_message(&body)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_owned());
            warn!(url = %url, status = status.as_u16(), message = %message, "generation service rejected request");
            return Err(GenerationError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<R>()
            .await
            .map_err(|e| self.classify(e, timeout))
    }

    fn classify(&self, err: reqwest::Error, timeout: Duration) -> GenerationError {
        if err.is_connect() {
            GenerationError::Unavailable(self.base_url.clone())
        } else if err.is_timeout() {
            GenerationError::Timeout(timeout)
        } else {
            GenerationError::Unknown(err.to_string())
        }
    }
}

#[async_trait]
impl GenerationService for HttpGenerationClient {
    async fn generate(&self, request: &GenerateRequest) -> Result<Value, GenerationError> {
        self.post(GENERATE_PATH, request, self.generate_timeout).await
    }

    async fn converse(&self, request: &ChatRequest) -> Result<ChatResponse, GenerationError> {
        self.post(CHAT_PATH, request, self.chat_timeout).await
    }
}

/// Pull a human-readable reason out of an error body. Structured bodies
/// carry it in `detail` (FastAPI), `error` or `message`; anything else is
/// used verbatim.
fn rejection_message(body: &str) -> Option<String> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }

    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) {
        for key in ["detail", "error", "message"] {
            match map.get(key) {
                Some(Value::String(s)) if !s.is_empty() => return Some(s.clone()),
                Some(Value::Null) | None => {}
                Some(other) => return Some(other.to_string()),
            }
        }
    }

    Some(body.to_owned())
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use axum::Router;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use axum::routing::post;
    use serde_json::json;

    use super::*;

    async fn spawn(router: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        addr
    }

    fn client(addr: SocketAddr) -> HttpGenerationClient {
        HttpGenerationClient::new(format!("http://{addr}/")).unwrap()
    }

    fn generate_request() -> GenerateRequest {
        GenerateRequest {
            query: "dynamic programming".into(),
            domain: Some("dsa".into()),
            num_topics: Some(5),
        }
    }

    #[test]
    fn rejection_message_prefers_structured_fields() {
        assert_eq!(
            rejection_message(r#"{"detail": "Vector store not initialized"}"#).as_deref(),
            Some("Vector store not initialized")
        );
        assert_eq!(
            rejection_message(r#"{"error": "bad domain", "message": "ignored"}"#).as_deref(),
            Some("bad domain")
        );
        assert_eq!(
            rejection_message(r#"{"detail": [{"loc": ["body", "query"]}]}"#).as_deref(),
            Some(r#"[{"loc":["body","query"]}]"#)
        );
        assert_eq!(
            rejection_message("upstream exploded").as_deref(),
            Some("upstream exploded")
        );
        assert_eq!(rejection_message("   "), None);
    }

    #[tokio::test]
    async fn generate_returns_raw_payload() {
        let router = Router::new().route(
            "/rag/generate",
            post(|axum::Json(body): axum::Json<Value>| async move {
                axum::Json(json!({"title": "echo", "query": body["query"], "n": body["num_topics"]}))
            }),
        );
        let addr = spawn(router).await;

        let payload = client(addr).generate(&generate_request()).await.unwrap();
        assert_eq!(payload["query"], "dynamic programming");
        assert_eq!(payload["n"], 5);
    }

    #[tokio::test]
    async fn converse_parses_advisory_fields() {
        let router = Router::new().route(
            "/rag/chat",
            post(|| async {
                axum::Json(json!({
                    "response": "What is your deadline?",
                    "should_generate_roadmap": false,
                    "context_completeness": 0.4
                }))
            }),
        );
        let addr = spawn(router).await;

        let resp = client(addr)
            .converse(&ChatRequest {
                message: "I want to learn graphs".into(),
                conversation_history: vec![],
            })
            .await
            .unwrap();
        assert_eq!(resp.response, "What is your deadline?");
        assert_eq!(resp.context_completeness, 0.4);
    }

    #[tokio::test]
    async fn non_success_status_is_rejected() {
        let router = Router::new().route(
            "/rag/generate",
            post(|| async {
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    axum::Json(json!({"detail": "Vector store not initialized"})),
                )
                    .into_response()
            }),
        );
        let addr = spawn(router).await;

        let err = client(addr).generate(&generate_request()).await.unwrap_err();
        match err {
            GenerationError::Rejected { status, message } => {
                assert_eq!(status, 503);
                assert_eq!(message, "Vector store not initialized");
            }
            other => panic!("expected Rejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_service_times_out() {
        let router = Router::new().route(
            "/rag/generate",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                axum::Json(json!({}))
            }),
        );
        let addr = spawn(router).await;

        let err = client(addr)
            .with_timeouts(Duration::from_millis(200), DEFAULT_CHAT_TIMEOUT)
            .generate(&generate_request())
            .await
            .unwrap_err();
        assert!(
            matches!(err, GenerationError::Timeout(d) if d == Duration::from_millis(200)),
            "got {err:?}"
        );
    }

    #[tokio::test]
    async fn refused_connection_is_unavailable() {
        // Bind then drop to get a port nothing listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let c = client(addr);
        let err = c.generate(&generate_request()).await.unwrap_err();
        match err {
            GenerationError::Unavailable(url) => assert_eq!(url, c.base_url()),
            other => panic!("expected Unavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn undecodable_body_is_unknown_failure() {
        let router = Router::new().route("/rag/chat", post(|| async { "not json" }));
        let addr = spawn(router).await;

        let err = client(addr)
            .converse(&ChatRequest {
                message: "hi".into(),
                conversation_history: vec![],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Unknown(_)), "got {err:?}");
    }

    #[test]
    fn base_url_is_trimmed() {
        let c = HttpGenerationClient::new("http://localhost:8000///").unwrap();
        assert_eq!(c.base_url(), "http://localhost:8000");
    }
}
