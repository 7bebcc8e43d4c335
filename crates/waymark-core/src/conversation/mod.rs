//! Conversation sessions and the per-turn orchestrator.

pub mod orchestrator;

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use waymark_db::models::{ChatSession, Message, MessageRole};
use waymark_db::queries::{messages as message_queries, sessions as session_queries};

use crate::error::{CoreError, CoreResult};
use crate::generation::client::{DEFAULT_CHAT_TIMEOUT, DEFAULT_GENERATE_TIMEOUT};

pub use orchestrator::{TurnOutcome, handle_user_message};

pub const DEFAULT_SESSION_TITLE: &str = "New Chat";
pub const MAX_MESSAGE_CHARS: usize = 10_000;
const AUTO_TITLE_CHARS: usize = 50;

/// Tunables for a conversation turn.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Bound on `POST /rag/generate`.
    pub generate_timeout: Duration,
    /// Bound on `POST /rag/chat`.
    pub chat_timeout: Duration,
    /// Pause before every conversational call. Never applied before
    /// generation.
    pub cooldown: Duration,
    /// Forwarded as `num_topics`; `None` lets the service choose.
    pub num_topics: Option<u32>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            generate_timeout: DEFAULT_GENERATE_TIMEOUT,
            chat_timeout: DEFAULT_CHAT_TIMEOUT,
            cooldown: Duration::from_secs(3),
            num_topics: Some(5),
        }
    }
}

/// A session with its transcript.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDetail {
    pub session: ChatSession,
    pub messages: Vec<Message>,
}

/// Apply an appended message to the session header.
///
/// The first user message names a session that still has the default
/// title; every message moves `last_message_at`.
pub fn apply_message(
    mut session: ChatSession,
    role: MessageRole,
    content: &str,
    at: DateTime<Utc>,
) -> ChatSession {
    if role == MessageRole::User && session.title == DEFAULT_SESSION_TITLE {
        let title: String = content.trim().chars().take(AUTO_TITLE_CHARS).collect();
        if !title.is_empty() {
            session.title = title;
        }
    }
    session.last_message_at = at;
    session
}

/// Reject content that must never reach the store or the service.
pub fn validate_content(content: &str) -> CoreResult<()> {
    if content.trim().is_empty() {
        return Err(CoreError::validation("message content is empty"));
    }
    if content.contains('\0') {
        return Err(CoreError::validation("message content contains a NUL character"));
    }
    let len = content.chars().count();
    if len > MAX_MESSAGE_CHARS {
        return Err(CoreError::validation(format!(
            "message content is {len} characters, limit is {MAX_MESSAGE_CHARS}"
        )));
    }
    Ok(())
}

pub async fn create_session(
    pool: &PgPool,
    user_id: Uuid,
    title: Option<&str>,
    domain: Option<&str>,
) -> CoreResult<ChatSession> {
    let title = title.map(str::trim).filter(|t| !t.is_empty());
    let domain = domain.map(str::trim).filter(|d| !d.is_empty());
    if title.into_iter().chain(domain).any(|v| v.contains('\0')) {
        return Err(CoreError::validation("session title and domain may not contain NUL"));
    }
    if let Some(t) = title {
        if t.chars().count() > crate::roadmap::normalize::MAX_TITLE_LEN {
            return Err(CoreError::validation("session title is too long"));
        }
    }

    let session = session_queries::insert_session(pool, user_id, title, domain).await?;
    tracing::info!(session_id = %session.id, user_id = %user_id, "session created");
    Ok(session)
}

pub async fn list_sessions(pool: &PgPool, user_id: Uuid) -> CoreResult<Vec<ChatSession>> {
    Ok(session_queries::list_sessions_for_user(pool, user_id).await?)
}

pub async fn load_session(
    pool: &PgPool,
    user_id: Uuid,
    session_id: Uuid,
) -> CoreResult<SessionDetail> {
    let session = owned_session(pool, user_id, session_id).await?;
    let messages = message_queries::list_messages(pool, session.id).await?;
    Ok(SessionDetail { session, messages })
}

/// Delete an owned session with its messages. A linked roadmap is kept.
pub async fn delete_session(pool: &PgPool, user_id: Uuid, session_id: Uuid) -> CoreResult<()> {
    if !session_queries::delete_session(pool, session_id, user_id).await? {
        return Err(CoreError::not_found(format!("session {session_id}")));
    }
    tracing::info!(session_id = %session_id, user_id = %user_id, "session deleted");
    Ok(())
}

pub(crate) async fn owned_session(
    pool: &PgPool,
    user_id: Uuid,
    session_id: Uuid,
) -> CoreResult<ChatSession> {
    session_queries::get_session_for_user(pool, session_id, user_id)
        .await?
        .ok_or_else(|| CoreError::not_found(format!("session {session_id}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(title: &str) -> ChatSession {
        let created = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        ChatSession {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            title: title.into(),
            domain: None,
            generation_completed: false,
            roadmap_id: None,
            last_message_at: created,
            created_at: created,
        }
    }

    #[test]
    fn first_user_message_names_the_session() {
        let now = Utc::now();
        let s = apply_message(session(DEFAULT_SESSION_TITLE), MessageRole::User, "  Learn graphs  ", now);
        assert_eq!(s.title, "Learn graphs");
        assert_eq!(s.last_message_at, now);

        let s = apply_message(s, MessageRole::User, "something else", now);
        assert_eq!(s.title, "Learn graphs");
    }

    #[test]
    fn auto_title_is_capped() {
        let s = apply_message(
            session(DEFAULT_SESSION_TITLE),
            MessageRole::User,
            &"a".repeat(80),
            Utc::now(),
        );
        assert_eq!(s.title.chars().count(), AUTO_TITLE_CHARS);
    }

    #[test]
    fn assistant_message_keeps_title_but_moves_timestamp() {
        let before = session(DEFAULT_SESSION_TITLE);
        let at = Utc::now();
        let s = apply_message(before.clone(), MessageRole::Assistant, "Hello!", at);
        assert_eq!(s.title, DEFAULT_SESSION_TITLE);
        assert_eq!(s.last_message_at, at);
        assert_ne!(s.last_message_at, before.last_message_at);
    }

    #[test]
    fn custom_title_is_kept() {
        let s = apply_message(session("Interview prep"), MessageRole::User, "hi", Utc::now());
        assert_eq!(s.title, "Interview prep");
    }

    #[test]
    fn content_validation() {
        assert!(validate_content("hello").is_ok());
        assert!(matches!(validate_content(""), Err(CoreError::Validation(_))));
        assert!(matches!(validate_content(" \n\t"), Err(CoreError::Validation(_))));
        assert!(matches!(
            validate_content("learn\0graphs"),
            Err(CoreError::Validation(_))
        ));
        assert!(validate_content(&"x".repeat(MAX_MESSAGE_CHARS)).is_ok());
        assert!(matches!(
            validate_content(&"x".repeat(MAX_MESSAGE_CHARS + 1)),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn default_config_matches_service_expectations() {
        let cfg = OrchestratorConfig::default();
        assert_eq!(cfg.generate_timeout, Duration::from_secs(90));
        assert_eq!(cfg.chat_timeout, Duration::from_secs(30));
        assert_eq!(cfg.cooldown, Duration::from_secs(3));
        assert_eq!(cfg.num_topics, Some(5));
    }
}
