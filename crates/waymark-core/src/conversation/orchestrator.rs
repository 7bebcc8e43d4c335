//! One user turn of a conversation session.
//!
//! Per turn the session moves `AwaitingTrigger -> Generating -> Linked` or
//! `-> Failed`. The user message is persisted before anything else so its
//! durability never depends on the Generation Service. Generation is
//! claimed in the store before the service is called; a failed attempt
//! releases the claim so the next user message can trigger again.

use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use serde_json::{Value, json};
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use waymark_db::models::{ChatSession, Message, MessageRole, RoadmapDraft};
use waymark_db::queries::{
    messages as message_queries, roadmaps as roadmap_queries, sessions as session_queries,
};

use super::{OrchestratorConfig, apply_message, owned_session, validate_content};
use crate::error::{CoreError, CoreResult};
use crate::generation::{
    ChatRequest, ChatTurn, GenerateRequest, GenerationError, GenerationService,
};
use crate::roadmap::{RoadmapView, normalize, truncate_title, view};
use crate::trigger::{should_generate, user_message_count};

/// What a turn produced.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnOutcome {
    pub session: ChatSession,
    pub user_message: Message,
    /// Assistant messages appended during the turn, in order.
    pub replies: Vec<Message>,
    /// Set when this turn generated (or recovered) the session's roadmap.
    pub roadmap: Option<RoadmapView>,
}

/// Handle one inbound user message for a session the caller owns.
pub async fn handle_user_message(
    pool: &PgPool,
    service: &dyn GenerationService,
    config: &OrchestratorConfig,
    user_id: Uuid,
    session_id: Uuid,
    content: &str,
) -> CoreResult<TurnOutcome> {
    validate_content(content)?;
    let session = owned_session(pool, user_id, session_id).await?;

    let (session, user_message) = append(pool, session, MessageRole::User, content, None).await?;
    let history = message_queries::list_messages(pool, session.id).await?;

    let mut turn = TurnOutcome {
        session,
        user_message,
        replies: Vec::new(),
        roadmap: None,
    };

    if should_generate(&history, turn.session.generation_completed, None) {
        return generate(pool, service, config, user_id, turn, &history).await;
    }

    tokio::time::sleep(config.cooldown).await;

    let request = ChatRequest {
        message: content.to_owned(),
        conversation_history: history
            .iter()
            .filter(|m| m.id != turn.user_message.id)
            .map(|m| ChatTurn {
                role: m.role,
                content: m.content.clone(),
            })
            .collect(),
    };
    let response = match bounded(config.chat_timeout, service.converse(&request)).await {
        Ok(response) => response,
        Err(err) => return Err(report_failure(pool, turn.session, err).await),
    };

    let signal = response.signal();
    let metadata = json!({
        "should_generate_roadmap": signal.should_generate_roadmap,
        "context_completeness": signal.context_completeness,
    });
    let (session, reply) = append(
        pool,
        turn.session,
        MessageRole::Assistant,
        &response.response,
        Some(&metadata),
    )
    .await?;
    turn.session = session;
    turn.replies.push(reply);

    if should_generate(&history, turn.session.generation_completed, Some(&signal)) {
        return generate(pool, service, config, user_id, turn, &history).await;
    }
    Ok(turn)
}

async fn generate(
    pool: &PgPool,
    service: &dyn GenerationService,
    config: &OrchestratorConfig,
    user_id: Uuid,
    mut turn: TurnOutcome,
    history: &[Message],
) -> CoreResult<TurnOutcome> {
    let session_id = turn.session.id;

    if !session_queries::claim_generation(pool, session_id).await? {
        info!(session_id = %session_id, "generation already claimed, skipping");
        return Ok(turn);
    }
    info!(
        session_id = %session_id,
        user_messages = user_message_count(history),
        "generation triggered"
    );

    let request = GenerateRequest {
        query: transcript(history),
        domain: turn.session.domain.clone(),
        num_topics: config.num_topics,
    };

    let draft = match fetch_draft(service, config, &request).await {
        Ok(draft) => draft,
        Err(err) => {
            release(pool, session_id).await;
            return Err(report_failure(pool, turn.session, err).await);
        }
    };

    let roadmap = match roadmap_queries::insert_roadmap(pool, user_id, Some(session_id), &draft).await
    {
        Ok(Some(roadmap)) => roadmap,
        Ok(None) => {
            let conflict = CoreError::ConsistencyViolation(format!(
                "session {session_id} already has a roadmap"
            ));
            warn!(session_id = %session_id, error = %conflict, "returning existing roadmap");
            roadmap_queries::get_roadmap_for_session(pool, session_id)
                .await?
                .ok_or(conflict)?
        }
        Err(err) => {
            // Typically the session was deleted while the service was
            // working; the result is discarded.
            release(pool, session_id).await;
            return Err(err.into());
        }
    };

    let linked = session_queries::link_roadmap(pool, session_id, roadmap.id).await?;
    let roadmap = roadmap_queries::update_roadmap_title(pool, roadmap.id, &truncate_title(&linked.title))
        .await?;
    info!(
        session_id = %session_id,
        roadmap_id = %roadmap.id,
        topics = roadmap.total_topics,
        "roadmap linked"
    );

    let announcement = format!(
        "Your roadmap \"{}\" is ready: {} phases, {} topics, about {} hours of study.",
        roadmap.title,
        roadmap.total_phases,
        roadmap.total_topics,
        roadmap.total_hours.round()
    );
    let (session, reply) = append(
        pool,
        linked,
        MessageRole::Assistant,
        &announcement,
        Some(&json!({ "roadmapId": roadmap.id })),
    )
    .await?;

    turn.session = session;
    turn.replies.push(reply);
    turn.roadmap = Some(view::load(pool, user_id, roadmap.id).await?);
    Ok(turn)
}

/// Call the service and normalize its answer. Nothing is written here.
async fn fetch_draft(
    service: &dyn GenerationService,
    config: &OrchestratorConfig,
    request: &GenerateRequest,
) -> CoreResult<RoadmapDraft> {
    let payload = bounded(config.generate_timeout, service.generate(request)).await?;
    Ok(normalize(&payload)?)
}

/// Bound a service call independently of the adapter's own timeout.
async fn bounded<T>(
    limit: Duration,
    call: impl Future<Output = Result<T, GenerationError>>,
) -> CoreResult<T> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(CoreError::ServiceTimeout(limit)),
    }
}

/// Append a message and persist the header change it implies.
async fn append(
    pool: &PgPool,
    session: ChatSession,
    role: MessageRole,
    content: &str,
    metadata: Option<&Value>,
) -> CoreResult<(ChatSession, Message)> {
    let message = message_queries::append_message(pool, session.id, role, content, metadata).await?;
    let session = apply_message(session, role, content, message.created_at);
    session_queries::update_session_header(pool, session.id, &session.title, session.last_message_at)
        .await?;
    Ok((session, message))
}

async fn release(pool: &PgPool, session_id: Uuid) {
    if let Err(e) = session_queries::release_generation(pool, session_id).await {
        warn!(session_id = %session_id, error = %e, "failed to release generation claim");
    }
}

/// Tell the user what went wrong, then hand the error back to the caller.
async fn report_failure(pool: &PgPool, session: ChatSession, err: CoreError) -> CoreError {
    let session_id = session.id;
    warn!(session_id = %session_id, error = %err, "turn failed");

    if err.is_service_fault() {
        let metadata = json!({ "error": err.to_string() });
        if let Err(e) = append(pool, session, MessageRole::Assistant, &failure_text(&err), Some(&metadata)).await {
            warn!(session_id = %session_id, error = %e, "failed to record failure message");
        }
    }
    err
}

fn failure_text(err: &CoreError) -> String {
    let reason = match err {
        CoreError::ServiceUnavailable(_) => "the roadmap service is unreachable right now".to_owned(),
        CoreError::ServiceTimeout(_) => "the roadmap service took too long to answer".to_owned(),
        CoreError::NormalizationFailure(_) => {
            "the roadmap service sent back a roadmap I could not read".to_owned()
        }
        other => other.to_string(),
    };
    format!("Sorry, {reason}. Send another message to try again.")
}

/// The generation query: every user message, oldest first.
fn transcript(history: &[Message]) -> String {
    history
        .iter()
        .filter(|m| m.role == MessageRole::User)
        .map(|m| m.content.trim())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::roadmap::NormalizeError;

    fn msg(role: MessageRole, content: &str) -> Message {
        Message {
            id: 0,
            session_id: Uuid::nil(),
            seq: 0,
            role,
            content: content.into(),
            metadata: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn transcript_keeps_only_user_messages() {
        let history = [
            msg(MessageRole::User, "I want to learn DP "),
            msg(MessageRole::Assistant, "How long do you have?"),
            msg(MessageRole::User, "three weeks"),
        ];
        assert_eq!(transcript(&history), "I want to learn DP\nthree weeks");
    }

    #[test]
    fn failure_text_names_the_fault() {
        let text = failure_text(&CoreError::ServiceTimeout(Duration::from_secs(90)));
        assert!(text.contains("took too long"));

        let text = failure_text(&CoreError::NormalizationFailure(NormalizeError::NoTopics));
        assert!(text.contains("could not read"));

        let text = failure_text(&CoreError::ServiceRejected {
            status: 500,
            message: "LLM quota exhausted".into(),
        });
        assert!(text.contains("LLM quota exhausted"));
        assert!(text.ends_with("Send another message to try again."));
    }

    #[tokio::test]
    async fn bounded_converts_elapsed_into_timeout() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, GenerationError>(())
        };
        let err = bounded(Duration::from_millis(20), slow).await.unwrap_err();
        assert!(matches!(err, CoreError::ServiceTimeout(d) if d == Duration::from_millis(20)));

        let fast = async { Err::<(), _>(GenerationError::Unavailable("x".into())) };
        let err = bounded(Duration::from_secs(1), fast).await.unwrap_err();
        assert!(matches!(err, CoreError::ServiceUnavailable(_)));
    }
}
