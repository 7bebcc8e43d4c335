//! Database query functions for the `chat_sessions` table.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::ChatSession;

/// Insert a new, empty session. `title` falls back to the column default
/// (`New Chat`) when `None`.
pub async fn insert_session(
    pool: &PgPool,
    user_id: Uuid,
    title: Option<&str>,
    domain: Option<&str>,
) -> Result<ChatSession> {
    let session = sqlx::query_as::<_, ChatSession>(
        "INSERT INTO chat_sessions (user_id, title, domain) \
         VALUES ($1, COALESCE($2, 'New Chat'), $3) \
         RETURNING *",
    )
    .bind(user_id)
    .bind(title)
    .bind(domain)
    .fetch_one(pool)
    .await
    .context("failed to insert chat session")?;

    Ok(session)
}

/// Fetch a session by ID regardless of owner.
pub async fn get_session(pool: &PgPool, id: Uuid) -> Result<Option<ChatSession>> {
    let session = sqlx::query_as::<_, ChatSession>("SELECT * FROM chat_sessions WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch chat session")?;

    Ok(session)
}

/// Fetch a session only if `user_id` owns it.
pub async fn get_session_for_user(
    pool: &PgPool,
    id: Uuid,
    user_id: Uuid,
) -> Result<Option<ChatSession>> {
    let session = sqlx::query_as::<_, ChatSession>(
        "SELECT * FROM chat_sessions WHERE id = $1 AND user_id = $2",
    )
    .bind(id)
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .context("failed to fetch chat session for user")?;

    Ok(session)
}

/// List a user's sessions, most recently active first.
pub async fn list_sessions_for_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<ChatSession>> {
    let sessions = sqlx::query_as::<_, ChatSession>(
        "SELECT * FROM chat_sessions WHERE user_id = $1 ORDER BY last_message_at DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .context("failed to list chat sessions")?;

    Ok(sessions)
}

/// Persist the header fields that change when a message is appended.
pub async fn update_session_header(
    pool: &PgPool,
    id: Uuid,
    title: &str,
    last_message_at: DateTime<Utc>,
) -> Result<()> {
    let result = sqlx::query(
        "UPDATE chat_sessions SET title = $1, last_message_at = $2 WHERE id = $3",
    )
    .bind(title)
    .bind(last_message_at)
    .bind(id)
    .execute(pool)
    .await
    .context("failed to update chat session header")?;

    if result.rows_affected() == 0 {
        anyhow::bail!("chat session {id} not found");
    }

    Ok(())
}

/// Atomically flip `generation_completed` from false to true.
///
/// Returns `true` if this caller won the claim. A concurrent caller for the
/// same session sees `false` and must not start a second generation.
pub async fn claim_generation(pool: &PgPool, id: Uuid) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE chat_sessions SET generation_completed = true \
         WHERE id = $1 AND generation_completed = false",
    )
    .bind(id)
    .execute(pool)
    .await
    .context("failed to claim generation")?;

    Ok(result.rows_affected() == 1)
}

/// Undo a claim after a failed generation so the next user message can
/// trigger again. A session that already links a roadmap is left alone.
pub async fn release_generation(pool: &PgPool, id: Uuid) -> Result<()> {
    sqlx::query(
        "UPDATE chat_sessions SET generation_completed = false \
         WHERE id = $1 AND roadmap_id IS NULL",
    )
    .bind(id)
    .execute(pool)
    .await
    .context("failed to release generation claim")?;

    Ok(())
}

/// Point the session at its generated roadmap.
pub async fn link_roadmap(pool: &PgPool, session_id: Uuid, roadmap_id: Uuid) -> Result<ChatSession> {
    let session = sqlx::query_as::<_, ChatSession>(
        "UPDATE chat_sessions SET roadmap_id = $1, generation_completed = true \
         WHERE id = $2 \
         RETURNING *",
    )
    .bind(roadmap_id)
    .bind(session_id)
    .fetch_optional(pool)
    .await
    .context("failed to link roadmap to session")?;

    session.with_context(|| format!("chat session {session_id} not found"))
}

/// Delete a session and, by cascade, its messages. A linked roadmap
/// survives with its `session_id` cleared.
pub async fn delete_session(pool: &PgPool, id: Uuid, user_id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM chat_sessions WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user_id)
        .execute(pool)
        .await
        .context("failed to delete chat session")?;

    Ok(result.rows_affected() == 1)
}
