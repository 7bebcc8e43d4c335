//! Database query functions for the append-only `messages` table.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{Message, MessageRole};

/// Append a message to a session.
///
/// The session row is locked for the duration of the insert so that
/// overlapping requests for the same session get consecutive `seq` values
/// instead of colliding on `UNIQUE (session_id, seq)`.
pub async fn append_message(
    pool: &PgPool,
    session_id: Uuid,
    role: MessageRole,
    content: &str,
    metadata: Option<&serde_json::Value>,
) -> Result<Message> {
    let mut tx = pool.begin().await.context("failed to begin transaction")?;

    let locked: Option<(Uuid,)> =
        sqlx::query_as("SELECT id FROM chat_sessions WHERE id = $1 FOR UPDATE")
            .bind(session_id)
            .fetch_optional(&mut *tx)
            .await
            .context("failed to lock chat session")?;
    if locked.is_none() {
        anyhow::bail!("chat session {session_id} not found");
    }

    let message = sqlx::query_as::<_, Message>(
        "INSERT INTO messages (session_id, seq, role, content, metadata) \
         SELECT $1, COALESCE(MAX(seq), 0) + 1, $2, $3, $4 \
         FROM messages WHERE session_id = $1 \
         RETURNING *",
    )
    .bind(session_id)
    .bind(role)
    .bind(content)
    .bind(metadata)
    .fetch_one(&mut *tx)
    .await
    .context("failed to insert message")?;

    tx.commit().await.context("failed to commit transaction")?;

    Ok(message)
}

/// All messages of a session in append order.
pub async fn list_messages(pool: &PgPool, session_id: Uuid) -> Result<Vec<Message>> {
    let messages = sqlx::query_as::<_, Message>(
        "SELECT * FROM messages WHERE session_id = $1 ORDER BY seq ASC",
    )
    .bind(session_id)
    .fetch_all(pool)
    .await
    .context("failed to list messages")?;

    Ok(messages)
}
