//! Database query functions for the `roadmaps`, `phases`, and `topics`
//! tables.

use anyhow::{Context, Result};
use sqlx::PgPool;
use sqlx::types::Json;
use uuid::Uuid;

use crate::models::{Phase, Roadmap, RoadmapDraft, RoadmapStatus, Topic};

/// Insert a roadmap with all of its phases and topics in one transaction.
///
/// Stored totals are computed from `draft` itself. Returns `None` when
/// `session_id` already owns a roadmap: the `UNIQUE (session_id)`
/// constraint makes a racing second writer lose instead of duplicating.
pub async fn insert_roadmap(
    pool: &PgPool,
    user_id: Uuid,
    session_id: Option<Uuid>,
    draft: &RoadmapDraft,
) -> Result<Option<Roadmap>> {
    let mut tx = pool.begin().await.context("failed to begin transaction")?;

    let total_topics =
        i32::try_from(draft.total_topics()).context("roadmap has too many topics")?;
    let total_phases =
        i32::try_from(draft.phases.len()).context("roadmap has too many phases")?;

    let roadmap = sqlx::query_as::<_, Roadmap>(
        "INSERT INTO roadmaps (user_id, session_id, title, description, ai_summary, \
         total_phases, total_topics, total_hours, metadata) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
         ON CONFLICT (session_id) DO NOTHING \
         RETURNING *",
    )
    .bind(user_id)
    .bind(session_id)
    .bind(&draft.title)
    .bind(&draft.description)
    .bind(&draft.ai_summary)
    .bind(total_phases)
    .bind(total_topics)
    .bind(draft.total_hours())
    .bind(&draft.metadata)
    .fetch_optional(&mut *tx)
    .await
    .context("failed to insert roadmap")?;

    let Some(roadmap) = roadmap else {
        // Nothing written; dropping the transaction rolls it back.
        return Ok(None);
    };

    for phase in &draft.phases {
        let (phase_id,): (Uuid,) = sqlx::query_as(
            "INSERT INTO phases (roadmap_id, phase_number, phase_name, description, total_hours) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING id",
        )
        .bind(roadmap.id)
        .bind(phase.phase_number)
        .bind(&phase.phase_name)
        .bind(&phase.description)
        .bind(phase.total_hours())
        .fetch_one(&mut *tx)
        .await
        .with_context(|| format!("failed to insert phase {}", phase.phase_number))?;

        for (position, topic) in phase.topics.iter().enumerate() {
            sqlx::query(
                "INSERT INTO topics (roadmap_id, phase_id, position, topic_id, topic, description, \
                 difficulty, estimated_hours, prerequisites, resources, topic_order) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
            )
            .bind(roadmap.id)
            .bind(phase_id)
            .bind(position as i32)
            .bind(&topic.topic_id)
            .bind(&topic.topic)
            .bind(&topic.description)
            .bind(topic.difficulty)
            .bind(topic.estimated_hours)
            .bind(&topic.prerequisites)
            .bind(Json(&topic.resources))
            .bind(topic.order)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("failed to insert topic {:?}", topic.topic_id))?;
        }
    }

    tx.commit().await.context("failed to commit transaction")?;

    Ok(Some(roadmap))
}

/// Fetch a roadmap by ID regardless of owner.
pub async fn get_roadmap(pool: &PgPool, id: Uuid) -> Result<Option<Roadmap>> {
    let roadmap = sqlx::query_as::<_, Roadmap>("SELECT * FROM roadmaps WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch roadmap")?;

    Ok(roadmap)
}

/// Fetch a roadmap only if `user_id` owns it.
pub async fn get_roadmap_for_user(
    pool: &PgPool,
    id: Uuid,
    user_id: Uuid,
) -> Result<Option<Roadmap>> {
    let roadmap = sqlx::query_as::<_, Roadmap>(
        "SELECT * FROM roadmaps WHERE id = $1 AND user_id = $2",
    )
    .bind(id)
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .context("failed to fetch roadmap for user")?;

    Ok(roadmap)
}

/// Fetch the roadmap generated from a session, if any.
pub async fn get_roadmap_for_session(pool: &PgPool, session_id: Uuid) -> Result<Option<Roadmap>> {
    let roadmap = sqlx::query_as::<_, Roadmap>("SELECT * FROM roadmaps WHERE session_id = $1")
        .bind(session_id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch roadmap for session")?;

    Ok(roadmap)
}

/// List a user's roadmaps, newest first.
pub async fn list_roadmaps_for_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<Roadmap>> {
    let roadmaps = sqlx::query_as::<_, Roadmap>(
        "SELECT * FROM roadmaps WHERE user_id = $1 ORDER BY created_at DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .context("failed to list roadmaps")?;

    Ok(roadmaps)
}

/// Phases of a roadmap in ascending `phase_number`.
pub async fn list_phases(pool: &PgPool, roadmap_id: Uuid) -> Result<Vec<Phase>> {
    let phases = sqlx::query_as::<_, Phase>(
        "SELECT * FROM phases WHERE roadmap_id = $1 ORDER BY phase_number ASC",
    )
    .bind(roadmap_id)
    .fetch_all(pool)
    .await
    .context("failed to list phases")?;

    Ok(phases)
}

/// Every topic of a roadmap, ordered by phase and then by position inside
/// the phase.
pub async fn list_topics(pool: &PgPool, roadmap_id: Uuid) -> Result<Vec<Topic>> {
    let topics = sqlx::query_as::<_, Topic>(
        "SELECT t.* FROM topics t \
         JOIN phases p ON p.id = t.phase_id \
         WHERE t.roadmap_id = $1 \
         ORDER BY p.phase_number ASC, t.position ASC",
    )
    .bind(roadmap_id)
    .fetch_all(pool)
    .await
    .context("failed to list topics")?;

    Ok(topics)
}

/// Fetch one topic row, scoped to its roadmap.
pub async fn get_topic(pool: &PgPool, roadmap_id: Uuid, topic_record_id: Uuid) -> Result<Option<Topic>> {
    let topic = sqlx::query_as::<_, Topic>(
        "SELECT * FROM topics WHERE id = $1 AND roadmap_id = $2",
    )
    .bind(topic_record_id)
    .bind(roadmap_id)
    .fetch_optional(pool)
    .await
    .context("failed to fetch topic")?;

    Ok(topic)
}

/// Overwrite a roadmap's title.
pub async fn update_roadmap_title(pool: &PgPool, id: Uuid, title: &str) -> Result<Roadmap> {
    let roadmap = sqlx::query_as::<_, Roadmap>(
        "UPDATE roadmaps SET title = $1 WHERE id = $2 RETURNING *",
    )
    .bind(title)
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("failed to update roadmap title")?;

    roadmap.with_context(|| format!("roadmap {id} not found"))
}

/// Set a roadmap's lifecycle status.
pub async fn update_roadmap_status(pool: &PgPool, id: Uuid, status: RoadmapStatus) -> Result<()> {
    let result = sqlx::query("UPDATE roadmaps SET status = $1 WHERE id = $2")
        .bind(status)
        .bind(id)
        .execute(pool)
        .await
        .context("failed to update roadmap status")?;

    if result.rows_affected() == 0 {
        anyhow::bail!("roadmap {id} not found");
    }

    Ok(())
}

/// Delete a roadmap owned by `user_id`.
///
/// Phases, topics and progress rows go with it by cascade; the source
/// session's `roadmap_id` is cleared by `ON DELETE SET NULL`. Returns
/// `false` when nothing matched.
pub async fn delete_roadmap(pool: &PgPool, id: Uuid, user_id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM roadmaps WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user_id)
        .execute(pool)
        .await
        .context("failed to delete roadmap")?;

    Ok(result.rows_affected() == 1)
}
