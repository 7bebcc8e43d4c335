//! Database query functions for the `topic_progress` ledger.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::ProgressRecord;

/// Fetch the record for one (user, roadmap, topic) tuple.
pub async fn get_progress(
    pool: &PgPool,
    user_id: Uuid,
    roadmap_id: Uuid,
    topic_record_id: Uuid,
) -> Result<Option<ProgressRecord>> {
    let record = sqlx::query_as::<_, ProgressRecord>(
        "SELECT * FROM topic_progress \
         WHERE user_id = $1 AND roadmap_id = $2 AND topic_record_id = $3",
    )
    .bind(user_id)
    .bind(roadmap_id)
    .bind(topic_record_id)
    .fetch_optional(pool)
    .await
    .context("failed to fetch progress record")?;

    Ok(record)
}

/// Parameters for creating a progress record.
#[derive(Debug, Clone)]
pub struct NewProgress<'a> {
    pub user_id: Uuid,
    pub roadmap_id: Uuid,
    pub topic_record_id: Uuid,
    pub topic_source_id: &'a str,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Insert a progress record unless one already exists for the tuple.
///
/// Uses `ON CONFLICT DO NOTHING` on the `(user_id, roadmap_id,
/// topic_record_id)` key: `None` means another writer got there first and
/// the caller should update the existing row instead.
pub async fn try_insert_progress(
    pool: &PgPool,
    new: &NewProgress<'_>,
) -> Result<Option<ProgressRecord>> {
    let record = sqlx::query_as::<_, ProgressRecord>(
        "INSERT INTO topic_progress \
         (user_id, roadmap_id, topic_record_id, topic_source_id, completed, completed_at) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         ON CONFLICT (user_id, roadmap_id, topic_record_id) DO NOTHING \
         RETURNING *",
    )
    .bind(new.user_id)
    .bind(new.roadmap_id)
    .bind(new.topic_record_id)
    .bind(new.topic_source_id)
    .bind(new.completed)
    .bind(new.completed_at)
    .fetch_optional(pool)
    .await
    .context("failed to insert progress record")?;

    Ok(record)
}

/// Flip `completed` in place, stamping `completed_at` when it becomes true
/// and clearing it when it becomes false. The flip is computed by the
/// database from the current row value.
pub async fn toggle_completed(pool: &PgPool, id: Uuid) -> Result<ProgressRecord> {
    let record = sqlx::query_as::<_, ProgressRecord>(
        "UPDATE topic_progress \
         SET completed = NOT completed, \
             completed_at = CASE WHEN completed THEN NULL ELSE now() END, \
             updated_at = now() \
         WHERE id = $1 \
         RETURNING *",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("failed to toggle progress record")?;

    record.with_context(|| format!("progress record {id} not found"))
}

/// Update the free-form fields of a record. `None` leaves a field as is.
pub async fn update_details(
    pool: &PgPool,
    id: Uuid,
    notes: Option<&str>,
    rating: Option<i32>,
    time_spent_minutes: Option<i32>,
) -> Result<ProgressRecord> {
    let record = sqlx::query_as::<_, ProgressRecord>(
        "UPDATE topic_progress \
         SET notes = COALESCE($1, notes), \
             rating = COALESCE($2, rating), \
             time_spent_minutes = COALESCE($3, time_spent_minutes), \
             updated_at = now() \
         WHERE id = $4 \
         RETURNING *",
    )
    .bind(notes)
    .bind(rating)
    .bind(time_spent_minutes)
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("failed to update progress record")?;

    record.with_context(|| format!("progress record {id} not found"))
}

/// All of a user's records for one roadmap.
pub async fn list_progress_for_roadmap(
    pool: &PgPool,
    user_id: Uuid,
    roadmap_id: Uuid,
) -> Result<Vec<ProgressRecord>> {
    let records = sqlx::query_as::<_, ProgressRecord>(
        "SELECT * FROM topic_progress WHERE user_id = $1 AND roadmap_id = $2",
    )
    .bind(user_id)
    .bind(roadmap_id)
    .fetch_all(pool)
    .await
    .context("failed to list progress records")?;

    Ok(records)
}

/// Number of records stored for a tuple. Used to check the uniqueness
/// invariant from tests and diagnostics.
pub async fn count_progress(
    pool: &PgPool,
    user_id: Uuid,
    roadmap_id: Uuid,
    topic_record_id: Uuid,
) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM topic_progress \
         WHERE user_id = $1 AND roadmap_id = $2 AND topic_record_id = $3",
    )
    .bind(user_id)
    .bind(roadmap_id)
    .bind(topic_record_id)
    .fetch_one(pool)
    .await
    .context("failed to count progress records")?;

    Ok(count)
}

/// Ledger totals across every roadmap a user owns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerTotals {
    pub roadmaps: i64,
    pub records: i64,
    pub completed: i64,
    pub time_spent_minutes: i64,
}

/// Aggregate a user's progress over the roadmaps they own. Records left on
/// roadmaps owned by someone else are not counted.
pub async fn ledger_totals(pool: &PgPool, user_id: Uuid) -> Result<LedgerTotals> {
    let (roadmaps,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM roadmaps WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(pool)
        .await
        .context("failed to count roadmaps")?;

    let (records, completed, time_spent_minutes): (i64, i64, i64) = sqlx::query_as(
        "SELECT COUNT(*), \
                COUNT(*) FILTER (WHERE tp.completed), \
                COALESCE(SUM(tp.time_spent_minutes), 0)::BIGINT \
         FROM topic_progress tp \
         JOIN roadmaps r ON r.id = tp.roadmap_id \
         WHERE tp.user_id = $1 AND r.user_id = $1",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await
    .context("failed to aggregate progress records")?;

    Ok(LedgerTotals {
        roadmaps,
        records,
        completed,
        time_spent_minutes,
    })
}
