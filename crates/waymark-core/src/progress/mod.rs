//! Per-user completion ledger over a roadmap's topics.
//!
//! Topic rows are the source of truth for totals; progress records only
//! contribute completion. A record exists at most once per
//! (user, roadmap, topic) and the store enforces it, so concurrent first
//! toggles race on `ON CONFLICT DO NOTHING` and the loser flips the
//! winner's row.

use std::collections::HashSet;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{debug, info};
use uuid::Uuid;

use waymark_db::models::{ProgressRecord, Roadmap, Topic};
use waymark_db::queries::progress::{self as progress_queries, NewProgress};
use waymark_db::queries::roadmaps as roadmap_queries;

use crate::error::{CoreError, CoreResult};
use crate::roadmap::ByDifficulty;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DifficultyProgress {
    pub total: usize,
    pub completed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressStats {
    pub total_topics: usize,
    pub completed_topics: usize,
    /// Integer in `[0, 100]`; 0 for a roadmap without topics.
    pub percentage_complete: u8,
    pub by_difficulty: ByDifficulty<DifficultyProgress>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallStats {
    pub total_roadmaps: i64,
    pub total_records: i64,
    pub completed_records: i64,
    pub percentage_complete: u8,
    pub time_spent_minutes: i64,
}

/// The slice of a record returned by a toggle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSummary {
    pub id: Uuid,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToggleOutcome {
    pub progress: ProgressSummary,
    pub stats: ProgressStats,
}

/// Optional edits to a record's free-form fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub notes: Option<String>,
    pub rating: Option<i32>,
    pub time_spent_minutes: Option<i32>,
}

impl ProgressUpdate {
    pub fn validate(&self) -> CoreResult<()> {
        if let Some(rating) = self.rating {
            if !(1..=5).contains(&rating) {
                return Err(CoreError::validation(format!(
                    "rating must be between 1 and 5, got {rating}"
                )));
            }
        }
        if let Some(minutes) = self.time_spent_minutes {
            if minutes < 0 {
                return Err(CoreError::validation(format!(
                    "time spent must not be negative, got {minutes}"
                )));
            }
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_none() && self.rating.is_none() && self.time_spent_minutes.is_none()
    }
}

fn percentage(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let pct = (done.min(total) as f64 / total as f64 * 100.0).round();
    pct as u8
}

/// Cross-reference topics against records. Records for topics not in
/// `topics` are ignored.
pub fn compute_stats(topics: &[Topic], records: &[ProgressRecord]) -> ProgressStats {
    let done: HashSet<Uuid> = records
        .iter()
        .filter(|r| r.completed)
        .map(|r| r.topic_record_id)
        .collect();

    let mut stats = ProgressStats {
        total_topics: topics.len(),
        ..Default::default()
    };
    for topic in topics {
        let bucket = stats.by_difficulty.get_mut(topic.difficulty);
        bucket.total += 1;
        if done.contains(&topic.id) {
            bucket.completed += 1;
            stats.completed_topics += 1;
        }
    }
    stats.percentage_complete = percentage(stats.completed_topics as u64, stats.total_topics as u64);
    stats
}

async fn owned_roadmap(pool: &PgPool, user_id: Uuid, roadmap_id: Uuid) -> CoreResult<Roadmap> {
    roadmap_queries::get_roadmap_for_user(pool, roadmap_id, user_id)
        .await?
        .ok_or_else(|| CoreError::not_found(format!("roadmap {roadmap_id}")))
}

async fn roadmap_topic(pool: &PgPool, roadmap_id: Uuid, topic_record_id: Uuid) -> CoreResult<Topic> {
    roadmap_queries::get_topic(pool, roadmap_id, topic_record_id)
        .await?
        .ok_or_else(|| CoreError::not_found(format!("topic {topic_record_id}")))
}

/// Return the existing record, or create it with the given completion. A
/// concurrent creator wins the insert and its row is returned with
/// `created == false`.
async fn get_or_create(
    pool: &PgPool,
    user_id: Uuid,
    topic: &Topic,
    completed: bool,
) -> CoreResult<(ProgressRecord, bool)> {
    if let Some(existing) =
        progress_queries::get_progress(pool, user_id, topic.roadmap_id, topic.id).await?
    {
        return Ok((existing, false));
    }

    let new = NewProgress {
        user_id,
        roadmap_id: topic.roadmap_id,
        topic_record_id: topic.id,
        topic_source_id: &topic.topic_id,
        completed,
        completed_at: completed.then(Utc::now),
    };
    if let Some(created) = progress_queries::try_insert_progress(pool, &new).await? {
        return Ok((created, true));
    }

    debug!(topic_record_id = %topic.id, "progress insert lost race, using existing row");
    let existing = progress_queries::get_progress(pool, user_id, topic.roadmap_id, topic.id)
        .await?
        .context("progress record vanished after conflicting insert")?;
    Ok((existing, false))
}

/// Flip a topic's completion for the user.
///
/// A missing record is created completed; an existing one is flipped in
/// place. Ownership of the roadmap is checked before anything else.
pub async fn toggle(
    pool: &PgPool,
    user_id: Uuid,
    roadmap_id: Uuid,
    topic_record_id: Uuid,
) -> CoreResult<ToggleOutcome> {
    let roadmap = owned_roadmap(pool, user_id, roadmap_id).await?;
    let topic = roadmap_topic(pool, roadmap.id, topic_record_id).await?;

    let (record, created) = get_or_create(pool, user_id, &topic, true).await?;
    let record = if created {
        record
    } else {
        progress_queries::toggle_completed(pool, record.id).await?
    };

    info!(
        user_id = %user_id,
        roadmap_id = %roadmap.id,
        topic_id = %topic.topic_id,
        completed = record.completed,
        "topic toggled"
    );

    let stats = stats_for(pool, user_id, &roadmap).await?;
    Ok(ToggleOutcome {
        progress: ProgressSummary {
            id: record.id,
            completed: record.completed,
            completed_at: record.completed_at,
        },
        stats,
    })
}

async fn stats_for(pool: &PgPool, user_id: Uuid, roadmap: &Roadmap) -> CoreResult<ProgressStats> {
    let topics = roadmap_queries::list_topics(pool, roadmap.id).await?;
    let records = progress_queries::list_progress_for_roadmap(pool, user_id, roadmap.id).await?;
    Ok(compute_stats(&topics, &records))
}

/// Completion statistics of one owned roadmap.
pub async fn stats(pool: &PgPool, user_id: Uuid, roadmap_id: Uuid) -> CoreResult<ProgressStats> {
    let roadmap = owned_roadmap(pool, user_id, roadmap_id).await?;
    stats_for(pool, user_id, &roadmap).await
}

/// The user's records for one owned roadmap.
pub async fn records(
    pool: &PgPool,
    user_id: Uuid,
    roadmap_id: Uuid,
) -> CoreResult<Vec<ProgressRecord>> {
    let roadmap = owned_roadmap(pool, user_id, roadmap_id).await?;
    Ok(progress_queries::list_progress_for_roadmap(pool, user_id, roadmap.id).await?)
}

pub async fn overall_stats(pool: &PgPool, user_id: Uuid) -> CoreResult<OverallStats> {
    let totals = progress_queries::ledger_totals(pool, user_id).await?;
    Ok(OverallStats {
        total_roadmaps: totals.roadmaps,
        total_records: totals.records,
        completed_records: totals.completed,
        percentage_complete: percentage(totals.completed.max(0) as u64, totals.records.max(0) as u64),
        time_spent_minutes: totals.time_spent_minutes,
    })
}

/// Edit notes, rating or time spent. Creates a not-completed record when
/// the topic has none yet.
pub async fn update_entry(
    pool: &PgPool,
    user_id: Uuid,
    roadmap_id: Uuid,
    topic_record_id: Uuid,
    update: &ProgressUpdate,
) -> CoreResult<ProgressRecord> {
    update.validate()?;
    let roadmap = owned_roadmap(pool, user_id, roadmap_id).await?;
    let topic = roadmap_topic(pool, roadmap.id, topic_record_id).await?;

    let (record, _) = get_or_create(pool, user_id, &topic, false).await?;
    if update.is_empty() {
        return Ok(record);
    }

    Ok(progress_queries::update_details(
        pool,
        record.id,
        update.notes.as_deref(),
        update.rating,
        update.time_spent_minutes,
    )
    .await?)
}
