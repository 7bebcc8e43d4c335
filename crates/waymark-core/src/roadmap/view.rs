//! The persisted roadmap as shown to callers.
//!
//! [`assemble`] is pure and groups flat topic rows under their phases;
//! [`load`] fetches the rows for an owned roadmap and assembles them.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use waymark_db::models::{Difficulty, Phase, Resource, Roadmap, RoadmapStatus, Topic};
use waymark_db::queries::roadmaps as roadmap_queries;

use super::ByDifficulty;
use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoadmapView {
    pub id: Uuid,
    pub session_id: Option<Uuid>,
    pub title: String,
    pub description: String,
    pub ai_summary: String,
    pub phases: Vec<PhaseView>,
    pub stats: RoadmapStats,
    pub status: RoadmapStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseView {
    pub phase_number: i32,
    pub phase_name: String,
    pub description: String,
    pub total_hours: f64,
    pub topics: Vec<TopicView>,
}

/// A topic as exposed to callers. `id` is the store identity used by the
/// progress ledger; `topic_id` is the upstream corpus key.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicView {
    pub id: Uuid,
    pub topic_id: String,
    pub topic: String,
    pub description: String,
    pub difficulty: Difficulty,
    pub estimated_hours: f64,
    pub prerequisites: Vec<String>,
    pub resources: Vec<Resource>,
    pub order: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoadmapStats {
    pub total_phases: usize,
    pub total_topics: usize,
    pub total_hours: f64,
    pub by_difficulty: ByDifficulty<usize>,
}

impl From<Topic> for TopicView {
    fn from(t: Topic) -> Self {
        Self {
            id: t.id,
            topic_id: t.topic_id,
            topic: t.topic,
            description: t.description,
            difficulty: t.difficulty,
            estimated_hours: t.estimated_hours,
            prerequisites: t.prerequisites,
            resources: t.resources.0,
            order: t.order,
        }
    }
}

/// Build the caller-facing tree. `phases` must be ordered by phase number;
/// topics are placed under the phase they reference, in the given order.
pub fn assemble(roadmap: Roadmap, phases: Vec<Phase>, topics: Vec<Topic>) -> RoadmapView {
    let mut stats = RoadmapStats {
        total_phases: phases.len(),
        ..Default::default()
    };

    let mut views: Vec<(Uuid, PhaseView)> = phases
        .into_iter()
        .map(|p| {
            (
                p.id,
                PhaseView {
                    phase_number: p.phase_number,
                    phase_name: p.phase_name,
                    description: p.description,
                    total_hours: 0.0,
                    topics: Vec::new(),
                },
            )
        })
        .collect();

    for topic in topics {
        let Some((_, phase)) = views.iter_mut().find(|(id, _)| *id == topic.phase_id) else {
            continue;
        };
        stats.total_topics += 1;
        stats.total_hours += topic.estimated_hours;
        *stats.by_difficulty.get_mut(topic.difficulty) += 1;
        phase.total_hours += topic.estimated_hours;
        phase.topics.push(topic.into());
    }

    RoadmapView {
        id: roadmap.id,
        session_id: roadmap.session_id,
        title: roadmap.title,
        description: roadmap.description,
        ai_summary: roadmap.ai_summary,
        phases: views.into_iter().map(|(_, view)| view).collect(),
        stats,
        status: roadmap.status,
        created_at: roadmap.created_at,
    }
}

/// Load a roadmap owned by `user_id`. Foreign and missing roadmaps are
/// indistinguishable.
pub async fn load(pool: &PgPool, user_id: Uuid, roadmap_id: Uuid) -> CoreResult<RoadmapView> {
    let roadmap = roadmap_queries::get_roadmap_for_user(pool, roadmap_id, user_id)
        .await?
        .ok_or_else(|| CoreError::not_found(format!("roadmap {roadmap_id}")))?;

    let phases = roadmap_queries::list_phases(pool, roadmap.id).await?;
    let topics = roadmap_queries::list_topics(pool, roadmap.id).await?;

    Ok(assemble(roadmap, phases, topics))
}

pub async fn list(pool: &PgPool, user_id: Uuid) -> CoreResult<Vec<Roadmap>> {
    Ok(roadmap_queries::list_roadmaps_for_user(pool, user_id).await?)
}

/// Move an owned roadmap to `status` and return the refreshed view.
pub async fn set_status(
    pool: &PgPool,
    user_id: Uuid,
    roadmap_id: Uuid,
    status: RoadmapStatus,
) -> CoreResult<RoadmapView> {
    let roadmap = roadmap_queries::get_roadmap_for_user(pool, roadmap_id, user_id)
        .await?
        .ok_or_else(|| CoreError::not_found(format!("roadmap {roadmap_id}")))?;
    roadmap_queries::update_roadmap_status(pool, roadmap.id, status).await?;
    info!(roadmap_id = %roadmap_id, status = %status, "roadmap status changed");
    load(pool, user_id, roadmap_id).await
}

/// Delete an owned roadmap with its phases, topics and progress records.
pub async fn delete(pool: &PgPool, user_id: Uuid, roadmap_id: Uuid) -> CoreResult<()> {
    if !roadmap_queries::delete_roadmap(pool, roadmap_id, user_id).await? {
        return Err(CoreError::not_found(format!("roadmap {roadmap_id}")));
    }
    info!(roadmap_id = %roadmap_id, user_id = %user_id, "roadmap deleted");
    Ok(())
}
