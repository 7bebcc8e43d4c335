//! `waymark roadmap` commands.

use anyhow::Result;
use sqlx::PgPool;
use uuid::Uuid;

use waymark_core::progress;
use waymark_core::roadmap::{RoadmapView, view};
use waymark_db::models::RoadmapStatus;

use crate::parse_id;

pub async fn run_list(pool: &PgPool, user: Uuid) -> Result<()> {
    let roadmaps = view::list(pool, user).await?;
    if roadmaps.is_empty() {
        println!("No roadmaps found.");
        return Ok(());
    }

    for roadmap in &roadmaps {
        let stats = progress::stats(pool, user, roadmap.id).await?;
        println!(
            "  {}  {}  [{}]  {}/{} topics ({}%)",
            roadmap.id,
            roadmap.title,
            roadmap.status,
            stats.completed_topics,
            stats.total_topics,
            stats.percentage_complete
        );
    }
    Ok(())
}

/// Print the roadmap tree, marking completed topics.
pub async fn run_show(pool: &PgPool, user: Uuid, roadmap_id: &str) -> Result<()> {
    let roadmap_id = parse_id(roadmap_id, "roadmap")?;
    let roadmap = view::load(pool, user, roadmap_id).await?;
    let records = progress::records(pool, user, roadmap_id).await?;
    let done: Vec<Uuid> = records
        .iter()
        .filter(|r| r.completed)
        .map(|r| r.topic_record_id)
        .collect();

    print_header(&roadmap);
    for phase in &roadmap.phases {
        println!();
        println!(
            "Phase {}: {} ({:.1}h)",
            phase.phase_number, phase.phase_name, phase.total_hours
        );
        for topic in &phase.topics {
            let mark = if done.contains(&topic.id) { "x" } else { " " };
            println!(
                "  [{mark}] {} ({}, {:.1}h)  {}",
                topic.topic, topic.difficulty, topic.estimated_hours, topic.id
            );
        }
    }
    Ok(())
}

pub async fn run_status(
    pool: &PgPool,
    user: Uuid,
    roadmap_id: &str,
    status: RoadmapStatus,
) -> Result<()> {
    let roadmap_id = parse_id(roadmap_id, "roadmap")?;
    let roadmap = view::set_status(pool, user, roadmap_id, status).await?;
    println!("Roadmap {} is now {}", roadmap.id, roadmap.status);
    Ok(())
}

pub async fn run_delete(pool: &PgPool, user: Uuid, roadmap_id: &str) -> Result<()> {
    let roadmap_id = parse_id(roadmap_id, "roadmap")?;
    view::delete(pool, user, roadmap_id).await?;
    println!("Deleted roadmap {roadmap_id}");
    Ok(())
}

fn print_header(roadmap: &RoadmapView) {
    println!("Roadmap: {} ({})", roadmap.title, roadmap.id);
    println!("Status: {}", roadmap.status);
    println!(
        "Created: {}",
        roadmap.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    if !roadmap.description.is_empty() {
        println!("{}", roadmap.description);
    }
    let stats = &roadmap.stats;
    println!(
        "{} phases, {} topics, {:.1}h  (easy={} medium={} hard={})",
        stats.total_phases,
        stats.total_topics,
        stats.total_hours,
        stats.by_difficulty.easy,
        stats.by_difficulty.medium,
        stats.by_difficulty.hard
    );
}
