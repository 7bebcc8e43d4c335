//! `waymark progress` commands.

use anyhow::Result;
use sqlx::PgPool;
use uuid::Uuid;

use waymark_core::progress::{self, ProgressStats, ProgressUpdate};

use crate::parse_id;

pub async fn run_toggle(pool: &PgPool, user: Uuid, roadmap_id: &str, topic: &str) -> Result<()> {
    let roadmap_id = parse_id(roadmap_id, "roadmap")?;
    let topic = parse_id(topic, "topic")?;

    let outcome = progress::toggle(pool, user, roadmap_id, topic).await?;
    match outcome.progress.completed_at {
        Some(at) if outcome.progress.completed => {
            println!("Completed at {}", at.format("%Y-%m-%d %H:%M:%S UTC"));
        }
        _ => println!("Marked not completed"),
    }
    print_stats(&outcome.stats);
    Ok(())
}

pub async fn run_update(
    pool: &PgPool,
    user: Uuid,
    roadmap_id: &str,
    topic: &str,
    notes: Option<String>,
    rating: Option<i32>,
    minutes: Option<i32>,
) -> Result<()> {
    let roadmap_id = parse_id(roadmap_id, "roadmap")?;
    let topic = parse_id(topic, "topic")?;
    let update = ProgressUpdate {
        notes,
        rating,
        time_spent_minutes: minutes,
    };

    let record = progress::update_entry(pool, user, roadmap_id, topic, &update).await?;
    println!("Topic {} ({})", record.topic_source_id, record.topic_record_id);
    println!("  completed: {}", record.completed);
    if let Some(rating) = record.rating {
        println!("  rating: {rating}/5");
    }
    println!("  time spent: {} min", record.time_spent_minutes);
    if !record.notes.is_empty() {
        println!("  notes: {}", record.notes);
    }
    Ok(())
}

pub async fn run_stats(pool: &PgPool, user: Uuid, roadmap_id: &str) -> Result<()> {
    let roadmap_id = parse_id(roadmap_id, "roadmap")?;
    let stats = progress::stats(pool, user, roadmap_id).await?;
    print_stats(&stats);
    Ok(())
}

pub async fn run_overall(pool: &PgPool, user: Uuid) -> Result<()> {
    let overall = progress::overall_stats(pool, user).await?;
    println!("Roadmaps: {}", overall.total_roadmaps);
    println!(
        "Progress: {}/{} tracked topics completed ({}%)",
        overall.completed_records, overall.total_records, overall.percentage_complete
    );
    println!("Time spent: {} min", overall.time_spent_minutes);
    Ok(())
}

fn print_stats(stats: &ProgressStats) {
    println!(
        "Progress: {}/{} topics ({}%)",
        stats.completed_topics, stats.total_topics, stats.percentage_complete
    );
    let d = &stats.by_difficulty;
    println!(
        "  easy={}/{} medium={}/{} hard={}/{}",
        d.easy.completed,
        d.easy.total,
        d.medium.completed,
        d.medium.total,
        d.hard.completed,
        d.hard.total
    );
}
