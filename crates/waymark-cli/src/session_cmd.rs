//! `waymark session` commands: start, inspect and talk to a session.

use anyhow::Result;
use sqlx::PgPool;
use uuid::Uuid;

use waymark_core::conversation::{self, OrchestratorConfig, TurnOutcome};
use waymark_core::generation::GenerationService;
use waymark_db::models::Message;

use crate::parse_id;

pub async fn run_new(
    pool: &PgPool,
    user: Uuid,
    title: Option<&str>,
    domain: Option<&str>,
) -> Result<()> {
    let session = conversation::create_session(pool, user, title, domain).await?;
    println!("Created session: {} ({})", session.title, session.id);
    if let Some(domain) = &session.domain {
        println!("Domain: {domain}");
    }
    Ok(())
}

pub async fn run_list(pool: &PgPool, user: Uuid) -> Result<()> {
    let sessions = conversation::list_sessions(pool, user).await?;
    if sessions.is_empty() {
        println!("No sessions found.");
        return Ok(());
    }

    for session in &sessions {
        let marker = if session.roadmap_id.is_some() { "+" } else { " " };
        println!(
            "  [{marker}] {}  {}  (last message {})",
            session.id,
            session.title,
            session.last_message_at.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}

pub async fn run_show(pool: &PgPool, user: Uuid, session_id: &str) -> Result<()> {
    let session_id = parse_id(session_id, "session")?;
    let detail = conversation::load_session(pool, user, session_id).await?;

    println!("Session: {} ({})", detail.session.title, detail.session.id);
    if let Some(roadmap_id) = detail.session.roadmap_id {
        println!("Roadmap: {roadmap_id}");
    }
    println!();
    for message in &detail.messages {
        print_message(message);
    }
    Ok(())
}

/// Send one message and print what the turn produced.
pub async fn run_send(
    pool: &PgPool,
    service: &dyn GenerationService,
    config: &OrchestratorConfig,
    user: Uuid,
    session_id: &str,
    message: &str,
) -> Result<()> {
    let session_id = parse_id(session_id, "session")?;
    let turn = conversation::handle_user_message(pool, service, config, user, session_id, message)
        .await?;
    print_turn(&turn);
    Ok(())
}

pub async fn run_delete(pool: &PgPool, user: Uuid, session_id: &str) -> Result<()> {
    let session_id = parse_id(session_id, "session")?;
    conversation::delete_session(pool, user, session_id).await?;
    println!("Deleted session {session_id}");
    Ok(())
}

fn print_turn(turn: &TurnOutcome) {
    for reply in &turn.replies {
        print_message(reply);
    }
    if let Some(roadmap) = &turn.roadmap {
        println!();
        println!(
            "Roadmap {} ready: run `waymark roadmap show {}`",
            roadmap.title, roadmap.id
        );
    }
}

fn print_message(message: &Message) {
    println!("[{}] {}: {}", message.seq, message.role, message.content);
}
