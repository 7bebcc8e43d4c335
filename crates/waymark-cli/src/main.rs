mod config;
mod progress_cmd;
mod roadmap_cmd;
mod serve_cmd;
mod session_cmd;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use waymark_db::models::RoadmapStatus;
use waymark_db::pool;

use crate::config::{
    ConfigFile, DEFAULT_GENERATION_URL, DatabaseSection, GenerationSection, WaymarkConfig,
};

#[derive(Parser)]
#[command(name = "waymark", about = "Conversational intake that turns chats into learning roadmaps")]
struct Cli {
    /// Database URL (overrides WAYMARK_DATABASE_URL and config file)
    #[arg(long, global = true)]
    database_url: Option<String>,

    /// Generation Service base URL (overrides WAYMARK_GENERATION_URL and config file)
    #[arg(long, global = true)]
    generation_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a config file
    Init {
        /// Database URL to store in the config
        #[arg(long)]
        db_url: Option<String>,
        /// Generation Service URL to store in the config
        #[arg(long)]
        generation_url: Option<String>,
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
    /// Create the database if needed and run migrations
    DbInit,
    /// Serve the HTTP API
    Serve {
        /// Address to bind
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,
        /// Port to listen on
        #[arg(long, default_value_t = 3000)]
        port: u16,
    },
    /// Conversation sessions
    Session {
        #[command(subcommand)]
        command: SessionCommands,
    },
    /// Persisted roadmaps
    Roadmap {
        #[command(subcommand)]
        command: RoadmapCommands,
    },
    /// Topic progress
    Progress {
        #[command(subcommand)]
        command: ProgressCommands,
    },
}

#[derive(Subcommand)]
enum SessionCommands {
    /// Start a new session
    New {
        #[arg(long)]
        user: Uuid,
        #[arg(long)]
        title: Option<String>,
        /// Subject area forwarded to the Generation Service
        #[arg(long)]
        domain: Option<String>,
    },
    /// List your sessions
    List {
        #[arg(long)]
        user: Uuid,
    },
    /// Show a session and its messages
    Show {
        #[arg(long)]
        user: Uuid,
        session_id: String,
    },
    /// Send a message to a session
    Send {
        #[arg(long)]
        user: Uuid,
        session_id: String,
        message: String,
    },
    /// Delete a session and its messages
    Delete {
        #[arg(long)]
        user: Uuid,
        session_id: String,
    },
}

#[derive(Subcommand)]
enum RoadmapCommands {
    /// List your roadmaps
    List {
        #[arg(long)]
        user: Uuid,
    },
    /// Show a roadmap with its phases and topics
    Show {
        #[arg(long)]
        user: Uuid,
        roadmap_id: String,
    },
    /// Change a roadmap's status
    Status {
        #[arg(long)]
        user: Uuid,
        roadmap_id: String,
        /// active, completed or archived
        status: RoadmapStatus,
    },
    /// Delete a roadmap and its progress
    Delete {
        #[arg(long)]
        user: Uuid,
        roadmap_id: String,
    },
}

#[derive(Subcommand)]
enum ProgressCommands {
    /// Flip a topic between completed and not completed
    Toggle {
        #[arg(long)]
        user: Uuid,
        roadmap_id: String,
        /// Topic record id, as shown by `roadmap show`
        topic: String,
    },
    /// Record notes, a rating or time spent on a topic
    Update {
        #[arg(long)]
        user: Uuid,
        roadmap_id: String,
        topic: String,
        #[arg(long)]
        notes: Option<String>,
        /// 1 to 5
        #[arg(long)]
        rating: Option<i32>,
        #[arg(long)]
        minutes: Option<i32>,
    },
    /// Completion stats for one roadmap
    Stats {
        #[arg(long)]
        user: Uuid,
        roadmap_id: String,
    },
    /// Completion stats across all your roadmaps
    Overall {
        #[arg(long)]
        user: Uuid,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let db_url = cli.database_url.as_deref();
    let generation_url = cli.generation_url.as_deref();

    match cli.command {
        Commands::Init {
            db_url: init_db_url,
            generation_url: init_generation_url,
            force,
        } => cmd_init(init_db_url, init_generation_url, force),
        Commands::DbInit => cmd_db_init(db_url).await,
        Commands::Serve { bind, port } => {
            let config = WaymarkConfig::resolve(db_url, generation_url)?;
            let pool = pool::create_pool(&config.db_config).await?;
            let client = config.generation_client()?;
            let result = serve_cmd::run_serve(
                pool.clone(),
                std::sync::Arc::new(client),
                config.orchestrator.clone(),
                &bind,
                port,
            )
            .await;
            pool.close().await;
            result
        }
        Commands::Session { command } => {
            let config = WaymarkConfig::resolve(db_url, generation_url)?;
            let pool = pool::create_pool(&config.db_config).await?;
            let result = run_session(&pool, &config, command).await;
            pool.close().await;
            result
        }
        Commands::Roadmap { command } => {
            let config = WaymarkConfig::resolve(db_url, generation_url)?;
            let pool = pool::create_pool(&config.db_config).await?;
            let result = match command {
                RoadmapCommands::List { user } => roadmap_cmd::run_list(&pool, user).await,
                RoadmapCommands::Show { user, roadmap_id } => {
                    roadmap_cmd::run_show(&pool, user, &roadmap_id).await
                }
                RoadmapCommands::Status {
                    user,
                    roadmap_id,
                    status,
                } => roadmap_cmd::run_status(&pool, user, &roadmap_id, status).await,
                RoadmapCommands::Delete { user, roadmap_id } => {
                    roadmap_cmd::run_delete(&pool, user, &roadmap_id).await
                }
            };
            pool.close().await;
            result
        }
        Commands::Progress { command } => {
            let config = WaymarkConfig::resolve(db_url, generation_url)?;
            let pool = pool::create_pool(&config.db_config).await?;
            let result = match command {
                ProgressCommands::Toggle {
                    user,
                    roadmap_id,
                    topic,
                } => progress_cmd::run_toggle(&pool, user, &roadmap_id, &topic).await,
                ProgressCommands::Update {
                    user,
                    roadmap_id,
                    topic,
                    notes,
                    rating,
                    minutes,
                } => {
                    progress_cmd::run_update(
                        &pool,
                        user,
                        &roadmap_id,
                        &topic,
                        notes,
                        rating,
                        minutes,
                    )
                    .await
                }
                ProgressCommands::Stats { user, roadmap_id } => {
                    progress_cmd::run_stats(&pool, user, &roadmap_id).await
                }
                ProgressCommands::Overall { user } => progress_cmd::run_overall(&pool, user).await,
            };
            pool.close().await;
            result
        }
    }
}

async fn run_session(
    pool: &sqlx::PgPool,
    config: &WaymarkConfig,
    command: SessionCommands,
) -> Result<()> {
    match command {
        SessionCommands::New {
            user,
            title,
            domain,
        } => session_cmd::run_new(pool, user, title.as_deref(), domain.as_deref()).await,
        SessionCommands::List { user } => session_cmd::run_list(pool, user).await,
        SessionCommands::Show { user, session_id } => {
            session_cmd::run_show(pool, user, &session_id).await
        }
        SessionCommands::Send {
            user,
            session_id,
            message,
        } => {
            let client = config.generation_client()?;
            session_cmd::run_send(
                pool,
                &client,
                &config.orchestrator,
                user,
                &session_id,
                &message,
            )
            .await
        }
        SessionCommands::Delete { user, session_id } => {
            session_cmd::run_delete(pool, user, &session_id).await
        }
    }
}

/// Parse a UUID argument, naming the kind of id in the error.
pub(crate) fn parse_id(raw: &str, kind: &str) -> Result<Uuid> {
    Uuid::parse_str(raw.trim()).with_context(|| format!("invalid {kind} ID: {raw}"))
}

fn cmd_init(db_url: Option<String>, generation_url: Option<String>, force: bool) -> Result<()> {
    let path = config::config_path();
    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let db_url = db_url.unwrap_or_else(|| waymark_db::config::DbConfig::DEFAULT_URL.to_owned());
    let generation = GenerationSection {
        base_url: generation_url.unwrap_or_else(|| DEFAULT_GENERATION_URL.to_owned()),
        ..GenerationSection::default()
    };
    let file = ConfigFile {
        database: DatabaseSection { url: db_url },
        generation,
    };
    config::save_config_to(&path, &file)?;

    println!("Config written to {}", path.display());
    println!("  database.url = {}", file.database.url);
    println!("  generation.base_url = {}", file.generation.base_url);
    println!();
    println!("Next: run `waymark db-init` to create and migrate the database.");
    Ok(())
}

async fn cmd_db_init(db_url: Option<&str>) -> Result<()> {
    let config = WaymarkConfig::resolve(db_url, None)?;
    pool::ensure_database_exists(&config.db_config).await?;
    let pool = pool::create_pool(&config.db_config).await?;
    pool::run_migrations(&pool).await?;

    println!("Database ready: {}", config.db_config.database_url);
    for (table, count) in pool::table_counts(&pool).await? {
        println!("  {table}: {count} rows");
    }
    pool.close().await;
    Ok(())
}
