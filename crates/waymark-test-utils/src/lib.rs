//! Shared test utilities for waymark integration tests.
//!
//! One PostgreSQL server is shared per test binary; every test gets its own
//! freshly migrated database inside it.
//!
//! - **`WAYMARK_TEST_PG_URL`** set: use that server directly (CI starts it
//!   once for the whole run).
//! - Otherwise a container is started through testcontainers on first use.

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};
use testcontainers::ContainerAsync;
use testcontainers::ImageExt;
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;
use uuid::Uuid;

use waymark_db::models::{
    ChatSession, Difficulty, PhaseDraft, Resource, ResourceType, Roadmap, RoadmapDraft,
    TopicDraft,
};
use waymark_db::pool;
use waymark_db::queries::{roadmaps, sessions};

struct SharedPg {
    base_url: String,
    /// Keeps the container alive; `None` for an external server.
    _container: Option<ContainerAsync<Postgres>>,
}

static SHARED_PG: OnceCell<SharedPg> = OnceCell::const_new();

async fn init_shared_pg() -> SharedPg {
    if let Ok(url) = std::env::var("WAYMARK_TEST_PG_URL") {
        return SharedPg {
            base_url: url.trim_end_matches('/').to_owned(),
            _container: None,
        };
    }

    let container = Postgres::default()
        .with_tag("17")
        .start()
        .await
        .expect("failed to start PostgreSQL container");
    let host = container.get_host().await.expect("failed to get host");
    let port = container
        .get_host_port_ipv4(5432)
        .await
        .expect("failed to get mapped port");

    SharedPg {
        base_url: format!("postgresql://postgres:postgres@{host}:{port}"),
        _container: Some(container),
    }
}

async fn maintenance_pool() -> PgPool {
    let shared = SHARED_PG.get_or_init(init_shared_pg).await;
    PgPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&format!("{}/postgres", shared.base_url))
        .await
        .expect("failed to connect to maintenance database")
}

/// A migrated, uniquely named database. Call [`TestDb::teardown`] at the
/// end of the test; a panicking test leaks the database until the server
/// goes away, which is harmless for throwaway containers.
pub struct TestDb {
    pub pool: PgPool,
    name: String,
}

impl TestDb {
    pub async fn new() -> Self {
        let name = format!("waymark_test_{}", Uuid::new_v4().simple());

        let maint = maintenance_pool().await;
        maint
            .execute(format!("CREATE DATABASE {name}").as_str())
            .await
            .unwrap_or_else(|e| panic!("failed to create temp database {name}: {e}"));
        maint.close().await;

        let shared = SHARED_PG.get_or_init(init_shared_pg).await;
        let pool = PgPoolOptions::new()
            .max_connections(8)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&format!("{}/{name}", shared.base_url))
            .await
            .unwrap_or_else(|e| panic!("failed to connect to temp database {name}: {e}"));

        pool::run_migrations(&pool)
            .await
            .expect("migrations should succeed");

        Self { pool, name }
    }

    /// Close the pool and drop the database.
    pub async fn teardown(self) {
        self.pool.close().await;

        let maint = maintenance_pool().await;
        let terminate = format!(
            "SELECT pg_terminate_backend(pid) \
             FROM pg_stat_activity \
             WHERE datname = '{}' AND pid <> pg_backend_pid()",
            self.name
        );
        let _ = maint.execute(terminate.as_str()).await;
        let _ = maint
            .execute(format!("DROP DATABASE IF EXISTS {}", self.name).as_str())
            .await;
        maint.close().await;
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn topic(topic_id: &str, name: &str, difficulty: Difficulty, hours: f64, order: i32) -> TopicDraft {
    TopicDraft {
        topic_id: topic_id.to_owned(),
        topic: name.to_owned(),
        description: format!("Work through {name}."),
        difficulty,
        estimated_hours: hours,
        prerequisites: vec![],
        resources: vec![Resource {
            title: format!("{name} walkthrough"),
            kind: ResourceType::Video,
            url: format!("https://www.youtube.com/results?search_query={topic_id}"),
            platform: Some("YouTube".to_owned()),
        }],
        order,
    }
}

/// Two phases, four topics (2 easy, 1 medium, 1 hard), 14 hours.
pub fn sample_draft() -> RoadmapDraft {
    RoadmapDraft {
        title: "Learning Path: Dynamic Programming".to_owned(),
        description: "Recursion to interval DP".to_owned(),
        ai_summary: "Start small, then build up.".to_owned(),
        metadata: serde_json::json!({ "mode": "rag" }),
        phases: vec![
            PhaseDraft {
                phase_number: 1,
                phase_name: "Foundation".to_owned(),
                description: "Build strong fundamentals".to_owned(),
                topics: vec![
                    topic("dp_01", "Recursion", Difficulty::Easy, 2.0, 1),
                    topic("dp_02", "Fibonacci DP", Difficulty::Easy, 3.0, 2),
                ],
            },
            PhaseDraft {
                phase_number: 2,
                phase_name: "Advanced Topics".to_owned(),
                description: "Level up your skills".to_owned(),
                topics: vec![
                    topic("dp_05", "House Robber", Difficulty::Medium, 4.0, 1),
                    topic("dp_09", "Interval DP", Difficulty::Hard, 5.0, 2),
                ],
            },
        ],
    }
}

/// Insert an empty session owned by `user_id`.
pub async fn seed_session(pool: &PgPool, user_id: Uuid) -> ChatSession {
    sessions::insert_session(pool, user_id, None, None)
        .await
        .expect("insert_session should succeed")
}

/// Insert [`sample_draft`] as a roadmap owned by `user_id`, not linked to
/// any session.
pub async fn seed_roadmap(pool: &PgPool, user_id: Uuid) -> Roadmap {
    roadmaps::insert_roadmap(pool, user_id, None, &sample_draft())
        .await
        .expect("insert_roadmap should succeed")
        .expect("unlinked roadmap cannot conflict")
}
