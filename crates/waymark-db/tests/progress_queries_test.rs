//! Integration tests for the `topic_progress` queries.

use chrono::Utc;
use uuid::Uuid;

use waymark_db::queries::progress::{self, NewProgress};
use waymark_db::queries::roadmaps;
use waymark_test_utils::{TestDb, seed_roadmap};

#[tokio::test]
async fn duplicate_insert_returns_none() {
    let db = TestDb::new().await;
    let user = Uuid::new_v4();
    let roadmap = seed_roadmap(&db.pool, user).await;
    let topic = &roadmaps::list_topics(&db.pool, roadmap.id).await.unwrap()[0];

    let new = NewProgress {
        user_id: user,
        roadmap_id: roadmap.id,
        topic_record_id: topic.id,
        topic_source_id: &topic.topic_id,
        completed: true,
        completed_at: Some(Utc::now()),
    };
    let first = progress::try_insert_progress(&db.pool, &new).await.unwrap();
    assert!(first.is_some());
    let second = progress::try_insert_progress(&db.pool, &new).await.unwrap();
    assert!(second.is_none());

    let count = progress::count_progress(&db.pool, user, roadmap.id, topic.id)
        .await
        .unwrap();
    assert_eq!(count, 1);

    db.teardown().await;
}

#[tokio::test]
async fn toggle_flips_and_restamps() {
    let db = TestDb::new().await;
    let user = Uuid::new_v4();
    let roadmap = seed_roadmap(&db.pool, user).await;
    let topic = &roadmaps::list_topics(&db.pool, roadmap.id).await.unwrap()[1];

    let record = progress::try_insert_progress(
        &db.pool,
        &NewProgress {
            user_id: user,
            roadmap_id: roadmap.id,
            topic_record_id: topic.id,
            topic_source_id: &topic.topic_id,
            completed: true,
            completed_at: Some(Utc::now()),
        },
    )
    .await
    .unwrap()
    .unwrap();

    let off = progress::toggle_completed(&db.pool, record.id).await.unwrap();
    assert!(!off.completed);
    assert!(off.completed_at.is_none());

    let on = progress::toggle_completed(&db.pool, record.id).await.unwrap();
    assert!(on.completed);
    assert!(on.completed_at.is_some());

    db.teardown().await;
}

#[tokio::test]
async fn update_details_keeps_unspecified_fields() {
    let db = TestDb::new().await;
    let user = Uuid::new_v4();
    let roadmap = seed_roadmap(&db.pool, user).await;
    let topic = &roadmaps::list_topics(&db.pool, roadmap.id).await.unwrap()[0];

    let record = progress::try_insert_progress(
        &db.pool,
        &NewProgress {
            user_id: user,
            roadmap_id: roadmap.id,
            topic_record_id: topic.id,
            topic_source_id: &topic.topic_id,
            completed: false,
            completed_at: None,
        },
    )
    .await
    .unwrap()
    .unwrap();

    let rated = progress::update_details(&db.pool, record.id, Some("tricky"), Some(4), None)
        .await
        .unwrap();
    assert_eq!(rated.notes, "tricky");
    assert_eq!(rated.rating, Some(4));

    let timed = progress::update_details(&db.pool, record.id, None, None, Some(45))
        .await
        .unwrap();
    assert_eq!(timed.notes, "tricky");
    assert_eq!(timed.rating, Some(4));
    assert_eq!(timed.time_spent_minutes, 45);

    db.teardown().await;
}

#[tokio::test]
async fn ledger_totals_only_counts_owned_roadmaps() {
    let db = TestDb::new().await;
    let user = Uuid::new_v4();
    let roadmap = seed_roadmap(&db.pool, user).await;
    let topics = roadmaps::list_topics(&db.pool, roadmap.id).await.unwrap();

    for (i, topic) in topics.iter().take(3).enumerate() {
        let record = progress::try_insert_progress(
            &db.pool,
            &NewProgress {
                user_id: user,
                roadmap_id: roadmap.id,
                topic_record_id: topic.id,
                topic_source_id: &topic.topic_id,
                completed: i < 2,
                completed_at: (i < 2).then(Utc::now),
            },
        )
        .await
        .unwrap()
        .unwrap();
        progress::update_details(&db.pool, record.id, None, None, Some(30))
            .await
            .unwrap();
    }

    let totals = progress::ledger_totals(&db.pool, user).await.unwrap();
    assert_eq!(totals.roadmaps, 1);
    assert_eq!(totals.records, 3);
    assert_eq!(totals.completed, 2);
    assert_eq!(totals.time_spent_minutes, 90);

    let stranger = progress::ledger_totals(&db.pool, Uuid::new_v4()).await.unwrap();
    assert_eq!(stranger, progress::LedgerTotals::default());

    db.teardown().await;
}

#[tokio::test]
async fn deleting_roadmap_cascades_progress() {
    let db = TestDb::new().await;
    let user = Uuid::new_v4();
    let roadmap = seed_roadmap(&db.pool, user).await;
    let topic = &roadmaps::list_topics(&db.pool, roadmap.id).await.unwrap()[0];

    progress::try_insert_progress(
        &db.pool,
        &NewProgress {
            user_id: user,
            roadmap_id: roadmap.id,
            topic_record_id: topic.id,
            topic_source_id: &topic.topic_id,
            completed: true,
            completed_at: Some(Utc::now()),
        },
    )
    .await
    .unwrap();

    roadmaps::delete_roadmap(&db.pool, roadmap.id, user).await.unwrap();

    let (left,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM topic_progress")
        .fetch_one(&db.pool)
        .await
        .unwrap();
    assert_eq!(left, 0);

    db.teardown().await;
}
