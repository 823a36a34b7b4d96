//! Integration tests for `PostgresUserStore` using testcontainers.
//!
//! # Requirements
//!
//! Docker must be running. The tests are `#[ignore]`d; run them with:
//!
//! ```bash
//! cargo test -p user-service-projections --test integration_tests -- --ignored
//! ```

#![allow(clippy::expect_used)] // Test code uses expect for clear failure messages
#![allow(clippy::panic)]

use std::sync::Arc;
use std::time::Duration;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use user_service_core::projection::{ProjectionError, UserRecord, UserStore};
use user_service_projections::PostgresUserStore;

type Timestamp = chrono::DateTime<chrono::Utc>;

async fn setup_test_db() -> (ContainerAsync<Postgres>, PostgresUserStore) {
    let container = Postgres::default()
        .start()
        .await
        .expect("Failed to start postgres container");

    let host = container.get_host().await.expect("Failed to get host");
    let port = container
        .get_host_port_ipv4(5432)
        .await
        .expect("Failed to get port");
    let database_url = format!("postgres://postgres:postgres@{host}:{port}/postgres");

    let mut attempts = 0;
    let store = loop {
        match PostgresUserStore::connect(&database_url, 5).await {
            Ok(store) => break store,
            Err(_) if attempts < 30 => {
                attempts += 1;
                tokio::time::sleep(Duration::from_millis(200)).await;
            },
            Err(e) => panic!("Failed to connect to test database: {e}"),
        }
    };

    store.migrate().await.expect("Failed to run migrations");
    (container, store)
}

fn record(user_id: &str, username: &str, avatar_url: Option<&str>) -> UserRecord {
    UserRecord {
        user_id: user_id.to_string(),
        username: username.to_string(),
        display_name: format!("{username} display"),
        avatar_url: avatar_url.map(str::to_string),
    }
}

#[tokio::test]
#[ignore]
async fn test_upsert_inserts_then_finds() {
    let (_container, store) = setup_test_db().await;

    store
        .upsert(&record("u1", "alice", Some("http://x/a.png")))
        .await
        .expect("upsert");

    let found = store.find("u1").await.expect("find").expect("row exists");
    assert_eq!(found, record("u1", "alice", Some("http://x/a.png")));
    assert_eq!(store.count().await.expect("count"), 1);
    assert!(store.find("missing").await.expect("find").is_none());
}

#[tokio::test]
#[ignore]
async fn test_applying_same_record_twice_is_idempotent() {
    let (_container, store) = setup_test_db().await;
    let alice = record("u1", "alice", None);

    store.upsert(&alice).await.expect("first upsert");
    store.upsert(&alice).await.expect("second upsert");

    assert_eq!(store.count().await.expect("count"), 1);
    assert_eq!(store.find("u1").await.expect("find"), Some(alice));
}

#[tokio::test]
#[ignore]
async fn test_later_event_overwrites_and_clears_avatar() {
    let (_container, store) = setup_test_db().await;

    store
        .upsert(&record("u1", "alice", Some("http://x/a.png")))
        .await
        .expect("first upsert");
    store
        .upsert(&record("u1", "alice2", None))
        .await
        .expect("second upsert");

    let found = store.find("u1").await.expect("find").expect("row exists");
    assert_eq!(found.username, "alice2");
    assert_eq!(found.display_name, "alice2 display");
    assert_eq!(found.avatar_url, None);
}

#[tokio::test]
#[ignore]
async fn test_updated_at_moves_and_created_at_stays() {
    let (_container, store) = setup_test_db().await;

    store.upsert(&record("u1", "alice", None)).await.expect("insert");
    let (created_before, updated_before): (Timestamp, Timestamp) =
        sqlx::query_as("SELECT created_at, updated_at FROM users WHERE user_id = 'u1'")
            .fetch_one(store.pool())
            .await
            .expect("timestamps");

    tokio::time::sleep(Duration::from_millis(20)).await;
    store.upsert(&record("u1", "bob", None)).await.expect("update");

    let (created_after, updated_after): (Timestamp, Timestamp) =
        sqlx::query_as("SELECT created_at, updated_at FROM users WHERE user_id = 'u1'")
            .fetch_one(store.pool())
            .await
            .expect("timestamps");

    assert_eq!(created_before, created_after);
    assert!(updated_after > updated_before);
}

#[tokio::test]
#[ignore]
async fn test_concurrent_upserts_for_same_user_never_duplicate() {
    let (_container, store) = setup_test_db().await;
    let store = Arc::new(store);

    let writes = (0..20).map(|i| {
        let store = Arc::clone(&store);
        async move { store.upsert(&record("u1", &format!("name{i}"), None)).await }
    });
    for result in futures::future::join_all(writes).await {
        result.expect("concurrent upsert");
    }

    assert_eq!(store.count().await.expect("count"), 1);
    let found = store.find("u1").await.expect("find").expect("row exists");
    assert!(found.username.starts_with("name"));
}

#[tokio::test]
#[ignore]
async fn test_close_is_idempotent_and_fails_later_writes() {
    let (_container, store) = setup_test_db().await;

    store.close().await.expect("first close");
    store.close().await.expect("second close");

    let result = store.upsert(&record("u1", "alice", None)).await;
    assert!(matches!(result, Err(ProjectionError::Unavailable(_))));
}
