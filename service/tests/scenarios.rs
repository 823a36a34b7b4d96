//! End-to-end message scenarios through a running service, using the
//! in-memory broker and store.

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code

use std::sync::Arc;
use user_service::{ServiceConfig, UserService};
use user_service_core::{Disposition, UserRecord, UserStore};
use user_service_testing::{InMemoryBroker, InMemoryUserStore, fixtures};

const EXCHANGE: &str = "events";
const ROUTING_KEY: &str = "user.onboarded";

fn test_config() -> ServiceConfig {
    ServiceConfig {
        node_env: user_service::NodeEnv::Test,
        port: 0,
        database_url: "postgres://unused".to_string(),
        database_max_connections: 1,
        rabbitmq_url: "amqp://unused".to_string(),
        rabbitmq_exchange: EXCHANGE.to_string(),
        shutdown_timeout_secs: 2,
    }
}

struct Harness {
    broker: Arc<InMemoryBroker>,
    store: InMemoryUserStore,
    service: UserService,
}

impl Harness {
    async fn start() -> Self {
        let broker = Arc::new(InMemoryBroker::new());
        let store = InMemoryUserStore::new();
        let service = UserService::start(&test_config(), broker.clone(), Arc::new(store.clone()))
            .await
            .unwrap();
        Self {
            broker,
            store,
            service,
        }
    }

    async fn publish(&self, body: &[u8]) -> Vec<Disposition> {
        self.broker.publish(EXCHANGE, ROUTING_KEY, body).await
    }

    async fn stop(self) {
        assert!(self.service.shutdown().await.is_clean());
    }
}

#[tokio::test]
async fn test_new_user_is_created_and_acked() {
    let harness = Harness::start().await;

    let outcome = harness
        .publish(&fixtures::user_onboarded("e1", "u1").to_json())
        .await;

    assert_eq!(outcome, vec![Disposition::Ack]);
    let record = harness.store.get("u1").unwrap();
    assert_eq!(record.username, "alice");
    assert_eq!(record.display_name, "Alice");
    assert_eq!(record.avatar_url, None);
    harness.stop().await;
}

#[tokio::test]
async fn test_replay_with_avatar_updates_the_same_record() {
    let harness = Harness::start().await;
    harness
        .publish(&fixtures::user_onboarded("e1", "u1").to_json())
        .await;

    let outcome = harness
        .publish(
            &fixtures::user_onboarded("e1", "u1")
                .avatar_url("http://x/a.png")
                .to_json(),
        )
        .await;

    assert_eq!(outcome, vec![Disposition::Ack]);
    assert_eq!(harness.store.len(), 1);
    assert_eq!(
        harness.store.get("u1").unwrap().avatar_url.as_deref(),
        Some("http://x/a.png")
    );
    harness.stop().await;
}

#[tokio::test]
async fn test_incomplete_payload_is_rejected_without_a_write() {
    let harness = Harness::start().await;

    let outcome = harness
        .publish(&fixtures::with_payload(
            "e2",
            serde_json::json!({ "userId": "u2" }),
        ))
        .await;

    assert_eq!(outcome, vec![Disposition::Nack { requeue: false }]);
    assert!(harness.store.get("u2").is_none());
    assert_eq!(harness.store.writes(), 0);
    harness.stop().await;
}

#[tokio::test]
async fn test_storage_outage_rejects_without_requeue() {
    let harness = Harness::start().await;
    harness.store.set_unavailable(true);

    let outcome = harness
        .publish(&fixtures::user_onboarded("e3", "u3").to_json())
        .await;

    assert_eq!(outcome, vec![Disposition::reject()]);
    harness.store.set_unavailable(false);
    assert!(harness.store.get("u3").is_none());
    harness.stop().await;
}

#[tokio::test]
async fn test_redelivery_is_idempotent() {
    let harness = Harness::start().await;
    let body = fixtures::user_onboarded("e1", "u1").to_json();

    for _ in 0..3 {
        assert_eq!(harness.publish(&body).await, vec![Disposition::Ack]);
    }

    assert_eq!(harness.store.count().await.unwrap(), 1);
    assert_eq!(
        harness.store.get("u1").unwrap(),
        UserRecord::from(&fixtures::user_onboarded("e1", "u1").build())
    );
    harness.stop().await;
}

#[tokio::test]
async fn test_unknown_payload_field_is_rejected() {
    let harness = Harness::start().await;
    let mut envelope = fixtures::user_onboarded("e4", "u4").to_value();
    envelope["payload"]["isAdmin"] = serde_json::Value::Bool(true);

    let outcome = harness.publish(envelope.to_string().as_bytes()).await;

    assert_eq!(outcome, vec![Disposition::reject()]);
    assert!(harness.store.is_empty());
    harness.stop().await;
}

#[tokio::test]
async fn test_non_json_body_is_rejected() {
    let harness = Harness::start().await;

    let outcome = harness.publish(b"not json at all").await;

    assert_eq!(outcome, vec![Disposition::reject()]);
    harness.stop().await;
}

#[tokio::test]
async fn test_other_routing_keys_are_not_delivered() {
    let harness = Harness::start().await;

    let outcome = harness
        .broker
        .publish(
            EXCHANGE,
            "user.deleted",
            &fixtures::user_onboarded("e5", "u5").to_json(),
        )
        .await;

    assert!(outcome.is_empty());
    assert!(harness.broker.settlements().is_empty());
    harness.stop().await;
}

#[tokio::test]
async fn test_concurrent_events_for_one_user_leave_one_record() {
    let harness = Harness::start().await;
    let names = ["alice", "alicia", "ali", "al"];

    let outcomes = futures::future::join_all(names.iter().enumerate().map(|(i, name)| {
        let body = fixtures::user_onboarded(&format!("e{i}"), "u1")
            .username(name)
            .to_json();
        let broker = harness.broker.clone();
        async move { broker.publish(EXCHANGE, ROUTING_KEY, &body).await }
    }))
    .await;

    assert!(outcomes.iter().flatten().all(|d| d.is_ack()));
    assert_eq!(harness.store.len(), 1);
    let username = harness.store.get("u1").unwrap().username;
    assert!(names.contains(&username.as_str()));
    harness.stop().await;
}

#[tokio::test]
async fn test_every_message_is_settled_once() {
    let harness = Harness::start().await;

    harness
        .publish(&fixtures::user_onboarded("e1", "u1").to_json())
        .await;
    harness.publish(b"{}").await;

    let settlements = harness.broker.settlements();
    assert_eq!(settlements.len(), 2);
    assert_eq!(settlements[0].disposition, Disposition::Ack);
    assert_eq!(settlements[1].disposition, Disposition::reject());
    assert_ne!(settlements[0].delivery_tag, settlements[1].delivery_tag);
    assert!(settlements.iter().all(|s| s.queue == user_service::QUEUE_NAME));
    harness.stop().await;
}
