//! `user.onboarded` message handler.
//!
//! Every delivery goes through the same pipeline:
//!
//! ```text
//! bytes ─► parse_user_onboarded ─► UserProjection::apply_event ─► Ack
//!               │                           │
//!               └── ValidationError ──┐     └── ProjectionError ──┐
//!                                     ▼                           ▼
//!                              Nack(requeue=false)         Nack(requeue=false)
//! ```
//!
//! Failures are logged and settled; they never reach the subscription.

use crate::error::ProcessingError;
use async_trait::async_trait;
use user_service_core::{
    Delivery, Disposition, MessageHandler, Projection, UserOnboardedEvent, UserProjection,
    parse_user_onboarded,
};

/// Validates `user.onboarded` messages and projects them into the user
/// store.
#[derive(Clone)]
pub struct UserOnboardedConsumer {
    projection: UserProjection,
}

impl UserOnboardedConsumer {
    /// Create a consumer applying events through `projection`.
    #[must_use]
    pub const fn new(projection: UserProjection) -> Self {
        Self { projection }
    }

    /// Validate `body` and apply it, returning the applied event.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessingError::Validation`] for malformed messages (no
    /// write is attempted) and [`ProcessingError::Projection`] when the store
    /// rejects the write.
    pub async fn process(&self, body: &[u8]) -> Result<UserOnboardedEvent, ProcessingError> {
        let event = parse_user_onboarded(body)?;

        self.projection
            .apply_event(&event)
            .await
            .map_err(|source| ProcessingError::Projection {
                event_id: event.event_id.clone(),
                user_id: event.payload.user_id.clone(),
                source,
            })?;

        Ok(event)
    }
}

#[async_trait]
impl MessageHandler for UserOnboardedConsumer {
    async fn handle(&self, delivery: &Delivery) -> Disposition {
        match self.process(&delivery.body).await {
            Ok(event) => {
                tracing::info!(
                    event_id = %event.event_id,
                    user_id = %event.payload.user_id,
                    delivery_tag = delivery.delivery_tag,
                    redelivered = delivery.redelivered,
                    "User projected"
                );
                Disposition::Ack
            },
            Err(error) => {
                let disposition = error.disposition();
                match &error {
                    ProcessingError::Validation(reason) => tracing::warn!(
                        delivery_tag = delivery.delivery_tag,
                        routing_key = %delivery.routing_key,
                        redelivered = delivery.redelivered,
                        error = %reason,
                        disposition = ?disposition,
                        "Rejecting invalid message"
                    ),
                    ProcessingError::Projection {
                        event_id,
                        user_id,
                        source,
                    } => tracing::error!(
                        event_id = %event_id,
                        user_id = %user_id,
                        delivery_tag = delivery.delivery_tag,
                        error = %source,
                        disposition = ?disposition,
                        "Failed to project user"
                    ),
                }
                disposition
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code
mod tests {
    use super::*;
    use std::sync::Arc;
    use user_service_core::ValidationError;
    use user_service_testing::{InMemoryUserStore, fixtures};

    fn consumer(store: &InMemoryUserStore) -> UserOnboardedConsumer {
        UserOnboardedConsumer::new(UserProjection::new(Arc::new(store.clone())))
    }

    fn delivery(body: Vec<u8>) -> Delivery {
        Delivery {
            body,
            routing_key: "user.onboarded".to_string(),
            delivery_tag: 1,
            redelivered: false,
        }
    }

    #[tokio::test]
    async fn valid_message_is_projected_and_acked() {
        let store = InMemoryUserStore::new();

        let disposition = consumer(&store)
            .handle(&delivery(fixtures::user_onboarded("e1", "u1").to_json()))
            .await;

        assert_eq!(disposition, Disposition::Ack);
        assert_eq!(store.get("u1").unwrap().username, "alice");
    }

    #[tokio::test]
    async fn invalid_message_is_rejected_without_a_write() {
        let store = InMemoryUserStore::new();

        let disposition = consumer(&store).handle(&delivery(b"{not json".to_vec())).await;

        assert_eq!(disposition, Disposition::reject());
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn process_reports_validation_errors() {
        let store = InMemoryUserStore::new();

        let err = consumer(&store).process(b"[]").await.unwrap_err();

        assert!(matches!(
            err,
            ProcessingError::Validation(ValidationError::NotAnObject)
        ));
    }

    #[tokio::test]
    async fn storage_failure_is_rejected_with_identifiers() {
        let store = InMemoryUserStore::new();
        store.set_unavailable(true);

        let err = consumer(&store)
            .process(&fixtures::user_onboarded("e7", "u7").to_json())
            .await
            .unwrap_err();

        let ProcessingError::Projection {
            event_id, user_id, ..
        } = &err
        else {
            unreachable!("expected a projection error, got {err:?}");
        };
        assert_eq!(event_id, "e7");
        assert_eq!(user_id, "u7");
        assert_eq!(err.disposition(), Disposition::reject());
    }
}
