//! The local user read model and the projection that maintains it.
//!
//! # Overview
//!
//! The service keeps one row per user, keyed by the stable external
//! `user_id`, built from `user.onboarded` events:
//!
//! - **First event** for a `user_id` inserts the record
//! - **Every later event** overwrites all projected fields (last write wins)
//! - **Omitted `avatarUrl`** clears a previously projected avatar
//!
//! Storage goes through the [`UserStore`] trait. Its `upsert` must be atomic
//! with respect to `user_id`: redelivered or concurrent events for the same
//! user never produce duplicates, and the record ends up in the state of the
//! write that executed last. The projection itself holds no locks.
//!
//! ## Example
//!
//! ```ignore
//! use user_service_core::projection::*;
//!
//! let projection = UserProjection::new(Arc::new(PostgresUserStore::new(pool)));
//! projection.apply_event(&event).await?;
//! ```

use crate::event::UserOnboardedEvent;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Error type for projection operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProjectionError {
    /// The storage backend rejected or failed the operation
    #[error("Storage error: {0}")]
    Storage(String),

    /// The storage backend is unreachable or already closed
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Result type for projection operations.
pub type Result<T> = std::result::Result<T, ProjectionError>;

/// One projected user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Stable external identifier (unique key)
    pub user_id: String,
    /// Unique handle
    pub username: String,
    /// Name shown in the UI
    pub display_name: String,
    /// Avatar location, `None` when the user has none
    pub avatar_url: Option<String>,
}

impl From<&UserOnboardedEvent> for UserRecord {
    fn from(event: &UserOnboardedEvent) -> Self {
        let payload = &event.payload;
        Self {
            user_id: payload.user_id.clone(),
            username: payload.username.clone(),
            display_name: payload.display_name.clone(),
            avatar_url: payload.avatar_url.clone(),
        }
    }
}

/// Storage backend for the user read model.
///
/// # Dyn Compatibility
///
/// This trait uses explicit `Pin<Box<dyn Future>>` returns so the supervisor
/// can own the store as `Arc<dyn UserStore>` and lend it to the projection.
pub trait UserStore: Send + Sync {
    /// Insert the record, or overwrite every projected field of the existing
    /// record with the same `user_id`.
    ///
    /// `avatar_url: None` writes `NULL`, clearing any previous value.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError`] if the write fails.
    fn upsert(&self, record: &UserRecord) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Look up a record by `user_id`.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError`] if the read fails.
    fn find(
        &self,
        user_id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<UserRecord>>> + Send + '_>>;

    /// Number of projected users.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError`] if the read fails.
    fn count(&self) -> Pin<Box<dyn Future<Output = Result<u64>> + Send + '_>>;

    /// Release the underlying connections. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError`] if the backend cannot be closed cleanly.
    fn close(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// A projection builds and maintains a read model from events.
///
/// # Idempotency
///
/// Events are delivered at least once, so `apply_event` must produce the same
/// read model when an event is applied again.
pub trait Projection: Send + Sync {
    /// The event type this projection listens to.
    type Event: Send + Sync;

    /// The projection name (used in logs).
    fn name(&self) -> &str;

    /// Apply an event to update the projection.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError`] if storage fails.
    fn apply_event(&self, event: &Self::Event) -> impl Future<Output = Result<()>> + Send;
}

/// Projects `user.onboarded` events into the [`UserStore`].
#[derive(Clone)]
pub struct UserProjection {
    store: Arc<dyn UserStore>,
}

impl UserProjection {
    /// Create a projection writing to `store`.
    #[must_use]
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self { store }
    }

    /// The store this projection writes to.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn UserStore> {
        &self.store
    }
}

impl Projection for UserProjection {
    type Event = UserOnboardedEvent;

    fn name(&self) -> &'static str {
        "users"
    }

    async fn apply_event(&self, event: &Self::Event) -> Result<()> {
        let record = UserRecord::from(event);

        tracing::debug!(
            event_id = %event.event_id,
            user_id = %record.user_id,
            has_avatar = record.avatar_url.is_some(),
            "Applying user.onboarded to projection"
        );

        self.store.upsert(&record).await
    }
}
