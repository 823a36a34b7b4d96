//! In-memory user store with failure injection.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Panics only on poisoned locks

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use user_service_core::projection::{ProjectionError, Result, UserRecord, UserStore};

/// In-memory user store for fast, deterministic testing.
///
/// Upserts are atomic per `user_id` (a single write-locked map insert), so
/// the duplicate-free, last-write-wins behavior matches the Postgres adapter.
///
/// # Example
///
/// ```
/// use user_service_testing::InMemoryUserStore;
/// use user_service_core::projection::{UserRecord, UserStore};
///
/// # tokio_test::block_on(async {
/// let store = InMemoryUserStore::new();
/// let record = UserRecord {
///     user_id: "u1".to_string(),
///     username: "alice".to_string(),
///     display_name: "Alice".to_string(),
///     avatar_url: None,
/// };
///
/// store.upsert(&record).await.unwrap();
/// assert_eq!(store.get("u1"), Some(record));
///
/// store.set_unavailable(true);
/// assert!(store.count().await.is_err());
/// # });
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryUserStore {
    data: Arc<RwLock<HashMap<String, UserRecord>>>,
    unavailable: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
    writes: Arc<AtomicU64>,
    closed_sequence: Arc<AtomicU64>,
}

impl InMemoryUserStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the database going away (`true`) or coming back (`false`).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Synchronous lookup for assertions.
    #[must_use]
    pub fn get(&self, user_id: &str) -> Option<UserRecord> {
        self.data.read().unwrap().get(user_id).cloned()
    }

    /// Number of stored users.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.read().unwrap().len()
    }

    /// Check if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.read().unwrap().is_empty()
    }

    /// Number of successful upserts, including ones that rewrote an existing
    /// record.
    #[must_use]
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Whether [`UserStore::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Position of this store's close in the process-wide close order.
    #[must_use]
    pub fn closed_sequence(&self) -> Option<u64> {
        match self.closed_sequence.load(Ordering::SeqCst) {
            0 => None,
            sequence => Some(sequence),
        }
    }

    fn check_available(&self) -> Result<()> {
        if self.is_closed() {
            return Err(ProjectionError::Unavailable("store is closed".to_string()));
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ProjectionError::Unavailable(
                "connection refused (simulated)".to_string(),
            ));
        }
        Ok(())
    }
}

impl UserStore for InMemoryUserStore {
    fn upsert(&self, record: &UserRecord) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let record = record.clone();
        Box::pin(async move {
            self.check_available()?;
            self.data
                .write()
                .unwrap()
                .insert(record.user_id.clone(), record);
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn find(
        &self,
        user_id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<UserRecord>>> + Send + '_>> {
        let user_id = user_id.to_string();
        Box::pin(async move {
            self.check_available()?;
            Ok(self.get(&user_id))
        })
    }

    fn count(&self) -> Pin<Box<dyn Future<Output = Result<u64>> + Send + '_>> {
        Box::pin(async move {
            self.check_available()?;
            Ok(self.len() as u64)
        })
    }

    fn close(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            if !self.closed.swap(true, Ordering::SeqCst) {
                self.closed_sequence
                    .store(crate::next_close_sequence(), Ordering::SeqCst);
            }
            Ok(())
        })
    }
}
