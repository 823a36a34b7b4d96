//! # User Service Testing
//!
//! Testing utilities for the user service.
//!
//! This crate provides:
//! - [`InMemoryBroker`]: a [`QueueClient`](user_service_core::QueueClient)
//!   with topic routing that records every disposition
//! - [`InMemoryUserStore`]: a [`UserStore`](user_service_core::UserStore)
//!   with failure injection
//! - [`fixtures`]: builders for `user.onboarded` envelopes
//! - [`properties`]: proptest strategies for valid payloads
//!
//! ## Example
//!
//! ```ignore
//! use user_service_testing::{InMemoryBroker, InMemoryUserStore, fixtures};
//!
//! #[tokio::test]
//! async fn test_onboarding_projects_user() {
//!     let broker = Arc::new(InMemoryBroker::new());
//!     let store = Arc::new(InMemoryUserStore::new());
//!     let service = UserService::start(&config, broker.clone(), store.clone()).await?;
//!
//!     let outcome = broker
//!         .publish("events", "user.onboarded", &fixtures::user_onboarded("e1", "u1").to_json())
//!         .await;
//!
//!     assert_eq!(outcome, vec![Disposition::Ack]);
//!     assert!(store.get("u1").is_some());
//! }
//! ```

pub mod broker;
pub mod fixtures;
pub mod store;

use std::sync::atomic::{AtomicU64, Ordering};

/// Property-based testing utilities using proptest.
pub mod properties {
    use proptest::prelude::*;
    use user_service_core::UserOnboardedPayload;

    /// Non-empty identifier-like strings.
    pub fn non_empty() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9_.-]{1,24}"
    }

    /// Any valid `user.onboarded` payload, with and without an avatar.
    pub fn user_onboarded_payload() -> impl Strategy<Value = UserOnboardedPayload> {
        (
            non_empty(),
            non_empty(),
            "[a-zA-Z ]{0,16}[a-zA-Z]",
            proptest::option::of("https://cdn\\.example\\.com/[a-z0-9]{1,12}\\.png"),
        )
            .prop_map(|(user_id, username, display_name, avatar_url)| {
                UserOnboardedPayload {
                    user_id,
                    username,
                    display_name,
                    avatar_url,
                }
            })
    }
}

static CLOSE_SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// Next value of a process-wide counter stamped on doubles when they close,
/// so tests can assert the order resources were released in.
pub(crate) fn next_close_sequence() -> u64 {
    CLOSE_SEQUENCE.fetch_add(1, Ordering::SeqCst)
}

// Re-export commonly used items
pub use broker::{InMemoryBroker, Settlement, topic_matches};
pub use store::InMemoryUserStore;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_sequence_is_strictly_increasing() {
        let first = next_close_sequence();
        let second = next_close_sequence();
        assert!(second > first);
    }
}
