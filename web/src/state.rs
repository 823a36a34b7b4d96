//! Application state for Axum handlers.

use std::sync::Arc;
use std::time::{Duration, Instant};

/// State shared across all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<Inner>,
}

struct Inner {
    service: String,
    started_at: Instant,
}

impl AppState {
    /// Create state for `service`, starting the uptime clock now.
    #[must_use]
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                service: service.into(),
                started_at: Instant::now(),
            }),
        }
    }

    /// Name reported by the health endpoint.
    #[must_use]
    pub fn service(&self) -> &str {
        &self.inner.service
    }

    /// Time since the state was created.
    #[must_use]
    pub fn uptime(&self) -> Duration {
        self.inner.started_at.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_is_clone() {
        // Ensure AppState implements Clone (required for Axum)
        fn assert_clone<T: Clone>() {}
        assert_clone::<AppState>();
    }

    #[test]
    fn clones_share_the_uptime_clock() {
        let state = AppState::new("user-service");
        let clone = state.clone();
        assert!(clone.uptime() >= Duration::ZERO);
        assert_eq!(clone.service(), "user-service");
        assert!(Arc::ptr_eq(&state.inner, &clone.inner));
    }
}
