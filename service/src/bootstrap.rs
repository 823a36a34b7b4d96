//! Production wiring: Postgres store, RabbitMQ client, signal-driven
//! shutdown.

use crate::config::ServiceConfig;
use crate::error::{Component, ServiceError, ShutdownReport};
use crate::lifecycle::{UserService, close_within, wait_for_signal};
use std::sync::Arc;
use std::time::Duration;
use user_service_core::UserStore;
use user_service_projections::PostgresUserStore;
use user_service_rabbitmq::{RabbitMqClient, redact_url};

/// Run the service until a shutdown signal arrives or the subscription is
/// lost.
///
/// Connects the store (and applies pending migrations), connects the broker,
/// starts the service, then waits for SIGINT/SIGTERM and shuts down.
///
/// # Errors
///
/// Returns [`ServiceError`] if any resource cannot be acquired during
/// startup (resources acquired before the failure are released first), or
/// [`ServiceError::Queue`] if the subscription is lost while running (after
/// shutting down). Failures to close on a signal-driven shutdown are
/// reported, not returned.
pub async fn run(config: &ServiceConfig) -> Result<ShutdownReport, ServiceError> {
    tracing::info!(
        node_env = %config.node_env,
        port = config.port,
        database_url = %redact_url(&config.database_url),
        rabbitmq_url = %redact_url(&config.rabbitmq_url),
        exchange = %config.rabbitmq_exchange,
        "Starting user service"
    );

    let store =
        PostgresUserStore::connect(&config.database_url, config.database_max_connections).await?;
    if let Err(e) = store.migrate().await {
        return Err(abort_startup(&store, e.into(), config.shutdown_timeout()).await);
    }

    let queue = match RabbitMqClient::builder()
        .url(config.rabbitmq_url.clone())
        .drain_timeout(config.shutdown_timeout())
        .connect()
        .await
    {
        Ok(queue) => queue,
        Err(e) => {
            return Err(abort_startup(&store, e.into(), config.shutdown_timeout()).await);
        },
    };

    let service = UserService::start(config, Arc::new(queue), Arc::new(store)).await?;

    service.run_until(wait_for_signal()).await
}

/// Release `store` after a failed startup step and hand back the error that
/// caused it. A failed close is logged; the startup error is what the caller
/// sees.
async fn abort_startup(
    store: &dyn UserStore,
    error: ServiceError,
    timeout: Duration,
) -> ServiceError {
    tracing::error!(error = %error, "Startup failed, releasing the store");
    if close_within(Component::Store, timeout, store.close()).await.is_err() {
        tracing::warn!(
            startup_error = %error,
            "Store was not released cleanly after a failed startup"
        );
    }
    error
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code
mod tests {
    use super::*;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicBool, Ordering};
    use user_service_core::QueueError;
    use user_service_core::projection::{ProjectionError, Result, UserRecord};
    use user_service_testing::InMemoryUserStore;

    /// Store whose close always fails.
    #[derive(Default)]
    struct StuckStore {
        close_attempted: AtomicBool,
    }

    impl UserStore for StuckStore {
        fn upsert(
            &self,
            _: &UserRecord,
        ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
            Box::pin(async { Ok(()) })
        }

        fn find(
            &self,
            _: &str,
        ) -> Pin<Box<dyn Future<Output = Result<Option<UserRecord>>> + Send + '_>> {
            Box::pin(async { Ok(None) })
        }

        fn count(&self) -> Pin<Box<dyn Future<Output = Result<u64>> + Send + '_>> {
            Box::pin(async { Ok(0) })
        }

        fn close(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
            Box::pin(async move {
                self.close_attempted.store(true, Ordering::SeqCst);
                Err(ProjectionError::Storage("pool refused to close".to_string()))
            })
        }
    }

    #[tokio::test]
    async fn aborted_startup_closes_the_store_and_keeps_the_cause() {
        let store = InMemoryUserStore::new();

        let error = abort_startup(
            &store,
            ServiceError::Queue(QueueError::ConnectionFailed("refused".to_string())),
            Duration::from_secs(1),
        )
        .await;

        assert!(store.is_closed());
        assert!(matches!(
            error,
            ServiceError::Queue(QueueError::ConnectionFailed(_))
        ));
    }

    #[tokio::test]
    async fn failed_store_close_does_not_mask_the_startup_error() {
        let store = StuckStore::default();

        let error = abort_startup(
            &store,
            ServiceError::Storage(ProjectionError::Unavailable("migration failed".to_string())),
            Duration::from_secs(1),
        )
        .await;

        assert!(store.close_attempted.load(Ordering::SeqCst));
        assert!(matches!(
            error,
            ServiceError::Storage(ProjectionError::Unavailable(_))
        ));
    }
}
