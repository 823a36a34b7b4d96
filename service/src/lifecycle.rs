//! Service lifecycle and graceful shutdown.
//!
//! # State Machine
//!
//! ```text
//! Starting ──► Running ──► ShuttingDown ──► Stopped
//!    │                                         ▲
//!    └──────── startup failure (cleanup) ──────┘
//! ```
//!
//! 1. **Starting**: open the HTTP listener, declare the topic exchange and
//!    subscribe the `user.onboarded` consumer
//! 2. **Running**: deliveries are validated, projected and settled, until a
//!    shutdown signal arrives or the subscription is lost
//! 3. **ShuttingDown**: close, in order, the queue client (draining in-flight
//!    handlers), the HTTP listener, then the store. Every close is attempted
//!    and bounded by the shutdown timeout
//! 4. **Stopped**: terminal
//!
//! # Example
//!
//! ```rust,ignore
//! let service = UserService::start(&config, queue, store).await?;
//! let report = service.run_until(wait_for_signal()).await?;
//! ```

use crate::config::ServiceConfig;
use crate::consumer::UserOnboardedConsumer;
use crate::error::{Component, ServiceError, ShutdownError, ShutdownReport};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use user_service_core::{
    EventType, QueueClient, QueueError, Subscription, UserProjection, UserStore,
};
use user_service_web::{AppState, HttpServer, router};

/// Name reported by the health endpoint.
pub const SERVICE_NAME: &str = "user-service";

/// Durable queue this service consumes `user.onboarded` from.
pub const QUEUE_NAME: &str = "user-service.user.onboarded";

/// Lifecycle state, published through [`UserService::state_changes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    /// Acquiring resources
    Starting,
    /// Consuming messages
    Running,
    /// Releasing resources
    ShuttingDown,
    /// Terminal
    Stopped,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::ShuttingDown => "shutting_down",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// The running service: owns the queue client, the HTTP listener and the
/// store, and releases them on [`UserService::shutdown`].
pub struct UserService {
    queue: Arc<dyn QueueClient>,
    http: HttpServer,
    store: Arc<dyn UserStore>,
    state: watch::Sender<ServiceState>,
    shutdown_timeout: Duration,
}

impl UserService {
    /// Perform `Starting` and return the service in `Running`.
    ///
    /// On failure every resource acquired so far, plus `queue` and `store`,
    /// is released before the error is returned.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Http`] if the listener cannot bind and
    /// [`ServiceError::Queue`] if the exchange or subscription cannot be set
    /// up.
    pub async fn start(
        config: &ServiceConfig,
        queue: Arc<dyn QueueClient>,
        store: Arc<dyn UserStore>,
    ) -> Result<Self, ServiceError> {
        let (state, _) = watch::channel(ServiceState::Starting);
        let shutdown_timeout = config.shutdown_timeout();
        tracing::info!(state = %ServiceState::Starting, "User service starting");

        let http = match HttpServer::bind(config.http_addr(), router(AppState::new(SERVICE_NAME)))
            .await
        {
            Ok(http) => http,
            Err(e) => {
                release(&*queue, None, &*store, shutdown_timeout).await;
                return Err(e.into());
            },
        };

        if let Err(e) = subscribe(config, &queue, &store).await {
            release(&*queue, Some(&http), &*store, shutdown_timeout).await;
            return Err(e.into());
        }

        state.send_replace(ServiceState::Running);
        tracing::info!(
            state = %ServiceState::Running,
            port = http.port(),
            exchange = %config.rabbitmq_exchange,
            queue = QUEUE_NAME,
            "User service running"
        );

        Ok(Self {
            queue,
            http,
            store,
            state,
            shutdown_timeout,
        })
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ServiceState {
        *self.state.borrow()
    }

    /// Receiver notified on every state transition.
    #[must_use]
    pub fn state_changes(&self) -> watch::Receiver<ServiceState> {
        self.state.subscribe()
    }

    /// Port the HTTP listener is bound to.
    #[must_use]
    pub const fn http_port(&self) -> u16 {
        self.http.port()
    }

    /// Stay `Running` until `signal` completes or a subscription is lost,
    /// then perform `ShuttingDown`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Queue`] if the subscription was lost. The
    /// shutdown sequence has already run by then.
    pub async fn run_until<S>(self, signal: S) -> Result<ShutdownReport, ServiceError>
    where
        S: Future,
    {
        let lost = tokio::select! {
            _ = signal => None,
            error = self.queue.subscription_lost() => Some(error),
        };

        if let Some(error) = &lost {
            tracing::error!(error = %error, "Subscription lost, no more messages will arrive");
        }

        let report = self.shutdown().await;
        match lost {
            None => Ok(report),
            Some(error) => Err(error.into()),
        }
    }

    /// Perform `ShuttingDown` and end in `Stopped`.
    ///
    /// Never fails: every close is attempted and its outcome recorded in the
    /// returned report.
    pub async fn shutdown(self) -> ShutdownReport {
        self.state.send_replace(ServiceState::ShuttingDown);
        tracing::info!(state = %ServiceState::ShuttingDown, "User service shutting down");

        let report = release(
            &*self.queue,
            Some(&self.http),
            &*self.store,
            self.shutdown_timeout,
        )
        .await;

        self.state.send_replace(ServiceState::Stopped);
        tracing::info!(
            state = %ServiceState::Stopped,
            clean = report.is_clean(),
            "User service stopped"
        );
        report
    }
}

async fn subscribe(
    config: &ServiceConfig,
    queue: &Arc<dyn QueueClient>,
    store: &Arc<dyn UserStore>,
) -> Result<(), QueueError> {
    queue.declare_topic(&config.rabbitmq_exchange).await?;

    let consumer = UserOnboardedConsumer::new(UserProjection::new(Arc::clone(store)));
    queue
        .subscribe(
            Subscription::new(
                config.rabbitmq_exchange.clone(),
                QUEUE_NAME,
                EventType::UserOnboarded.as_str(),
            ),
            Arc::new(consumer),
        )
        .await
}

/// Close the queue client, the HTTP listener (if started) and the store, in
/// that order.
///
/// The queue gets twice the timeout: its close includes the in-flight drain,
/// which is itself bounded by the timeout.
async fn release(
    queue: &dyn QueueClient,
    http: Option<&HttpServer>,
    store: &dyn UserStore,
    timeout: Duration,
) -> ShutdownReport {
    let mut report = ShutdownReport::default();

    let outcome = close_within(Component::Queue, timeout * 2, queue.close()).await;
    report.record(Component::Queue, outcome);

    if let Some(http) = http {
        let outcome = close_within(Component::Http, timeout, http.close()).await;
        report.record(Component::Http, outcome);
    }

    let outcome = close_within(Component::Store, timeout, store.close()).await;
    report.record(Component::Store, outcome);

    report
}

/// Await `close`, bounded by `timeout`, and log the outcome.
pub(crate) async fn close_within<F, E>(
    component: Component,
    timeout: Duration,
    close: F,
) -> Result<(), ShutdownError>
where
    F: Future<Output = Result<(), E>>,
    E: fmt::Display,
{
    let outcome = match tokio::time::timeout(timeout, close).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(ShutdownError::Failed {
            component,
            reason: e.to_string(),
        }),
        Err(_) => Err(ShutdownError::TimedOut { component, timeout }),
    };

    match &outcome {
        Ok(()) => tracing::info!(component = %component, "Closed"),
        Err(e) => tracing::warn!(component = %component, error = %e, "Close failed"),
    }
    outcome
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM) and return its name.
///
/// If a handler cannot be installed the failure is logged and the other
/// signal is still honoured.
pub async fn wait_for_signal() -> &'static str {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => "SIGINT",
            Err(e) => {
                tracing::error!(error = %e, "Failed to install Ctrl+C handler");
                std::future::pending().await
            },
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
                "SIGTERM"
            },
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending().await
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<&'static str>();

    let signal = tokio::select! {
        signal = ctrl_c => signal,
        signal = terminate => signal,
    };

    tracing::info!(signal, "Shutdown signal received");
    signal
}
