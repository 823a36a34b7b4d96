//! Service-level error types.

use crate::config::ConfigError;
use std::fmt;
use std::time::Duration;
use user_service_core::{Disposition, ProjectionError, QueueError, ValidationError};
use user_service_web::WebError;

/// Fatal errors while starting the service. Each maps to exit code 1.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Configuration was missing or invalid
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The broker could not be reached or the subscription set up
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    /// The database could not be reached or migrated
    #[error("Storage error: {0}")]
    Storage(#[from] ProjectionError),

    /// The HTTP listener could not be started
    #[error("HTTP error: {0}")]
    Http(#[from] WebError),

    /// Logging could not be initialized
    #[error("Telemetry error: {0}")]
    Telemetry(String),
}

/// Why one message could not be processed.
///
/// Never fatal: the consumer turns it into a [`Disposition`] and keeps going.
#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    /// The message is malformed or violates the schema
    #[error("Invalid message: {0}")]
    Validation(#[from] ValidationError),

    /// The event was valid but could not be written
    #[error("Failed to project event {event_id} for user {user_id}: {source}")]
    Projection {
        /// Envelope `eventId`, kept for manual reprocessing
        event_id: String,
        /// Payload `userId`
        user_id: String,
        /// Underlying storage error
        #[source]
        source: ProjectionError,
    },
}

impl ProcessingError {
    /// How the broker should settle the message.
    ///
    /// Invalid messages are poison and are never requeued. Storage failures
    /// are rejected too until a dead-letter policy exists.
    #[must_use]
    pub const fn disposition(&self) -> Disposition {
        match self {
            Self::Validation(_) | Self::Projection { .. } => Disposition::reject(),
        }
    }
}

/// A resource released during shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Component {
    /// Broker connection and channel
    Queue,
    /// HTTP listener
    Http,
    /// Database pool
    Store,
}

impl Component {
    /// Shutdown order.
    pub const ORDER: [Self; 3] = [Self::Queue, Self::Http, Self::Store];

    /// Name used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queue => "queue",
            Self::Http => "http",
            Self::Store => "store",
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resource failed to close. Logged; never changes the exit code.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ShutdownError {
    /// The close call returned an error
    #[error("{component} failed to close: {reason}")]
    Failed {
        /// Which resource
        component: Component,
        /// Error text
        reason: String,
    },

    /// The close call did not finish in time
    #[error("{component} did not close within {timeout:?}")]
    TimedOut {
        /// Which resource
        component: Component,
        /// Timeout that elapsed
        timeout: Duration,
    },
}

impl ShutdownError {
    /// The resource this error is about.
    #[must_use]
    pub const fn component(&self) -> Component {
        match self {
            Self::Failed { component, .. } | Self::TimedOut { component, .. } => *component,
        }
    }
}

/// Outcome of every close attempted during shutdown, in the order attempted.
#[derive(Debug, Clone, Default)]
pub struct ShutdownReport {
    outcomes: Vec<(Component, Result<(), ShutdownError>)>,
}

impl ShutdownReport {
    pub(crate) fn record(&mut self, component: Component, outcome: Result<(), ShutdownError>) {
        self.outcomes.push((component, outcome));
    }

    /// Components in the order they were closed.
    #[must_use]
    pub fn components(&self) -> Vec<Component> {
        self.outcomes.iter().map(|(component, _)| *component).collect()
    }

    /// Every failure.
    #[must_use]
    pub fn errors(&self) -> Vec<&ShutdownError> {
        self.outcomes
            .iter()
            .filter_map(|(_, outcome)| outcome.as_ref().err())
            .collect()
    }

    /// Whether every component closed cleanly.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.outcomes.iter().all(|(_, outcome)| outcome.is_ok())
    }
}
