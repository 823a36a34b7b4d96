//! Message broker abstraction for consuming events.
//!
//! This module provides the [`QueueClient`] trait for consuming events from a
//! durable, topic-routed broker (RabbitMQ in production, an in-memory broker
//! in tests) and the [`MessageHandler`] callback a subscription dispatches to.
//!
//! # Architecture
//!
//! ```text
//!   producer ──► topic exchange ──(routing key)──► durable queue
//!                                                      │
//!                                          prefetch-bounded deliveries
//!                                                      │
//!                                                      ▼
//!                                           ┌────────────────────┐
//!                                           │   MessageHandler   │
//!                                           └─────────┬──────────┘
//!                                                     │ Disposition
//!                                                     ▼
//!                                           QueueClient relays ack/nack
//! ```
//!
//! # Key Principles
//!
//! - **At-least-once delivery**: a message is redelivered until it is acked
//!   or nacked, so handlers must be idempotent
//! - **Manual acknowledgement**: nothing is acked before the handler returns
//! - **Exactly-once settlement**: the handler returns a [`Disposition`] and
//!   the client relays it to the broker once; handlers never ack themselves
//! - **Bounded concurrency**: at most `prefetch` deliveries are in flight
//!
//! # Implementations
//!
//! - `InMemoryBroker` (`user-service-testing`) - for tests
//! - `RabbitMqClient` (`user-service-rabbitmq`) - for production (AMQP 0-9-1)

use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

/// Maximum unacknowledged deliveries per subscription.
pub const DEFAULT_PREFETCH: u16 = 10;

/// Errors that can occur during queue operations.
#[derive(Error, Debug, Clone)]
pub enum QueueError {
    /// Failed to connect to the broker (unreachable, bad credentials)
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to declare an exchange
    #[error("Declare failed for exchange '{exchange}': {reason}")]
    DeclareFailed {
        /// The exchange that failed
        exchange: String,
        /// The reason for failure
        reason: String,
    },

    /// Failed to declare, bind or consume a queue
    #[error("Subscription failed for queue '{queue}': {reason}")]
    SubscriptionFailed {
        /// The queue that failed
        queue: String,
        /// The reason for failure
        reason: String,
    },

    /// Failed to relay an ack or nack to the broker
    #[error("Acknowledgement failed for delivery {delivery_tag}: {reason}")]
    AcknowledgementFailed {
        /// Broker-assigned delivery tag
        delivery_tag: u64,
        /// The reason for failure
        reason: String,
    },

    /// A subscription stopped delivering without [`QueueClient::close`]
    /// (consumer cancelled by the broker, channel or connection lost)
    #[error("Subscription to queue '{queue}' lost: {reason}")]
    SubscriptionLost {
        /// The queue that stopped delivering
        queue: String,
        /// The reason for failure
        reason: String,
    },

    /// Failed to release the channel or connection
    #[error("Close failed: {0}")]
    CloseFailed(String),

    /// The client has already been closed
    #[error("Queue client is closed")]
    Closed,
}

/// One message handed to a [`MessageHandler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Raw message body
    pub body: Vec<u8>,
    /// Routing key the message was published with
    pub routing_key: String,
    /// Broker-assigned tag, unique per channel
    pub delivery_tag: u64,
    /// Whether the broker delivered this message before
    pub redelivered: bool,
}

/// What to tell the broker about a delivery once it has been handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Processed; remove the message from the queue.
    Ack,
    /// Not processed. With `requeue: false` the broker drops (or
    /// dead-letters) the message; with `requeue: true` it is redelivered.
    Nack {
        /// Whether the broker should redeliver the message
        requeue: bool,
    },
}

impl Disposition {
    /// Nack without requeue: the message is a poison message.
    #[must_use]
    pub const fn reject() -> Self {
        Self::Nack { requeue: false }
    }

    /// Nack with requeue: the failure is expected to be transient.
    #[must_use]
    pub const fn retry() -> Self {
        Self::Nack { requeue: true }
    }

    /// Whether this disposition acknowledges the message.
    #[must_use]
    pub const fn is_ack(self) -> bool {
        matches!(self, Self::Ack)
    }
}

/// Where and how a queue is bound and consumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    /// Topic exchange the queue is bound to
    pub exchange: String,
    /// Durable queue name
    pub queue: String,
    /// Routing key (or topic pattern) binding the queue to the exchange
    pub routing_key: String,
    /// Maximum unacknowledged deliveries in flight
    pub prefetch: u16,
}

impl Subscription {
    /// Create a subscription with the default prefetch of
    /// [`DEFAULT_PREFETCH`].
    ///
    /// # Example
    ///
    /// ```
    /// use user_service_core::queue::{DEFAULT_PREFETCH, Subscription};
    ///
    /// let subscription = Subscription::new("events", "user-service.user.onboarded", "user.onboarded");
    /// assert_eq!(subscription.prefetch, DEFAULT_PREFETCH);
    /// ```
    #[must_use]
    pub fn new(
        exchange: impl Into<String>,
        queue: impl Into<String>,
        routing_key: impl Into<String>,
    ) -> Self {
        Self {
            exchange: exchange.into(),
            queue: queue.into(),
            routing_key: routing_key.into(),
            prefetch: DEFAULT_PREFETCH,
        }
    }

    /// Override the prefetch count.
    #[must_use]
    pub const fn with_prefetch(mut self, prefetch: u16) -> Self {
        self.prefetch = prefetch;
        self
    }
}

/// Callback a subscription dispatches deliveries to.
///
/// Handlers run concurrently (up to the subscription's prefetch) and must not
/// panic; every outcome, including failures, is expressed as a
/// [`Disposition`].
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    /// Process one delivery and decide its disposition.
    async fn handle(&self, delivery: &Delivery) -> Disposition;
}

/// Trait for broker client implementations.
///
/// # Dyn Compatibility
///
/// This trait uses explicit `Pin<Box<dyn Future>>` returns instead of `async fn`
/// so the supervisor can hold the client as `Arc<dyn QueueClient>`.
pub trait QueueClient: Send + Sync {
    /// Declare a durable topic exchange.
    ///
    /// Idempotent: declaring an existing exchange with the same settings is a
    /// no-op, so this is safe to call on every startup.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::DeclareFailed`] if the broker refuses the
    /// declaration, or [`QueueError::Closed`] after [`QueueClient::close`].
    fn declare_topic(
        &self,
        exchange: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(), QueueError>> + Send + '_>>;

    /// Assert the durable queue, bind it, apply the prefetch limit and start
    /// dispatching deliveries to `handler`.
    ///
    /// Deliveries keep flowing until the client is closed. The client relays
    /// each returned [`Disposition`] to the broker exactly once.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::SubscriptionFailed`] if the queue cannot be
    /// declared, bound or consumed, or [`QueueError::Closed`] after
    /// [`QueueClient::close`].
    fn subscribe(
        &self,
        subscription: Subscription,
        handler: Arc<dyn MessageHandler>,
    ) -> Pin<Box<dyn Future<Output = Result<(), QueueError>> + Send + '_>>;

    /// Resolve once any subscription stops delivering for a reason other than
    /// [`QueueClient::close`].
    ///
    /// Never resolves while every subscription is healthy, nor after a
    /// deliberate close.
    fn subscription_lost(&self) -> Pin<Box<dyn Future<Output = QueueError> + Send + '_>>;

    /// Stop consuming and release the channel, then the connection.
    ///
    /// In-flight handlers are allowed to finish and settle their deliveries
    /// first (bounded by the implementation's drain grace period). Calling
    /// `close` again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::CloseFailed`] if a resource could not be
    /// released cleanly. Remaining resources are still released.
    fn close(&self) -> Pin<Box<dyn Future<Output = Result<(), QueueError>> + Send + '_>>;
}
