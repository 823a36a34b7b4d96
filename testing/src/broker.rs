//! In-memory message broker for fast, deterministic tests.
//!
//! [`InMemoryBroker`] implements [`QueueClient`] without a network: exchanges
//! and bindings live in a map, [`InMemoryBroker::publish`] routes a message
//! through the topic bindings and awaits each bound handler directly, and
//! every returned [`Disposition`] is recorded as a [`Settlement`].
//! [`InMemoryBroker::lose_subscription`] simulates the broker cancelling a
//! consumer.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Panics only on poisoned locks

use std::collections::BTreeSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::watch;
use user_service_core::queue::{
    Delivery, Disposition, MessageHandler, QueueClient, QueueError, Subscription,
};

/// One settled delivery, as the broker saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    /// Queue the delivery was made from
    pub queue: String,
    /// Routing key the message was published with
    pub routing_key: String,
    /// Tag assigned at delivery
    pub delivery_tag: u64,
    /// What the handler decided
    pub disposition: Disposition,
}

struct Binding {
    subscription: Subscription,
    handler: Arc<dyn MessageHandler>,
}

/// In-memory broker implementing [`QueueClient`].
///
/// # Example
///
/// ```
/// use user_service_testing::InMemoryBroker;
/// use user_service_core::queue::QueueClient;
///
/// # tokio_test::block_on(async {
/// let broker = InMemoryBroker::new();
/// broker.declare_topic("events").await.unwrap();
///
/// // Nothing bound yet: the message is dropped.
/// assert!(broker.publish("events", "user.onboarded", b"{}").await.is_empty());
/// # });
/// ```
pub struct InMemoryBroker {
    exchanges: RwLock<BTreeSet<String>>,
    bindings: RwLock<Vec<Binding>>,
    settlements: Mutex<Vec<Settlement>>,
    next_tag: AtomicU64,
    closed: AtomicBool,
    fail_close: AtomicBool,
    closed_sequence: AtomicU64,
    lost: watch::Sender<Option<QueueError>>,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBroker {
    /// Create an empty broker.
    #[must_use]
    pub fn new() -> Self {
        Self {
            exchanges: RwLock::default(),
            bindings: RwLock::default(),
            settlements: Mutex::default(),
            next_tag: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            fail_close: AtomicBool::new(false),
            closed_sequence: AtomicU64::new(0),
            lost: watch::channel(None).0,
        }
    }

    /// Drop every binding of `queue` as if the broker had cancelled its
    /// consumer, and resolve [`QueueClient::subscription_lost`].
    pub fn lose_subscription(&self, queue: &str) {
        self.bindings
            .write()
            .unwrap()
            .retain(|binding| binding.subscription.queue != queue);
        self.lost.send_replace(Some(QueueError::SubscriptionLost {
            queue: queue.to_string(),
            reason: "consumer cancelled by broker".to_string(),
        }));
    }

    /// Publish `body` to `exchange` under `routing_key`.
    ///
    /// Every bound queue whose pattern matches receives the message; the
    /// handler runs to completion before this returns. Returns one
    /// disposition per matching queue, in binding order. Messages published
    /// to an undeclared exchange, or after close, are dropped.
    pub async fn publish(&self, exchange: &str, routing_key: &str, body: &[u8]) -> Vec<Disposition> {
        if self.is_closed() || !self.exchanges.read().unwrap().contains(exchange) {
            return Vec::new();
        }

        let targets: Vec<(String, Arc<dyn MessageHandler>)> = self
            .bindings
            .read()
            .unwrap()
            .iter()
            .filter(|binding| {
                binding.subscription.exchange == exchange
                    && topic_matches(&binding.subscription.routing_key, routing_key)
            })
            .map(|binding| (binding.subscription.queue.clone(), Arc::clone(&binding.handler)))
            .collect();

        let mut dispositions = Vec::with_capacity(targets.len());
        for (queue, handler) in targets {
            let delivery = Delivery {
                body: body.to_vec(),
                routing_key: routing_key.to_string(),
                delivery_tag: self.next_tag.fetch_add(1, Ordering::SeqCst) + 1,
                redelivered: false,
            };

            let disposition = handler.handle(&delivery).await;

            self.settlements.lock().unwrap().push(Settlement {
                queue,
                routing_key: delivery.routing_key,
                delivery_tag: delivery.delivery_tag,
                disposition,
            });
            dispositions.push(disposition);
        }
        dispositions
    }

    /// Every settlement so far, in order.
    #[must_use]
    pub fn settlements(&self) -> Vec<Settlement> {
        self.settlements.lock().unwrap().clone()
    }

    /// Declared exchange names.
    #[must_use]
    pub fn exchanges(&self) -> Vec<String> {
        self.exchanges.read().unwrap().iter().cloned().collect()
    }

    /// Active subscriptions, in binding order.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.bindings
            .read()
            .unwrap()
            .iter()
            .map(|binding| binding.subscription.clone())
            .collect()
    }

    /// Make the next [`QueueClient::close`] report a failure (after still
    /// closing).
    pub fn fail_close(&self) {
        self.fail_close.store(true, Ordering::SeqCst);
    }

    /// Whether [`QueueClient::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Position of this broker's close in the process-wide close order.
    #[must_use]
    pub fn closed_sequence(&self) -> Option<u64> {
        match self.closed_sequence.load(Ordering::SeqCst) {
            0 => None,
            sequence => Some(sequence),
        }
    }
}

impl QueueClient for InMemoryBroker {
    fn declare_topic(
        &self,
        exchange: &str,
    ) -> Pin<Box<dyn Future<Output = Result<(), QueueError>> + Send + '_>> {
        let exchange = exchange.to_string();
        Box::pin(async move {
            if self.is_closed() {
                return Err(QueueError::Closed);
            }
            self.exchanges.write().unwrap().insert(exchange);
            Ok(())
        })
    }

    fn subscribe(
        &self,
        subscription: Subscription,
        handler: Arc<dyn MessageHandler>,
    ) -> Pin<Box<dyn Future<Output = Result<(), QueueError>> + Send + '_>> {
        Box::pin(async move {
            if self.is_closed() {
                return Err(QueueError::Closed);
            }
            if !self.exchanges.read().unwrap().contains(&subscription.exchange) {
                return Err(QueueError::SubscriptionFailed {
                    queue: subscription.queue,
                    reason: format!("exchange '{}' not declared", subscription.exchange),
                });
            }
            self.bindings.write().unwrap().push(Binding {
                subscription,
                handler,
            });
            Ok(())
        })
    }

    fn subscription_lost(&self) -> Pin<Box<dyn Future<Output = QueueError> + Send + '_>> {
        Box::pin(async move {
            let mut lost = self.lost.subscribe();
            let error = lost
                .wait_for(Option::is_some)
                .await
                .ok()
                .and_then(|error| (*error).clone());
            match error {
                Some(error) => error,
                None => std::future::pending().await,
            }
        })
    }

    fn close(&self) -> Pin<Box<dyn Future<Output = Result<(), QueueError>> + Send + '_>> {
        Box::pin(async move {
            if self.closed.swap(true, Ordering::SeqCst) {
                return Ok(());
            }
            self.bindings.write().unwrap().clear();
            self.closed_sequence
                .store(crate::next_close_sequence(), Ordering::SeqCst);

            if self.fail_close.load(Ordering::SeqCst) {
                return Err(QueueError::CloseFailed("injected close failure".to_string()));
            }
            Ok(())
        })
    }
}

/// AMQP topic matching: words are separated by `.`, `*` matches exactly one
/// word and `#` matches zero or more words.
///
/// # Example
///
/// ```
/// use user_service_testing::topic_matches;
///
/// assert!(topic_matches("user.*", "user.onboarded"));
/// assert!(topic_matches("#", "user.onboarded"));
/// assert!(!topic_matches("user.*", "user.profile.updated"));
/// ```
#[must_use]
pub fn topic_matches(pattern: &str, routing_key: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = routing_key.split('.').collect();
    matches_words(&pattern, &key)
}

fn matches_words(pattern: &[&str], key: &[&str]) -> bool {
    match pattern.split_first() {
        None => key.is_empty(),
        Some((&"#", rest)) => (0..=key.len()).any(|skip| matches_words(rest, &key[skip..])),
        Some((&word, rest)) => match key.split_first() {
            Some((&first, tail)) if word == "*" || word == first => matches_words(rest, tail),
            _ => false,
        },
    }
}
