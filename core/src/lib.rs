//! # User Service Core
//!
//! Core types and traits for the event-driven user service.
//!
//! This crate has no I/O of its own. It defines the contracts the adapter
//! crates implement and the service wires together:
//!
//! - [`event`]: the event envelope and the closed registry of event types
//! - [`validation`]: strict parsing of raw message bytes into typed events
//! - [`queue`]: the message broker abstraction ([`queue::QueueClient`]) and
//!   the per-message [`queue::Disposition`] contract
//! - [`projection`]: the user read model, its storage trait and the
//!   projection that applies `user.onboarded` events
//!
//! ## Data Flow
//!
//! ```text
//! ┌──────────┐  Delivery   ┌───────────┐  UserOnboardedEvent  ┌──────────────┐
//! │  Broker  │ ──────────► │ Validator │ ───────────────────► │  Projection  │
//! └──────────┘             └───────────┘                      └──────┬───────┘
//!      ▲                                                             │
//!      │                      Disposition (Ack / Nack)               │
//!      └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use user_service_core::validation::parse_user_onboarded;
//!
//! let raw = br#"{
//!     "eventId": "e1",
//!     "type": "user.onboarded",
//!     "occurredAt": "2024-01-01T00:00:00Z",
//!     "payload": { "userId": "u1", "username": "alice", "displayName": "Alice" }
//! }"#;
//!
//! let event = parse_user_onboarded(raw).unwrap();
//! assert_eq!(event.payload.user_id, "u1");
//! assert!(event.payload.avatar_url.is_none());
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};

pub mod event;
pub mod projection;
pub mod queue;
pub mod validation;

pub use event::{EventEnvelope, EventPayload, EventType, UserOnboardedEvent, UserOnboardedPayload};
pub use projection::{Projection, ProjectionError, UserProjection, UserRecord, UserStore};
pub use queue::{
    DEFAULT_PREFETCH, Delivery, Disposition, MessageHandler, QueueClient, QueueError, Subscription,
};
pub use validation::{ValidationError, parse_event, parse_user_onboarded};
