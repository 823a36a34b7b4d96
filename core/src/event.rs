//! Event envelope and the registry of event types.
//!
//! Every message on the bus is an [`EventEnvelope`]: a producer-assigned id,
//! a type identifier from the closed [`EventType`] registry, the producer's
//! timestamp, and a type-specific payload.
//!
//! # Wire Format
//!
//! ```json
//! {
//!   "eventId": "e1",
//!   "type": "user.onboarded",
//!   "occurredAt": "2024-01-01T00:00:00Z",
//!   "payload": { "userId": "u1", "username": "alice", "displayName": "Alice" }
//! }
//! ```
//!
//! # Adding an Event Type
//!
//! 1. Add a variant to [`EventType`] (and to [`EventType::ALL`])
//! 2. Define the payload struct with `#[serde(deny_unknown_fields)]`
//! 3. Implement [`EventPayload`] for it, binding the variant and the
//!    payload-level validation rules
//!
//! The envelope, the validator and the transport stay untouched; consumers of
//! other event types are unaffected.

use crate::validation::{ValidationError, require_non_empty};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifiers of every event type the service knows about.
///
/// The string form doubles as the AMQP routing key the producer publishes
/// under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// A user finished onboarding (`user.onboarded`).
    #[serde(rename = "user.onboarded")]
    UserOnboarded,
}

impl EventType {
    /// Every registered event type.
    pub const ALL: &'static [Self] = &[Self::UserOnboarded];

    /// The wire identifier for this event type.
    ///
    /// # Example
    ///
    /// ```
    /// use user_service_core::event::EventType;
    ///
    /// assert_eq!(EventType::UserOnboarded.as_str(), "user.onboarded");
    /// ```
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UserOnboarded => "user.onboarded",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string is not a registered event type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown event type: {0}")]
pub struct UnknownEventType(pub String);

impl FromStr for EventType {
    type Err = UnknownEventType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|event_type| event_type.as_str() == s)
            .ok_or_else(|| UnknownEventType(s.to_string()))
    }
}

/// A payload shape registered under one [`EventType`].
///
/// Implementations bind the payload struct to its type identifier and carry
/// the payload-level rules that serde cannot express (non-empty strings and
/// the like). Structural strictness (no unknown fields, required fields
/// present) comes from the struct's serde attributes.
pub trait EventPayload: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// The type identifier envelopes carrying this payload must declare.
    const EVENT_TYPE: EventType;

    /// Check the payload-level invariants.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] describing the first violated rule.
    fn validate(&self) -> Result<(), ValidationError>;
}

/// Generic wrapper around a domain event.
///
/// Envelopes are transient: they live for the duration of processing one
/// message and are never persisted. Construct them through
/// [`crate::validation::parse_event`] (inbound) or [`EventEnvelope::new`]
/// (fixtures and producers).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope<P> {
    /// Producer-assigned unique id, used for tracing and idempotency.
    pub event_id: String,
    /// Registered type identifier.
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Producer clock at the time the event happened.
    pub occurred_at: DateTime<Utc>,
    /// Type-specific body.
    pub payload: P,
}

impl<P: EventPayload> EventEnvelope<P> {
    /// Build an envelope for `payload`, taking the type identifier from the
    /// payload's registry entry.
    #[must_use]
    pub fn new(event_id: impl Into<String>, occurred_at: DateTime<Utc>, payload: P) -> Self {
        Self {
            event_id: event_id.into(),
            event_type: P::EVENT_TYPE,
            occurred_at,
            payload,
        }
    }

    /// Encode the envelope to its JSON wire form.
    ///
    /// # Errors
    ///
    /// Returns [`serde_json::Error`] if the payload cannot be serialized.
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// Payload of `user.onboarded`.
///
/// `user_id` is the stable external identifier, trusted as verified by the
/// upstream application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UserOnboardedPayload {
    /// Stable external identifier of the user.
    pub user_id: String,
    /// Unique handle chosen during onboarding.
    pub username: String,
    /// Name shown in the UI.
    pub display_name: String,
    /// Avatar location. Absent means "no avatar"; `null` is rejected on input.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present_string"
    )]
    pub avatar_url: Option<String>,
}

impl EventPayload for UserOnboardedPayload {
    const EVENT_TYPE: EventType = EventType::UserOnboarded;

    fn validate(&self) -> Result<(), ValidationError> {
        require_non_empty("payload.userId", &self.user_id)?;
        require_non_empty("payload.username", &self.username)?;
        require_non_empty("payload.displayName", &self.display_name)?;
        if let Some(avatar_url) = &self.avatar_url {
            require_non_empty("payload.avatarUrl", avatar_url)?;
        }
        Ok(())
    }
}

/// A validated `user.onboarded` event.
pub type UserOnboardedEvent = EventEnvelope<UserOnboardedPayload>;

/// Deserialize an optional field that, when present, must be a string.
///
/// Combined with `#[serde(default)]` an absent key becomes `None`, while an
/// explicit `null` fails instead of silently collapsing into `None`.
fn present_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(Some)
}
