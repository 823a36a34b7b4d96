//! Strict validation of inbound event envelopes.
//!
//! [`parse_event`] turns raw message bytes into a typed [`EventEnvelope`] or
//! fails with a [`ValidationError`]. Validation is closed: unknown fields are
//! rejected at both the envelope and the payload level, required fields must
//! be present and non-empty, and optional fields may be absent but never
//! `null` or empty.
//!
//! Checks run in a fixed order and the first failure is reported:
//!
//! 1. UTF-8 / JSON decoding
//! 2. top-level value is an object
//! 3. `type` equals the identifier registered for the payload
//! 4. structural decode (unknown, missing and mistyped fields)
//! 5. `eventId` non-empty
//! 6. `occurredAt` is an RFC 3339 UTC timestamp (`Z` designator)
//! 7. payload rules from [`EventPayload::validate`]
//!
//! Parsing is pure: no I/O, deterministic on its input.

use crate::event::{EventEnvelope, EventPayload, EventType, UserOnboardedEvent, UserOnboardedPayload};
use chrono::{DateTime, Timelike, Utc};
use serde::Deserialize;
use thiserror::Error;

/// Reasons a message is rejected as malformed.
///
/// A validation failure is permanent: redelivering the same bytes cannot
/// succeed, so the message is dropped as poison.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The body is not valid UTF-8 JSON.
    #[error("Malformed message body: {0}")]
    Malformed(String),

    /// The body decoded, but not to a JSON object.
    #[error("Message body is not a JSON object")]
    NotAnObject,

    /// The envelope has no `type` field, or it is not a string.
    #[error("Envelope has no string `type` field")]
    MissingType,

    /// The envelope declares a different event type than the one expected.
    #[error("Unexpected event type '{found}', expected '{expected}'")]
    TypeMismatch {
        /// Type this consumer handles
        expected: EventType,
        /// Type the message declared
        found: String,
    },

    /// The envelope or payload does not match the registered shape
    /// (unknown field, missing field, wrong JSON type).
    #[error("Envelope does not match the {event_type} schema: {reason}")]
    Schema {
        /// Type whose schema was applied
        event_type: EventType,
        /// Decoder message naming the offending field
        reason: String,
    },

    /// A string field that must carry a value is empty.
    #[error("Field `{field}` must be a non-empty string")]
    EmptyField {
        /// Dotted path of the field, e.g. `payload.username`
        field: &'static str,
    },

    /// `occurredAt` is not a well-formed timestamp.
    #[error("Invalid occurredAt timestamp '{value}': {reason}")]
    InvalidTimestamp {
        /// The rejected value
        value: String,
        /// Why it was rejected
        reason: String,
    },
}

/// Envelope as decoded, before semantic checks.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawEnvelope<P> {
    event_id: String,
    #[serde(rename = "type")]
    #[allow(dead_code)] // checked on the raw value before decoding
    event_type: String,
    occurred_at: String,
    payload: P,
}

/// Parse and validate an envelope carrying payload `P`.
///
/// # Errors
///
/// Returns [`ValidationError`] describing the first failed check.
///
/// # Example
///
/// ```
/// use user_service_core::event::UserOnboardedPayload;
/// use user_service_core::validation::{ValidationError, parse_event};
///
/// let err = parse_event::<UserOnboardedPayload>(b"not json").unwrap_err();
/// assert!(matches!(err, ValidationError::Malformed(_)));
/// ```
pub fn parse_event<P: EventPayload>(raw: &[u8]) -> Result<EventEnvelope<P>, ValidationError> {
    let value: serde_json::Value =
        serde_json::from_slice(raw).map_err(|e| ValidationError::Malformed(e.to_string()))?;

    let object = value.as_object().ok_or(ValidationError::NotAnObject)?;

    let declared = object
        .get("type")
        .and_then(serde_json::Value::as_str)
        .ok_or(ValidationError::MissingType)?;
    if declared != P::EVENT_TYPE.as_str() {
        return Err(ValidationError::TypeMismatch {
            expected: P::EVENT_TYPE,
            found: declared.to_string(),
        });
    }

    let envelope: RawEnvelope<P> =
        serde_json::from_value(value).map_err(|e| ValidationError::Schema {
            event_type: P::EVENT_TYPE,
            reason: e.to_string(),
        })?;

    require_non_empty("eventId", &envelope.event_id)?;
    let occurred_at = parse_timestamp(&envelope.occurred_at)?;
    envelope.payload.validate()?;

    Ok(EventEnvelope {
        event_id: envelope.event_id,
        event_type: P::EVENT_TYPE,
        occurred_at,
        payload: envelope.payload,
    })
}

/// Parse and validate a `user.onboarded` envelope.
///
/// # Errors
///
/// Returns [`ValidationError`] describing the first failed check.
pub fn parse_user_onboarded(raw: &[u8]) -> Result<UserOnboardedEvent, ValidationError> {
    parse_event::<UserOnboardedPayload>(raw)
}

/// Reject empty strings for a required (or present optional) field.
///
/// # Errors
///
/// Returns [`ValidationError::EmptyField`] when `value` is empty.
pub fn require_non_empty(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        Err(ValidationError::EmptyField { field })
    } else {
        Ok(())
    }
}

/// Parse an RFC 3339 date-time in UTC.
///
/// Only the `Z` designator is accepted; numeric offsets and space-separated
/// forms are rejected. Fractional seconds are allowed, leap seconds are not.
fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, ValidationError> {
    let invalid = |reason: String| ValidationError::InvalidTimestamp {
        value: value.to_string(),
        reason,
    };

    if value.as_bytes().get(10) != Some(&b'T') || !value.ends_with('Z') {
        return Err(invalid(
            "expected a UTC date-time such as 2024-01-01T00:00:00Z".to_string(),
        ));
    }

    let parsed = DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|e| invalid(e.to_string()))?;

    // chrono encodes `:60` as second 59 with an overflowing nanosecond field.
    if parsed.nanosecond() >= 1_000_000_000 {
        return Err(invalid("leap seconds are not accepted".to_string()));
    }

    Ok(parsed)
}
