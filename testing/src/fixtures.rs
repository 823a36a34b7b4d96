//! Builders for `user.onboarded` envelopes.
//!
//! ```
//! use user_service_testing::fixtures;
//!
//! let raw = fixtures::user_onboarded("e1", "u1")
//!     .avatar_url("http://x/a.png")
//!     .to_json();
//!
//! let event = user_service_core::parse_user_onboarded(&raw).unwrap();
//! assert_eq!(event.payload.avatar_url.as_deref(), Some("http://x/a.png"));
//! ```

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use user_service_core::{EventEnvelope, UserOnboardedEvent, UserOnboardedPayload};

/// Start a valid `user.onboarded` envelope with `username` `"alice"`,
/// `displayName` `"Alice"`, no avatar, and `occurredAt`
/// `2024-01-01T00:00:00Z`.
#[must_use]
pub fn user_onboarded(event_id: &str, user_id: &str) -> UserOnboardedBuilder {
    UserOnboardedBuilder {
        event_id: event_id.to_string(),
        occurred_at: Utc
            .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
            .single()
            .unwrap_or_default(),
        payload: UserOnboardedPayload {
            user_id: user_id.to_string(),
            username: "alice".to_string(),
            display_name: "Alice".to_string(),
            avatar_url: None,
        },
    }
}

/// Fluent builder returned by [`user_onboarded`].
#[derive(Debug, Clone)]
pub struct UserOnboardedBuilder {
    event_id: String,
    occurred_at: DateTime<Utc>,
    payload: UserOnboardedPayload,
}

impl UserOnboardedBuilder {
    /// Set `payload.username`.
    #[must_use]
    pub fn username(mut self, username: &str) -> Self {
        self.payload.username = username.to_string();
        self
    }

    /// Set `payload.displayName`.
    #[must_use]
    pub fn display_name(mut self, display_name: &str) -> Self {
        self.payload.display_name = display_name.to_string();
        self
    }

    /// Set `payload.avatarUrl`.
    #[must_use]
    pub fn avatar_url(mut self, avatar_url: &str) -> Self {
        self.payload.avatar_url = Some(avatar_url.to_string());
        self
    }

    /// Set `occurredAt`.
    #[must_use]
    pub const fn occurred_at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = occurred_at;
        self
    }

    /// The typed event.
    #[must_use]
    pub fn build(self) -> UserOnboardedEvent {
        EventEnvelope::new(self.event_id, self.occurred_at, self.payload)
    }

    /// The envelope as a JSON value, for tests that tamper with fields.
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(EventEnvelope::new(
            self.event_id.clone(),
            self.occurred_at,
            self.payload.clone(),
        ))
        .unwrap_or(Value::Null)
    }

    /// The envelope as wire bytes.
    #[must_use]
    pub fn to_json(&self) -> Vec<u8> {
        self.to_value().to_string().into_bytes()
    }
}

/// The envelope with `payload` replaced wholesale, e.g. to drop required
/// fields: `with_payload("e2", json!({"userId": "u2"}))`.
#[must_use]
pub fn with_payload(event_id: &str, payload: Value) -> Vec<u8> {
    let mut envelope = user_onboarded(event_id, "unused").to_value();
    envelope["payload"] = payload;
    envelope.to_string().into_bytes()
}
