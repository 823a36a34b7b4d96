//! # User Service
//!
//! Maintains the local user read model from `user.onboarded` events.
//!
//! ```text
//!   RabbitMQ (topic exchange)
//!          │  user.onboarded
//!          ▼
//!   ┌──────────────────────────┐      ┌──────────────────┐
//!   │  UserOnboardedConsumer   │ ───► │  users (Postgres)│
//!   │  validate ► upsert ► ack │      └──────────────────┘
//!   └──────────────────────────┘
//!
//!   GET /health ──► {"status":"ok", ...}
//! ```
//!
//! - [`config`]: environment configuration
//! - [`consumer`]: per-message pipeline and its acknowledgement policy
//! - [`lifecycle`]: startup, state tracking and graceful shutdown
//! - [`bootstrap`]: production wiring used by the binary
//! - [`telemetry`]: tracing subscriber setup

pub mod bootstrap;
pub mod config;
pub mod consumer;
pub mod error;
pub mod lifecycle;
pub mod telemetry;

pub use bootstrap::run;
pub use config::{ConfigError, NodeEnv, ServiceConfig};
pub use consumer::UserOnboardedConsumer;
pub use error::{Component, ProcessingError, ServiceError, ShutdownError, ShutdownReport};
pub use lifecycle::{QUEUE_NAME, SERVICE_NAME, ServiceState, UserService, wait_for_signal};
