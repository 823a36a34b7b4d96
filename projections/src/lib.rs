//! Storage implementations for the user read model.
//!
//! # Overview
//!
//! This crate provides the production implementation of
//! [`UserStore`](user_service_core::projection::UserStore):
//! - **`PostgreSQL`**: the `users` table, written with a single atomic upsert
//!   per event and created by an embedded migration
//!
//! ```text
//! RabbitMQ  →  UserOnboardedConsumer  →  UserProjection  →  PostgresUserStore
//! ```
//!
//! # Example
//!
//! ```ignore
//! use user_service_projections::PostgresUserStore;
//!
//! let store = PostgresUserStore::connect("postgres://localhost/users", 10).await?;
//! store.migrate().await?;
//! ```

pub mod postgres;

pub use postgres::PostgresUserStore;
