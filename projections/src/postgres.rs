//! `PostgreSQL` implementation of [`UserStore`].
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE users (
//!     user_id      TEXT PRIMARY KEY,
//!     username     TEXT NOT NULL,
//!     display_name TEXT NOT NULL,
//!     avatar_url   TEXT,
//!     created_at   TIMESTAMPTZ NOT NULL DEFAULT now(),
//!     updated_at   TIMESTAMPTZ NOT NULL DEFAULT now()
//! );
//! ```
//!
//! `created_at` is set on the first event for a user and never changed;
//! `updated_at` is bumped by every upsert.

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::future::Future;
use std::pin::Pin;
use user_service_core::projection::{ProjectionError, Result, UserRecord, UserStore};

/// Upsert keyed on `user_id`. Every projected field is overwritten, so a
/// missing avatar in the event clears the stored one.
const UPSERT_USER: &str = "INSERT INTO users (user_id, username, display_name, avatar_url)
     VALUES ($1, $2, $3, $4)
     ON CONFLICT (user_id) DO UPDATE
     SET username = EXCLUDED.username,
         display_name = EXCLUDED.display_name,
         avatar_url = EXCLUDED.avatar_url,
         updated_at = now()";

/// PostgreSQL-backed user store.
///
/// # Concurrency
///
/// Concurrent upserts for the same `user_id` are serialized by the primary
/// key; the row ends up in the state of whichever statement committed last
/// and never duplicates.
///
/// # Example
///
/// ```ignore
/// use user_service_projections::PostgresUserStore;
///
/// let store = PostgresUserStore::connect("postgres://localhost/users", 10).await?;
/// store.migrate().await?;
/// store.upsert(&record).await?;
/// ```
#[derive(Clone)]
pub struct PostgresUserStore {
    pool: PgPool,
}

impl PostgresUserStore {
    /// Create a store using an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a connection pool to `database_url`.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Unavailable`] if the database cannot be
    /// reached.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| ProjectionError::Unavailable(format!("Failed to connect: {e}")))?;

        tracing::info!(max_connections, "Connected to user database");

        Ok(Self::new(pool))
    }

    /// Create the `users` table if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Storage`] if migration fails.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| ProjectionError::Storage(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Map a driver error, separating "database is gone" from "query failed".
fn storage_error(context: &str, error: &sqlx::Error) -> ProjectionError {
    match error {
        sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => {
            ProjectionError::Unavailable(format!("{context}: {error}"))
        },
        _ => ProjectionError::Storage(format!("{context}: {error}")),
    }
}

impl UserStore for PostgresUserStore {
    fn upsert(&self, record: &UserRecord) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let record = record.clone();
        Box::pin(async move {
            sqlx::query(UPSERT_USER)
                .bind(&record.user_id)
                .bind(&record.username)
                .bind(&record.display_name)
                .bind(&record.avatar_url)
                .execute(&self.pool)
                .await
                .map_err(|e| storage_error("Failed to upsert user", &e))?;

            tracing::debug!(user_id = %record.user_id, "User upserted");
            Ok(())
        })
    }

    fn find(
        &self,
        user_id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<UserRecord>>> + Send + '_>> {
        let user_id = user_id.to_string();
        Box::pin(async move {
            let row: Option<(String, String, String, Option<String>)> = sqlx::query_as(
                "SELECT user_id, username, display_name, avatar_url
                 FROM users
                 WHERE user_id = $1",
            )
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| storage_error("Failed to find user", &e))?;

            Ok(row.map(|(user_id, username, display_name, avatar_url)| UserRecord {
                user_id,
                username,
                display_name,
                avatar_url,
            }))
        })
    }

    fn count(&self) -> Pin<Box<dyn Future<Output = Result<u64>> + Send + '_>> {
        Box::pin(async move {
            let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
                .fetch_one(&self.pool)
                .await
                .map_err(|e| storage_error("Failed to count users", &e))?;

            // COUNT(*) is never negative.
            Ok(u64::try_from(count).unwrap_or_default())
        })
    }

    fn close(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            if !self.pool.is_closed() {
                self.pool.close().await;
                tracing::info!("User database pool closed");
            }
            Ok(())
        })
    }
}
