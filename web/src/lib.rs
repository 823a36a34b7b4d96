//! HTTP surface of the user service.
//!
//! The service is queue-driven; HTTP exists only for liveness checks from
//! load balancers and orchestrators.
//!
//! # Routes
//!
//! ```text
//! GET /health  →  200 {"status":"ok","service":"user-service","uptimeSeconds":N}
//! ```
//!
//! # Example
//!
//! ```no_run
//! use user_service_web::{AppState, HttpServer, router};
//!
//! # async fn example() -> Result<(), user_service_web::WebError> {
//! let server = HttpServer::bind("0.0.0.0:4001".parse().unwrap(), router(AppState::new("user-service"))).await?;
//! println!("listening on {}", server.port());
//!
//! server.close().await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod handlers;
pub mod server;
pub mod state;

use axum::Router;
use axum::routing::get;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

pub use handlers::health::{HealthResponse, health_check};
pub use server::{HttpServer, WebError};
pub use state::AppState;

/// Build the service router with request tracing.
#[must_use]
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}
