//! HTTP listener handle.
//!
//! [`HttpServer::bind`] opens the listener and serves the router on a
//! background task; [`HttpServer::close`] stops accepting connections,
//! lets in-flight requests finish and waits for the task.

use axum::Router;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;

/// Errors raised by the HTTP listener.
#[derive(Debug, thiserror::Error)]
pub enum WebError {
    /// The listen address could not be bound
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        /// Requested address
        addr: SocketAddr,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The server stopped with an I/O error
    #[error("HTTP server failed: {0}")]
    Serve(#[from] std::io::Error),

    /// The server task panicked or was cancelled
    #[error("HTTP server task failed: {0}")]
    Task(String),
}

struct Running {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<std::io::Result<()>>,
}

/// A bound, serving HTTP listener.
pub struct HttpServer {
    local_addr: SocketAddr,
    running: Mutex<Option<Running>>,
}

impl HttpServer {
    /// Bind `addr` and start serving `router`.
    ///
    /// Port `0` asks the OS for a free port; read it back with
    /// [`HttpServer::port`].
    ///
    /// # Errors
    ///
    /// Returns [`WebError::Bind`] if the address is unavailable.
    pub async fn bind(addr: SocketAddr, router: Router) -> Result<Self, WebError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| WebError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| WebError::Bind { addr, source })?;

        let (shutdown, signal) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    // A dropped sender also stops the server.
                    let _ = signal.await;
                })
                .await
        });

        tracing::info!(addr = %local_addr, "HTTP server listening");

        Ok(Self {
            local_addr,
            running: Mutex::new(Some(Running { shutdown, task })),
        })
    }

    /// Address the listener is bound to.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Port the listener is bound to.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Stop accepting connections and wait for in-flight requests.
    ///
    /// Calling `close` again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`WebError::Serve`] if the server ended with an I/O error, or
    /// [`WebError::Task`] if its task panicked.
    pub async fn close(&self) -> Result<(), WebError> {
        let Some(Running { shutdown, task }) = self.running.lock().await.take() else {
            return Ok(());
        };

        let _ = shutdown.send(());
        task.await.map_err(|e| WebError::Task(e.to_string()))??;

        tracing::info!(addr = %self.local_addr, "HTTP server closed");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code
mod tests {
    use super::*;
    use crate::{AppState, router};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    async fn ephemeral() -> HttpServer {
        HttpServer::bind(
            "127.0.0.1:0".parse().unwrap(),
            router(AppState::new("user-service")),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn binds_an_ephemeral_port() {
        let server = ephemeral().await;
        assert_ne!(server.port(), 0);
        server.close().await.unwrap();
    }

    #[tokio::test]
    async fn serves_health_over_tcp() {
        let server = ephemeral().await;

        let mut stream = TcpStream::connect(server.local_addr()).await.unwrap();
        stream
            .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();

        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains(r#""status":"ok""#));
        server.close().await.unwrap();
    }

    #[tokio::test]
    async fn close_is_idempotent_and_releases_the_port() {
        let server = ephemeral().await;
        let addr = server.local_addr();

        server.close().await.unwrap();
        server.close().await.unwrap();

        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn binding_a_taken_port_fails() {
        let server = ephemeral().await;

        let result = HttpServer::bind(server.local_addr(), router(AppState::new("other"))).await;

        assert!(matches!(result, Err(WebError::Bind { .. })));
        server.close().await.unwrap();
    }
}
