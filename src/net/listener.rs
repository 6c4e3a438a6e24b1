//! TCP listener implementation with backpressure.
//!
//! # Responsibilities
//! - Bind to the configured address (port 0 means OS-assigned)
//! - Accept incoming TCP connections
//! - Enforce max_connections limit via semaphore
//! - Graceful handling of accept errors

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;

use crate::config::ListenerConfig;

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Failed to bind to address.
    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Failed to accept connection.
    #[error("Failed to accept: {0}")]
    Accept(#[source] std::io::Error),

    /// The listener was closed or never bound.
    #[error("Listener is closed")]
    Closed,
}

/// A bounded TCP listener that limits concurrent connections.
///
/// Uses a semaphore to enforce `max_connections`. When the limit is reached,
/// new connections will wait until a slot becomes available.
#[derive(Debug)]
pub struct Listener {
    inner: TcpListener,
    connection_limit: Arc<Semaphore>,
    max_connections: usize,
    local_addr: SocketAddr,
}

impl Listener {
    /// Bind to the configured address with connection limits.
    pub async fn bind(config: &ListenerConfig) -> Result<Self, ListenerError> {
        let address = config.bind_address;
        let listener = TcpListener::bind(address)
            .await
            .map_err(|source| ListenerError::Bind { address, source })?;

        let local_addr = listener
            .local_addr()
            .map_err(|source| ListenerError::Bind { address, source })?;

        tracing::info!(
            address = %local_addr,
            max_connections = config.max_connections,
            "Listener bound"
        );

        Ok(Self {
            inner: listener,
            connection_limit: Arc::new(Semaphore::new(config.max_connections)),
            max_connections: config.max_connections,
            local_addr,
        })
    }

    /// Accept a new connection, respecting the connection limit.
    ///
    /// This will wait if the connection limit has been reached.
    /// Returns the stream and a permit that must be held for the connection's lifetime.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr, ConnectionPermit), ListenerError> {
        // Acquire permit first (backpressure)
        let permit = Arc::clone(&self.connection_limit)
            .acquire_owned()
            .await
            .map_err(|_| ListenerError::Closed)?;

        let (stream, addr) = self.inner.accept().await.map_err(ListenerError::Accept)?;

        tracing::debug!(
            peer_addr = %addr,
            available_permits = self.connection_limit.available_permits(),
            "Connection accepted"
        );

        Ok((stream, addr, ConnectionPermit { _permit: permit }))
    }

    /// The address this listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Get current available connection slots.
    pub fn available_permits(&self) -> usize {
        self.connection_limit.available_permits()
    }

    /// Get configured maximum connections.
    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Stop handing out connection slots; pending and future accepts fail
    /// with [`ListenerError::Closed`].
    pub fn close(&self) {
        self.connection_limit.close();
    }
}

/// A permit representing a connection slot.
///
/// When dropped, the connection slot is released back to the pool.
/// This ensures backpressure is maintained even if the connection handler panics.
#[derive(Debug)]
pub struct ConnectionPermit {
    _permit: tokio::sync::OwnedSemaphorePermit,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max_connections: usize) -> ListenerConfig {
        ListenerConfig {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 0)),
            max_connections,
        }
    }

    #[tokio::test]
    async fn port_zero_gets_an_ephemeral_port() {
        let listener = Listener::bind(&config(4)).await.unwrap();
        assert_ne!(listener.local_addr().port(), 0);
        assert_eq!(listener.max_connections(), 4);
    }

    #[tokio::test]
    async fn bind_conflict_is_reported() {
        let first = Listener::bind(&config(1)).await.unwrap();
        let taken = ListenerConfig {
            bind_address: first.local_addr(),
            max_connections: 1,
        };
        let err = Listener::bind(&taken).await.unwrap_err();
        assert!(matches!(err, ListenerError::Bind { .. }));
    }

    #[tokio::test]
    async fn permits_bound_concurrent_connections() {
        let listener = Listener::bind(&config(1)).await.unwrap();
        let addr = listener.local_addr();

        let _client = TcpStream::connect(addr).await.unwrap();
        let (_stream, _, permit) = listener.accept().await.unwrap();
        assert_eq!(listener.available_permits(), 0);
        drop(permit);
        assert_eq!(listener.available_permits(), 1);

        listener.close();
        assert!(matches!(listener.accept().await, Err(ListenerError::Closed)));
    }
}
