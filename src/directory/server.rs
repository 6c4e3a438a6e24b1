//! The embedded directory server: a store behind a bounded LDAP listener.
//!
//! # Responsibilities
//! - Bind the listener separately from accepting, so data can be imported
//!   between the two
//! - Run the accept loop, one task per client session
//! - Forcibly close the listener and every session on shutdown
//!
//! # Design Decisions
//! - Sessions live in a `JoinSet` owned by the accept task; aborting or
//!   finishing that task aborts every session with it
//! - Dropping the server aborts the accept task (best-effort release)

use std::io::BufRead;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::{JoinHandle, JoinSet};

use crate::config::ListenerConfig;
use crate::directory::entry::Dn;
use crate::directory::schema::Schema;
use crate::directory::store::{DirectoryStore, StoreError};
use crate::lifecycle::shutdown::Shutdown;
use crate::net::connection::ConnectionTracker;
use crate::net::listener::{Listener, ListenerError};
use crate::observability::metrics;
use crate::protocol::session::{self, BindCredential, SessionContext, DEFAULT_MAX_MESSAGE_SIZE};

/// Everything the server needs before it binds.
#[derive(Debug)]
pub struct DirectoryServerConfig {
    pub base_dns: Vec<Dn>,
    pub credential: Option<BindCredential>,
    /// `None` disables schema checking entirely.
    pub schema: Option<Arc<Schema>>,
    pub listener: ListenerConfig,
}

pub struct DirectoryServer {
    context: Arc<SessionContext>,
    listener_config: ListenerConfig,
    listener: Option<Listener>,
    local_addr: Option<SocketAddr>,
    shutdown: Shutdown,
    tracker: ConnectionTracker,
    accept_task: Option<JoinHandle<()>>,
}

impl DirectoryServer {
    pub fn new(config: DirectoryServerConfig) -> Self {
        let store = DirectoryStore::new(config.base_dns, config.schema);
        Self {
            context: Arc::new(SessionContext {
                store: Arc::new(store),
                credential: config.credential,
                max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            }),
            listener_config: config.listener,
            listener: None,
            local_addr: None,
            shutdown: Shutdown::new(),
            tracker: ConnectionTracker::new(),
            accept_task: None,
        }
    }

    pub fn store(&self) -> &Arc<DirectoryStore> {
        &self.context.store
    }

    /// Bind the listener without accepting connections yet.
    pub async fn bind(&mut self) -> Result<SocketAddr, ListenerError> {
        let listener = Listener::bind(&self.listener_config).await?;
        let address = listener.local_addr();
        self.listener = Some(listener);
        self.local_addr = Some(address);
        Ok(address)
    }

    /// Replace the directory content with an LDIF stream. See
    /// [`DirectoryStore::import_ldif`].
    pub fn import_from_ldif<R: BufRead>(&self, input: R) -> Result<usize, StoreError> {
        let result = self.context.store.import_ldif(input);
        match &result {
            Ok(count) => metrics::record_import(true, *count),
            Err(_) => metrics::record_import(false, 0),
        }
        result
    }

    /// Start accepting connections on the bound listener.
    pub fn start_listening(&mut self) -> Result<(), ListenerError> {
        let listener = self.listener.take().ok_or(ListenerError::Closed)?;
        let context = Arc::clone(&self.context);
        let tracker = self.tracker.clone();
        let shutdown_rx = self.shutdown.subscribe();
        self.accept_task = Some(tokio::spawn(accept_loop(listener, context, tracker, shutdown_rx)));
        Ok(())
    }

    /// Port of the bound listener, if any.
    pub fn listen_port(&self) -> Option<u16> {
        self.local_addr.map(|address| address.port())
    }

    pub fn is_listening(&self) -> bool {
        self.accept_task.as_ref().is_some_and(|task| !task.is_finished())
    }

    pub fn active_connections(&self) -> u64 {
        self.tracker.active_count()
    }

    /// Shared counter of this server's live sessions.
    pub fn tracker(&self) -> &ConnectionTracker {
        &self.tracker
    }

    /// Close the listener and abort every session, then wait for the accept
    /// task to finish. Problems are logged, never returned.
    pub async fn shut_down(&mut self) {
        self.shutdown.trigger();
        self.listener = None;
        if let Some(task) = self.accept_task.take() {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    tracing::warn!(error = %e, "Directory accept task ended abnormally");
                }
            }
        }
        self.local_addr = None;
    }
}

impl Drop for DirectoryServer {
    fn drop(&mut self) {
        if let Some(task) = self.accept_task.take() {
            task.abort();
        }
    }
}

async fn accept_loop(
    listener: Listener,
    context: Arc<SessionContext>,
    tracker: ConnectionTracker,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut sessions = JoinSet::new();
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer, permit)) => {
                    let guard = tracker.track();
                    let context = Arc::clone(&context);
                    sessions.spawn(async move {
                        let _permit = permit;
                        let connection = guard.id();
                        tracing::debug!(connection_id = %connection, peer_addr = %peer, "Session started");
                        if let Err(e) = session::serve(stream, context, connection).await {
                            tracing::debug!(connection_id = %connection, error = %e, "Session ended with error");
                        }
                        drop(guard);
                    });
                }
                Err(ListenerError::Closed) => break,
                Err(e) => tracing::warn!(error = %e, "Accept failed"),
            },
            Some(_) = sessions.join_next(), if !sessions.is_empty() => {}
        }
    }

    listener.close();
    let open = sessions.len();
    sessions.shutdown().await;
    tracing::debug!(aborted_sessions = open, "Accept loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpStream;

    fn server() -> DirectoryServer {
        DirectoryServer::new(DirectoryServerConfig {
            base_dns: vec![Dn::parse("dc=spring,dc=org").unwrap()],
            credential: None,
            schema: None,
            listener: ListenerConfig {
                bind_address: SocketAddr::from(([127, 0, 0, 1], 0)),
                max_connections: 8,
            },
        })
    }

    #[tokio::test]
    async fn shut_down_closes_open_connections() {
        let mut server = server();
        let address = server.bind().await.unwrap();
        server.start_listening().unwrap();
        assert!(server.is_listening());

        let mut client = TcpStream::connect(address).await.unwrap();
        // wait until the session is tracked
        for _ in 0..50 {
            if server.active_connections() == 1 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(server.active_connections(), 1);

        server.shut_down().await;
        assert_eq!(server.listen_port(), None);
        assert_eq!(server.active_connections(), 0);

        let mut buf = [0u8; 1];
        let read = client.read(&mut buf).await;
        assert!(matches!(read, Ok(0) | Err(_)));
        assert!(TcpStream::connect(address).await.is_err());
    }

    #[tokio::test]
    async fn listening_requires_a_bound_listener() {
        let mut server = server();
        assert!(matches!(server.start_listening(), Err(ListenerError::Closed)));
        server.shut_down().await;
    }

    #[tokio::test]
    async fn import_counts_entries() {
        let server = server();
        let count = server
            .import_from_ldif("dn: dc=spring,dc=org\nobjectClass: domain\ndc: spring\n".as_bytes())
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(server.store().len(), 1);
    }
}
