//! Shared state of the management endpoint.

use std::sync::Arc;

use crate::bootstrap::{ContextSource, EmbeddedServiceBootstrapper, RuntimeHandle};
use crate::config::schema::{ManagementConfig, ServiceConfig};
use crate::config::scope::ConfigScope;
use crate::directory::store::DirectoryStore;
use crate::net::connection::ConnectionTracker;

/// Read-only view of a started directory.
#[derive(Debug, Clone)]
pub struct DirectoryView {
    pub handle: RuntimeHandle,
    pub store: Arc<DirectoryStore>,
    pub config: ServiceConfig,
    pub context: ContextSource,
    pub connections: ConnectionTracker,
}

impl DirectoryView {
    /// Capture a view of `bootstrapper`; `None` until it has started.
    pub fn capture(bootstrapper: &EmbeddedServiceBootstrapper) -> Option<Self> {
        Some(Self {
            handle: bootstrapper.handle(),
            store: Arc::clone(bootstrapper.store()?),
            config: bootstrapper.config()?.clone(),
            context: bootstrapper.context_source(),
            connections: bootstrapper.connection_tracker()?,
        })
    }
}

#[derive(Debug)]
struct Inner {
    scope: Arc<ConfigScope>,
    api_key: String,
    directory_endpoint_enabled: bool,
    directory: Option<DirectoryView>,
}

/// Cloneable handle passed to every handler.
#[derive(Debug, Clone)]
pub struct ManagementState {
    inner: Arc<Inner>,
}

impl ManagementState {
    pub fn new(
        scope: Arc<ConfigScope>,
        config: &ManagementConfig,
        directory: Option<DirectoryView>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                scope,
                api_key: config.api_key.clone(),
                directory_endpoint_enabled: config.directory_endpoint_enabled,
                directory,
            }),
        }
    }

    pub fn scope(&self) -> &Arc<ConfigScope> {
        &self.inner.scope
    }

    pub fn api_key(&self) -> &str {
        &self.inner.api_key
    }

    /// The directory view, when the route is enabled.
    pub fn directory(&self) -> Option<&DirectoryView> {
        if !self.inner.directory_endpoint_enabled {
            return None;
        }
        self.inner.directory.as_ref()
    }
}
