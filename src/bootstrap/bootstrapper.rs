use std::io::BufReader;
use std::sync::Arc;

use crate::bootstrap::activation;
use crate::bootstrap::context::ContextSource;
use crate::bootstrap::error::BootstrapError;
use crate::bootstrap::handle::{RuntimeHandle, ServerState};
use crate::bootstrap::publish::{publish_port, LDAP_SERVICE};
use crate::config::loader::ConfigError;
use crate::config::schema::{SchemaValidation, ServiceConfig};
use crate::config::scope::ConfigScope;
use crate::config::validation::ValidationError;
use crate::directory::entry::Dn;
use crate::directory::ldif::LdifError;
use crate::directory::schema::{Schema, SchemaError};
use crate::directory::server::{DirectoryServer, DirectoryServerConfig};
use crate::directory::store::{DirectoryStore, StoreError};
use crate::net::connection::ConnectionTracker;
use crate::protocol::session::BindCredential;
use crate::resource::ResourceLoader;

/// Starts, publishes and stops the embedded directory for one
/// configuration scope.
///
/// `start` and `stop` take `&mut self`, so callers serialise them; observers
/// use the cloneable [`RuntimeHandle`].
pub struct EmbeddedServiceBootstrapper {
    scope: Arc<ConfigScope>,
    resources: ResourceLoader,
    handle: RuntimeHandle,
    server: Option<DirectoryServer>,
    config: Option<ServiceConfig>,
}

impl EmbeddedServiceBootstrapper {
    pub fn new(scope: Arc<ConfigScope>, resources: ResourceLoader) -> Self {
        Self {
            scope,
            resources,
            handle: RuntimeHandle::new(),
            server: None,
            config: None,
        }
    }

    pub fn scope(&self) -> &Arc<ConfigScope> {
        &self.scope
    }

    pub fn should_activate(&self) -> bool {
        activation::should_activate(&self.scope)
    }

    /// Bind a validated [`ServiceConfig`] from the scope. Never mutates it.
    pub fn derive_config(&self) -> Result<ServiceConfig, ConfigError> {
        ServiceConfig::bind(&self.scope)
    }

    pub fn handle(&self) -> RuntimeHandle {
        self.handle.clone()
    }

    /// The configuration of the current (or last) successful start.
    pub fn config(&self) -> Option<&ServiceConfig> {
        self.config.as_ref()
    }

    pub fn store(&self) -> Option<&Arc<DirectoryStore>> {
        self.server.as_ref().map(DirectoryServer::store)
    }

    pub fn active_connections(&self) -> u64 {
        self.server
            .as_ref()
            .map(DirectoryServer::active_connections)
            .unwrap_or(0)
    }

    pub fn connection_tracker(&self) -> Option<ConnectionTracker> {
        self.server.as_ref().map(|server| server.tracker().clone())
    }

    /// Settings a co-located client would use to reach this directory.
    pub fn context_source(&self) -> ContextSource {
        let credential = self.config.as_ref().and_then(|c| c.credential.as_ref());
        ContextSource::from_scope(&self.scope, credential)
    }

    /// Start the directory: schema, bind, import, accept, publish.
    ///
    /// Any failure leaves the bootstrapper `Stopped` with the listener
    /// released.
    pub async fn start(&mut self, config: ServiceConfig) -> Result<RuntimeHandle, BootstrapError> {
        if let Err(current) = self
            .handle
            .transition(ServerState::Stopped, ServerState::Starting)
        {
            tracing::warn!(state = ?current, "Start requested while not stopped");
            return Err(BootstrapError::AlreadyRunning);
        }

        match self.launch(&config).await {
            Ok(server) => {
                let port = server.listen_port().unwrap_or_default();
                self.server = Some(server);
                self.handle.set_port(port);
                publish_port(&self.scope, LDAP_SERVICE, port);
                let _ = self
                    .handle
                    .transition(ServerState::Starting, ServerState::Running);
                tracing::info!(
                    port,
                    base_dns = ?config.base_dns,
                    schema_validation = config.validation.enabled,
                    "Embedded directory started"
                );
                self.config = Some(config);
                Ok(self.handle.clone())
            }
            Err(e) => {
                self.handle.clear_port();
                let _ = self
                    .handle
                    .transition(ServerState::Starting, ServerState::Stopped);
                tracing::error!(error = %e, "Embedded directory failed to start");
                Err(e)
            }
        }
    }

    async fn launch(&self, config: &ServiceConfig) -> Result<DirectoryServer, BootstrapError> {
        let base_dns = parse_base_dns(&config.base_dns)?;
        let schema = self.load_schema(&config.validation)?;
        let credential = config
            .credential
            .as_ref()
            .map(|c| BindCredential::new(&c.username, &c.password));

        let mut server = DirectoryServer::new(DirectoryServerConfig {
            base_dns,
            credential,
            schema,
            listener: config.listener(),
        });

        server.bind().await?;

        // from here on an early return drops `server`, releasing the listener
        if let Some(location) = &config.ldif {
            self.import_ldif(&server, location)?;
        }
        server.start_listening()?;
        Ok(server)
    }

    fn load_schema(&self, validation: &SchemaValidation) -> Result<Option<Arc<Schema>>, BootstrapError> {
        if !validation.enabled {
            tracing::debug!("Schema validation disabled");
            return Ok(None);
        }
        let standard = |source| BootstrapError::SchemaLoad {
            resource: "standard schema".to_string(),
            source,
        };
        let mut schema = Schema::standard().map_err(standard)?;

        if let Some(location) = &validation.schema {
            let resource = self.resources.resolve(location);
            let load_error = |source: SchemaError| BootstrapError::SchemaLoad {
                resource: resource.description(),
                source,
            };
            let input = resource
                .open()
                .map_err(|e| load_error(SchemaError::Ldif(LdifError::Io(e))))?;
            let custom = Schema::from_ldif(BufReader::new(input)).map_err(load_error)?;
            schema.merge(custom);
            tracing::info!(resource = %resource.description(), "Custom schema merged");
        }
        Ok(Some(Arc::new(schema)))
    }

    fn import_ldif(&self, server: &DirectoryServer, location: &str) -> Result<(), BootstrapError> {
        let resource = self.resources.resolve(location);
        if !resource.exists() {
            tracing::debug!(location, "LDIF resource not found, skipping import");
            return Ok(());
        }
        let import_error = |source: StoreError| BootstrapError::DataImport {
            location: location.to_string(),
            source,
        };
        let input = resource
            .open()
            .map_err(|e| import_error(StoreError::Ldif(LdifError::Io(e))))?;
        let count = server
            .import_from_ldif(BufReader::new(input))
            .map_err(import_error)?;
        tracing::info!(location, entries = count, "Imported LDIF");
        Ok(())
    }

    /// Stop the directory. A no-op unless running; never fails.
    pub async fn stop(&mut self) {
        let Some(mut server) = self.server.take() else {
            return;
        };
        let _ = self
            .handle
            .transition(ServerState::Running, ServerState::ShuttingDown);
        let open = server.active_connections();
        server.shut_down().await;
        self.handle.clear_port();
        let _ = self
            .handle
            .transition(ServerState::ShuttingDown, ServerState::Stopped);
        tracing::info!(closed_connections = open, "Embedded directory stopped");
    }
}

impl Drop for EmbeddedServiceBootstrapper {
    fn drop(&mut self) {
        if self.server.take().is_some() {
            // the server's own Drop aborts its tasks
            self.handle.clear_port();
            let _ = self
                .handle
                .transition(ServerState::Running, ServerState::ShuttingDown);
            let _ = self
                .handle
                .transition(ServerState::ShuttingDown, ServerState::Stopped);
        }
    }
}

fn parse_base_dns(raw: &[String]) -> Result<Vec<Dn>, ConfigError> {
    let mut parsed = Vec::with_capacity(raw.len());
    let mut errors = Vec::new();
    for dn in raw {
        match Dn::parse(dn) {
            Ok(value) => parsed.push(value),
            Err(e) => errors.push(ValidationError::InvalidBaseDn {
                dn: dn.clone(),
                reason: e.to_string(),
            }),
        }
    }
    if errors.is_empty() {
        Ok(parsed)
    } else {
        Err(ConfigError::Validation(errors))
    }
}

impl std::fmt::Debug for EmbeddedServiceBootstrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddedServiceBootstrapper")
            .field("scope", &self.scope.name())
            .field("state", &self.handle.state())
            .field("port", &self.handle.listening_port())
            .finish()
    }
}
