use thiserror::Error;

use crate::config::loader::ConfigError;
use crate::directory::schema::SchemaError;
use crate::directory::store::StoreError;
use crate::net::listener::ListenerError;

/// Failures of [`start`](crate::bootstrap::EmbeddedServiceBootstrapper::start).
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("Invalid configuration: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Unable to load schema {resource}: {source}")]
    SchemaLoad {
        resource: String,
        #[source]
        source: SchemaError,
    },

    #[error("Unable to bind directory listener: {0}")]
    Bind(#[from] ListenerError),

    #[error("Unable to load LDIF {location}: {source}")]
    DataImport {
        location: String,
        #[source]
        source: StoreError,
    },

    #[error("Embedded directory is already running")]
    AlreadyRunning,
}
