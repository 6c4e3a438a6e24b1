//! Embedded LDAP directory library.
//!
//! Starts an in-memory LDAP directory when a base DN is configured, seeds it
//! from LDIF and publishes the bound port back into the configuration.

pub mod admin;
pub mod bootstrap;
pub mod config;
pub mod directory;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod protocol;
pub mod resource;

pub use bootstrap::{BootstrapError, EmbeddedServiceBootstrapper, RuntimeHandle, ServerState};
pub use config::{ConfigScope, ServiceConfig};
pub use lifecycle::Shutdown;
