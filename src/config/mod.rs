//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config files (TOML) / environment / command line
//!     → loader.rs (parse into PropertySources)
//!     → scope.rs (ordered layers, parent chain)
//!     → binder.rs (relaxed keys, typed values, lists)
//!     → validation.rs (semantic checks)
//!     → schema.rs snapshots (validated, immutable)
//!
//! On successful directory start:
//!     bootstrap publishes local.ldap.port
//!     → front-most "ldap.ports" source of each scope up the chain
//! ```
//!
//! # Design Decisions
//! - Snapshots are immutable once bound; later layer changes need a new bind
//! - All keys have defaults to allow minimal configs
//! - Keys are relaxed: `base-dn`, `baseDn` and `BASEDN` are the same key

pub mod binder;
pub mod loader;
pub mod schema;
pub mod scope;
pub mod source;
pub mod validation;

pub use binder::Binder;
pub use loader::ConfigError;
pub use schema::{
    ClientConfig, Credential, ListenerConfig, LoggingConfig, ManagementConfig, SchemaValidation,
    ServiceConfig,
};
pub use scope::ConfigScope;
pub use source::{PropertyKey, PropertySource, PropertyValue};
pub use validation::ValidationError;
