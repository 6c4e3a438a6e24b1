//! Configuration schema definitions.
//!
//! This module defines the typed snapshots bound from a [`ConfigScope`] and
//! the property keys they are read from. Every snapshot has defaults so an
//! empty scope binds successfully (an empty base-DN list simply means the
//! directory stays inactive).

use std::net::SocketAddr;

use serde::Serialize;

use crate::config::binder::Binder;
use crate::config::loader::ConfigError;
use crate::config::scope::ConfigScope;
use crate::config::validation::{
    validate_base_dns, validate_credential, validate_positive, validate_socket_addr,
    ValidationError,
};

pub const BASE_DN_KEY: &str = "ldap.embedded.base-dn";
pub const PORT_KEY: &str = "ldap.embedded.port";
pub const USERNAME_KEY: &str = "ldap.embedded.credential.username";
pub const PASSWORD_KEY: &str = "ldap.embedded.credential.password";
pub const LDIF_KEY: &str = "ldap.embedded.ldif";
pub const VALIDATION_ENABLED_KEY: &str = "ldap.embedded.validation.enabled";
pub const VALIDATION_SCHEMA_KEY: &str = "ldap.embedded.validation.schema";
pub const MAX_CONNECTIONS_KEY: &str = "ldap.embedded.max-connections";

/// Default LDIF location, imported only when it exists.
pub const DEFAULT_LDIF: &str = "classpath:schema.ldif";

/// Bind credential registered with the embedded directory.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct Credential {
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"******")
            .finish()
    }
}

/// Schema enforcement settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaValidation {
    /// Enforce a schema on imported and added entries.
    pub enabled: bool,

    /// Custom schema resource merged with the default schema.
    pub schema: Option<String>,
}

impl Default for SchemaValidation {
    fn default() -> Self {
        Self {
            enabled: true,
            schema: None,
        }
    }
}

/// Immutable snapshot consumed by the bootstrapper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceConfig {
    /// Base distinguished names served by the directory.
    pub base_dns: Vec<String>,

    /// Listen port; 0 asks the OS for an ephemeral port.
    pub port: u16,

    /// Optional additional bind credential.
    pub credential: Option<Credential>,

    /// LDIF resource imported at startup when it exists.
    pub ldif: Option<String>,

    pub validation: SchemaValidation,

    /// Maximum concurrent client connections (backpressure).
    pub max_connections: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_dns: Vec::new(),
            port: 0,
            credential: None,
            ldif: Some(DEFAULT_LDIF.to_string()),
            validation: SchemaValidation::default(),
            max_connections: 1024,
        }
    }
}

/// Listener settings derived from a [`ServiceConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerConfig {
    /// Address to bind; port 0 asks the OS for a free port.
    pub bind_address: SocketAddr,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl ServiceConfig {
    /// Listener settings: every interface on the configured port.
    pub fn listener(&self) -> ListenerConfig {
        ListenerConfig {
            bind_address: SocketAddr::from(([0, 0, 0, 0], self.port)),
            max_connections: self.max_connections,
        }
    }

    /// Bind and validate the snapshot from `scope`.
    pub fn bind(scope: &ConfigScope) -> Result<Self, ConfigError> {
        let binder = Binder::new(scope);
        let defaults = Self::default();

        let base_dns = binder.list(BASE_DN_KEY, None);
        let mut errors = validate_base_dns(&base_dns);
        let port = collect(
            binder.parse::<u16>(PORT_KEY, "a port number between 0 and 65535"),
            &mut errors,
        )?
        .unwrap_or(defaults.port);
        let max_connections = collect(
            binder.parse::<usize>(MAX_CONNECTIONS_KEY, "a connection count"),
            &mut errors,
        )?
        .unwrap_or(defaults.max_connections);
        let enabled = collect(binder.boolean(VALIDATION_ENABLED_KEY), &mut errors)?
            .unwrap_or(defaults.validation.enabled);
        let ldif = match binder.value(LDIF_KEY) {
            Some(value) => binder.text(LDIF_KEY).or_else(|| {
                tracing::debug!(value = %value, "Blank LDIF location, nothing to import");
                None
            }),
            None => defaults.ldif,
        };

        let credential = validate_credential(binder.text(USERNAME_KEY), binder.text(PASSWORD_KEY))
            .unwrap_or_else(|e| {
                errors.push(e);
                None
            });
        if let Err(e) = validate_positive(MAX_CONNECTIONS_KEY, max_connections) {
            errors.push(e);
        }
        if !errors.is_empty() {
            return Err(ConfigError::Validation(errors));
        }

        Ok(Self {
            base_dns,
            port,
            credential,
            ldif,
            validation: SchemaValidation {
                enabled,
                schema: binder.text(VALIDATION_SCHEMA_KEY),
            },
            max_connections,
        })
    }
}

/// Move an unparseable value into `errors` so it is reported with the rest.
fn collect<T>(
    result: Result<Option<T>, ConfigError>,
    errors: &mut Vec<ValidationError>,
) -> Result<Option<T>, ConfigError> {
    match result {
        Err(ConfigError::InvalidProperty { key, value, expected }) => {
            errors.push(ValidationError::InvalidValue { key, value, expected });
            Ok(None)
        }
        other => other,
    }
}

pub const URLS_KEY: &str = "ldap.urls";
pub const BASE_KEY: &str = "ldap.base";

/// Client-side connection settings for the shared LDAP client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClientConfig {
    /// Explicit server URLs; when empty the local embedded port is used.
    pub urls: Vec<String>,

    /// Base suffix client operations are relative to.
    pub base: Option<String>,
}

impl ClientConfig {
    pub fn bind(scope: &ConfigScope) -> Self {
        let binder = Binder::new(scope);
        Self {
            urls: binder.list(URLS_KEY, Some(',')),
            base: binder.text(BASE_KEY),
        }
    }
}

/// Management endpoint configuration.
#[derive(Debug, Clone, Serialize)]
pub struct ManagementConfig {
    /// Start the management endpoint.
    pub enabled: bool,

    /// Management endpoint bind address.
    pub bind_address: SocketAddr,

    /// API key for authentication (Bearer token).
    #[serde(skip_serializing)]
    pub api_key: String,

    /// Expose the directory endpoint.
    pub directory_endpoint_enabled: bool,

    /// Start the Prometheus exporter.
    pub metrics_enabled: bool,

    /// Prometheus exporter bind address.
    pub metrics_address: SocketAddr,
}

impl Default for ManagementConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_address: SocketAddr::from(([127, 0, 0, 1], 8081)),
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            directory_endpoint_enabled: true,
            metrics_enabled: false,
            metrics_address: SocketAddr::from(([127, 0, 0, 1], 9090)),
        }
    }
}

impl ManagementConfig {
    pub fn bind(scope: &ConfigScope) -> Result<Self, ConfigError> {
        let binder = Binder::new(scope);
        let defaults = Self::default();
        let mut errors = Vec::new();

        let mut address = |key: &str, default: SocketAddr| match binder.string(key) {
            None => default,
            Some(raw) => validate_socket_addr(key, &raw).unwrap_or_else(|e| {
                errors.push(e);
                default
            }),
        };
        let bind_address = address("management.bind-address", defaults.bind_address);
        let metrics_address = address("management.metrics.address", defaults.metrics_address);

        let config = Self {
            enabled: binder.boolean("management.enabled")?.unwrap_or(defaults.enabled),
            bind_address,
            api_key: binder.text("management.api-key").unwrap_or(defaults.api_key),
            directory_endpoint_enabled: binder
                .boolean("management.endpoint.directory.enabled")?
                .unwrap_or(defaults.directory_endpoint_enabled),
            metrics_enabled: binder
                .boolean("management.metrics.enabled")?
                .unwrap_or(defaults.metrics_enabled),
            metrics_address,
        };

        if !errors.is_empty() {
            return Err(ConfigError::Validation(errors));
        }
        Ok(config)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoggingConfig {
    /// Log filter (trace, debug, info, warn, error, or a full directive).
    pub level: String,

    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl LoggingConfig {
    pub fn bind(scope: &ConfigScope) -> Result<Self, ConfigError> {
        let binder = Binder::new(scope);
        let format = match binder.string("logging.format").map(|s| s.to_ascii_lowercase()) {
            None => LogFormat::default(),
            Some(f) if f == "pretty" => LogFormat::Pretty,
            Some(f) if f == "json" => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::InvalidProperty {
                    key: "logging.format".to_string(),
                    value: other,
                    expected: "'pretty' or 'json'",
                })
            }
        };
        Ok(Self {
            level: binder.string("logging.level").unwrap_or_else(|| Self::default().level),
            format,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::source::PropertySource;
    use std::sync::Arc;

    fn scope_with(pairs: &[(&str, &str)]) -> Arc<ConfigScope> {
        let scope = ConfigScope::new("test");
        scope.add_last(PropertySource::from_pairs("test", pairs.iter().copied()));
        scope
    }

    #[test]
    fn empty_scope_binds_defaults() {
        let config = ServiceConfig::bind(&ConfigScope::new("empty")).unwrap();
        assert_eq!(config, ServiceConfig::default());
        assert_eq!(config.ldif.as_deref(), Some(DEFAULT_LDIF));
        assert!(config.validation.enabled);
    }

    #[test]
    fn partial_credential_is_rejected() {
        let scope = scope_with(&[
            (BASE_DN_KEY, "dc=spring,dc=org"),
            (USERNAME_KEY, "uid=root"),
        ]);
        let err = ServiceConfig::bind(&scope).unwrap_err();
        assert_eq!(
            err.validation_errors(),
            &[ValidationError::PartialCredential { missing: "password" }]
        );
    }

    #[test]
    fn blank_password_counts_as_missing() {
        let scope = scope_with(&[(USERNAME_KEY, "uid=root"), (PASSWORD_KEY, "   ")]);
        assert!(ServiceConfig::bind(&scope).is_err());
    }

    #[test]
    fn all_errors_reported_together() {
        let scope = scope_with(&[
            (BASE_DN_KEY, "nonsense"),
            (PASSWORD_KEY, "secret"),
            (MAX_CONNECTIONS_KEY, "0"),
        ]);
        let err = ServiceConfig::bind(&scope).unwrap_err();
        assert_eq!(err.validation_errors().len(), 3);
    }

    #[test]
    fn unparseable_values_are_reported_with_other_errors() {
        let scope = scope_with(&[
            (BASE_DN_KEY, "dc=spring,dc=org"),
            (PORT_KEY, "not-a-port"),
            (MAX_CONNECTIONS_KEY, "many"),
            (VALIDATION_ENABLED_KEY, "maybe"),
            (USERNAME_KEY, "uid=root"),
        ]);
        let err = ServiceConfig::bind(&scope).unwrap_err();
        let errors = err.validation_errors();
        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&ValidationError::InvalidValue {
            key: PORT_KEY.to_string(),
            value: "not-a-port".to_string(),
            expected: "a port number between 0 and 65535",
        }));
        assert!(errors.contains(&ValidationError::PartialCredential { missing: "password" }));
    }

    #[test]
    fn blank_ldif_disables_import() {
        let scope = scope_with(&[(LDIF_KEY, "")]);
        assert_eq!(ServiceConfig::bind(&scope).unwrap().ldif, None);
    }

    #[test]
    fn management_defaults_are_disabled() {
        let config = ManagementConfig::bind(&ConfigScope::new("empty")).unwrap();
        assert!(!config.enabled);
        assert!(config.directory_endpoint_enabled);
    }

    #[test]
    fn management_rejects_bad_address() {
        let scope = scope_with(&[("management.bind-address", "localhost")]);
        assert!(ManagementConfig::bind(&scope).is_err());
    }

    #[test]
    fn logging_format_is_checked() {
        let scope = scope_with(&[("logging.format", "JSON"), ("logging.level", "debug")]);
        let config = LoggingConfig::bind(&scope).unwrap();
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.level, "debug");

        let scope = scope_with(&[("logging.format", "xml")]);
        assert!(LoggingConfig::bind(&scope).is_err());
    }
}
