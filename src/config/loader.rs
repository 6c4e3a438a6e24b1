//! Configuration loading from disk, the environment and the command line.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::source::{PropertySource, PropertyValue};
use crate::config::validation::ValidationError;

/// Environment variable prefixes imported by [`environment_source`].
pub const ENV_PREFIXES: &[&str] = &["LDAP_", "MANAGEMENT_", "LOGGING_"];

/// Error type for configuration loading and binding.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error in {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid value '{value}' for '{key}': expected {expected}")]
    InvalidProperty {
        key: String,
        value: String,
        expected: &'static str,
    },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

impl ConfigError {
    /// The individual validation failures, empty for other kinds of error.
    pub fn validation_errors(&self) -> &[ValidationError] {
        match self {
            ConfigError::Validation(errors) => errors,
            _ => &[],
        }
    }
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load a TOML file as a property source named after the file.
///
/// Nested tables flatten to dotted keys; arrays become lists.
pub fn load_config(path: &Path) -> Result<PropertySource, ConfigError> {
    let content = fs::read_to_string(path)?;
    let name = format!("file [{}]", path.display());
    parse_toml(&name, &content).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}

/// Parse TOML text into a property source.
pub fn parse_toml(name: &str, content: &str) -> Result<PropertySource, toml::de::Error> {
    let table: toml::Table = toml::from_str(content)?;
    let source = PropertySource::new(name);
    flatten_into(&source, "", &table);
    Ok(source)
}

fn flatten_into(source: &PropertySource, prefix: &str, table: &toml::Table) {
    for (key, value) in table {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            toml::Value::Table(nested) => flatten_into(source, &path, nested),
            other => {
                source.insert(path.as_str(), to_property_value(other));
            }
        }
    }
}

fn to_property_value(value: &toml::Value) -> PropertyValue {
    match value {
        toml::Value::String(s) => PropertyValue::String(s.clone()),
        toml::Value::Integer(i) => PropertyValue::Integer(*i),
        toml::Value::Float(f) => PropertyValue::Float(*f),
        toml::Value::Boolean(b) => PropertyValue::Boolean(*b),
        toml::Value::Datetime(d) => PropertyValue::String(d.to_string()),
        toml::Value::Array(items) => PropertyValue::List(
            items
                .iter()
                .map(|item| match item {
                    toml::Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect(),
        ),
        // tables are flattened before reaching here
        toml::Value::Table(_) => PropertyValue::String(value.to_string()),
    }
}

/// Build the environment layer from `(name, value)` pairs, keeping only
/// variables under [`ENV_PREFIXES`].
pub fn environment_source<I>(vars: I) -> PropertySource
where
    I: IntoIterator<Item = (String, String)>,
{
    let source = PropertySource::new("systemEnvironment");
    for (name, value) in vars {
        if ENV_PREFIXES.iter().any(|p| name.starts_with(p)) {
            source.insert(name.as_str(), value);
        }
    }
    source
}

/// Build the command-line layer from `key=value` arguments.
pub fn command_line_source<S: AsRef<str>>(args: &[S]) -> Result<PropertySource, ConfigError> {
    let source = PropertySource::new("commandLineArgs");
    for arg in args {
        let arg = arg.as_ref();
        let (key, value) = arg.split_once('=').ok_or_else(|| ConfigError::InvalidProperty {
            key: arg.to_string(),
            value: String::new(),
            expected: "key=value",
        })?;
        source.insert(key.trim(), value.trim());
    }
    Ok(source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::source::PropertyKey;

    #[test]
    fn toml_tables_flatten_to_dotted_keys() {
        let source = parse_toml(
            "test",
            r#"
            [ldap.embedded]
            base-dn = ["dc=spring,dc=org"]
            port = 1389

            [ldap.embedded.validation]
            enabled = false
            "#,
        )
        .unwrap();

        assert_eq!(
            source.get(&PropertyKey::new("ldap.embedded.base-dn")),
            Some(PropertyValue::List(vec!["dc=spring,dc=org".into()]))
        );
        assert_eq!(
            source.get(&PropertyKey::new("ldap.embedded.port")),
            Some(PropertyValue::Integer(1389))
        );
        assert_eq!(
            source.get(&PropertyKey::new("ldap.embedded.validation.enabled")),
            Some(PropertyValue::Boolean(false))
        );
    }

    #[test]
    fn malformed_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[ldap\nport = ").unwrap();

        let err = load_config(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("broken.toml"));
    }

    #[test]
    fn environment_keeps_known_prefixes_only() {
        let source = environment_source(vec![
            ("LDAP_EMBEDDED_PORT".to_string(), "1389".to_string()),
            ("PATH".to_string(), "/usr/bin".to_string()),
        ]);
        assert_eq!(source.len(), 1);
        assert_eq!(
            source.get(&PropertyKey::new("ldap.embedded.port")),
            Some(PropertyValue::from("1389"))
        );
    }

    #[test]
    fn command_line_requires_key_value_pairs() {
        let source = command_line_source(&["ldap.embedded.port=0"]).unwrap();
        assert_eq!(source.name(), "commandLineArgs");
        assert!(command_line_source(&["ldap.embedded.port"]).is_err());
    }
}
