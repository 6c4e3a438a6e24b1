//! Typed binding over a [`ConfigScope`].
//!
//! # Design Decisions
//! - Lists bind from a list value, a delimited string, or `key[0]`, `key[1]`…
//! - The first source (then the first ancestor scope) contributing any form
//!   of a list wins; forms are never merged across sources
//! - A value that is present but unparseable is an error, never a default

use std::str::FromStr;

use crate::config::loader::ConfigError;
use crate::config::scope::ConfigScope;
use crate::config::source::{PropertyKey, PropertySource, PropertyValue};

pub struct Binder<'a> {
    scope: &'a ConfigScope,
}

impl<'a> Binder<'a> {
    pub fn new(scope: &'a ConfigScope) -> Self {
        Self { scope }
    }

    /// Raw value for `key`.
    pub fn value(&self, key: &str) -> Option<PropertyValue> {
        self.scope.get(key)
    }

    /// String value with surrounding whitespace removed; blank reads as unset.
    pub fn string(&self, key: &str) -> Option<String> {
        self.value(key)
            .map(|v| v.as_string().trim().to_string())
            .filter(|s| !s.is_empty())
    }

    /// Untrimmed string value, only when it contains non-whitespace text.
    pub fn text(&self, key: &str) -> Option<String> {
        self.value(key)
            .map(|v| v.as_string())
            .filter(|s| !s.trim().is_empty())
    }

    /// List value. `delimiter` controls how a plain string is split; `None`
    /// keeps it as a single element (DNs contain commas).
    pub fn list(&self, key: &str, delimiter: Option<char>) -> Vec<String> {
        let key = PropertyKey::new(key);
        for scope in self.scope.self_and_ancestors() {
            for source in scope.sources().iter() {
                if let Some(items) = list_from_source(source, &key, delimiter) {
                    return items;
                }
            }
        }
        Vec::new()
    }

    /// Parse a value with `FromStr`.
    pub fn parse<T>(&self, key: &str, expected: &'static str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
    {
        match self.string(key) {
            None => Ok(None),
            Some(raw) => raw
                .parse::<T>()
                .map(Some)
                .map_err(|_| ConfigError::InvalidProperty {
                    key: key.to_string(),
                    value: raw,
                    expected,
                }),
        }
    }

    /// Boolean value. Accepts `true`/`false`, `yes`/`no`, `on`/`off`, `1`/`0`.
    pub fn boolean(&self, key: &str) -> Result<Option<bool>, ConfigError> {
        let value = match self.value(key) {
            None => return Ok(None),
            Some(PropertyValue::Boolean(b)) => return Ok(Some(b)),
            Some(other) => other.as_string(),
        };
        match value.trim().to_ascii_lowercase().as_str() {
            "" => Ok(None),
            "true" | "yes" | "on" | "1" => Ok(Some(true)),
            "false" | "no" | "off" | "0" => Ok(Some(false)),
            _ => Err(ConfigError::InvalidProperty {
                key: key.to_string(),
                value,
                expected: "a boolean",
            }),
        }
    }
}

fn list_from_source(
    source: &PropertySource,
    key: &PropertyKey,
    delimiter: Option<char>,
) -> Option<Vec<String>> {
    if let Some(value) = source.get(key) {
        return Some(value.as_list(delimiter));
    }
    let mut items = Vec::new();
    while let Some(value) = source.get(&key.indexed(items.len())) {
        items.push(value.as_string());
    }
    if items.is_empty() {
        None
    } else {
        Some(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope_with(pairs: &[(&str, &str)]) -> std::sync::Arc<ConfigScope> {
        let scope = ConfigScope::new("test");
        scope.add_last(PropertySource::from_pairs("test", pairs.iter().copied()));
        scope
    }

    #[test]
    fn indexed_keys_bind_as_list() {
        let scope = scope_with(&[
            ("ldap.embedded.base-dn[0]", "dc=spring,dc=org"),
            ("ldap.embedded.base-dn[1]", "dc=pivotal,dc=io"),
        ]);
        let dns = Binder::new(&scope).list("ldap.embedded.base-dn", None);
        assert_eq!(dns, vec!["dc=spring,dc=org", "dc=pivotal,dc=io"]);
    }

    #[test]
    fn higher_source_list_replaces_lower_source_list() {
        let scope = scope_with(&[
            ("ldap.embedded.base-dn[0]", "dc=a"),
            ("ldap.embedded.base-dn[1]", "dc=b"),
        ]);
        scope.add_first(PropertySource::from_pairs(
            "override",
            [("ldap.embedded.base-dn", "dc=c")],
        ));
        let dns = Binder::new(&scope).list("ldap.embedded.base-dn", None);
        assert_eq!(dns, vec!["dc=c"]);
    }

    #[test]
    fn unparseable_value_is_an_error() {
        let scope = scope_with(&[("ldap.embedded.port", "not-a-port")]);
        let err = Binder::new(&scope)
            .parse::<u16>("ldap.embedded.port", "a port number")
            .unwrap_err();
        assert!(err.to_string().contains("ldap.embedded.port"));
    }

    #[test]
    fn booleans_accept_common_spellings() {
        let scope = scope_with(&[("a", "on"), ("b", "No"), ("c", "maybe")]);
        let binder = Binder::new(&scope);
        assert_eq!(binder.boolean("a").unwrap(), Some(true));
        assert_eq!(binder.boolean("b").unwrap(), Some(false));
        assert!(binder.boolean("c").is_err());
        assert_eq!(binder.boolean("missing").unwrap(), None);
    }
}
