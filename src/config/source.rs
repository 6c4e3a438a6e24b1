//! Property sources and relaxed property keys.
//!
//! # Responsibilities
//! - Canonicalise keys so `base-dn`, `baseDn` and `BASEDN` name one property
//! - Hold one named layer of key → value pairs
//! - Allow concurrent reads and single-key writes (port publication)

use std::fmt;

use dashmap::DashMap;

/// A canonical property key.
///
/// Canonical form: lower case, dashes removed, underscores read as dots and
/// purely numeric segments folded into `[n]` list indices. Environment
/// variable names therefore canonicalise to the same key as their dotted
/// file counterparts (`LDAP_EMBEDDED_BASEDN_0` → `ldap.embedded.basedn[0]`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropertyKey(String);

impl PropertyKey {
    pub fn new(raw: &str) -> Self {
        let mut canonical = String::with_capacity(raw.len());
        for segment in raw.split(['.', '_']).filter(|s| !s.is_empty()) {
            if segment.bytes().all(|b| b.is_ascii_digit()) && !canonical.is_empty() {
                canonical.push('[');
                canonical.push_str(segment);
                canonical.push(']');
                continue;
            }
            if !canonical.is_empty() {
                canonical.push('.');
            }
            canonical.extend(
                segment
                    .chars()
                    .filter(|c| *c != '-')
                    .map(|c| c.to_ascii_lowercase()),
            );
        }
        Self(canonical)
    }

    /// Key of the `index`-th element of this list-valued key.
    pub fn indexed(&self, index: usize) -> Self {
        Self(format!("{}[{}]", self.0, index))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PropertyKey {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

/// A single configuration value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    List(Vec<String>),
}

impl PropertyValue {
    /// Render the value as a string, joining lists with commas.
    pub fn as_string(&self) -> String {
        match self {
            PropertyValue::String(s) => s.clone(),
            PropertyValue::Integer(i) => i.to_string(),
            PropertyValue::Float(f) => f.to_string(),
            PropertyValue::Boolean(b) => b.to_string(),
            PropertyValue::List(items) => items.join(","),
        }
    }

    /// Interpret the value as a list. With a delimiter, strings are split
    /// and blank elements dropped; without one a string is a single element.
    pub fn as_list(&self, delimiter: Option<char>) -> Vec<String> {
        match (self, delimiter) {
            (PropertyValue::List(items), _) => items.clone(),
            (PropertyValue::String(s), Some(delimiter)) => s
                .split(delimiter)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            (PropertyValue::String(s), None) if s.trim().is_empty() => Vec::new(),
            (other, _) => vec![other.as_string()],
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_string())
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::String(s.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        PropertyValue::String(s)
    }
}

impl From<i64> for PropertyValue {
    fn from(i: i64) -> Self {
        PropertyValue::Integer(i)
    }
}

impl From<u16> for PropertyValue {
    fn from(i: u16) -> Self {
        PropertyValue::Integer(i64::from(i))
    }
}

impl From<bool> for PropertyValue {
    fn from(b: bool) -> Self {
        PropertyValue::Boolean(b)
    }
}

impl From<Vec<String>> for PropertyValue {
    fn from(items: Vec<String>) -> Self {
        PropertyValue::List(items)
    }
}

/// One named layer of configuration.
#[derive(Debug)]
pub struct PropertySource {
    name: String,
    values: DashMap<PropertyKey, PropertyValue>,
}

impl PropertySource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: DashMap::new(),
        }
    }

    /// Build a source from raw `(key, value)` pairs.
    pub fn from_pairs<K, V, I>(name: impl Into<String>, pairs: I) -> Self
    where
        K: AsRef<str>,
        V: Into<PropertyValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        let source = Self::new(name);
        for (key, value) in pairs {
            source.insert(key.as_ref(), value);
        }
        source
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, key: &PropertyKey) -> Option<PropertyValue> {
        self.values.get(key).map(|v| v.value().clone())
    }

    pub fn contains(&self, key: &PropertyKey) -> bool {
        self.values.contains_key(key)
    }

    /// Insert or overwrite a value, returning the previous one.
    pub fn insert(&self, key: impl Into<PropertyKey>, value: impl Into<PropertyValue>) -> Option<PropertyValue> {
        self.values.insert(key.into(), value.into())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Snapshot of all entries, sorted by key.
    pub fn entries(&self) -> Vec<(PropertyKey, PropertyValue)> {
        let mut entries: Vec<_> = self
            .values
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relaxed_forms_share_a_canonical_key() {
        let dotted = PropertyKey::new("ldap.embedded.base-dn");
        assert_eq!(dotted.as_str(), "ldap.embedded.basedn");
        assert_eq!(PropertyKey::new("ldap.embedded.baseDn"), dotted);
        assert_eq!(PropertyKey::new("LDAP_EMBEDDED_BASEDN"), dotted);
    }

    #[test]
    fn numeric_segments_become_indices() {
        let key = PropertyKey::new("LDAP_EMBEDDED_BASEDN_1");
        assert_eq!(key.as_str(), "ldap.embedded.basedn[1]");
        assert_eq!(PropertyKey::new("ldap.embedded.base-dn[1]").as_str(), "ldap.embedded.basedn[1]");
        assert_eq!(PropertyKey::new("ldap.embedded.base-dn").indexed(1), key);
    }

    #[test]
    fn delimiter_controls_string_splitting() {
        let value = PropertyValue::from("ldap://a:389, ,ldap://b:389");
        assert_eq!(value.as_list(Some(',')), vec!["ldap://a:389".to_string(), "ldap://b:389".to_string()]);

        let dn = PropertyValue::from("dc=spring,dc=org");
        assert_eq!(dn.as_list(None), vec!["dc=spring,dc=org".to_string()]);
        assert!(PropertyValue::from("  ").as_list(None).is_empty());
    }

    #[test]
    fn insert_overwrites() {
        let source = PropertySource::new("test");
        assert!(source.insert("local.ldap.port", 1234u16).is_none());
        let previous = source.insert("local.ldap.port", 4321u16);
        assert_eq!(previous, Some(PropertyValue::Integer(1234)));
        assert_eq!(source.len(), 1);
    }
}
