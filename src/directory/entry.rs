//! Distinguished names and directory entries.
//!
//! # Design Decisions
//! - DN identity is the normalised form: attribute names and values are
//!   case-folded, whitespace around separators is dropped
//! - The spelling a client or LDIF file used is kept for display
//! - Attribute names are case-insensitive; values keep their bytes

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DnError {
    #[error("RDN '{0}' is missing '='")]
    MissingEquals(String),

    #[error("RDN '{0}' has an empty attribute name")]
    EmptyAttribute(String),

    #[error("DN ends with a dangling escape")]
    DanglingEscape,
}

/// A parsed distinguished name.
#[derive(Debug, Clone)]
pub struct Dn {
    display: String,
    rdns: Vec<String>,
}

impl Dn {
    pub fn root() -> Self {
        Self {
            display: String::new(),
            rdns: Vec::new(),
        }
    }

    pub fn parse(raw: &str) -> Result<Self, DnError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(Self::root());
        }
        let rdns = split_unescaped(trimmed, ',')?
            .into_iter()
            .map(|rdn| normalize_rdn(&rdn))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            display: trimmed.to_string(),
            rdns,
        })
    }

    pub fn is_root(&self) -> bool {
        self.rdns.is_empty()
    }

    /// Normalised form used for identity and ordering.
    pub fn normalized(&self) -> String {
        self.rdns.join(",")
    }

    /// The DN as originally written.
    pub fn as_str(&self) -> &str {
        &self.display
    }

    /// Number of RDN components.
    pub fn depth(&self) -> usize {
        self.rdns.len()
    }

    /// Leftmost RDN, normalised.
    pub fn rdn(&self) -> Option<&str> {
        self.rdns.first().map(String::as_str)
    }

    /// The immediate parent; `None` for the root DN.
    pub fn parent(&self) -> Option<Dn> {
        if self.rdns.is_empty() {
            return None;
        }
        let display = split_unescaped(&self.display, ',')
            .map(|parts| parts[1..].join(","))
            .unwrap_or_default();
        Some(Dn {
            display: display.trim().to_string(),
            rdns: self.rdns[1..].to_vec(),
        })
    }

    /// True if `self` equals `ancestor` or sits anywhere below it.
    pub fn is_descendant_of(&self, ancestor: &Dn) -> bool {
        self.rdns.len() >= ancestor.rdns.len()
            && self.rdns[self.rdns.len() - ancestor.rdns.len()..] == ancestor.rdns[..]
    }

    /// True if `self` is exactly one level below `parent`.
    pub fn is_child_of(&self, parent: &Dn) -> bool {
        self.rdns.len() == parent.rdns.len() + 1 && self.is_descendant_of(parent)
    }
}

impl PartialEq for Dn {
    fn eq(&self, other: &Self) -> bool {
        self.rdns == other.rdns
    }
}

impl Eq for Dn {}

impl std::hash::Hash for Dn {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.rdns.hash(state);
    }
}

impl fmt::Display for Dn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display)
    }
}

fn split_unescaped(raw: &str, separator: char) -> Result<Vec<String>, DnError> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                current.push(c);
                current.push(chars.next().ok_or(DnError::DanglingEscape)?);
            }
            c if c == separator => parts.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    parts.push(current);
    Ok(parts)
}

fn normalize_rdn(rdn: &str) -> Result<String, DnError> {
    // multi-valued RDNs are sorted so `cn=a+uid=b` equals `uid=b+cn=a`
    let mut avas = split_unescaped(rdn, '+')?
        .into_iter()
        .map(|ava| {
            let (name, value) = ava
                .split_once('=')
                .ok_or_else(|| DnError::MissingEquals(rdn.trim().to_string()))?;
            let name = name.trim();
            if name.is_empty() {
                return Err(DnError::EmptyAttribute(rdn.trim().to_string()));
            }
            Ok(format!(
                "{}={}",
                name.to_ascii_lowercase(),
                value.trim().to_lowercase()
            ))
        })
        .collect::<Result<Vec<_>, _>>()?;
    avas.sort();
    Ok(avas.join("+"))
}

/// A named, multi-valued attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub values: Vec<Vec<u8>>,
}

impl Attribute {
    /// Values rendered as text (lossy for binary values).
    pub fn string_values(&self) -> impl Iterator<Item = String> + '_ {
        self.values.iter().map(|v| String::from_utf8_lossy(v).into_owned())
    }

    /// Case-insensitive value membership.
    pub fn contains_ignore_case(&self, value: &[u8]) -> bool {
        self.values.iter().any(|v| v.eq_ignore_ascii_case(value))
    }
}

/// A directory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    dn: Dn,
    // keyed by lower-cased attribute name
    attributes: BTreeMap<String, Attribute>,
}

impl Entry {
    pub fn new(dn: Dn) -> Self {
        Self {
            dn,
            attributes: BTreeMap::new(),
        }
    }

    pub fn dn(&self) -> &Dn {
        &self.dn
    }

    /// Append a value, creating the attribute on first use.
    pub fn add_value(&mut self, name: &str, value: impl Into<Vec<u8>>) {
        self.attributes
            .entry(name.to_ascii_lowercase())
            .or_insert_with(|| Attribute {
                name: name.to_string(),
                values: Vec::new(),
            })
            .values
            .push(value.into());
    }

    /// Builder-style [`Entry::add_value`].
    pub fn with(mut self, name: &str, value: impl Into<Vec<u8>>) -> Self {
        self.add_value(name, value);
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(&name.to_ascii_lowercase())
    }

    pub fn attributes(&self) -> impl Iterator<Item = &Attribute> {
        self.attributes.values()
    }

    /// Lower-cased object class names.
    pub fn object_classes(&self) -> Vec<String> {
        self.attribute("objectClass")
            .map(|a| a.string_values().map(|v| v.to_ascii_lowercase()).collect())
            .unwrap_or_default()
    }
}
