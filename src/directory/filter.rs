//! Search filter evaluation.
//!
//! # Design Decisions
//! - Attribute names match case-insensitively
//! - Values compare case-insensitively (directory string semantics)
//! - Ordering compares numerically when both sides are integers
//! - An empty `and` is true and an empty `or` is false (RFC 4526)

use std::cmp::Ordering;

use crate::directory::entry::Entry;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Equality { attribute: String, value: Vec<u8> },
    Substrings {
        attribute: String,
        initial: Option<Vec<u8>>,
        any: Vec<Vec<u8>>,
        last: Option<Vec<u8>>,
    },
    GreaterOrEqual { attribute: String, value: Vec<u8> },
    LessOrEqual { attribute: String, value: Vec<u8> },
    Present(String),
    /// Approximate match, evaluated as equality.
    Approx { attribute: String, value: Vec<u8> },
}

impl Filter {
    /// `(objectClass=*)`, the conventional match-all filter.
    pub fn match_all() -> Self {
        Filter::Present("objectClass".to_string())
    }

    pub fn matches(&self, entry: &Entry) -> bool {
        match self {
            Filter::And(filters) => filters.iter().all(|f| f.matches(entry)),
            Filter::Or(filters) => filters.iter().any(|f| f.matches(entry)),
            Filter::Not(filter) => !filter.matches(entry),
            Filter::Present(attribute) => entry.attribute(attribute).is_some(),
            Filter::Equality { attribute, value } | Filter::Approx { attribute, value } => {
                values(entry, attribute).any(|v| fold(v) == fold(value))
            }
            Filter::GreaterOrEqual { attribute, value } => {
                values(entry, attribute).any(|v| compare(v, value) != Ordering::Less)
            }
            Filter::LessOrEqual { attribute, value } => {
                values(entry, attribute).any(|v| compare(v, value) != Ordering::Greater)
            }
            Filter::Substrings {
                attribute,
                initial,
                any,
                last,
            } => values(entry, attribute).any(|v| {
                substring_match(&fold(v), initial.as_deref(), any, last.as_deref())
            }),
        }
    }
}

fn values<'a>(entry: &'a Entry, attribute: &str) -> impl Iterator<Item = &'a [u8]> {
    entry
        .attribute(attribute)
        .into_iter()
        .flat_map(|a| a.values.iter().map(Vec::as_slice))
}

fn fold(value: &[u8]) -> String {
    String::from_utf8_lossy(value).trim().to_lowercase()
}

fn compare(left: &[u8], right: &[u8]) -> Ordering {
    let (left, right) = (fold(left), fold(right));
    match (left.parse::<i64>(), right.parse::<i64>()) {
        (Ok(l), Ok(r)) => l.cmp(&r),
        _ => left.cmp(&right),
    }
}

fn substring_match(value: &str, initial: Option<&[u8]>, any: &[Vec<u8>], last: Option<&[u8]>) -> bool {
    let mut rest = value;
    if let Some(initial) = initial {
        let initial = fold(initial);
        match rest.strip_prefix(initial.as_str()) {
            Some(remaining) => rest = remaining,
            None => return false,
        }
    }
    for fragment in any {
        let fragment = fold(fragment);
        match rest.find(fragment.as_str()) {
            Some(index) => rest = &rest[index + fragment.len()..],
            None => return false,
        }
    }
    match last {
        Some(last) => rest.ends_with(fold(last).as_str()),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::entry::Dn;

    fn bob() -> Entry {
        Entry::new(Dn::parse("uid=bob,ou=people,dc=spring,dc=org").unwrap())
            .with("objectClass", "inetOrgPerson")
            .with("cn", "Bob Hamilton")
            .with("uid", "bob")
            .with("employeeNumber", "42")
    }

    fn eq(attribute: &str, value: &str) -> Filter {
        Filter::Equality {
            attribute: attribute.to_string(),
            value: value.as_bytes().to_vec(),
        }
    }

    #[test]
    fn equality_and_presence() {
        let entry = bob();
        assert!(Filter::match_all().matches(&entry));
        assert!(eq("UID", "BOB").matches(&entry));
        assert!(!eq("uid", "alice").matches(&entry));
        assert!(!Filter::Present("mail".into()).matches(&entry));
    }

    #[test]
    fn boolean_combinations() {
        let entry = bob();
        assert!(Filter::And(vec![eq("uid", "bob"), Filter::Not(Box::new(eq("uid", "ben")))])
            .matches(&entry));
        assert!(Filter::Or(vec![eq("uid", "ben"), eq("cn", "bob hamilton")]).matches(&entry));
        assert!(Filter::And(vec![]).matches(&entry));
        assert!(!Filter::Or(vec![]).matches(&entry));
    }

    #[test]
    fn substrings_match_in_order() {
        let entry = bob();
        let substrings = |initial: Option<&str>, any: &[&str], last: Option<&str>| Filter::Substrings {
            attribute: "cn".into(),
            initial: initial.map(|s| s.as_bytes().to_vec()),
            any: any.iter().map(|s| s.as_bytes().to_vec()).collect(),
            last: last.map(|s| s.as_bytes().to_vec()),
        };
        assert!(substrings(Some("bob"), &[], None).matches(&entry));
        assert!(substrings(None, &["ham"], Some("ton")).matches(&entry));
        assert!(substrings(Some("b"), &["ob", "ham"], None).matches(&entry));
        assert!(!substrings(Some("ham"), &[], None).matches(&entry));
        assert!(!substrings(None, &["ton", "ham"], None).matches(&entry));
    }

    #[test]
    fn ordering_is_numeric_for_integers() {
        let entry = bob();
        let ge = Filter::GreaterOrEqual {
            attribute: "employeeNumber".into(),
            value: b"9".to_vec(),
        };
        let le = Filter::LessOrEqual {
            attribute: "employeeNumber".into(),
            value: b"100".to_vec(),
        };
        assert!(ge.matches(&entry));
        assert!(le.matches(&entry));
    }
}
