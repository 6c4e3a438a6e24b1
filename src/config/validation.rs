//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (the binder handles syntax)
//! - Credential completeness: username and password come as a pair
//! - Validate value ranges and DN syntax
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure: raw values in, typed values or errors out
//! - Runs before a snapshot is accepted by the bootstrapper

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::Credential;
use crate::directory::entry::Dn;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("credential is incomplete: {missing} is not set")]
    PartialCredential { missing: &'static str },

    #[error("invalid base DN '{dn}': {reason}")]
    InvalidBaseDn { dn: String, reason: String },

    #[error("invalid address '{value}' for '{key}'")]
    InvalidAddress { key: String, value: String },

    #[error("'{key}' must be greater than zero")]
    NotPositive { key: String },

    #[error("invalid value '{value}' for '{key}': expected {expected}")]
    InvalidValue {
        key: String,
        value: String,
        expected: &'static str,
    },
}

/// Pair up an optional username and password.
///
/// Both absent is fine (no bind credential); exactly one present is an error.
pub fn validate_credential(
    username: Option<String>,
    password: Option<String>,
) -> Result<Option<Credential>, ValidationError> {
    match (username, password) {
        (Some(username), Some(password)) => Ok(Some(Credential { username, password })),
        (None, None) => Ok(None),
        (Some(_), None) => Err(ValidationError::PartialCredential { missing: "password" }),
        (None, Some(_)) => Err(ValidationError::PartialCredential { missing: "username" }),
    }
}

/// Check every base DN parses as a distinguished name.
pub fn validate_base_dns(base_dns: &[String]) -> Vec<ValidationError> {
    base_dns
        .iter()
        .filter_map(|dn| match Dn::parse(dn) {
            Ok(parsed) if parsed.is_root() => Some(ValidationError::InvalidBaseDn {
                dn: dn.clone(),
                reason: "the root DN cannot be a base DN".to_string(),
            }),
            Ok(_) => None,
            Err(e) => Some(ValidationError::InvalidBaseDn {
                dn: dn.clone(),
                reason: e.to_string(),
            }),
        })
        .collect()
}

pub fn validate_socket_addr(key: &str, value: &str) -> Result<SocketAddr, ValidationError> {
    value.parse().map_err(|_| ValidationError::InvalidAddress {
        key: key.to_string(),
        value: value.to_string(),
    })
}

pub fn validate_positive(key: &str, value: usize) -> Result<usize, ValidationError> {
    if value == 0 {
        return Err(ValidationError::NotPositive { key: key.to_string() });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_requires_both_halves() {
        assert_eq!(
            validate_credential(Some("uid=admin".into()), None),
            Err(ValidationError::PartialCredential { missing: "password" })
        );
        assert_eq!(
            validate_credential(None, Some("secret".into())),
            Err(ValidationError::PartialCredential { missing: "username" })
        );
        assert_eq!(validate_credential(None, None), Ok(None));
        assert!(validate_credential(Some("uid=admin".into()), Some("secret".into()))
            .unwrap()
            .is_some());
    }

    #[test]
    fn base_dns_are_checked_individually() {
        let errors = validate_base_dns(&[
            "dc=spring,dc=org".to_string(),
            "not a dn".to_string(),
            "".to_string(),
        ]);
        assert_eq!(errors.len(), 2);
    }
}
