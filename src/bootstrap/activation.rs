//! Activation condition: the service runs only when base DNs are configured.

use crate::config::binder::Binder;
use crate::config::schema::BASE_DN_KEY;
use crate::config::scope::ConfigScope;

/// Result of evaluating the activation condition, with a message for logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionOutcome {
    pub matched: bool,
    pub message: String,
}

/// Evaluate whether `ldap.embedded.base-dn` resolves to a non-empty list in
/// any layer or relaxed form. Reads only.
pub fn evaluate(scope: &ConfigScope) -> ConditionOutcome {
    let base_dns = Binder::new(scope).list(BASE_DN_KEY, None);
    if base_dns.is_empty() {
        ConditionOutcome {
            matched: false,
            message: "No base-dn property found".to_string(),
        }
    } else {
        ConditionOutcome {
            matched: true,
            message: format!("Found base-dn property ({})", base_dns.join("; ")),
        }
    }
}

pub fn should_activate(scope: &ConfigScope) -> bool {
    evaluate(scope).matched
}
