//! Publication of bound ports into configuration scopes.

use crate::config::scope::ConfigScope;

/// Service name under which the directory port is published.
pub const LDAP_SERVICE: &str = "ldap";

/// Name of the property source holding a service's published ports.
pub fn ports_source_name(service: &str) -> String {
    format!("{service}.ports")
}

/// Key under which a service's bound port is published.
pub fn local_port_key(service: &str) -> String {
    format!("local.{service}.port")
}

/// Write `local.<service>.port = port` into the front-most `<service>.ports`
/// source of `scope` and of every ancestor, creating the source at the front
/// on first use. Other keys and sources are untouched.
pub fn publish_port(scope: &ConfigScope, service: &str, port: u16) {
    let source_name = ports_source_name(service);
    let key = local_port_key(service);
    for current in scope.self_and_ancestors() {
        let source = current.get_or_insert_first(&source_name);
        source.insert(key.as_str(), port);
        tracing::debug!(scope = current.name(), key = %key, port, "Published port");
    }
}
