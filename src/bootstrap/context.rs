//! Client-side connection settings for a co-located LDAP client.

use serde::Serialize;

use crate::bootstrap::publish::{local_port_key, LDAP_SERVICE};
use crate::config::binder::Binder;
use crate::config::schema::{ClientConfig, Credential};
use crate::config::scope::ConfigScope;

/// Port assumed when none has been published.
pub const DEFAULT_LDAP_PORT: u16 = 389;

/// What a client needs to reach the embedded directory.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct ContextSource {
    pub urls: Vec<String>,
    pub base: Option<String>,
    pub user_dn: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
}

impl std::fmt::Debug for ContextSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextSource")
            .field("urls", &self.urls)
            .field("base", &self.base)
            .field("user_dn", &self.user_dn)
            .field("password", &self.password.as_ref().map(|_| "******"))
            .finish()
    }
}

impl ContextSource {
    /// Derive client settings: `ldap.urls` when set, otherwise the published
    /// local port (389 when none was published).
    pub fn from_scope(scope: &ConfigScope, credential: Option<&Credential>) -> Self {
        let client = ClientConfig::bind(scope);
        let urls = if client.urls.is_empty() {
            let port = Binder::new(scope)
                .parse::<u16>(&local_port_key(LDAP_SERVICE), "a port number")
                .ok()
                .flatten()
                .unwrap_or(DEFAULT_LDAP_PORT);
            vec![format!("ldap://localhost:{port}")]
        } else {
            client.urls
        };
        Self {
            urls,
            base: client.base,
            user_dn: credential.map(|c| c.username.clone()),
            password: credential.map(|c| c.password.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::publish::publish_port;
    use crate::config::source::PropertySource;

    #[test]
    fn falls_back_to_default_port() {
        let scope = ConfigScope::new("root");
        let context = ContextSource::from_scope(&scope, None);
        assert_eq!(context.urls, vec!["ldap://localhost:389"]);
        assert_eq!(context.user_dn, None);
    }

    #[test]
    fn uses_published_port_and_credential() {
        let scope = ConfigScope::new("root");
        publish_port(&scope, LDAP_SERVICE, 10389);
        let credential = Credential {
            username: "uid=root".into(),
            password: "secret".into(),
        };
        let context = ContextSource::from_scope(&scope, Some(&credential));
        assert_eq!(context.urls, vec!["ldap://localhost:10389"]);
        assert_eq!(context.user_dn.as_deref(), Some("uid=root"));
        assert!(!format!("{context:?}").contains("secret"));
    }

    #[test]
    fn explicit_urls_win() {
        let scope = ConfigScope::new("root");
        scope.add_last(PropertySource::from_pairs(
            "file",
            [
                ("ldap.urls", "ldap://a:389, ldap://b:389"),
                ("ldap.base", "dc=spring,dc=org"),
            ],
        ));
        publish_port(&scope, LDAP_SERVICE, 10389);
        let context = ContextSource::from_scope(&scope, None);
        assert_eq!(context.urls, vec!["ldap://a:389", "ldap://b:389"]);
        assert_eq!(context.base.as_deref(), Some("dc=spring,dc=org"));
    }
}
