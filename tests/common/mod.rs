//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use embedded_directory::config::{ConfigScope, PropertySource};
use ldap3::{Ldap, LdapConnAsync};

pub const BASE_DN: &str = "dc=spring,dc=org";

pub const SAMPLE_LDIF: &str = "\
version: 1

dn: dc=spring,dc=org
objectClass: top
objectClass: domain
dc: spring

dn: ou=people,dc=spring,dc=org
objectClass: top
objectClass: organizationalUnit
ou: people

dn: uid=bob,ou=people,dc=spring,dc=org
objectClass: top
objectClass: person
objectClass: organizationalPerson
objectClass: inetOrgPerson
cn: Bob Hamilton
sn: Hamilton
uid: bob
userPassword: bobspassword

dn: uid=ben,ou=people,dc=spring,dc=org
objectClass: top
objectClass: person
objectClass: organizationalPerson
objectClass: inetOrgPerson
cn: Ben Alex
sn: Alex
uid: ben
userPassword: benspassword
";

/// A root scope holding `pairs` in a single source.
pub fn scope_with(pairs: &[(&str, &str)]) -> Arc<ConfigScope> {
    let scope = ConfigScope::new("test");
    scope.add_last(PropertySource::from_pairs("test", pairs.iter().copied()));
    scope
}

/// Write `content` under `dir` and return its `file:` location.
pub fn write_resource(dir: &Path, name: &str, content: &str) -> String {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    format!("file:{}", path.display())
}

/// Open an LDAP connection to the local directory.
pub async fn connect(port: u16) -> Ldap {
    let (conn, ldap) = LdapConnAsync::new(&format!("ldap://127.0.0.1:{port}"))
        .await
        .unwrap();
    ldap3::drive!(conn);
    ldap
}
