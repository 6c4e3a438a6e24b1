//! Management endpoint tests over real HTTP.

use std::sync::Arc;

use embedded_directory::admin::{DirectoryView, ManagementServer, ManagementState};
use embedded_directory::bootstrap::EmbeddedServiceBootstrapper;
use embedded_directory::config::ManagementConfig;
use embedded_directory::lifecycle::Shutdown;
use embedded_directory::resource::ResourceLoader;
use reqwest::StatusCode;
use serde_json::Value;
use tokio::net::TcpListener;

mod common;

use common::{scope_with, write_resource, BASE_DN, SAMPLE_LDIF};

const API_KEY: &str = "management-test-key";

#[tokio::test]
async fn reports_the_running_directory() {
    let dir = tempfile::tempdir().unwrap();
    let ldif = write_resource(dir.path(), "users.ldif", SAMPLE_LDIF);
    let scope = scope_with(&[
        ("ldap.embedded.base-dn", BASE_DN),
        ("ldap.embedded.port", "0"),
        ("ldap.embedded.ldif", ldif.as_str()),
        ("ldap.embedded.credential.username", "uid=admin"),
        ("ldap.embedded.credential.password", "adminpassword"),
    ]);

    let mut bootstrapper = EmbeddedServiceBootstrapper::new(Arc::clone(&scope), ResourceLoader::default());
    let config = bootstrapper.derive_config().unwrap();
    bootstrapper.start(config).await.unwrap();
    let port = bootstrapper.handle().listening_port().unwrap();

    let management = ManagementConfig {
        enabled: true,
        api_key: API_KEY.to_string(),
        ..ManagementConfig::default()
    };
    let state = ManagementState::new(
        Arc::clone(&scope),
        &management,
        DirectoryView::capture(&bootstrapper),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let shutdown = Shutdown::new();
    let server = tokio::spawn(ManagementServer::new(state).run(listener, shutdown.subscribe()));

    let client = reqwest::Client::new();

    let unauthorized = client
        .get(format!("{base}/admin/directory"))
        .send()
        .await
        .unwrap();
    assert_eq!(unauthorized.status(), StatusCode::UNAUTHORIZED);

    let directory: Value = client
        .get(format!("{base}/admin/directory"))
        .bearer_auth(API_KEY)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(directory["state"], "running");
    assert_eq!(directory["port"], port);
    assert_eq!(directory["entries"], 4);
    assert_eq!(directory["base_dns"][0], BASE_DN);

    let config: Value = client
        .get(format!("{base}/admin/config"))
        .bearer_auth(API_KEY)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let sources = config[0]["sources"].as_array().unwrap();
    assert_eq!(sources[0]["name"], "ldap.ports");
    assert_eq!(sources[0]["properties"]["local.ldap.port"], port.to_string());
    let test_source = sources.iter().find(|s| s["name"] == "test").unwrap();
    assert_eq!(
        test_source["properties"]["ldap.embedded.credential.password"],
        "******"
    );

    // once stopped the directory route disappears
    bootstrapper.stop().await;
    let gone = client
        .get(format!("{base}/admin/directory"))
        .bearer_auth(API_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(gone.status(), StatusCode::NOT_FOUND);

    drop(client);
    shutdown.trigger();
    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn directory_route_can_be_disabled() {
    let scope = scope_with(&[("ldap.embedded.base-dn", BASE_DN), ("ldap.embedded.port", "0")]);
    let mut bootstrapper = EmbeddedServiceBootstrapper::new(Arc::clone(&scope), ResourceLoader::default());
    let config = bootstrapper.derive_config().unwrap();
    bootstrapper.start(config).await.unwrap();

    let management = ManagementConfig {
        enabled: true,
        api_key: API_KEY.to_string(),
        directory_endpoint_enabled: false,
        ..ManagementConfig::default()
    };
    let state = ManagementState::new(scope, &management, DirectoryView::capture(&bootstrapper));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let shutdown = Shutdown::new();
    let server = tokio::spawn(ManagementServer::new(state).run(listener, shutdown.subscribe()));

    let client = reqwest::Client::new();
    let response = client
        .get(format!("{base}/admin/directory"))
        .bearer_auth(API_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let status: Value = client
        .get(format!("{base}/admin/status"))
        .bearer_auth(API_KEY)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["status"], "operational");

    drop(client);
    shutdown.trigger();
    server.await.unwrap().unwrap();
    bootstrapper.stop().await;
}
