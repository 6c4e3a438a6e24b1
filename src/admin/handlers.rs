use std::collections::BTreeMap;

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::admin::state::ManagementState;
use crate::bootstrap::ServerState;
use crate::config::source::{PropertyKey, PropertyValue};

const MASK: &str = "******";
const SECRET_MARKERS: [&str; 3] = ["password", "apikey", "secret"];

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
}

#[derive(Serialize)]
pub struct DirectoryStatus {
    pub state: ServerState,
    pub port: Option<u16>,
    pub base_dns: Vec<String>,
    pub entries: usize,
    pub active_connections: u64,
    pub schema_validation: bool,
    pub urls: Vec<String>,
}

#[derive(Serialize)]
pub struct SourceReport {
    pub name: String,
    pub properties: BTreeMap<String, String>,
}

#[derive(Serialize)]
pub struct ScopeReport {
    pub name: String,
    pub sources: Vec<SourceReport>,
}

pub async fn get_status() -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
    })
}

pub async fn get_directory(
    State(state): State<ManagementState>,
) -> Result<Json<DirectoryStatus>, StatusCode> {
    let view = state.directory().ok_or(StatusCode::NOT_FOUND)?;
    let current = view.handle.state();
    if current != ServerState::Running {
        return Err(StatusCode::NOT_FOUND);
    }

    Ok(Json(DirectoryStatus {
        state: current,
        port: view.handle.listening_port(),
        base_dns: view.store.base_dns().iter().map(ToString::to_string).collect(),
        entries: view.store.len(),
        active_connections: view.connections.active_count(),
        schema_validation: view.config.validation.enabled,
        urls: view.context.urls.clone(),
    }))
}

pub async fn get_config(State(state): State<ManagementState>) -> Json<Vec<ScopeReport>> {
    let reports = state
        .scope()
        .self_and_ancestors()
        .map(|scope| ScopeReport {
            name: scope.name().to_string(),
            sources: scope
                .sources()
                .iter()
                .map(|source| SourceReport {
                    name: source.name().to_string(),
                    properties: source
                        .entries()
                        .into_iter()
                        .map(|(key, value)| (key.as_str().to_string(), display_value(&key, &value)))
                        .collect(),
                })
                .collect(),
        })
        .collect();
    Json(reports)
}

fn display_value(key: &PropertyKey, value: &PropertyValue) -> String {
    if is_secret(key) {
        MASK.to_string()
    } else {
        value.to_string()
    }
}

fn is_secret(key: &PropertyKey) -> bool {
    let key = key.as_str();
    SECRET_MARKERS.iter().any(|marker| key.contains(marker))
}
