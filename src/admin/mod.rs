//! Management endpoint.
//!
//! # Data Flow
//! ```text
//! HTTP request
//!     → TraceLayer / TimeoutLayer
//!     → auth.rs (Bearer api-key)
//!     → handlers.rs (status, directory, config)
//!     → JSON response
//! ```
//!
//! # Design Decisions
//! - Read-only: nothing here can change the directory or its configuration
//! - The directory route answers 404 unless the directory is running and the
//!   route is enabled

pub mod auth;
pub mod handlers;
pub mod state;

use std::time::Duration;

use axum::{middleware, routing::get, Router};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use self::auth::admin_auth_middleware;
use self::handlers::{get_config, get_directory, get_status};
pub use self::state::{DirectoryView, ManagementState};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[allow(deprecated)]
pub fn setup_admin_router(state: ManagementState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/directory", get(get_directory))
        .route("/admin/config", get(get_config))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(TraceLayer::new_for_http())
}

/// HTTP server for the management endpoint.
pub struct ManagementServer {
    router: Router,
}

impl ManagementServer {
    pub fn new(state: ManagementState) -> Self {
        Self {
            router: setup_admin_router(state),
        }
    }

    /// Serve until `shutdown` fires, then finish in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Management endpoint starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("Management endpoint stopped");
        Ok(())
    }
}
