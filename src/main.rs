//! Embedded LDAP directory host.
//!
//! # Architecture Overview
//!
//! ```text
//!     config files / env / --set
//!             │
//!             ▼
//!     ┌──────────────┐     ┌──────────────────────────────────────────┐
//!     │ ConfigScope  │────▶│ bootstrap                                │
//!     │ (layers)     │◀────│  activation → schema → bind → LDIF       │
//!     └──────────────┘     │  → accept → publish local.ldap.port      │
//!        ▲     ▲           └───────────────┬──────────────────────────┘
//!        │     │                           ▼
//!        │     │           ┌──────────────────────────────────────────┐
//!        │     │  LDAP ───▶│ net listener → protocol session → store  │
//!        │     │           └──────────────────────────────────────────┘
//!        │     │
//!        │  ┌──┴───────────┐   ┌──────────────┐
//!        └──│ admin (HTTP) │   │ observability│
//!           └──────────────┘   └──────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use embedded_directory::admin::{DirectoryView, ManagementServer, ManagementState};
use embedded_directory::bootstrap::EmbeddedServiceBootstrapper;
use embedded_directory::config::loader::{command_line_source, environment_source, load_config};
use embedded_directory::config::{ConfigError, ConfigScope, LoggingConfig, ManagementConfig};
use embedded_directory::lifecycle::{start_directory, wait_for_signal, Shutdown};
use embedded_directory::observability::{logging, metrics};
use embedded_directory::resource::ResourceLoader;

#[derive(Parser, Debug)]
#[command(author, version, about = "Embedded LDAP directory", long_about = None)]
struct Args {
    /// TOML configuration file; later files override earlier ones
    #[arg(short, long = "config", value_name = "FILE")]
    config: Vec<PathBuf>,

    /// Property override, highest precedence
    #[arg(long = "set", value_name = "KEY=VALUE")]
    set: Vec<String>,

    /// Directory that `classpath:` and relative locations resolve against
    #[arg(long, default_value = ".")]
    resource_root: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let scope = build_scope(&args)?;

    let logging_config = LoggingConfig::bind(&scope)?;
    logging::init_logging(&logging_config);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "embedded-directory starting");

    let management = ManagementConfig::bind(&scope)?;
    if management.metrics_enabled {
        if let Err(e) = metrics::init_metrics(management.metrics_address) {
            tracing::error!(error = %e, "Failed to start metrics exporter");
        }
    }

    let resources = ResourceLoader::new(args.resource_root.clone());
    let mut directory = start_directory(Arc::clone(&scope), resources).await?;

    let result = serve(&scope, &management, directory.as_ref()).await;

    if let Some(bootstrapper) = directory.as_mut() {
        bootstrapper.stop().await;
    }
    tracing::info!("embedded-directory stopped");
    result
}

/// Layer the scope: command line, then environment, then files with the
/// last file first.
fn build_scope(args: &Args) -> Result<Arc<ConfigScope>, ConfigError> {
    let scope = ConfigScope::new("application");
    scope.add_last(command_line_source(args.set.as_slice())?);
    scope.add_last(environment_source(std::env::vars()));
    for path in args.config.iter().rev() {
        scope.add_last(load_config(path)?);
    }
    Ok(scope)
}

async fn serve(
    scope: &Arc<ConfigScope>,
    management: &ManagementConfig,
    directory: Option<&EmbeddedServiceBootstrapper>,
) -> Result<(), Box<dyn std::error::Error>> {
    if directory.is_none() && !management.enabled {
        tracing::info!("Nothing to run");
        return Ok(());
    }

    let shutdown = Shutdown::new();
    let mut management_task = None;
    if management.enabled {
        let view = directory.and_then(DirectoryView::capture);
        let state = ManagementState::new(Arc::clone(scope), management, view);
        let listener = TcpListener::bind(management.bind_address).await?;
        let server = ManagementServer::new(state);
        management_task = Some(tokio::spawn(server.run(listener, shutdown.subscribe())));
    }

    let signal = wait_for_signal().await;
    tracing::info!(signal, "Shutdown requested");
    shutdown.trigger();

    if let Some(task) = management_task {
        match task.await {
            Ok(Err(e)) => tracing::error!(error = %e, "Management endpoint failed"),
            Err(e) => tracing::error!(error = %e, "Management task panicked"),
            Ok(Ok(())) => {}
        }
    }
    Ok(())
}
