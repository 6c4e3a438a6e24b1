//! Startup orchestration.
//!
//! # Responsibilities
//! - Evaluate the activation condition and log its outcome
//! - Bind the service configuration
//! - Start the embedded directory
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal to the host
//! - An inactive directory is not an error

use std::sync::Arc;

use crate::bootstrap::activation;
use crate::bootstrap::{BootstrapError, EmbeddedServiceBootstrapper};
use crate::config::scope::ConfigScope;
use crate::resource::ResourceLoader;

/// Start the directory when `scope` asks for one.
///
/// Returns `Ok(None)` when no base DN is configured.
pub async fn start_directory(
    scope: Arc<ConfigScope>,
    resources: ResourceLoader,
) -> Result<Option<EmbeddedServiceBootstrapper>, BootstrapError> {
    let outcome = activation::evaluate(&scope);
    tracing::info!(matched = outcome.matched, "{}", outcome.message);
    if !outcome.matched {
        return Ok(None);
    }

    let mut bootstrapper = EmbeddedServiceBootstrapper::new(scope, resources);
    let config = bootstrapper.derive_config()?;
    bootstrapper.start(config).await?;
    Ok(Some(bootstrapper))
}
