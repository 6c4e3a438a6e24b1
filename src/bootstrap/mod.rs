//! Embedded directory bootstrap.
//!
//! # Data Flow
//! ```text
//! ConfigScope
//!     → activation.rs (base-dn present?)
//!     → ServiceConfig::bind (validated snapshot)
//!     → bootstrapper.rs
//!         schema (standard + custom) → bind listener → import LDIF
//!         → accept clients → publish local.ldap.port
//!     → handle.rs (port + state for observers)
//!     → context.rs (client URL/base/credential)
//! ```
//!
//! # Responsibilities
//! - Decide whether the directory should run at all
//! - Start it with a fully loaded data set before any client is accepted
//! - Publish the bound port to the scope and every ancestor
//! - Stop it idempotently and release the port
//!
//! # Design Decisions
//! - State is an `AtomicU8` with compare-and-swap transitions
//! - A failed start never leaves a bound listener behind

pub mod activation;
pub mod bootstrapper;
pub mod context;
pub mod error;
pub mod handle;
pub mod publish;

pub use activation::{should_activate, ConditionOutcome};
pub use bootstrapper::EmbeddedServiceBootstrapper;
pub use context::ContextSource;
pub use error::BootstrapError;
pub use handle::{RuntimeHandle, ServerState};
pub use publish::{publish_port, LDAP_SERVICE};
