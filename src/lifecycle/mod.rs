//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Activation check → Bind config → Start directory
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Close sessions → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: data is loaded before the first client is accepted
//! - Ordered shutdown: stop accept, close sessions, release the port

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use signals::wait_for_signal;
pub use startup::start_directory;
