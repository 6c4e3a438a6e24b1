//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → connection.rs (id, live-connection accounting)
//!     → Hand off to the LDAP session (protocol::session)
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - Each connection tracked so status reports and metrics stay accurate
//! - Shutdown aborts connections rather than draining them

pub mod connection;
pub mod listener;
