//! LDAP wire protocol subsystem.
//!
//! # Data Flow
//! ```text
//! TCP bytes
//!     → ber.rs (TLV framing, size limit)
//!     → message.rs (LDAPMessage → Request)
//!     → session.rs (bind state, dispatch to the store)
//!     → message.rs (responses → BER) → TCP bytes
//! ```
//!
//! # Design Decisions
//! - Undecodable input closes the connection
//! - Recognised but unsupported operations get `unwillingToPerform`

pub mod ber;
pub mod message;
pub mod session;
