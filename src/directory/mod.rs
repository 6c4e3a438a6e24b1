//! In-memory directory subsystem.
//!
//! # Data Flow
//! ```text
//! LDIF resource
//!     → ldif.rs (records → entries)
//!     → schema.rs (optional entry checks)
//!     → store.rs (staged, then swapped in whole)
//!
//! Client search
//!     → protocol::session
//!     → store.rs (scope walk) + filter.rs (matching)
//! ```
//!
//! # Design Decisions
//! - Bind and search only; write requests get `unwillingToPerform`
//! - Whole-file imports; a failed import changes nothing

pub mod entry;
pub mod filter;
pub mod ldif;
pub mod schema;
pub mod server;
pub mod store;

pub use entry::{Dn, Entry};
pub use server::{DirectoryServer, DirectoryServerConfig};
pub use store::{DirectoryStore, SearchScope, StoreError};
