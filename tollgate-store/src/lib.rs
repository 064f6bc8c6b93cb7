//! Persistence for Tollgate.
//!
//! Provides:
//! - The [`Store`] trait the licensing engine is written against
//! - [`SqliteStore`], a single-file SQLite implementation
//!
//! Cross-row invariants (license counters versus machine rows) are kept by
//! guarded `UPDATE ... RETURNING` statements inside a transaction, never by
//! read-modify-write in the caller.

mod error;
mod sqlite;
mod traits;

pub use error::{StoreError, StoreResult};
pub use sqlite::SqliteStore;
pub use traits::{LicenseTransition, Store};
