//! Store interfaces and `SurrealDB` implementation.
//!
//! The store layer persists documentation records and ranks them against a
//! query embedding. Ranking runs inside the database.

pub mod surreal;

pub use surreal::{StoreError, StoreResult, SurrealDocStore};
