//! Core services for tm1-mcp.
//!
//! This crate owns the capability surface used to talk to a TM1 server, the
//! REST implementation of that surface, the scoped-session wrapper every
//! operation runs inside, and the documentation index backed by `SurrealDB`.

pub mod control;
pub mod docs;
pub mod mdx;
pub mod session;
pub mod store;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use control::{ControlError, ControlResult, Tm1ControlPlane};
pub use docs::{DocumentIndex, Embedder, OllamaEmbedder, SurrealDocIndex};
pub use session::{RestSessionFactory, SessionError, SessionFactory, Tm1ConnectionConfig, Tm1Session};
