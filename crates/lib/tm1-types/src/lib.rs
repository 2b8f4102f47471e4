//! Data model and naming helpers for tm1-mcp.
//!
//! This crate defines the typed records returned by the TM1 capability
//! surface, the status envelope used by mutating tools, and the naming rules
//! shared by the REST client and the MCP layer.

pub mod models;
pub mod schema;

pub use models::*;
