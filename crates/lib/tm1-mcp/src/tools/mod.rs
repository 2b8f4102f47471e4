//! MCP tool modules.
//!
//! Tools are grouped by domain: cubes, cells, MDX, dimensions, elements, and
//! the documentation lookup.

pub mod cells;
pub mod cubes;
pub mod dimensions;
pub mod docs;
pub mod elements;
pub mod mdx;
