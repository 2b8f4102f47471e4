//! MCP server implementation for tm1-mcp.
//!
//! This crate wires the TM1 control plane and the documentation index into
//! rmcp tool handlers. Every tool call opens its own TM1 session and closes it
//! before returning.

pub mod catalog;
mod helpers;
pub mod server;
mod tools;

use std::sync::Arc;

use rmcp::{
    ErrorData,
    ServerHandler,
    handler::server::tool::ToolRouter,
    tool,
    tool_handler,
    tool_router,
};
use rmcp::model::{CallToolResult, Content, ServerCapabilities, ServerInfo};
use tm1_core::control::Tm1ControlPlane;
use tm1_core::docs::DocumentIndex;

pub use catalog::{Access, CATALOG, ToolSpec};

const SERVER_INSTRUCTIONS: &str = r"tm1-mcp exposes an IBM Planning Analytics (TM1) server as MCP tools.

Every tool opens its own TM1 session, performs one request (or a short fixed sequence), and
closes the session before returning. Tools are independent; nothing is cached between calls.

Groups:
- cubes: `get_all_cubes`, `get_model_cubes`, `get_control_cubes`, `get_cube_count`, `check_cube_exists`,
  `get_cube`, `get_cube_dimensions`, `get_cube_rules`, `check_cube_rules`, `update_cube_rules`,
  `lock_cube`, `unlock_cube`, `load_cube`, `unload_cube`, `get_storage_dimension_order`,
  `update_storage_dimension_order`, `get_cube_vmm`, `get_cube_vmt`, `set_cube_vmm`, `set_cube_vmt`.
- cells and MDX: `get_value`, `execute_mdx`.
- dimensions: `get_all_dimensions`, `get_model_dimensions`, `get_dimension_count`, `dimension_exists`,
  `get_dimension`, `execute_dimension_mdx`.
- elements: `get_element`, `get_elements`, `get_leaf_elements`, `get_consolidated_elements`,
  `get_elements_by_level`, `get_element_types`, `get_parents`, `get_members_under_consolidation`,
  `element_is_parent`, `element_is_ancestor` and the name-only variants.
- documentation: `get_documentation` searches TurboIntegrator reference material.

Notes:
- Mutating tools return `{status, message}`; `status` is `success`, `error` or `warning`.
  A mutation on a missing cube returns `error` without touching the server.
- Reads of a missing cube, dimension or element return `{}` or `[]`; existence and relation
  checks return `false`.
- `get_value` takes one element per cube dimension; write `hierarchy::element` to pick a hierarchy.
- Use `help` for the full catalog with arguments and access level. `health` returns `ok`.";

/// MCP server wrapper around the TM1 control plane and tool routers.
#[derive(Clone)]
pub struct Tm1Mcp {
    tool_router: ToolRouter<Self>,
    control: Tm1ControlPlane,
    docs: Arc<dyn DocumentIndex>,
}

impl Tm1Mcp {
    #[must_use]
    pub fn new(control: Tm1ControlPlane, docs: Arc<dyn DocumentIndex>) -> Self {
        let tool_router = Self::tool_router_core()
            + Self::tool_router_cubes()
            + Self::tool_router_cells()
            + Self::tool_router_mdx()
            + Self::tool_router_dimensions()
            + Self::tool_router_elements()
            + Self::tool_router_docs();
        Self {
            tool_router,
            control,
            docs,
        }
    }

    /// Names of every registered tool.
    #[must_use]
    pub fn tool_names(&self) -> Vec<String> {
        self.tool_router
            .list_all()
            .into_iter()
            .map(|tool| tool.name.to_string())
            .collect()
    }
}

#[tool_router(router = tool_router_core, vis = "pub")]
impl Tm1Mcp {
    #[tool(description = "Health check. Returns 'ok'.")]
    async fn health(&self) -> Result<CallToolResult, ErrorData> {
        Ok(CallToolResult::success(vec![Content::text("ok")]))
    }

    #[tool(description = "List every tool with its arguments, result shape and access level (read, check, mutate).")]
    async fn help(&self) -> Result<CallToolResult, ErrorData> {
        Ok(CallToolResult::success(vec![Content::json(CATALOG)?]))
    }

    #[tool(description = "Get the product version of the TM1 server.")]
    async fn get_server_version(&self) -> Result<CallToolResult, ErrorData> {
        let version = self
            .control
            .server_version()
            .await
            .map_err(helpers::map_err)?;
        Ok(CallToolResult::success(vec![Content::text(version)]))
    }
}

#[tool_handler]
impl ServerHandler for Tm1Mcp {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(SERVER_INSTRUCTIONS.to_string()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}
