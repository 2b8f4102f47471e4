use rmcp::{
    ErrorData,
    handler::server::wrapper::Parameters,
    model::CallToolResult,
    schemars,
    tool,
    tool_router,
};
use serde::{Deserialize, Serialize};

use crate::Tm1Mcp;
use crate::helpers::{self, json_result};

/// Parameters for running an MDX query.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ExecuteMdxParams {
    pub mdx: String,
}

#[tool_router(router = tool_router_mdx, vis = "pub")]
impl Tm1Mcp {
    #[tool(description = "Run an MDX query. Returns one {coordinates, value} row per cell; coordinates list the member names of every axis.")]
    async fn execute_mdx(
        &self,
        Parameters(params): Parameters<ExecuteMdxParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let rows = self
            .control
            .execute_mdx(&params.mdx)
            .await
            .map_err(helpers::map_err)?;
        json_result(rows)
    }
}
