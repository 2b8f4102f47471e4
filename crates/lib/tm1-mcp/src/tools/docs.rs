use rmcp::{
    ErrorData,
    handler::server::wrapper::Parameters,
    model::CallToolResult,
    schemars,
    tool,
    tool_router,
};
use serde::{Deserialize, Serialize};
use tm1_core::docs;

use crate::Tm1Mcp;
use crate::helpers::{self, json_result};

/// Parameters for a documentation search.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct DocumentationParams {
    pub query_text: String,
    /// Number of documents to return (default 1).
    pub limit: Option<usize>,
}

#[tool_router(router = tool_router_docs, vis = "pub")]
impl Tm1Mcp {
    #[tool(description = "Search TurboIntegrator reference documentation. Returns {query, documents}; documents are ranked best first, one by default.")]
    async fn get_documentation(
        &self,
        Parameters(params): Parameters<DocumentationParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let result = docs::lookup(self.docs.as_ref(), &params.query_text, params.limit)
            .await
            .map_err(helpers::map_err)?;
        json_result(result)
    }
}
