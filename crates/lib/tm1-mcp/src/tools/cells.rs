use rmcp::{
    ErrorData,
    handler::server::wrapper::Parameters,
    model::CallToolResult,
    schemars,
    tool,
    tool_router,
};
use serde::{Deserialize, Serialize};
use tm1_types::ElementAddress;

use crate::Tm1Mcp;
use crate::helpers::{self, json_result};

/// Cell coordinates: a comma separated string or a list, one element per
/// cube dimension. `hierarchy::element` selects a hierarchy.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(untagged)]
pub enum ElementList {
    Delimited(String),
    List(Vec<String>),
}

impl ElementList {
    #[must_use]
    pub fn addresses(&self) -> Vec<ElementAddress> {
        match self {
            Self::Delimited(value) => ElementAddress::parse_delimited(value),
            Self::List(values) => values
                .iter()
                .map(|value| ElementAddress::parse(value))
                .collect(),
        }
    }
}

/// Parameters for reading a cell.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct GetValueParams {
    pub cube_name: String,
    pub elements: ElementList,
}

#[tool_router(router = tool_router_cells, vis = "pub")]
impl Tm1Mcp {
    #[tool(description = "Read one cell value. 'elements' lists one element per cube dimension in cube order, as a comma separated string or a list; write 'hierarchy::element' to pick a hierarchy.")]
    async fn get_value(
        &self,
        Parameters(params): Parameters<GetValueParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let value = self
            .control
            .cell_value(&params.cube_name, &params.elements.addresses())
            .await
            .map_err(helpers::map_err)?;
        json_result(value)
    }
}
