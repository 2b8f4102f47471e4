use rmcp::{
    ErrorData,
    handler::server::wrapper::Parameters,
    model::CallToolResult,
    schemars,
    tool,
    tool_router,
};
use serde::{Deserialize, Serialize};
use tm1_types::EntityScope;

use crate::Tm1Mcp;
use crate::helpers::{self, json_result, optional_result};

#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct DimensionNameParams {
    pub dimension_name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, schemars::JsonSchema)]
pub struct DimensionCountParams {
    /// Leave out control dimensions (names starting with `}`).
    pub skip_control_dims: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct DimensionMdxParams {
    pub dimension_name: String,
    /// MDX set expression, e.g. `{TM1SUBSETALL([Month])}`.
    pub mdx: String,
}

#[tool_router(router = tool_router_dimensions, vis = "pub")]
impl Tm1Mcp {
    #[tool(description = "List the names of all dimensions, including control dimensions.")]
    async fn get_all_dimensions(&self) -> Result<CallToolResult, ErrorData> {
        let names = self
            .control
            .dimension_names(EntityScope::All)
            .await
            .map_err(helpers::map_err)?;
        json_result(names)
    }

    #[tool(description = "List the names of model dimensions (control dimensions excluded).")]
    async fn get_model_dimensions(&self) -> Result<CallToolResult, ErrorData> {
        let names = self
            .control
            .dimension_names(EntityScope::Model)
            .await
            .map_err(helpers::map_err)?;
        json_result(names)
    }

    #[tool(description = "Count dimensions, optionally skipping control dimensions.")]
    async fn get_dimension_count(
        &self,
        Parameters(params): Parameters<DimensionCountParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let count = self
            .control
            .dimension_count(params.skip_control_dims.unwrap_or(false))
            .await
            .map_err(helpers::map_err)?;
        json_result(count)
    }

    #[tool(description = "Check whether a dimension exists.")]
    async fn dimension_exists(
        &self,
        Parameters(params): Parameters<DimensionNameParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let exists = self
            .control
            .dimension_exists(&params.dimension_name)
            .await
            .map_err(helpers::map_err)?;
        json_result(exists)
    }

    #[tool(description = "Get a dimension with its hierarchies, elements and edges. Returns {} when the dimension does not exist.")]
    async fn get_dimension(
        &self,
        Parameters(params): Parameters<DimensionNameParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let dimension = self
            .control
            .dimension(&params.dimension_name)
            .await
            .map_err(helpers::map_err)?;
        optional_result(dimension)
    }

    #[tool(description = "Evaluate an MDX set expression over a dimension and return the element names. Returns [] when the dimension does not exist.")]
    async fn execute_dimension_mdx(
        &self,
        Parameters(params): Parameters<DimensionMdxParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let members = self
            .control
            .execute_dimension_mdx(&params.dimension_name, &params.mdx)
            .await
            .map_err(helpers::map_err)?;
        json_result(members)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{json_of, server};
    use rmcp::model::ErrorCode;
    use serde_json::json;
    use tm1_core::mock::{MockTm1, hierarchy_dimension};
    use tm1_types::ElementType;

    fn model() -> MockTm1 {
        MockTm1::new()
            .with_dimension(hierarchy_dimension(
                "Month",
                &[("Q1", ElementType::Consolidated), ("Jan", ElementType::Numeric)],
                &[("Q1", "Jan")],
            ))
            .with_dimension(hierarchy_dimension("}Clients", &[("Admin", ElementType::String)], &[]))
    }

    #[tokio::test]
    async fn counts_and_lists_respect_control_prefix() {
        let tm1 = model();
        let mcp = server(&tm1);

        let all = mcp
            .get_dimension_count(Parameters(DimensionCountParams::default()))
            .await
            .expect("count should run");
        let model_only = mcp
            .get_model_dimensions()
            .await
            .expect("listing should run");

        assert_eq!(json_of(&all), json!(2));
        assert_eq!(json_of(&model_only), json!(["Month"]));
    }

    #[tokio::test]
    async fn missing_dimension_is_empty() {
        let tm1 = model();
        let mcp = server(&tm1);

        let dimension = mcp
            .get_dimension(Parameters(DimensionNameParams {
                dimension_name: "Nope".to_string(),
            }))
            .await
            .expect("read should run");
        let members = mcp
            .execute_dimension_mdx(Parameters(DimensionMdxParams {
                dimension_name: "Nope".to_string(),
                mdx: "{TM1SUBSETALL([Nope])}".to_string(),
            }))
            .await
            .expect("read should run");

        assert_eq!(json_of(&dimension), json!({}));
        assert_eq!(json_of(&members), json!([]));
    }

    #[tokio::test]
    async fn dimension_mdx_returns_members() {
        let set = "{TM1SUBSETALL([Month])}";
        let tm1 = model().with_set_result(set, &["Q1", "Jan"]);
        let mcp = server(&tm1);

        let members = mcp
            .execute_dimension_mdx(Parameters(DimensionMdxParams {
                dimension_name: "Month".to_string(),
                mdx: set.to_string(),
            }))
            .await
            .expect("set should evaluate");
        let empty = mcp
            .execute_dimension_mdx(Parameters(DimensionMdxParams {
                dimension_name: "Month".to_string(),
                mdx: "  ".to_string(),
            }))
            .await
            .expect_err("empty expression should be rejected");

        assert_eq!(json_of(&members), json!(["Q1", "Jan"]));
        assert_eq!(empty.code, ErrorCode::INVALID_PARAMS);
    }
}
