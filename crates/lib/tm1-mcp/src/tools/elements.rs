use rmcp::{
    ErrorData,
    handler::server::wrapper::Parameters,
    model::{CallToolResult, ErrorCode},
    schemars,
    tool,
    tool_router,
};
use serde::{Deserialize, Serialize};
use tm1_types::{AncestorMethod, ElementFilter};

use crate::Tm1Mcp;
use crate::helpers::{self, json_result, optional_result};

/// Parameters naming a hierarchy of a dimension.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct HierarchyParams {
    pub dimension_name: String,
    pub hierarchy_name: String,
}

/// Parameters naming a single element.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ElementParams {
    pub dimension_name: String,
    pub hierarchy_name: String,
    pub element_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct LevelParams {
    pub dimension_name: String,
    pub hierarchy_name: String,
    /// Leaves sit at level 0.
    pub level: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ElementTypesParams {
    pub dimension_name: String,
    pub hierarchy_name: String,
    pub skip_consolidations: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ConsolidationParams {
    pub dimension_name: String,
    pub hierarchy_name: String,
    pub consolidation: String,
    /// Levels to descend (default 99).
    pub max_depth: Option<u32>,
    pub leaves_only: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct LeavesParams {
    pub dimension_name: String,
    pub hierarchy_name: String,
    pub consolidation: String,
    pub max_depth: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct IsParentParams {
    pub dimension_name: String,
    pub hierarchy_name: String,
    pub parent_name: String,
    pub element_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct IsAncestorParams {
    pub dimension_name: String,
    pub hierarchy_name: String,
    pub ancestor_name: String,
    pub element_name: String,
    /// `TM1DrillDownMember` (default), `Descendants` or `TI`.
    pub method: Option<String>,
}

impl IsAncestorParams {
    fn method(&self) -> Result<AncestorMethod, ErrorData> {
        self.method.as_deref().map_or(Ok(AncestorMethod::default()), |method| {
            method
                .parse()
                .map_err(|message: String| helpers::mcp_err(ErrorCode::INVALID_PARAMS, message))
        })
    }
}

impl Tm1Mcp {
    async fn element_list(
        &self,
        params: &HierarchyParams,
        filter: ElementFilter,
    ) -> Result<CallToolResult, ErrorData> {
        let elements = self
            .control
            .elements(&params.dimension_name, &params.hierarchy_name, filter)
            .await
            .map_err(helpers::map_err)?;
        json_result(elements)
    }

    async fn element_name_list(
        &self,
        dimension_name: &str,
        hierarchy_name: &str,
        filter: ElementFilter,
    ) -> Result<CallToolResult, ErrorData> {
        let names = self
            .control
            .element_names(dimension_name, hierarchy_name, filter)
            .await
            .map_err(helpers::map_err)?;
        json_result(names)
    }
}

#[tool_router(router = tool_router_elements, vis = "pub")]
impl Tm1Mcp {
    #[tool(description = "Get one element with its type, level and attributes. Returns {} when it does not exist.")]
    async fn get_element(
        &self,
        Parameters(params): Parameters<ElementParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let element = self
            .control
            .element(&params.dimension_name, &params.hierarchy_name, &params.element_name)
            .await
            .map_err(helpers::map_err)?;
        optional_result(element)
    }

    #[tool(description = "List every element of a hierarchy.")]
    async fn get_elements(
        &self,
        Parameters(params): Parameters<HierarchyParams>,
    ) -> Result<CallToolResult, ErrorData> {
        self.element_list(&params, ElementFilter::All).await
    }

    #[tool(description = "List the leaf (numeric and string) elements of a hierarchy.")]
    async fn get_leaf_elements(
        &self,
        Parameters(params): Parameters<HierarchyParams>,
    ) -> Result<CallToolResult, ErrorData> {
        self.element_list(&params, ElementFilter::Leaves).await
    }

    #[tool(description = "List the names of the leaf elements of a hierarchy.")]
    async fn get_leaf_element_names(
        &self,
        Parameters(params): Parameters<HierarchyParams>,
    ) -> Result<CallToolResult, ErrorData> {
        self.element_name_list(&params.dimension_name, &params.hierarchy_name, ElementFilter::Leaves)
            .await
    }

    #[tool(description = "List the consolidated elements of a hierarchy.")]
    async fn get_consolidated_elements(
        &self,
        Parameters(params): Parameters<HierarchyParams>,
    ) -> Result<CallToolResult, ErrorData> {
        self.element_list(&params, ElementFilter::Consolidated).await
    }

    #[tool(description = "List the names of the consolidated elements of a hierarchy.")]
    async fn get_consolidated_element_names(
        &self,
        Parameters(params): Parameters<HierarchyParams>,
    ) -> Result<CallToolResult, ErrorData> {
        self.element_name_list(
            &params.dimension_name,
            &params.hierarchy_name,
            ElementFilter::Consolidated,
        )
        .await
    }

    #[tool(description = "List the names of the elements at a level; leaves are level 0.")]
    async fn get_elements_by_level(
        &self,
        Parameters(params): Parameters<LevelParams>,
    ) -> Result<CallToolResult, ErrorData> {
        self.element_name_list(
            &params.dimension_name,
            &params.hierarchy_name,
            ElementFilter::Level(params.level),
        )
        .await
    }

    #[tool(description = "Map element names to their type (Numeric, String, Consolidated), optionally without consolidations.")]
    async fn get_element_types(
        &self,
        Parameters(params): Parameters<ElementTypesParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let types = self
            .control
            .element_types(
                &params.dimension_name,
                &params.hierarchy_name,
                params.skip_consolidations.unwrap_or(false),
            )
            .await
            .map_err(helpers::map_err)?;
        json_result(types)
    }

    #[tool(description = "List the direct parents of an element.")]
    async fn get_parents(
        &self,
        Parameters(params): Parameters<ElementParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let parents = self
            .control
            .parents(&params.dimension_name, &params.hierarchy_name, &params.element_name)
            .await
            .map_err(helpers::map_err)?;
        json_result(parents)
    }

    #[tool(description = "List the members below a consolidation, depth first, each once. 'max_depth' limits the levels walked (default 99); 'leaves_only' drops consolidations.")]
    async fn get_members_under_consolidation(
        &self,
        Parameters(params): Parameters<ConsolidationParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let members = self
            .control
            .members_under_consolidation(
                &params.dimension_name,
                &params.hierarchy_name,
                &params.consolidation,
                params.max_depth,
                params.leaves_only.unwrap_or(false),
            )
            .await
            .map_err(helpers::map_err)?;
        json_result(members)
    }

    #[tool(description = "List the leaves below a consolidation, depth first, each once.")]
    async fn get_leaves_under_consolidation(
        &self,
        Parameters(params): Parameters<LeavesParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let leaves = self
            .control
            .leaves_under_consolidation(
                &params.dimension_name,
                &params.hierarchy_name,
                &params.consolidation,
                params.max_depth,
            )
            .await
            .map_err(helpers::map_err)?;
        json_result(leaves)
    }

    #[tool(description = "Check whether 'parent_name' is a direct parent of 'element_name'. False when either is missing.")]
    async fn element_is_parent(
        &self,
        Parameters(params): Parameters<IsParentParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let is_parent = self
            .control
            .element_is_parent(
                &params.dimension_name,
                &params.hierarchy_name,
                &params.parent_name,
                &params.element_name,
            )
            .await
            .map_err(helpers::map_err)?;
        json_result(is_parent)
    }

    #[tool(description = "Check whether 'ancestor_name' is an ancestor of 'element_name'. 'method' is TM1DrillDownMember (default), Descendants or TI. An element is never its own ancestor.")]
    async fn element_is_ancestor(
        &self,
        Parameters(params): Parameters<IsAncestorParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let method = params.method()?;
        let is_ancestor = self
            .control
            .element_is_ancestor(
                &params.dimension_name,
                &params.hierarchy_name,
                &params.ancestor_name,
                &params.element_name,
                method,
            )
            .await
            .map_err(helpers::map_err)?;
        json_result(is_ancestor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{json_of, server};
    use serde_json::json;
    use tm1_core::mock::MockTm1;
    use tm1_types::ElementType;

    fn months() -> MockTm1 {
        MockTm1::new().with_hierarchy(
            "Month",
            &[
                ("Year", ElementType::Consolidated),
                ("Q1", ElementType::Consolidated),
                ("Jan", ElementType::Numeric),
                ("Feb", ElementType::Numeric),
            ],
            &[("Year", "Q1"), ("Q1", "Jan"), ("Q1", "Feb")],
        )
    }

    fn hierarchy() -> Parameters<HierarchyParams> {
        Parameters(HierarchyParams {
            dimension_name: "Month".to_string(),
            hierarchy_name: "Month".to_string(),
        })
    }

    fn ancestor(method: Option<&str>) -> Parameters<IsAncestorParams> {
        Parameters(IsAncestorParams {
            dimension_name: "Month".to_string(),
            hierarchy_name: "Month".to_string(),
            ancestor_name: "Year".to_string(),
            element_name: "Jan".to_string(),
            method: method.map(ToString::to_string),
        })
    }

    #[tokio::test]
    async fn leaf_and_consolidated_names() {
        let tm1 = months();
        let mcp = server(&tm1);

        let leaves = mcp
            .get_leaf_element_names(hierarchy())
            .await
            .expect("listing should run");
        let consolidated = mcp
            .get_consolidated_element_names(hierarchy())
            .await
            .expect("listing should run");
        let level_two = mcp
            .get_elements_by_level(Parameters(LevelParams {
                dimension_name: "Month".to_string(),
                hierarchy_name: "Month".to_string(),
                level: 2,
            }))
            .await
            .expect("listing should run");

        assert_eq!(json_of(&leaves), json!(["Jan", "Feb"]));
        assert_eq!(json_of(&consolidated), json!(["Year", "Q1"]));
        assert_eq!(json_of(&level_two), json!(["Year"]));
    }

    #[tokio::test]
    async fn element_types_render_by_name() {
        let tm1 = months();
        let mcp = server(&tm1);

        let types = mcp
            .get_element_types(Parameters(ElementTypesParams {
                dimension_name: "Month".to_string(),
                hierarchy_name: "Month".to_string(),
                skip_consolidations: None,
            }))
            .await
            .expect("types should load");

        assert_eq!(
            json_of(&types),
            json!({"Feb": "Numeric", "Jan": "Numeric", "Q1": "Consolidated", "Year": "Consolidated"})
        );
    }

    #[tokio::test]
    async fn missing_element_renders_empty_object() {
        let tm1 = months();
        let mcp = server(&tm1);

        let element = mcp
            .get_element(Parameters(ElementParams {
                dimension_name: "Month".to_string(),
                hierarchy_name: "Month".to_string(),
                element_name: "Dec".to_string(),
            }))
            .await
            .expect("read should run");

        assert_eq!(json_of(&element), json!({}));
    }

    #[tokio::test]
    async fn members_under_consolidation_leaves_only() {
        let tm1 = months();
        let mcp = server(&tm1);

        let members = mcp
            .get_members_under_consolidation(Parameters(ConsolidationParams {
                dimension_name: "Month".to_string(),
                hierarchy_name: "Month".to_string(),
                consolidation: "Year".to_string(),
                max_depth: None,
                leaves_only: Some(true),
            }))
            .await
            .expect("tree should load");

        assert_eq!(json_of(&members), json!(["Jan", "Feb"]));
    }

    #[tokio::test]
    async fn parent_check_is_direct_only() {
        let tm1 = months();
        let mcp = server(&tm1);

        let direct = mcp
            .element_is_parent(Parameters(IsParentParams {
                dimension_name: "Month".to_string(),
                hierarchy_name: "Month".to_string(),
                parent_name: "Q1".to_string(),
                element_name: "Jan".to_string(),
            }))
            .await
            .expect("check should run");
        let grandparent = mcp
            .element_is_parent(Parameters(IsParentParams {
                dimension_name: "Month".to_string(),
                hierarchy_name: "Month".to_string(),
                parent_name: "Year".to_string(),
                element_name: "Jan".to_string(),
            }))
            .await
            .expect("check should run");

        assert_eq!(json_of(&direct), json!(true));
        assert_eq!(json_of(&grandparent), json!(false));
    }

    #[tokio::test]
    async fn ancestor_check_runs_process_for_ti() {
        let tm1 = months().with_process_status("QuitCalled");
        let mcp = server(&tm1);

        let result = mcp
            .element_is_ancestor(ancestor(Some("ti")))
            .await
            .expect("check should run");

        assert_eq!(json_of(&result), json!(true));
        assert_eq!(tm1.processes().len(), 1);
    }

    #[tokio::test]
    async fn unknown_ancestor_method_is_invalid_params() {
        let tm1 = months();
        let mcp = server(&tm1);

        let err = mcp
            .element_is_ancestor(ancestor(Some("Guess")))
            .await
            .expect_err("unknown method should fail");

        assert_eq!(err.code, ErrorCode::INVALID_PARAMS);
        assert!(err.message.contains("Guess"));
        assert_eq!(tm1.opened(), 0);
    }
}
