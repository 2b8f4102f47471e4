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

/// Parameters naming a single cube.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct CubeNameParams {
    pub cube_name: String,
}

/// Parameters for counting cubes.
#[derive(Debug, Clone, Default, Serialize, Deserialize, schemars::JsonSchema)]
pub struct CubeCountParams {
    /// Leave out control cubes (names starting with `}`).
    pub skip_control_cubes: Option<bool>,
}

/// Parameters for replacing the rules of a cube.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct UpdateCubeRulesParams {
    pub cube_name: String,
    pub rules: String,
}

/// Parameters for reordering storage dimensions.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct StorageOrderParams {
    pub cube_name: String,
    /// New order; must contain every dimension of the cube exactly once.
    pub dimension_names: Vec<String>,
}

/// Parameters for writing a cube property such as VMM or VMT.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct CubePropertyParams {
    pub cube_name: String,
    pub value: String,
}

#[tool_router(router = tool_router_cubes, vis = "pub")]
impl Tm1Mcp {
    #[tool(description = "List the names of all cubes, including control cubes.")]
    async fn get_all_cubes(&self) -> Result<CallToolResult, ErrorData> {
        let names = self
            .control
            .cube_names(EntityScope::All)
            .await
            .map_err(helpers::map_err)?;
        json_result(names)
    }

    #[tool(description = "List the names of model cubes (control cubes excluded).")]
    async fn get_model_cubes(&self) -> Result<CallToolResult, ErrorData> {
        let names = self
            .control
            .cube_names(EntityScope::Model)
            .await
            .map_err(helpers::map_err)?;
        json_result(names)
    }

    #[tool(description = "List the names of control cubes (names starting with '}').")]
    async fn get_control_cubes(&self) -> Result<CallToolResult, ErrorData> {
        let names = self
            .control
            .cube_names(EntityScope::Control)
            .await
            .map_err(helpers::map_err)?;
        json_result(names)
    }

    #[tool(description = "Count cubes, optionally skipping control cubes.")]
    async fn get_cube_count(
        &self,
        Parameters(params): Parameters<CubeCountParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let count = self
            .control
            .cube_count(params.skip_control_cubes.unwrap_or(false))
            .await
            .map_err(helpers::map_err)?;
        json_result(count)
    }

    #[tool(description = "Check whether a cube exists.")]
    async fn check_cube_exists(
        &self,
        Parameters(params): Parameters<CubeNameParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let exists = self
            .control
            .cube_exists(&params.cube_name)
            .await
            .map_err(helpers::map_err)?;
        json_result(exists)
    }

    #[tool(description = "Get cube metadata: dimensions, rules and update timestamps. Returns {} when the cube does not exist.")]
    async fn get_cube(
        &self,
        Parameters(params): Parameters<CubeNameParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let cube = self
            .control
            .cube(&params.cube_name)
            .await
            .map_err(helpers::map_err)?;
        optional_result(cube)
    }

    #[tool(description = "List the dimensions of a cube in cube order. Returns [] when the cube does not exist.")]
    async fn get_cube_dimensions(
        &self,
        Parameters(params): Parameters<CubeNameParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let dimensions = self
            .control
            .cube_dimensions(&params.cube_name)
            .await
            .map_err(helpers::map_err)?;
        json_result(dimensions)
    }

    #[tool(description = "Get the rule text of a cube as {cube, rules}. Returns {} when the cube does not exist.")]
    async fn get_cube_rules(
        &self,
        Parameters(params): Parameters<CubeNameParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let rules = self
            .control
            .cube_rules(&params.cube_name)
            .await
            .map_err(helpers::map_err)?;
        optional_result(rules)
    }

    #[tool(description = "Ask the server to validate the rules of a cube. Returns status 'warning' with 'errors' when problems are found.")]
    async fn check_cube_rules(
        &self,
        Parameters(params): Parameters<CubeNameParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let envelope = self
            .control
            .check_cube_rules(&params.cube_name)
            .await
            .map_err(helpers::map_err)?;
        json_result(envelope)
    }

    #[tool(description = "Replace the rules of a cube.")]
    async fn update_cube_rules(
        &self,
        Parameters(params): Parameters<UpdateCubeRulesParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let envelope = self
            .control
            .update_cube_rules(&params.cube_name, &params.rules)
            .await
            .map_err(helpers::map_err)?;
        json_result(envelope)
    }

    #[tool(description = "Lock a cube against data changes.")]
    async fn lock_cube(
        &self,
        Parameters(params): Parameters<CubeNameParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let envelope = self
            .control
            .lock_cube(&params.cube_name)
            .await
            .map_err(helpers::map_err)?;
        json_result(envelope)
    }

    #[tool(description = "Unlock a cube.")]
    async fn unlock_cube(
        &self,
        Parameters(params): Parameters<CubeNameParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let envelope = self
            .control
            .unlock_cube(&params.cube_name)
            .await
            .map_err(helpers::map_err)?;
        json_result(envelope)
    }

    #[tool(description = "Load a cube into server memory.")]
    async fn load_cube(
        &self,
        Parameters(params): Parameters<CubeNameParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let envelope = self
            .control
            .load_cube(&params.cube_name)
            .await
            .map_err(helpers::map_err)?;
        json_result(envelope)
    }

    #[tool(description = "Unload a cube from server memory.")]
    async fn unload_cube(
        &self,
        Parameters(params): Parameters<CubeNameParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let envelope = self
            .control
            .unload_cube(&params.cube_name)
            .await
            .map_err(helpers::map_err)?;
        json_result(envelope)
    }

    #[tool(description = "Get the storage order of a cube's dimensions. Returns [] when the cube does not exist.")]
    async fn get_storage_dimension_order(
        &self,
        Parameters(params): Parameters<CubeNameParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let order = self
            .control
            .storage_dimension_order(&params.cube_name)
            .await
            .map_err(helpers::map_err)?;
        json_result(order)
    }

    #[tool(description = "Reorder the storage dimensions of a cube. The new order must be a permutation of the cube's dimensions; the result carries 'percent_change' in memory.")]
    async fn update_storage_dimension_order(
        &self,
        Parameters(params): Parameters<StorageOrderParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let envelope = self
            .control
            .update_storage_dimension_order(&params.cube_name, &params.dimension_names)
            .await
            .map_err(helpers::map_err)?;
        json_result(envelope)
    }

    #[tool(description = "Get the VMM (view memory maximum, KB) of a cube.")]
    async fn get_cube_vmm(
        &self,
        Parameters(params): Parameters<CubeNameParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let value = self
            .control
            .cube_vmm(&params.cube_name)
            .await
            .map_err(helpers::map_err)?;
        json_result(value)
    }

    #[tool(description = "Get the VMT (view memory threshold, seconds) of a cube.")]
    async fn get_cube_vmt(
        &self,
        Parameters(params): Parameters<CubeNameParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let value = self
            .control
            .cube_vmt(&params.cube_name)
            .await
            .map_err(helpers::map_err)?;
        json_result(value)
    }

    #[tool(description = "Set the VMM (view memory maximum, KB) of a cube.")]
    async fn set_cube_vmm(
        &self,
        Parameters(params): Parameters<CubePropertyParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let envelope = self
            .control
            .set_cube_vmm(&params.cube_name, &params.value)
            .await
            .map_err(helpers::map_err)?;
        json_result(envelope)
    }

    #[tool(description = "Set the VMT (view memory threshold, seconds) of a cube.")]
    async fn set_cube_vmt(
        &self,
        Parameters(params): Parameters<CubePropertyParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let envelope = self
            .control
            .set_cube_vmt(&params.cube_name, &params.value)
            .await
            .map_err(helpers::map_err)?;
        json_result(envelope)
    }
}
