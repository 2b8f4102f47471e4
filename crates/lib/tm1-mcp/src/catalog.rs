//! Static description of every exposed tool.

use serde::Serialize;

/// How a tool touches the server.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Access {
    Read,
    /// Asks the server to validate something without changing it.
    Check,
    Mutate,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct ToolSpec {
    pub name: &'static str,
    pub group: &'static str,
    pub capability: &'static str,
    pub arguments: &'static [&'static str],
    pub result: &'static str,
    pub access: Access,
}

const fn entry(
    name: &'static str,
    group: &'static str,
    capability: &'static str,
    arguments: &'static [&'static str],
    result: &'static str,
    access: Access,
) -> ToolSpec {
    ToolSpec {
        name,
        group,
        capability,
        arguments,
        result,
        access,
    }
}

const CUBE: &[&str] = &["cube_name"];
const HIERARCHY: &[&str] = &["dimension_name", "hierarchy_name"];
const ELEMENT: &[&str] = &["dimension_name", "hierarchy_name", "element_name"];
const ENVELOPE: &str = "{status, message}";

pub const CATALOG: &[ToolSpec] = &[
    entry("health", "core", "liveness check", &[], "text 'ok'", Access::Read),
    entry("help", "core", "describe every tool", &[], "catalog", Access::Read),
    entry("get_server_version", "core", "server product version", &[], "text", Access::Read),
    entry("get_all_cubes", "cubes", "list cube names", &[], "list of names", Access::Read),
    entry("get_model_cubes", "cubes", "list cube names without control cubes", &[], "list of names", Access::Read),
    entry("get_control_cubes", "cubes", "list control cube names", &[], "list of names", Access::Read),
    entry("get_cube_count", "cubes", "count cubes", &["skip_control_cubes?"], "integer", Access::Read),
    entry("check_cube_exists", "cubes", "cube existence", CUBE, "bool", Access::Read),
    entry("get_cube", "cubes", "cube metadata", CUBE, "mapping, {} when missing", Access::Read),
    entry("get_cube_dimensions", "cubes", "cube dimension names", CUBE, "list, [] when missing", Access::Read),
    entry("get_cube_rules", "cubes", "cube rule text", CUBE, "{cube, rules}, {} when missing", Access::Read),
    entry("check_cube_rules", "cubes", "validate cube rules", CUBE, "{status, message, errors?}", Access::Check),
    entry("update_cube_rules", "cubes", "replace cube rules", &["cube_name", "rules"], ENVELOPE, Access::Mutate),
    entry("lock_cube", "cubes", "lock a cube", CUBE, ENVELOPE, Access::Mutate),
    entry("unlock_cube", "cubes", "unlock a cube", CUBE, ENVELOPE, Access::Mutate),
    entry("load_cube", "cubes", "load a cube into memory", CUBE, ENVELOPE, Access::Mutate),
    entry("unload_cube", "cubes", "unload a cube from memory", CUBE, ENVELOPE, Access::Mutate),
    entry("get_storage_dimension_order", "cubes", "storage dimension order", CUBE, "list, [] when missing", Access::Read),
    entry("update_storage_dimension_order", "cubes", "reorder storage dimensions", &["cube_name", "dimension_names"], "{status, message, percent_change}", Access::Mutate),
    entry("get_cube_vmm", "cubes", "view memory maximum", CUBE, "cell value", Access::Read),
    entry("get_cube_vmt", "cubes", "view memory threshold", CUBE, "cell value", Access::Read),
    entry("set_cube_vmm", "cubes", "set view memory maximum", &["cube_name", "value"], ENVELOPE, Access::Mutate),
    entry("set_cube_vmt", "cubes", "set view memory threshold", &["cube_name", "value"], ENVELOPE, Access::Mutate),
    entry("get_value", "cells", "read one cell", &["cube_name", "elements"], "cell value", Access::Read),
    entry("execute_mdx", "mdx", "run an MDX query", &["mdx"], "list of {coordinates, value}", Access::Read),
    entry("get_all_dimensions", "dimensions", "list dimension names", &[], "list of names", Access::Read),
    entry("get_model_dimensions", "dimensions", "list dimension names without control dimensions", &[], "list of names", Access::Read),
    entry("get_dimension_count", "dimensions", "count dimensions", &["skip_control_dims?"], "integer", Access::Read),
    entry("dimension_exists", "dimensions", "dimension existence", &["dimension_name"], "bool", Access::Read),
    entry("get_dimension", "dimensions", "dimension with hierarchies", &["dimension_name"], "mapping, {} when missing", Access::Read),
    entry("execute_dimension_mdx", "dimensions", "evaluate an MDX set", &["dimension_name", "mdx"], "list of names", Access::Read),
    entry("get_element", "elements", "element details", ELEMENT, "mapping, {} when missing", Access::Read),
    entry("get_elements", "elements", "all elements", HIERARCHY, "list of mappings", Access::Read),
    entry("get_leaf_elements", "elements", "leaf elements", HIERARCHY, "list of mappings", Access::Read),
    entry("get_leaf_element_names", "elements", "leaf element names", HIERARCHY, "list of names", Access::Read),
    entry("get_consolidated_elements", "elements", "consolidated elements", HIERARCHY, "list of mappings", Access::Read),
    entry("get_consolidated_element_names", "elements", "consolidated element names", HIERARCHY, "list of names", Access::Read),
    entry("get_elements_by_level", "elements", "element names at a level", &["dimension_name", "hierarchy_name", "level"], "list of names", Access::Read),
    entry("get_element_types", "elements", "element name to type", &["dimension_name", "hierarchy_name", "skip_consolidations?"], "mapping", Access::Read),
    entry("get_parents", "elements", "direct parents", ELEMENT, "list of names", Access::Read),
    entry("get_members_under_consolidation", "elements", "members below a consolidation", &["dimension_name", "hierarchy_name", "consolidation", "max_depth?", "leaves_only?"], "list of names", Access::Read),
    entry("get_leaves_under_consolidation", "elements", "leaves below a consolidation", &["dimension_name", "hierarchy_name", "consolidation", "max_depth?"], "list of names", Access::Read),
    entry("element_is_parent", "elements", "direct parent check", &["dimension_name", "hierarchy_name", "parent_name", "element_name"], "bool", Access::Read),
    entry("element_is_ancestor", "elements", "ancestor check", &["dimension_name", "hierarchy_name", "ancestor_name", "element_name", "method?"], "bool", Access::Read),
    entry("get_documentation", "docs", "TurboIntegrator documentation search", &["query_text", "limit?"], "{query, documents}", Access::Read),
];
