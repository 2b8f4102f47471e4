use std::collections::{BTreeMap, HashSet};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use surrealdb_types::SurrealValue;

use crate::schema::{
    HIERARCHY_ELEMENT_SEPARATOR,
    METHOD_DESCENDANTS,
    METHOD_DRILL_DOWN,
    METHOD_TI,
};

/// Cube metadata reported by the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Cube {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dimensions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rules: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_schema_update: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_data_update: Option<String>,
}

/// Rule text attached to a cube.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CubeRules {
    pub cube: String,
    pub rules: Option<String>,
}

/// A problem reported by the server when validating cube rules.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuleError {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_number: Option<u32>,
    pub message: String,
}

/// Dimension with its hierarchies.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Dimension {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unique_name: Option<String>,
    #[serde(default)]
    pub hierarchies: Vec<Hierarchy>,
}

/// Hierarchy within a dimension, including its elements and edges.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Hierarchy {
    pub name: String,
    #[serde(default)]
    pub elements: Vec<Element>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

/// TM1 element types. The server serializes them by name.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ElementType {
    Numeric,
    String,
    Consolidated,
}

impl ElementType {
    /// Numeric code used by the server in `$filter` expressions.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Numeric => 1,
            Self::String => 2,
            Self::Consolidated => 3,
        }
    }

    #[must_use]
    pub const fn is_leaf(self) -> bool {
        !matches!(self, Self::Consolidated)
    }
}

/// Element of a hierarchy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Element {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unique_name: Option<String>,
    pub element_type: ElementType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, Value>,
}

/// Parent/child link inside a hierarchy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Edge {
    pub parent_name: String,
    pub component_name: String,
    pub weight: f64,
}

/// Node of a consolidation tree fetched from the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ElementNode {
    pub name: String,
    pub element_type: ElementType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<Self>,
}

impl ElementNode {
    /// Flattens the tree below this node, depth first.
    ///
    /// Each descendant is listed once even when it rolls up through several
    /// branches. The node itself is never included.
    #[must_use]
    pub fn descendants(&self, leaves_only: bool) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut names = Vec::new();
        collect_descendants(self, leaves_only, &mut seen, &mut names);
        names
    }
}

fn collect_descendants<'a>(
    node: &'a ElementNode,
    leaves_only: bool,
    seen: &mut HashSet<&'a str>,
    names: &mut Vec<String>,
) {
    for component in &node.components {
        let include = !leaves_only || component.element_type.is_leaf();
        if include && seen.insert(component.name.as_str()) {
            names.push(component.name.clone());
        }
        collect_descendants(component, leaves_only, seen, names);
    }
}

/// Value of a single cube cell.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum CellValue {
    Number(f64),
    Text(String),
    Empty,
}

/// Element coordinate of a cell, optionally naming the hierarchy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ElementAddress {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hierarchy: Option<String>,
    pub element: String,
}

impl ElementAddress {
    /// Parses `element` or `hierarchy::element`.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value.split_once(HIERARCHY_ELEMENT_SEPARATOR) {
            Some((hierarchy, element)) if !hierarchy.trim().is_empty() => Self {
                hierarchy: Some(hierarchy.trim().to_string()),
                element: element.trim().to_string(),
            },
            _ => Self {
                hierarchy: None,
                element: value.trim().to_string(),
            },
        }
    }

    /// Parses a comma separated list of addresses.
    #[must_use]
    pub fn parse_delimited(value: &str) -> Vec<Self> {
        value
            .split(',')
            .filter(|part| !part.trim().is_empty())
            .map(Self::parse)
            .collect()
    }
}

/// Strategy used to decide whether one element is an ancestor of another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AncestorMethod {
    #[default]
    DrillDown,
    Descendants,
    TurboIntegrator,
}

impl FromStr for AncestorMethod {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.eq_ignore_ascii_case(METHOD_DRILL_DOWN) {
            Ok(Self::DrillDown)
        } else if trimmed.eq_ignore_ascii_case(METHOD_DESCENDANTS) {
            Ok(Self::Descendants)
        } else if trimmed.eq_ignore_ascii_case(METHOD_TI) {
            Ok(Self::TurboIntegrator)
        } else {
            Err(format!(
                "unknown ancestor method '{trimmed}' (expected {METHOD_TI}, {METHOD_DRILL_DOWN} or {METHOD_DESCENDANTS})"
            ))
        }
    }
}

/// One cell of an MDX result, addressed by the member names of every axis.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CellRow {
    pub coordinates: Vec<String>,
    pub value: CellValue,
}

/// Which entities a listing covers. Control entities carry the `}` prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntityScope {
    #[default]
    All,
    Model,
    Control,
}

impl EntityScope {
    #[must_use]
    pub const fn skip_control(skip: bool) -> Self {
        if skip { Self::Model } else { Self::All }
    }
}

/// Element subsets that can be requested from a hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementFilter {
    All,
    Leaves,
    Consolidated,
    Level(u32),
}

/// Outcome of an unbound TurboIntegrator process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProcessOutcome {
    pub status_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_log_file: Option<String>,
}

/// Result status of an operation that can fail without raising.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
    Warning,
}

/// Envelope returned by mutating and checking tools.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusEnvelope {
    pub status: Status,
    pub message: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StatusEnvelope {
    pub fn new(status: Status, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            extra: Map::new(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(Status::Success, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Status::Error, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Status::Warning, message)
    }

    /// Adds an extra field next to `status` and `message`.
    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.extra.insert(key.to_string(), value.into());
        self
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }
}

/// Document stored in the documentation index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, SurrealValue)]
pub struct DocRecord {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub embedding: Vec<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingested_at: Option<String>,
}

/// Ranked match returned by the documentation index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, SurrealValue)]
pub struct DocMatch {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub score: f64,
}

/// Shape returned by the documentation lookup tool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentationResult {
    pub query: String,
    pub documents: Vec<DocMatch>,
}
