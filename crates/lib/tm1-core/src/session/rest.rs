//! TM1 REST API implementation of the session surface.

use std::collections::BTreeMap;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONNECTION, HeaderMap, HeaderValue};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tm1_types::{
    CellRow,
    CellValue,
    Cube,
    Dimension,
    Edge,
    Element,
    ElementAddress,
    ElementFilter,
    ElementNode,
    ElementType,
    EntityScope,
    Hierarchy,
    ProcessOutcome,
    RuleError,
};
use tracing::{debug, warn};

use super::{
    SessionError,
    SessionFactory,
    SessionResult,
    Tm1ConnectionConfig,
    Tm1Session,
    UnboundProcess,
};
use crate::mdx;

const ACCEPT_VALUE: &str = "application/json;odata.metadata=none,text/plain";
const SESSION_CONTEXT_HEADER: &str = "TM1-SessionContext";

/// Opens [`RestSession`]s against the configured server.
#[derive(Debug, Clone, Copy, Default)]
pub struct RestSessionFactory;

#[async_trait]
impl SessionFactory for RestSessionFactory {
    async fn open(&self, config: &Tm1ConnectionConfig) -> SessionResult<Box<dyn Tm1Session>> {
        let session = RestSession::connect(config).await?;
        Ok(Box::new(session))
    }
}

/// Authenticated session holding its own HTTP client and cookie jar.
pub struct RestSession {
    client: Client,
    api_root: String,
}

impl RestSession {
    /// Authenticates against the server and returns the live session.
    ///
    /// # Errors
    /// Returns `SessionError` if the client cannot be built, the server is
    /// unreachable, or the credentials are rejected.
    pub async fn connect(config: &Tm1ConnectionConfig) -> SessionResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_VALUE));
        headers.insert(AUTHORIZATION, authorization_header(config)?);
        headers.insert(
            SESSION_CONTEXT_HEADER,
            HeaderValue::from_str(&config.session_context).map_err(|err| {
                SessionError::InvalidInput(format!("invalid session context: {err}"))
            })?,
        );

        let client = Client::builder()
            .default_headers(headers)
            .cookie_store(true)
            .danger_accept_invalid_certs(!config.verify_tls)
            .timeout(config.timeout)
            .build()
            .map_err(|err| SessionError::Transport(err.to_string()))?;

        let session = Self {
            client,
            api_root: config.api_root(),
        };
        let version = session.product_version().await.map_err(|err| match err {
            SessionError::Remote { status, message }
                if status == StatusCode::UNAUTHORIZED.as_u16()
                    || status == StatusCode::FORBIDDEN.as_u16() =>
            {
                SessionError::Auth(message)
            }
            other => other,
        })?;
        debug!(version = %version, api_root = %session.api_root, "TM1 session opened");
        Ok(session)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.api_root)
    }

    async fn send(&self, request: RequestBuilder) -> SessionResult<Response> {
        let response = request
            .send()
            .await
            .map_err(|err| SessionError::Transport(err.to_string()))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = remote_message(&body).unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        });
        Err(match status {
            StatusCode::NOT_FOUND => SessionError::NotFound(message),
            StatusCode::UNAUTHORIZED => SessionError::Auth(message),
            _ => SessionError::Remote {
                status: status.as_u16(),
                message,
            },
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> SessionResult<T> {
        let response = self.send(self.client.get(self.url(path))).await?;
        decode(response).await
    }

    async fn get_text(&self, path: &str) -> SessionResult<String> {
        let response = self.send(self.client.get(self.url(path))).await?;
        response
            .text()
            .await
            .map_err(|err| SessionError::Decode(err.to_string()))
    }

    async fn post_json<T: DeserializeOwned>(&self, path: &str, body: &Value) -> SessionResult<T> {
        let response = self
            .send(self.client.post(self.url(path)).json(body))
            .await?;
        decode(response).await
    }

    async fn post_unit(&self, path: &str, body: &Value) -> SessionResult<()> {
        self.send(self.client.post(self.url(path)).json(body))
            .await
            .map(drop)
    }

    async fn patch_unit(&self, path: &str, body: &Value) -> SessionResult<()> {
        self.send(self.client.patch(self.url(path)).json(body))
            .await
            .map(drop)
    }

    async fn exists(&self, path: &str) -> SessionResult<bool> {
        match self.send(self.client.get(self.url(path))).await {
            Ok(_) => Ok(true),
            Err(SessionError::NotFound(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn names(&self, path: &str) -> SessionResult<Vec<String>> {
        let list: ODataList<NamedRow> = self.get_json(path).await?;
        Ok(list.value.into_iter().map(|row| row.name).collect())
    }

    async fn execute_cellset(&self, mdx: &str) -> SessionResult<CellsetWire> {
        let path = "ExecuteMDX?$expand=Axes($select=Ordinal;$expand=Tuples($select=Ordinal;$expand=Members($select=Name))),Cells($select=Ordinal,Value)";
        let cellset: CellsetWire = self.post_json(path, &json!({ "MDX": mdx })).await?;
        if let Some(id) = cellset.id.as_deref() {
            let delete_path = format!("Cellsets('{}')", quote(id));
            if let Err(err) = self
                .send(self.client.delete(self.url(&delete_path)))
                .await
            {
                warn!(error = %err, "failed to delete cellset");
            }
        }
        Ok(cellset)
    }
}

#[async_trait]
impl Tm1Session for RestSession {
    async fn product_version(&self) -> SessionResult<String> {
        self.get_text("Configuration/ProductVersion/$value").await
    }

    async fn close(&self) -> SessionResult<()> {
        self.send(
            self.client
                .post(self.url("ActiveSession/tm1.Close"))
                .header(CONNECTION, "close")
                .json(&json!({})),
        )
        .await
        .map(drop)
    }

    async fn cube_names(&self, scope: EntityScope) -> SessionResult<Vec<String>> {
        let collection = match scope {
            EntityScope::All => "Cubes",
            EntityScope::Model => "ModelCubes()",
            EntityScope::Control => "ControlCubes()",
        };
        self.names(&format!("{collection}?$select=Name")).await
    }

    async fn cube_exists(&self, cube_name: &str) -> SessionResult<bool> {
        self.exists(&format!("Cubes('{}')?$select=Name", quote(cube_name)))
            .await
    }

    async fn cube(&self, cube_name: &str) -> SessionResult<Cube> {
        let path = format!(
            "Cubes('{}')?$select=Name,Rules,LastSchemaUpdate,LastDataUpdate&$expand=Dimensions($select=Name)",
            quote(cube_name)
        );
        let wire: CubeWire = self.get_json(&path).await?;
        Ok(wire.into())
    }

    async fn cube_dimension_names(&self, cube_name: &str) -> SessionResult<Vec<String>> {
        self.names(&format!("Cubes('{}')/Dimensions?$select=Name", quote(cube_name)))
            .await
    }

    async fn check_rules(&self, cube_name: &str) -> SessionResult<Vec<RuleError>> {
        let path = format!("Cubes('{}')/tm1.CheckRules", quote(cube_name));
        let list: ODataList<RuleErrorWire> = self.post_json(&path, &json!({})).await?;
        Ok(list
            .value
            .into_iter()
            .map(|row| RuleError {
                line_number: row.line_number,
                message: row.message,
            })
            .collect())
    }

    async fn update_rules(&self, cube_name: &str, rules: &str) -> SessionResult<()> {
        let path = format!("Cubes('{}')", quote(cube_name));
        self.patch_unit(&path, &json!({ "Rules": rules })).await
    }

    async fn lock_cube(&self, cube_name: &str) -> SessionResult<()> {
        self.post_unit(&format!("Cubes('{}')/tm1.Lock", quote(cube_name)), &json!({}))
            .await
    }

    async fn unlock_cube(&self, cube_name: &str) -> SessionResult<()> {
        self.post_unit(&format!("Cubes('{}')/tm1.Unlock", quote(cube_name)), &json!({}))
            .await
    }

    async fn load_cube(&self, cube_name: &str) -> SessionResult<()> {
        self.post_unit(&format!("Cubes('{}')/tm1.Load", quote(cube_name)), &json!({}))
            .await
    }

    async fn unload_cube(&self, cube_name: &str) -> SessionResult<()> {
        self.post_unit(&format!("Cubes('{}')/tm1.Unload", quote(cube_name)), &json!({}))
            .await
    }

    async fn storage_dimension_order(&self, cube_name: &str) -> SessionResult<Vec<String>> {
        self.names(&format!(
            "Cubes('{}')/tm1.DimensionsStorageOrder()?$select=Name",
            quote(cube_name)
        ))
        .await
    }

    async fn reorder_dimensions(
        &self,
        cube_name: &str,
        dimension_names: &[String],
    ) -> SessionResult<f64> {
        let bindings: Vec<String> = dimension_names
            .iter()
            .map(|name| format!("Dimensions('{}')", quote(name)))
            .collect();
        let path = format!("Cubes('{}')/tm1.ReorderDimensions", quote(cube_name));
        let result: ODataScalar<f64> = self
            .post_json(&path, &json!({ "Dimensions@odata.bind": bindings }))
            .await?;
        Ok(result.value)
    }

    async fn cell_value(
        &self,
        cube_name: &str,
        elements: &[ElementAddress],
    ) -> SessionResult<CellValue> {
        let dimensions = self.cube_dimension_names(cube_name).await?;
        let query = mdx::cell_query(cube_name, &dimensions, elements)?;
        let rows = self.execute_mdx(&query).await?;
        Ok(rows
            .into_iter()
            .next()
            .map_or(CellValue::Empty, |row| row.value))
    }

    async fn write_value(
        &self,
        cube_name: &str,
        elements: &[ElementAddress],
        value: &CellValue,
    ) -> SessionResult<()> {
        let dimensions = self.cube_dimension_names(cube_name).await?;
        if dimensions.len() != elements.len() {
            return Err(SessionError::InvalidInput(format!(
                "cube '{cube_name}' has {} dimensions but {} elements were given",
                dimensions.len(),
                elements.len()
            )));
        }
        let tuple: Vec<String> = dimensions
            .iter()
            .zip(elements)
            .map(|(dimension, address)| {
                let hierarchy = address.hierarchy.as_deref().unwrap_or(dimension);
                format!(
                    "Dimensions('{}')/Hierarchies('{}')/Elements('{}')",
                    quote(dimension),
                    quote(hierarchy),
                    quote(&address.element)
                )
            })
            .collect();
        let body = json!({
            "Cells": [{ "Tuple@odata.bind": tuple }],
            "Value": value,
        });
        self.post_unit(&format!("Cubes('{}')/tm1.Update", quote(cube_name)), &body)
            .await
    }

    async fn execute_mdx(&self, mdx: &str) -> SessionResult<Vec<CellRow>> {
        let cellset = self.execute_cellset(mdx).await?;
        let axes: Vec<Vec<Vec<String>>> = cellset
            .axes
            .into_iter()
            .map(|axis| {
                axis.tuples
                    .into_iter()
                    .map(|tuple| tuple.members.into_iter().map(|member| member.name).collect())
                    .collect()
            })
            .collect();
        let cells: Vec<(usize, CellValue)> = cellset
            .cells
            .into_iter()
            .map(|cell| (cell.ordinal, cell.value.unwrap_or(CellValue::Empty)))
            .collect();
        Ok(mdx::rows_from_cellset(&axes, cells))
    }

    async fn execute_set_mdx(&self, mdx: &str) -> SessionResult<Vec<String>> {
        let path = "ExecuteMDXSetExpression?$expand=Tuples($expand=Members($select=Name))";
        let set: SetWire = self.post_json(path, &json!({ "MDX": mdx })).await?;
        Ok(set
            .tuples
            .into_iter()
            .filter_map(|tuple| tuple.members.into_iter().next().map(|member| member.name))
            .collect())
    }

    async fn dimension_names(&self, scope: EntityScope) -> SessionResult<Vec<String>> {
        let collection = match scope {
            EntityScope::All => "Dimensions",
            EntityScope::Model => "ModelDimensions()",
            EntityScope::Control => "ControlDimensions()",
        };
        self.names(&format!("{collection}?$select=Name")).await
    }

    async fn dimension_exists(&self, dimension_name: &str) -> SessionResult<bool> {
        self.exists(&format!("Dimensions('{}')?$select=Name", quote(dimension_name)))
            .await
    }

    async fn dimension(&self, dimension_name: &str) -> SessionResult<Dimension> {
        let path = format!(
            "Dimensions('{}')?$select=Name,UniqueName&$expand=Hierarchies($select=Name;$expand=Elements($select=Name,UniqueName,Type,Level,Index),Edges($select=ParentName,ComponentName,Weight))",
            quote(dimension_name)
        );
        let wire: DimensionWire = self.get_json(&path).await?;
        Ok(wire.into())
    }

    async fn element(
        &self,
        dimension_name: &str,
        hierarchy_name: &str,
        element_name: &str,
    ) -> SessionResult<Element> {
        let path = format!(
            "{}/Elements('{}')?$select=Name,UniqueName,Type,Level,Index,Attributes",
            hierarchy_path(dimension_name, hierarchy_name),
            quote(element_name)
        );
        let wire: ElementWire = self.get_json(&path).await?;
        Ok(wire.into())
    }

    async fn elements(
        &self,
        dimension_name: &str,
        hierarchy_name: &str,
        filter: ElementFilter,
    ) -> SessionResult<Vec<Element>> {
        let path = format!(
            "{}/Elements?$select=Name,UniqueName,Type,Level,Index{}",
            hierarchy_path(dimension_name, hierarchy_name),
            filter_clause(filter)
        );
        let list: ODataList<ElementWire> = self.get_json(&path).await?;
        Ok(list.value.into_iter().map(Element::from).collect())
    }

    async fn element_names(
        &self,
        dimension_name: &str,
        hierarchy_name: &str,
        filter: ElementFilter,
    ) -> SessionResult<Vec<String>> {
        self.names(&format!(
            "{}/Elements?$select=Name{}",
            hierarchy_path(dimension_name, hierarchy_name),
            filter_clause(filter)
        ))
        .await
    }

    async fn parents(
        &self,
        dimension_name: &str,
        hierarchy_name: &str,
        element_name: &str,
    ) -> SessionResult<Vec<String>> {
        self.names(&format!(
            "{}/Elements('{}')/Parents?$select=Name",
            hierarchy_path(dimension_name, hierarchy_name),
            quote(element_name)
        ))
        .await
    }

    async fn element_tree(
        &self,
        dimension_name: &str,
        hierarchy_name: &str,
        element_name: &str,
        depth: u32,
    ) -> SessionResult<ElementNode> {
        let mut path = format!(
            "{}/Elements('{}')?$select=Name,Type",
            hierarchy_path(dimension_name, hierarchy_name),
            quote(element_name)
        );
        if let Some(expand) = components_expand(depth) {
            path.push_str("&$expand=");
            path.push_str(&expand);
        }
        let wire: NodeWire = self.get_json(&path).await?;
        Ok(wire.into())
    }

    async fn execute_process(&self, process: &UnboundProcess) -> SessionResult<ProcessOutcome> {
        let body = json!({
            "Process": {
                "Name": process.name,
                "HasSecurityAccess": false,
                "PrologProcedure": process.prolog,
                "MetadataProcedure": "",
                "DataProcedure": "",
                "EpilogProcedure": "",
                "DataSource": { "Type": "None" },
                "Parameters": [],
                "Variables": [],
            },
            "Parameters": [],
        });
        let wire: ProcessExecuteWire = self
            .post_json("ExecuteProcessWithReturn?$expand=*", &body)
            .await?;
        Ok(ProcessOutcome {
            status_code: wire.status_code,
            error_log_file: wire.error_log_file.map(|file| file.filename),
        })
    }
}

fn authorization_header(config: &Tm1ConnectionConfig) -> SessionResult<HeaderValue> {
    let value = match config.namespace.as_deref() {
        Some(namespace) => format!(
            "CAMNamespace {}",
            STANDARD.encode(format!("{}:{}:{namespace}", config.user, config.password))
        ),
        None => format!(
            "Basic {}",
            STANDARD.encode(format!("{}:{}", config.user, config.password))
        ),
    };
    let mut header = HeaderValue::from_str(&value)
        .map_err(|err| SessionError::InvalidInput(format!("invalid credentials: {err}")))?;
    header.set_sensitive(true);
    Ok(header)
}

async fn decode<T: DeserializeOwned>(response: Response) -> SessionResult<T> {
    let body = response
        .text()
        .await
        .map_err(|err| SessionError::Transport(err.to_string()))?;
    serde_json::from_str(&body).map_err(|err| SessionError::Decode(err.to_string()))
}

fn remote_message(body: &str) -> Option<String> {
    let parsed: RemoteErrorBody = serde_json::from_str(body).ok()?;
    Some(parsed.error.message)
}

/// Escapes an object name for use inside `('...')` in a resource path.
pub(crate) fn quote(name: &str) -> String {
    urlencoding::encode(&name.replace('\'', "''")).into_owned()
}

fn hierarchy_path(dimension_name: &str, hierarchy_name: &str) -> String {
    format!(
        "Dimensions('{}')/Hierarchies('{}')",
        quote(dimension_name),
        quote(hierarchy_name)
    )
}

fn filter_clause(filter: ElementFilter) -> String {
    match filter {
        ElementFilter::All => String::new(),
        ElementFilter::Leaves => {
            format!("&$filter=Type ne {}", ElementType::Consolidated.code())
        }
        ElementFilter::Consolidated => {
            format!("&$filter=Type eq {}", ElementType::Consolidated.code())
        }
        ElementFilter::Level(level) => format!("&$filter=Level eq {level}"),
    }
}

/// Nested `$expand` selecting components `depth` levels deep.
fn components_expand(depth: u32) -> Option<String> {
    if depth == 0 {
        return None;
    }
    let mut expand = "Components($select=Name,Type)".to_string();
    for _ in 1..depth {
        expand = format!("Components($select=Name,Type;$expand={expand})");
    }
    Some(expand)
}

#[derive(Deserialize)]
struct ODataList<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
}

#[derive(Deserialize)]
struct ODataScalar<T> {
    value: T,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct NamedRow {
    name: String,
}

#[derive(Deserialize)]
struct RemoteErrorBody {
    error: RemoteErrorDetail,
}

#[derive(Deserialize)]
struct RemoteErrorDetail {
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CubeWire {
    name: String,
    #[serde(default)]
    rules: Option<String>,
    #[serde(default)]
    last_schema_update: Option<String>,
    #[serde(default)]
    last_data_update: Option<String>,
    #[serde(default)]
    dimensions: Vec<NamedRow>,
}

impl From<CubeWire> for Cube {
    fn from(wire: CubeWire) -> Self {
        Self {
            name: wire.name,
            dimensions: wire.dimensions.into_iter().map(|row| row.name).collect(),
            rules: wire.rules.filter(|rules| !rules.trim().is_empty()),
            last_schema_update: wire.last_schema_update,
            last_data_update: wire.last_data_update,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RuleErrorWire {
    #[serde(default)]
    line_number: Option<u32>,
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ElementWire {
    name: String,
    #[serde(default)]
    unique_name: Option<String>,
    #[serde(rename = "Type")]
    element_type: ElementType,
    #[serde(default)]
    level: Option<u32>,
    #[serde(default)]
    index: Option<u32>,
    #[serde(default)]
    attributes: Option<BTreeMap<String, Value>>,
}

impl From<ElementWire> for Element {
    fn from(wire: ElementWire) -> Self {
        Self {
            name: wire.name,
            unique_name: wire.unique_name,
            element_type: wire.element_type,
            level: wire.level,
            index: wire.index,
            attributes: wire.attributes.unwrap_or_default(),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EdgeWire {
    parent_name: String,
    component_name: String,
    weight: f64,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct HierarchyWire {
    name: String,
    #[serde(default)]
    elements: Vec<ElementWire>,
    #[serde(default)]
    edges: Vec<EdgeWire>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DimensionWire {
    name: String,
    #[serde(default)]
    unique_name: Option<String>,
    #[serde(default)]
    hierarchies: Vec<HierarchyWire>,
}

impl From<DimensionWire> for Dimension {
    fn from(wire: DimensionWire) -> Self {
        Self {
            name: wire.name,
            unique_name: wire.unique_name,
            hierarchies: wire
                .hierarchies
                .into_iter()
                .map(|hierarchy| Hierarchy {
                    name: hierarchy.name,
                    elements: hierarchy.elements.into_iter().map(Element::from).collect(),
                    edges: hierarchy
                        .edges
                        .into_iter()
                        .map(|edge| Edge {
                            parent_name: edge.parent_name,
                            component_name: edge.component_name,
                            weight: edge.weight,
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct NodeWire {
    name: String,
    #[serde(rename = "Type")]
    element_type: ElementType,
    #[serde(default)]
    components: Vec<Self>,
}

impl From<NodeWire> for ElementNode {
    fn from(wire: NodeWire) -> Self {
        Self {
            name: wire.name,
            element_type: wire.element_type,
            components: wire.components.into_iter().map(Self::from).collect(),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CellsetWire {
    #[serde(rename = "ID", default)]
    id: Option<String>,
    #[serde(default)]
    axes: Vec<AxisWire>,
    #[serde(default)]
    cells: Vec<CellWire>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AxisWire {
    #[serde(default)]
    tuples: Vec<TupleWire>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TupleWire {
    #[serde(default)]
    members: Vec<NamedRow>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CellWire {
    ordinal: usize,
    #[serde(default)]
    value: Option<CellValue>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SetWire {
    #[serde(default)]
    tuples: Vec<TupleWire>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ProcessExecuteWire {
    #[serde(rename = "ProcessExecuteStatusCode")]
    status_code: String,
    #[serde(default)]
    error_log_file: Option<ErrorLogFileWire>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ErrorLogFileWire {
    filename: String,
}
