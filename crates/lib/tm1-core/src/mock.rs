//! In-memory TM1 server for tests.
//!
//! [`MockTm1`] is both the server state and a [`SessionFactory`]; every
//! session it opens shares that state and records the calls it receives.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tm1_types::schema::names_match;
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
    schema::is_control_name,
};

use crate::session::{
    SessionError,
    SessionFactory,
    SessionResult,
    Tm1ConnectionConfig,
    Tm1Session,
    UnboundProcess,
};

#[derive(Debug, Clone, Default)]
struct MockCube {
    dimensions: Vec<String>,
    storage_order: Vec<String>,
    rules: Option<String>,
    rule_errors: Vec<RuleError>,
}

#[derive(Default)]
struct MockState {
    version: String,
    cubes: BTreeMap<String, MockCube>,
    dimensions: BTreeMap<String, Dimension>,
    cells: HashMap<(String, Vec<String>), CellValue>,
    mdx_rows: HashMap<String, Vec<CellRow>>,
    set_results: HashMap<String, Vec<String>>,
    process_status: Option<String>,
    processes: Vec<UnboundProcess>,
    reorder_change: f64,
    calls: Vec<String>,
    mutations: usize,
    opened: usize,
    closed: usize,
    failing_open: bool,
    failing_close: bool,
    failing_mutations: bool,
    close_delay: Option<Duration>,
}

impl MockState {
    fn cube(&self, cube_name: &str) -> SessionResult<&MockCube> {
        self.cubes
            .get(cube_name)
            .ok_or_else(|| SessionError::NotFound(format!("cube '{cube_name}'")))
    }

    fn cube_mut(&mut self, cube_name: &str) -> SessionResult<&mut MockCube> {
        self.cubes
            .get_mut(cube_name)
            .ok_or_else(|| SessionError::NotFound(format!("cube '{cube_name}'")))
    }

    fn hierarchy(&self, dimension_name: &str, hierarchy_name: &str) -> SessionResult<&Hierarchy> {
        let dimension = self
            .dimensions
            .get(dimension_name)
            .ok_or_else(|| SessionError::NotFound(format!("dimension '{dimension_name}'")))?;
        dimension
            .hierarchies
            .iter()
            .find(|hierarchy| names_match(&hierarchy.name, hierarchy_name))
            .ok_or_else(|| {
                SessionError::NotFound(format!(
                    "hierarchy '{hierarchy_name}' in dimension '{dimension_name}'"
                ))
            })
    }

    fn element(
        &self,
        dimension_name: &str,
        hierarchy_name: &str,
        element_name: &str,
    ) -> SessionResult<&Element> {
        self.hierarchy(dimension_name, hierarchy_name)?
            .elements
            .iter()
            .find(|element| names_match(&element.name, element_name))
            .ok_or_else(|| SessionError::NotFound(format!("element '{element_name}'")))
    }

    fn mutation(&mut self, call: &str) -> SessionResult<()> {
        self.calls.push(call.to_string());
        self.mutations += 1;
        if self.failing_mutations {
            return Err(SessionError::Remote {
                status: 500,
                message: format!("{call} rejected"),
            });
        }
        Ok(())
    }

    fn read(&mut self, call: &str) {
        self.calls.push(call.to_string());
    }
}

/// Scriptable in-memory TM1 server.
#[derive(Clone, Default)]
pub struct MockTm1 {
    state: Arc<Mutex<MockState>>,
}

impl MockTm1 {
    #[must_use]
    pub fn new() -> Self {
        let mock = Self::default();
        mock.state().version = "11.8.02300.3".to_string();
        mock
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn with_cube(self, name: &str, dimensions: &[&str]) -> Self {
        let dimensions: Vec<String> = dimensions.iter().map(ToString::to_string).collect();
        self.state().cubes.insert(
            name.to_string(),
            MockCube {
                storage_order: dimensions.clone(),
                dimensions,
                ..MockCube::default()
            },
        );
        self
    }

    #[must_use]
    pub fn with_rules(self, cube_name: &str, rules: &str) -> Self {
        if let Some(cube) = self.state().cubes.get_mut(cube_name) {
            cube.rules = Some(rules.to_string());
        }
        self
    }

    #[must_use]
    pub fn with_rule_errors(self, cube_name: &str, errors: Vec<RuleError>) -> Self {
        if let Some(cube) = self.state().cubes.get_mut(cube_name) {
            cube.rule_errors = errors;
        }
        self
    }

    #[must_use]
    pub fn with_dimension(self, dimension: Dimension) -> Self {
        self.state()
            .dimensions
            .insert(dimension.name.clone(), dimension);
        self
    }

    /// Adds a dimension with one same-named hierarchy built from
    /// `(name, type)` elements and `(parent, component)` edges.
    #[must_use]
    pub fn with_hierarchy(
        self,
        name: &str,
        elements: &[(&str, ElementType)],
        edges: &[(&str, &str)],
    ) -> Self {
        let dimension = hierarchy_dimension(name, elements, edges);
        self.with_dimension(dimension)
    }

    #[must_use]
    pub fn with_cell(self, cube_name: &str, elements: &[&str], value: CellValue) -> Self {
        let key = (
            cube_name.to_string(),
            elements.iter().map(ToString::to_string).collect(),
        );
        self.state().cells.insert(key, value);
        self
    }

    #[must_use]
    pub fn with_mdx_rows(self, mdx: &str, rows: Vec<CellRow>) -> Self {
        self.state().mdx_rows.insert(mdx.to_string(), rows);
        self
    }

    #[must_use]
    pub fn with_set_result(self, mdx: &str, members: &[&str]) -> Self {
        self.state().set_results.insert(
            mdx.to_string(),
            members.iter().map(ToString::to_string).collect(),
        );
        self
    }

    #[must_use]
    pub fn with_process_status(self, status_code: &str) -> Self {
        self.state().process_status = Some(status_code.to_string());
        self
    }

    #[must_use]
    pub fn with_reorder_change(self, percent: f64) -> Self {
        self.state().reorder_change = percent;
        self
    }

    #[must_use]
    pub fn with_failing_open(self) -> Self {
        self.state().failing_open = true;
        self
    }

    #[must_use]
    pub fn with_failing_close(self) -> Self {
        self.state().failing_close = true;
        self
    }

    /// Makes every logout take `delay`; a close counts only once it finishes.
    #[must_use]
    pub fn with_close_delay(self, delay: Duration) -> Self {
        self.state().close_delay = Some(delay);
        self
    }

    #[must_use]
    pub fn with_failing_mutations(self) -> Self {
        self.state().failing_mutations = true;
        self
    }

    /// Names of every session call received so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    #[must_use]
    pub fn mutation_calls(&self) -> usize {
        self.state().mutations
    }

    #[must_use]
    pub fn opened(&self) -> usize {
        self.state().opened
    }

    #[must_use]
    pub fn closed(&self) -> usize {
        self.state().closed
    }

    #[must_use]
    pub fn processes(&self) -> Vec<UnboundProcess> {
        self.state().processes.clone()
    }

    #[must_use]
    pub fn rules(&self, cube_name: &str) -> Option<String> {
        self.state()
            .cubes
            .get(cube_name)
            .and_then(|cube| cube.rules.clone())
    }

    #[must_use]
    pub fn storage_order(&self, cube_name: &str) -> Option<Vec<String>> {
        self.state()
            .cubes
            .get(cube_name)
            .map(|cube| cube.storage_order.clone())
    }

    #[must_use]
    pub fn cell(&self, cube_name: &str, elements: &[&str]) -> Option<CellValue> {
        let key = (
            cube_name.to_string(),
            elements.iter().map(ToString::to_string).collect::<Vec<_>>(),
        );
        self.state().cells.get(&key).cloned()
    }
}

#[async_trait]
impl SessionFactory for MockTm1 {
    async fn open(&self, _config: &Tm1ConnectionConfig) -> SessionResult<Box<dyn Tm1Session>> {
        let mut state = self.state();
        if state.failing_open {
            return Err(SessionError::Transport("connection refused".to_string()));
        }
        state.opened += 1;
        Ok(Box::new(MockSession {
            state: self.state.clone(),
        }))
    }
}

struct MockSession {
    state: Arc<Mutex<MockState>>,
}

impl MockSession {
    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Tm1Session for MockSession {
    async fn product_version(&self) -> SessionResult<String> {
        let mut state = self.state();
        state.read("product_version");
        Ok(state.version.clone())
    }

    async fn close(&self) -> SessionResult<()> {
        let delay = self.state().close_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state();
        state.closed += 1;
        if state.failing_close {
            return Err(SessionError::Transport("logout failed".to_string()));
        }
        Ok(())
    }

    async fn cube_names(&self, scope: EntityScope) -> SessionResult<Vec<String>> {
        let mut state = self.state();
        state.read("cube_names");
        Ok(scoped_names(state.cubes.keys(), scope))
    }

    async fn cube_exists(&self, cube_name: &str) -> SessionResult<bool> {
        let mut state = self.state();
        state.read("cube_exists");
        Ok(state.cubes.contains_key(cube_name))
    }

    async fn cube(&self, cube_name: &str) -> SessionResult<Cube> {
        let mut state = self.state();
        state.read("cube");
        let cube = state.cube(cube_name)?;
        Ok(Cube {
            name: cube_name.to_string(),
            dimensions: cube.dimensions.clone(),
            rules: cube.rules.clone(),
            last_schema_update: None,
            last_data_update: None,
        })
    }

    async fn cube_dimension_names(&self, cube_name: &str) -> SessionResult<Vec<String>> {
        let mut state = self.state();
        state.read("cube_dimension_names");
        Ok(state.cube(cube_name)?.dimensions.clone())
    }

    async fn check_rules(&self, cube_name: &str) -> SessionResult<Vec<RuleError>> {
        let mut state = self.state();
        state.read("check_rules");
        Ok(state.cube(cube_name)?.rule_errors.clone())
    }

    async fn update_rules(&self, cube_name: &str, rules: &str) -> SessionResult<()> {
        let mut state = self.state();
        state.mutation("update_rules")?;
        state.cube_mut(cube_name)?.rules = Some(rules.to_string());
        Ok(())
    }

    async fn lock_cube(&self, cube_name: &str) -> SessionResult<()> {
        let mut state = self.state();
        state.mutation("lock_cube")?;
        state.cube(cube_name).map(drop)
    }

    async fn unlock_cube(&self, cube_name: &str) -> SessionResult<()> {
        let mut state = self.state();
        state.mutation("unlock_cube")?;
        state.cube(cube_name).map(drop)
    }

    async fn load_cube(&self, cube_name: &str) -> SessionResult<()> {
        let mut state = self.state();
        state.mutation("load_cube")?;
        state.cube(cube_name).map(drop)
    }

    async fn unload_cube(&self, cube_name: &str) -> SessionResult<()> {
        let mut state = self.state();
        state.mutation("unload_cube")?;
        state.cube(cube_name).map(drop)
    }

    async fn storage_dimension_order(&self, cube_name: &str) -> SessionResult<Vec<String>> {
        let mut state = self.state();
        state.read("storage_dimension_order");
        Ok(state.cube(cube_name)?.storage_order.clone())
    }

    async fn reorder_dimensions(
        &self,
        cube_name: &str,
        dimension_names: &[String],
    ) -> SessionResult<f64> {
        let mut state = self.state();
        state.mutation("reorder_dimensions")?;
        let change = state.reorder_change;
        state.cube_mut(cube_name)?.storage_order = dimension_names.to_vec();
        Ok(change)
    }

    async fn cell_value(
        &self,
        cube_name: &str,
        elements: &[ElementAddress],
    ) -> SessionResult<CellValue> {
        let mut state = self.state();
        state.read("cell_value");
        let key = cell_key(&state, cube_name, elements)?;
        Ok(state.cells.get(&key).cloned().unwrap_or(CellValue::Empty))
    }

    async fn write_value(
        &self,
        cube_name: &str,
        elements: &[ElementAddress],
        value: &CellValue,
    ) -> SessionResult<()> {
        let mut state = self.state();
        state.mutation("write_value")?;
        let key = cell_key(&state, cube_name, elements)?;
        state.cells.insert(key, value.clone());
        Ok(())
    }

    async fn execute_mdx(&self, mdx: &str) -> SessionResult<Vec<CellRow>> {
        let mut state = self.state();
        state.read("execute_mdx");
        state
            .mdx_rows
            .get(mdx)
            .cloned()
            .ok_or_else(|| SessionError::Remote {
                status: 400,
                message: format!("unable to evaluate '{mdx}'"),
            })
    }

    async fn execute_set_mdx(&self, mdx: &str) -> SessionResult<Vec<String>> {
        let mut state = self.state();
        state.read("execute_set_mdx");
        Ok(state.set_results.get(mdx).cloned().unwrap_or_default())
    }

    async fn dimension_names(&self, scope: EntityScope) -> SessionResult<Vec<String>> {
        let mut state = self.state();
        state.read("dimension_names");
        Ok(scoped_names(state.dimensions.keys(), scope))
    }

    async fn dimension_exists(&self, dimension_name: &str) -> SessionResult<bool> {
        let mut state = self.state();
        state.read("dimension_exists");
        Ok(state.dimensions.contains_key(dimension_name))
    }

    async fn dimension(&self, dimension_name: &str) -> SessionResult<Dimension> {
        let mut state = self.state();
        state.read("dimension");
        state
            .dimensions
            .get(dimension_name)
            .cloned()
            .ok_or_else(|| SessionError::NotFound(format!("dimension '{dimension_name}'")))
    }

    async fn element(
        &self,
        dimension_name: &str,
        hierarchy_name: &str,
        element_name: &str,
    ) -> SessionResult<Element> {
        let mut state = self.state();
        state.read("element");
        state
            .element(dimension_name, hierarchy_name, element_name)
            .cloned()
    }

    async fn elements(
        &self,
        dimension_name: &str,
        hierarchy_name: &str,
        filter: ElementFilter,
    ) -> SessionResult<Vec<Element>> {
        let mut state = self.state();
        state.read("elements");
        let hierarchy = state.hierarchy(dimension_name, hierarchy_name)?;
        Ok(hierarchy
            .elements
            .iter()
            .filter(|element| matches_filter(element, filter))
            .cloned()
            .collect())
    }

    async fn element_names(
        &self,
        dimension_name: &str,
        hierarchy_name: &str,
        filter: ElementFilter,
    ) -> SessionResult<Vec<String>> {
        let mut state = self.state();
        state.read("element_names");
        let hierarchy = state.hierarchy(dimension_name, hierarchy_name)?;
        Ok(hierarchy
            .elements
            .iter()
            .filter(|element| matches_filter(element, filter))
            .map(|element| element.name.clone())
            .collect())
    }

    async fn parents(
        &self,
        dimension_name: &str,
        hierarchy_name: &str,
        element_name: &str,
    ) -> SessionResult<Vec<String>> {
        let mut state = self.state();
        state.read("parents");
        state.element(dimension_name, hierarchy_name, element_name)?;
        let hierarchy = state.hierarchy(dimension_name, hierarchy_name)?;
        Ok(hierarchy
            .edges
            .iter()
            .filter(|edge| names_match(&edge.component_name, element_name))
            .map(|edge| edge.parent_name.clone())
            .collect())
    }

    async fn element_tree(
        &self,
        dimension_name: &str,
        hierarchy_name: &str,
        element_name: &str,
        depth: u32,
    ) -> SessionResult<ElementNode> {
        let mut state = self.state();
        state.read("element_tree");
        let root = state.element(dimension_name, hierarchy_name, element_name)?;
        let hierarchy = state.hierarchy(dimension_name, hierarchy_name)?;
        Ok(build_tree(hierarchy, root, depth))
    }

    async fn execute_process(&self, process: &UnboundProcess) -> SessionResult<ProcessOutcome> {
        let mut state = self.state();
        state.read("execute_process");
        state.processes.push(process.clone());
        Ok(ProcessOutcome {
            status_code: state
                .process_status
                .clone()
                .unwrap_or_else(|| "CompletedSuccessfully".to_string()),
            error_log_file: None,
        })
    }
}

fn scoped_names<'a>(names: impl Iterator<Item = &'a String>, scope: EntityScope) -> Vec<String> {
    names
        .filter(|name| match scope {
            EntityScope::All => true,
            EntityScope::Model => !is_control_name(name),
            EntityScope::Control => is_control_name(name),
        })
        .cloned()
        .collect()
}

fn cell_key(
    state: &MockState,
    cube_name: &str,
    elements: &[ElementAddress],
) -> SessionResult<(String, Vec<String>)> {
    let cube = state.cube(cube_name)?;
    if cube.dimensions.len() != elements.len() {
        return Err(SessionError::InvalidInput(format!(
            "cube '{cube_name}' has {} dimensions but {} elements were given",
            cube.dimensions.len(),
            elements.len()
        )));
    }
    Ok((
        cube_name.to_string(),
        elements
            .iter()
            .map(|address| address.element.clone())
            .collect(),
    ))
}

fn matches_filter(element: &Element, filter: ElementFilter) -> bool {
    match filter {
        ElementFilter::All => true,
        ElementFilter::Leaves => element.element_type.is_leaf(),
        ElementFilter::Consolidated => !element.element_type.is_leaf(),
        ElementFilter::Level(level) => element.level == Some(level),
    }
}

fn build_tree(hierarchy: &Hierarchy, element: &Element, depth: u32) -> ElementNode {
    let components = if depth == 0 {
        Vec::new()
    } else {
        hierarchy
            .edges
            .iter()
            .filter(|edge| names_match(&edge.parent_name, &element.name))
            .filter_map(|edge| {
                hierarchy
                    .elements
                    .iter()
                    .find(|candidate| names_match(&candidate.name, &edge.component_name))
            })
            .map(|component| build_tree(hierarchy, component, depth - 1))
            .collect()
    };
    ElementNode {
        name: element.name.clone(),
        element_type: element.element_type,
        components,
    }
}

/// Builds a dimension with one same-named hierarchy. Levels are derived from
/// the edges: leaves sit at level 0 and a consolidation one above its
/// highest component.
#[must_use]
pub fn hierarchy_dimension(
    name: &str,
    elements: &[(&str, ElementType)],
    edges: &[(&str, &str)],
) -> Dimension {
    let edges: Vec<Edge> = edges
        .iter()
        .map(|(parent, component)| Edge {
            parent_name: (*parent).to_string(),
            component_name: (*component).to_string(),
            weight: 1.0,
        })
        .collect();
    let elements = elements
        .iter()
        .zip(1..)
        .map(|((element, element_type), index)| Element {
            name: (*element).to_string(),
            unique_name: Some(format!("[{name}].[{name}].[{element}]")),
            element_type: *element_type,
            level: Some(level_of(element, &edges, elements.len())),
            index: Some(index),
            attributes: BTreeMap::new(),
        })
        .collect();
    Dimension {
        name: name.to_string(),
        unique_name: Some(format!("[{name}]")),
        hierarchies: vec![Hierarchy {
            name: name.to_string(),
            elements,
            edges,
        }],
    }
}

fn level_of(element: &str, edges: &[Edge], budget: usize) -> u32 {
    if budget == 0 {
        return 0;
    }
    edges
        .iter()
        .filter(|edge| edge.parent_name == element)
        .map(|edge| level_of(&edge.component_name, edges, budget - 1) + 1)
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

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

    #[test]
    fn hierarchy_levels_follow_edges() {
        let dimension = hierarchy_dimension(
            "Month",
            &[
                ("Year", ElementType::Consolidated),
                ("Q1", ElementType::Consolidated),
                ("Jan", ElementType::Numeric),
            ],
            &[("Year", "Q1"), ("Q1", "Jan")],
        );
        let levels: Vec<Option<u32>> = dimension.hierarchies[0]
            .elements
            .iter()
            .map(|element| element.level)
            .collect();
        assert_eq!(levels, vec![Some(2), Some(1), Some(0)]);
    }

    #[tokio::test]
    async fn sessions_share_state_and_record_calls() {
        let tm1 = months().with_cube("Sales", &["Month"]);
        let config = Tm1ConnectionConfig::new("http://localhost:8010", "admin", "apple");
        let session = tm1.open(&config).await.expect("mock session should open");

        let tree = session
            .element_tree("Month", "Month", "Year", 99)
            .await
            .expect("tree should build");
        assert_eq!(tree.descendants(true), vec!["Jan", "Feb"]);

        session
            .update_rules("Sales", "SKIPCHECK;")
            .await
            .expect("rules should update");
        assert_eq!(tm1.rules("Sales").as_deref(), Some("SKIPCHECK;"));
        assert_eq!(tm1.mutation_calls(), 1);
        assert_eq!(tm1.calls(), vec!["element_tree", "update_rules"]);
        assert_eq!(tm1.opened(), 1);
    }
}
