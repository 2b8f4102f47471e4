use std::collections::BTreeMap;
use std::sync::Arc;

use tm1_types::schema::{DEFAULT_CONSOLIDATION_DEPTH, names_match};
use tm1_types::{AncestorMethod, Element, ElementFilter, ElementType, ProcessOutcome};
use uuid::Uuid;

use super::{ControlResult, Tm1ControlPlane, optional, or_absent};
use crate::mdx;
use crate::session::{SessionError, SessionResult, Tm1Session, UnboundProcess};

const PROCESS_QUIT_CALLED: &str = "QuitCalled";
const PROCESS_COMPLETED: &str = "CompletedSuccessfully";
/// Reported with a process that ran but neither quit nor completed.
const PROCESS_FAILURE_STATUS: u16 = 500;

impl Tm1ControlPlane {
    /// # Errors
    /// Returns `ControlError` if the session cannot be opened or the call fails.
    pub async fn element(
        &self,
        dimension_name: &str,
        hierarchy_name: &str,
        element_name: &str,
    ) -> ControlResult<Option<Element>> {
        self.scoped("get_element", |session| async move {
            optional(
                session
                    .element(dimension_name, hierarchy_name, element_name)
                    .await,
            )
        })
        .await
    }

    /// Elements of a hierarchy matching `filter`, empty when the hierarchy is
    /// missing.
    ///
    /// # Errors
    /// Returns `ControlError` if the session cannot be opened or the call fails.
    pub async fn elements(
        &self,
        dimension_name: &str,
        hierarchy_name: &str,
        filter: ElementFilter,
    ) -> ControlResult<Vec<Element>> {
        self.scoped("get_elements", |session| async move {
            or_absent(
                session
                    .elements(dimension_name, hierarchy_name, filter)
                    .await,
                Vec::new,
            )
        })
        .await
    }

    /// # Errors
    /// Returns `ControlError` if the session cannot be opened or the call fails.
    pub async fn element_names(
        &self,
        dimension_name: &str,
        hierarchy_name: &str,
        filter: ElementFilter,
    ) -> ControlResult<Vec<String>> {
        self.scoped("get_element_names", |session| async move {
            or_absent(
                session
                    .element_names(dimension_name, hierarchy_name, filter)
                    .await,
                Vec::new,
            )
        })
        .await
    }

    /// Element name to type, optionally without consolidations.
    ///
    /// # Errors
    /// Returns `ControlError` if the session cannot be opened or the call fails.
    pub async fn element_types(
        &self,
        dimension_name: &str,
        hierarchy_name: &str,
        skip_consolidations: bool,
    ) -> ControlResult<BTreeMap<String, ElementType>> {
        let filter = if skip_consolidations {
            ElementFilter::Leaves
        } else {
            ElementFilter::All
        };
        let elements = self
            .elements(dimension_name, hierarchy_name, filter)
            .await?;
        Ok(elements
            .into_iter()
            .map(|element| (element.name, element.element_type))
            .collect())
    }

    /// # Errors
    /// Returns `ControlError` if the session cannot be opened or the call fails.
    pub async fn parents(
        &self,
        dimension_name: &str,
        hierarchy_name: &str,
        element_name: &str,
    ) -> ControlResult<Vec<String>> {
        self.scoped("get_parents", |session| async move {
            or_absent(
                session
                    .parents(dimension_name, hierarchy_name, element_name)
                    .await,
                Vec::new,
            )
        })
        .await
    }

    /// Members below a consolidation, down to `max_depth` levels.
    ///
    /// The tree is fetched in one request and flattened depth first; each
    /// member is listed once.
    ///
    /// # Errors
    /// Returns `ControlError` if the session cannot be opened or the call fails.
    pub async fn members_under_consolidation(
        &self,
        dimension_name: &str,
        hierarchy_name: &str,
        consolidation: &str,
        max_depth: Option<u32>,
        leaves_only: bool,
    ) -> ControlResult<Vec<String>> {
        let depth = max_depth.unwrap_or(DEFAULT_CONSOLIDATION_DEPTH);
        self.scoped("get_members_under_consolidation", |session| async move {
            let tree = session
                .element_tree(dimension_name, hierarchy_name, consolidation, depth)
                .await
                .map(|tree| tree.descendants(leaves_only));
            or_absent(tree, Vec::new)
        })
        .await
    }

    /// # Errors
    /// Returns `ControlError` if the session cannot be opened or the call fails.
    pub async fn leaves_under_consolidation(
        &self,
        dimension_name: &str,
        hierarchy_name: &str,
        consolidation: &str,
        max_depth: Option<u32>,
    ) -> ControlResult<Vec<String>> {
        self.members_under_consolidation(
            dimension_name,
            hierarchy_name,
            consolidation,
            max_depth,
            true,
        )
        .await
    }

    /// Whether `parent_name` is a direct parent of `element_name`.
    ///
    /// # Errors
    /// Returns `ControlError` if the session cannot be opened or the call fails.
    pub async fn element_is_parent(
        &self,
        dimension_name: &str,
        hierarchy_name: &str,
        parent_name: &str,
        element_name: &str,
    ) -> ControlResult<bool> {
        self.scoped("element_is_parent", |session| async move {
            let parents = session
                .parents(dimension_name, hierarchy_name, element_name)
                .await
                .map(|parents| parents.iter().any(|parent| names_match(parent, parent_name)));
            or_absent(parents, || false)
        })
        .await
    }

    /// Whether `ancestor_name` sits anywhere above `element_name`.
    ///
    /// An element is never its own ancestor.
    ///
    /// # Errors
    /// Returns `ControlError` if the session cannot be opened or the call fails.
    pub async fn element_is_ancestor(
        &self,
        dimension_name: &str,
        hierarchy_name: &str,
        ancestor_name: &str,
        element_name: &str,
        method: AncestorMethod,
    ) -> ControlResult<bool> {
        if names_match(ancestor_name, element_name) {
            return Ok(false);
        }
        let check = AncestorCheck {
            dimension: dimension_name,
            hierarchy: hierarchy_name,
            ancestor: ancestor_name,
            element: element_name,
        };
        self.scoped("element_is_ancestor", |session| async move {
            or_absent(check.run(session, method).await, || false)
        })
        .await
    }
}

#[derive(Clone, Copy)]
struct AncestorCheck<'a> {
    dimension: &'a str,
    hierarchy: &'a str,
    ancestor: &'a str,
    element: &'a str,
}

impl AncestorCheck<'_> {
    async fn run(self, session: Arc<dyn Tm1Session>, method: AncestorMethod) -> SessionResult<bool> {
        session
            .element(self.dimension, self.hierarchy, self.ancestor)
            .await?;
        session
            .element(self.dimension, self.hierarchy, self.element)
            .await?;
        let set = match method {
            AncestorMethod::DrillDown => mdx::drill_down_ancestor_set(
                self.dimension,
                self.hierarchy,
                self.ancestor,
                self.element,
            ),
            AncestorMethod::Descendants => mdx::descendants_ancestor_set(
                self.dimension,
                self.hierarchy,
                self.ancestor,
                self.element,
            ),
            AncestorMethod::TurboIntegrator => {
                let outcome = session.execute_process(&self.process()).await?;
                return process_verdict(outcome);
            }
        };
        let members = session.execute_set_mdx(&set).await?;
        Ok(!members.is_empty())
    }

    /// Unbound process that quits when the relation holds and completes
    /// normally otherwise.
    fn process(self) -> UnboundProcess {
        let prolog = format!(
            "If(ElementIsAncestor('{}', '{}', '{}', '{}')=1);\r\nProcessQuit;\r\nEndIf;",
            ti_quote(self.dimension),
            ti_quote(self.hierarchy),
            ti_quote(self.ancestor),
            ti_quote(self.element)
        );
        UnboundProcess {
            name: format!("}}tm1_mcp_{}", Uuid::new_v4().simple()),
            prolog,
        }
    }
}

/// `QuitCalled` means the relation holds, a clean run means it does not, and
/// any other status is a failed process.
fn process_verdict(outcome: ProcessOutcome) -> SessionResult<bool> {
    match outcome.status_code.as_str() {
        PROCESS_QUIT_CALLED => Ok(true),
        PROCESS_COMPLETED => Ok(false),
        status => Err(SessionError::Remote {
            status: PROCESS_FAILURE_STATUS,
            message: match outcome.error_log_file {
                Some(log) => format!("ancestor check process ended with {status} (log: {log})"),
                None => format!("ancestor check process ended with {status}"),
            },
        }),
    }
}

fn ti_quote(value: &str) -> String {
    value.replace('\'', "''")
}
