use std::sync::Arc;

use serde_json::{Value, json};
use tm1_types::schema::{CUBE_PROPERTIES, PROPERTY_VMM, PROPERTY_VMT, normalize_name};
use tm1_types::{
    CellValue,
    Cube,
    CubeRules,
    ElementAddress,
    EntityScope,
    RuleError,
    StatusEnvelope,
};

use super::{ControlResult, Tm1ControlPlane, optional, or_absent};
use crate::session::{SessionError, SessionResult, Tm1Session};

impl Tm1ControlPlane {
    /// Product version reported by the server.
    ///
    /// # Errors
    /// Returns `ControlError` if the session cannot be opened or the call fails.
    pub async fn server_version(&self) -> ControlResult<String> {
        self.scoped("get_server_version", |session| async move {
            session.product_version().await
        })
        .await
    }

    /// # Errors
    /// Returns `ControlError` if the session cannot be opened or the call fails.
    pub async fn cube_names(&self, scope: EntityScope) -> ControlResult<Vec<String>> {
        self.scoped("cube_names", |session| async move { session.cube_names(scope).await })
            .await
    }

    /// Number of cubes, optionally leaving out control cubes.
    ///
    /// # Errors
    /// Returns `ControlError` if the session cannot be opened or the call fails.
    pub async fn cube_count(&self, skip_control_cubes: bool) -> ControlResult<usize> {
        let names = self
            .cube_names(EntityScope::skip_control(skip_control_cubes))
            .await?;
        Ok(names.len())
    }

    /// # Errors
    /// Returns `ControlError` if the session cannot be opened or the call fails.
    pub async fn cube_exists(&self, cube_name: &str) -> ControlResult<bool> {
        self.scoped("check_cube_exists", |session| async move {
            or_absent(session.cube_exists(cube_name).await, || false)
        })
        .await
    }

    /// Cube metadata, `None` when the cube does not exist.
    ///
    /// # Errors
    /// Returns `ControlError` if the session cannot be opened or the call fails.
    pub async fn cube(&self, cube_name: &str) -> ControlResult<Option<Cube>> {
        self.scoped("get_cube", |session| async move {
            optional(session.cube(cube_name).await)
        })
        .await
    }

    /// Dimension names of a cube, empty when the cube does not exist.
    ///
    /// # Errors
    /// Returns `ControlError` if the session cannot be opened or the call fails.
    pub async fn cube_dimensions(&self, cube_name: &str) -> ControlResult<Vec<String>> {
        self.scoped("get_cube_dimensions", |session| async move {
            or_absent(session.cube_dimension_names(cube_name).await, Vec::new)
        })
        .await
    }

    /// # Errors
    /// Returns `ControlError` if the session cannot be opened or the call fails.
    pub async fn cube_rules(&self, cube_name: &str) -> ControlResult<Option<CubeRules>> {
        self.scoped("get_cube_rules", |session| async move {
            optional(session.cube(cube_name).await).map(|cube| {
                cube.map(|cube| CubeRules {
                    cube: cube.name,
                    rules: cube.rules,
                })
            })
        })
        .await
    }

    /// Asks the server to validate the rules of a cube.
    ///
    /// Reported rule errors produce a `warning` envelope listing them under
    /// `errors`.
    ///
    /// # Errors
    /// Returns `ControlError` on connectivity or authentication failures.
    pub async fn check_cube_rules(&self, cube_name: &str) -> ControlResult<StatusEnvelope> {
        self.with_existing_cube("check_cube_rules", cube_name, |session| async move {
            session
                .check_rules(cube_name)
                .await
                .map(|errors| rules_envelope(cube_name, &errors))
        })
        .await
    }

    /// # Errors
    /// Returns `ControlError` on connectivity or authentication failures.
    pub async fn update_cube_rules(
        &self,
        cube_name: &str,
        rules: &str,
    ) -> ControlResult<StatusEnvelope> {
        self.with_existing_cube("update_cube_rules", cube_name, |session| async move {
            session
                .update_rules(cube_name, rules)
                .await
                .map(|()| StatusEnvelope::success(format!("Rules of cube '{cube_name}' updated")))
        })
        .await
    }

    /// # Errors
    /// Returns `ControlError` on connectivity or authentication failures.
    pub async fn lock_cube(&self, cube_name: &str) -> ControlResult<StatusEnvelope> {
        self.with_existing_cube("lock_cube", cube_name, |session| async move {
            session
                .lock_cube(cube_name)
                .await
                .map(|()| StatusEnvelope::success(format!("Cube '{cube_name}' locked")))
        })
        .await
    }

    /// # Errors
    /// Returns `ControlError` on connectivity or authentication failures.
    pub async fn unlock_cube(&self, cube_name: &str) -> ControlResult<StatusEnvelope> {
        self.with_existing_cube("unlock_cube", cube_name, |session| async move {
            session
                .unlock_cube(cube_name)
                .await
                .map(|()| StatusEnvelope::success(format!("Cube '{cube_name}' unlocked")))
        })
        .await
    }

    /// # Errors
    /// Returns `ControlError` on connectivity or authentication failures.
    pub async fn load_cube(&self, cube_name: &str) -> ControlResult<StatusEnvelope> {
        self.with_existing_cube("load_cube", cube_name, |session| async move {
            session
                .load_cube(cube_name)
                .await
                .map(|()| StatusEnvelope::success(format!("Cube '{cube_name}' loaded")))
        })
        .await
    }

    /// # Errors
    /// Returns `ControlError` on connectivity or authentication failures.
    pub async fn unload_cube(&self, cube_name: &str) -> ControlResult<StatusEnvelope> {
        self.with_existing_cube("unload_cube", cube_name, |session| async move {
            session
                .unload_cube(cube_name)
                .await
                .map(|()| StatusEnvelope::success(format!("Cube '{cube_name}' unloaded")))
        })
        .await
    }

    /// # Errors
    /// Returns `ControlError` if the session cannot be opened or the call fails.
    pub async fn storage_dimension_order(&self, cube_name: &str) -> ControlResult<Vec<String>> {
        self.scoped("get_storage_dimension_order", |session| async move {
            or_absent(session.storage_dimension_order(cube_name).await, Vec::new)
        })
        .await
    }

    /// Reorders the storage dimensions of a cube.
    ///
    /// `dimension_names` must be a permutation of the cube's dimensions;
    /// anything else is rejected before the server is asked to reorder.
    ///
    /// # Errors
    /// Returns `ControlError` on connectivity or authentication failures.
    pub async fn update_storage_dimension_order(
        &self,
        cube_name: &str,
        dimension_names: &[String],
    ) -> ControlResult<StatusEnvelope> {
        self.with_existing_cube("update_storage_dimension_order", cube_name, |session| {
            reorder_storage(session, cube_name, dimension_names)
        })
        .await
    }

    /// View memory maximum of a cube, read from the cube properties.
    ///
    /// # Errors
    /// Returns `ControlError` with a not-found session error when the cube
    /// does not exist, or if the call fails.
    pub async fn cube_vmm(&self, cube_name: &str) -> ControlResult<CellValue> {
        self.cube_property("get_cube_vmm", cube_name, PROPERTY_VMM).await
    }

    /// View memory threshold of a cube, read from the cube properties.
    ///
    /// # Errors
    /// Returns `ControlError` with a not-found session error when the cube
    /// does not exist, or if the call fails.
    pub async fn cube_vmt(&self, cube_name: &str) -> ControlResult<CellValue> {
        self.cube_property("get_cube_vmt", cube_name, PROPERTY_VMT).await
    }

    /// # Errors
    /// Returns `ControlError` on connectivity or authentication failures.
    pub async fn set_cube_vmm(&self, cube_name: &str, value: &str) -> ControlResult<StatusEnvelope> {
        self.set_cube_property("set_cube_vmm", cube_name, PROPERTY_VMM, value)
            .await
    }

    /// # Errors
    /// Returns `ControlError` on connectivity or authentication failures.
    pub async fn set_cube_vmt(&self, cube_name: &str, value: &str) -> ControlResult<StatusEnvelope> {
        self.set_cube_property("set_cube_vmt", cube_name, PROPERTY_VMT, value)
            .await
    }

    async fn cube_property(
        &self,
        operation: &'static str,
        cube_name: &str,
        property: &str,
    ) -> ControlResult<CellValue> {
        self.scoped(operation, |session| async move {
            if !session.cube_exists(cube_name).await? {
                return Err(SessionError::NotFound(format!("cube '{cube_name}'")));
            }
            session
                .cell_value(CUBE_PROPERTIES, &property_address(cube_name, property))
                .await
        })
        .await
    }

    async fn set_cube_property(
        &self,
        operation: &'static str,
        cube_name: &str,
        property: &str,
        value: &str,
    ) -> ControlResult<StatusEnvelope> {
        self.with_existing_cube(operation, cube_name, |session| async move {
            let cell = CellValue::Text(value.to_string());
            session
                .write_value(CUBE_PROPERTIES, &property_address(cube_name, property), &cell)
                .await
                .map(|()| {
                    StatusEnvelope::success(format!(
                        "{property} of cube '{cube_name}' set to '{value}'"
                    ))
                })
        })
        .await
    }
}

async fn reorder_storage(
    session: Arc<dyn Tm1Session>,
    cube_name: &str,
    dimension_names: &[String],
) -> SessionResult<StatusEnvelope> {
    let current = session.cube_dimension_names(cube_name).await?;
    if !is_permutation(&current, dimension_names) {
        return Ok(StatusEnvelope::error(format!(
            "Dimensions [{}] are not a permutation of the dimensions of cube '{cube_name}' [{}]",
            dimension_names.join(", "),
            current.join(", ")
        )));
    }
    let percent_change = session.reorder_dimensions(cube_name, dimension_names).await?;
    Ok(StatusEnvelope::success(format!(
        "Storage dimension order of cube '{cube_name}' updated"
    ))
    .with("percent_change", percent_change))
}

fn rules_envelope(cube_name: &str, errors: &[RuleError]) -> StatusEnvelope {
    if errors.is_empty() {
        return StatusEnvelope::success(format!("Rules of cube '{cube_name}' are valid"));
    }
    StatusEnvelope::warning(format!(
        "Rules of cube '{cube_name}' have {} error(s)",
        errors.len()
    ))
    .with("errors", rule_errors_json(errors))
}

fn property_address(cube_name: &str, property: &str) -> [ElementAddress; 2] {
    [
        ElementAddress {
            hierarchy: None,
            element: cube_name.to_string(),
        },
        ElementAddress {
            hierarchy: None,
            element: property.to_string(),
        },
    ]
}

fn is_permutation(current: &[String], requested: &[String]) -> bool {
    let mut current: Vec<String> = current.iter().map(|name| normalize_name(name)).collect();
    let mut requested: Vec<String> = requested.iter().map(|name| normalize_name(name)).collect();
    current.sort_unstable();
    requested.sort_unstable();
    current == requested
}

fn rule_errors_json(errors: &[RuleError]) -> Value {
    Value::Array(
        errors
            .iter()
            .map(|error| json!({ "line_number": error.line_number, "message": error.message }))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::tests::plane;
    use crate::mock::MockTm1;
    use serde_json::json;
    use tm1_types::Status;

    fn sales() -> MockTm1 {
        MockTm1::new()
            .with_cube("Sales", &["Version", "Region", "Month"])
            .with_cube("Plan", &["Version", "Month"])
            .with_cube("}ClientGroups", &["}Clients", "}Groups"])
            .with_cube("}ElementAttributes_Month", &["Month", "}ElementAttributes_Month"])
            .with_cube("}CubeProperties", &["}Cubes", "}CubeProperties"])
    }

    #[tokio::test]
    async fn check_cube_exists_reports_presence() {
        let tm1 = MockTm1::new()
            .with_cube("Sales", &["Month"])
            .with_cube("}ControlCube", &["Month"]);
        let control = plane(&tm1);

        assert!(control.cube_exists("Sales").await.expect("check should run"));
        assert!(!control.cube_exists("Nope").await.expect("check should run"));
        assert_eq!(tm1.closed(), 2);
    }

    #[tokio::test]
    async fn cube_count_can_skip_control_cubes() {
        let tm1 = sales();
        let control = plane(&tm1);

        assert_eq!(control.cube_count(true).await.expect("count should run"), 2);
        assert_eq!(control.cube_count(false).await.expect("count should run"), 5);
    }

    #[tokio::test]
    async fn update_rules_on_missing_cube_issues_no_mutation() {
        let tm1 = sales();
        let control = plane(&tm1);

        let envelope = control
            .update_cube_rules("Missing", "SKIPCHECK;")
            .await
            .expect("missing cube should produce an envelope");

        assert_eq!(
            serde_json::to_value(&envelope).expect("envelope should serialize"),
            json!({"status": "error", "message": "Cube 'Missing' does not exist"})
        );
        assert_eq!(tm1.mutation_calls(), 0);
        assert_eq!(tm1.closed(), 1);
    }

    #[tokio::test]
    async fn mutations_on_missing_cube_issue_no_mutation() {
        let tm1 = sales();
        let control = plane(&tm1);
        let order = vec!["Month".to_string(), "Version".to_string()];

        for operation in [
            "lock_cube",
            "unlock_cube",
            "load_cube",
            "unload_cube",
            "set_cube_vmm",
            "set_cube_vmt",
            "update_storage_dimension_order",
        ] {
            let envelope = match operation {
                "lock_cube" => control.lock_cube("Missing").await,
                "unlock_cube" => control.unlock_cube("Missing").await,
                "load_cube" => control.load_cube("Missing").await,
                "unload_cube" => control.unload_cube("Missing").await,
                "set_cube_vmm" => control.set_cube_vmm("Missing", "128").await,
                "set_cube_vmt" => control.set_cube_vmt("Missing", "5").await,
                _ => control.update_storage_dimension_order("Missing", &order).await,
            }
            .expect("missing cube should produce an envelope");

            assert_eq!(
                serde_json::to_value(&envelope).expect("envelope should serialize"),
                json!({"status": "error", "message": "Cube 'Missing' does not exist"}),
                "{operation}"
            );
        }

        assert_eq!(tm1.mutation_calls(), 0);
        assert_eq!(tm1.opened(), 7);
        assert_eq!(tm1.closed(), 7);
    }

    #[tokio::test]
    async fn cube_reads_are_repeatable() {
        let tm1 = sales();
        let control = plane(&tm1);

        let first = control.cube("Sales").await.expect("read should run");
        let second = control.cube("Sales").await.expect("read should run");
        assert!(first.is_some());
        assert_eq!(first, second);
        assert_eq!(
            control.cube_dimensions("Sales").await.expect("read should run"),
            control.cube_dimensions("Sales").await.expect("read should run")
        );
        assert_eq!(tm1.mutation_calls(), 0);
    }

    #[tokio::test]
    async fn update_rules_is_idempotent() {
        let tm1 = sales();
        let control = plane(&tm1);

        for _ in 0..2 {
            let envelope = control
                .update_cube_rules("Sales", "SKIPCHECK;\n[] = N: 1;")
                .await
                .expect("update should run");
            assert!(envelope.is_success());
        }

        assert_eq!(tm1.rules("Sales").as_deref(), Some("SKIPCHECK;\n[] = N: 1;"));
        assert_eq!(tm1.mutation_calls(), 2);
        assert_eq!(tm1.closed(), 2);
    }

    #[tokio::test]
    async fn missing_cube_reads_have_empty_representations() {
        let tm1 = sales();
        let control = plane(&tm1);

        assert_eq!(control.cube("Nope").await.expect("read should run"), None);
        assert_eq!(control.cube_rules("Nope").await.expect("read should run"), None);
        assert!(control
            .cube_dimensions("Nope")
            .await
            .expect("read should run")
            .is_empty());
        assert!(control
            .storage_dimension_order("Nope")
            .await
            .expect("read should run")
            .is_empty());
        assert_eq!(tm1.opened(), tm1.closed());
    }

    #[tokio::test]
    async fn rule_errors_produce_a_warning() {
        let tm1 = sales().with_rule_errors(
            "Sales",
            vec![RuleError {
                line_number: Some(3),
                message: "Syntax error".to_string(),
            }],
        );
        let control = plane(&tm1);

        let envelope = control
            .check_cube_rules("Sales")
            .await
            .expect("check should run");

        assert_eq!(envelope.status, Status::Warning);
        assert_eq!(
            envelope.extra["errors"],
            json!([{"line_number": 3, "message": "Syntax error"}])
        );
        assert_eq!(tm1.mutation_calls(), 0);
    }

    #[tokio::test]
    async fn reorder_rejects_non_permutation() {
        let tm1 = sales().with_reorder_change(-12.5);
        let control = plane(&tm1);

        let rejected = control
            .update_storage_dimension_order("Sales", &["Month".to_string(), "Version".to_string()])
            .await
            .expect("precondition should produce an envelope");
        assert_eq!(rejected.status, Status::Error);
        assert_eq!(tm1.mutation_calls(), 0);

        let order = vec!["month".to_string(), "Version".to_string(), "Region".to_string()];
        let accepted = control
            .update_storage_dimension_order("Sales", &order)
            .await
            .expect("reorder should run");
        assert!(accepted.is_success());
        assert_eq!(accepted.extra["percent_change"], json!(-12.5));
        assert_eq!(tm1.storage_order("Sales"), Some(order));
    }

    #[tokio::test]
    async fn vmm_round_trips_through_cube_properties() {
        let tm1 = sales();
        let control = plane(&tm1);

        let envelope = control
            .set_cube_vmm("Sales", "65536")
            .await
            .expect("write should run");
        assert!(envelope.is_success());
        assert_eq!(
            tm1.cell("}CubeProperties", &["Sales", "VMM"]),
            Some(CellValue::Text("65536".to_string()))
        );
        assert_eq!(
            control.cube_vmm("Sales").await.expect("read should run"),
            CellValue::Text("65536".to_string())
        );

        let err = control.cube_vmt("Nope").await.expect_err("missing cube should fail");
        assert!(err.is_not_found());
    }
}
