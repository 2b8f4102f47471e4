use tm1_types::{CellRow, CellValue, ElementAddress};

use super::{ControlError, ControlResult, Tm1ControlPlane};

impl Tm1ControlPlane {
    /// Reads one cell. `elements` holds one address per cube dimension, in
    /// cube dimension order.
    ///
    /// # Errors
    /// Returns `ControlError::InvalidInput` when no element is given, and
    /// `ControlError::Session` if the cube is missing or the call fails.
    pub async fn cell_value(
        &self,
        cube_name: &str,
        elements: &[ElementAddress],
    ) -> ControlResult<CellValue> {
        if elements.is_empty() {
            return Err(ControlError::InvalidInput(
                "at least one element is required".to_string(),
            ));
        }
        self.scoped("get_value", |session| async move {
            session.cell_value(cube_name, elements).await
        })
        .await
    }

    /// Runs an MDX query and returns one row per cell.
    ///
    /// # Errors
    /// Returns `ControlError::InvalidInput` for an empty query, and
    /// `ControlError::Session` if the server rejects it.
    pub async fn execute_mdx(&self, mdx: &str) -> ControlResult<Vec<CellRow>> {
        if mdx.trim().is_empty() {
            return Err(ControlError::InvalidInput("mdx is required".to_string()));
        }
        self.scoped("execute_mdx", |session| async move { session.execute_mdx(mdx).await })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::tests::plane;
    use crate::mock::MockTm1;

    #[tokio::test]
    async fn reads_cell_by_address() {
        let tm1 = MockTm1::new()
            .with_cube("Sales", &["Version", "Month"])
            .with_cell("Sales", &["Actual", "Jan"], CellValue::Number(42.0));
        let control = plane(&tm1);

        let value = control
            .cell_value("Sales", &ElementAddress::parse_delimited("Actual,Jan"))
            .await
            .expect("read should run");

        assert_eq!(value, CellValue::Number(42.0));
        assert_eq!(tm1.closed(), 1);
    }

    #[tokio::test]
    async fn missing_cube_propagates_not_found() {
        let tm1 = MockTm1::new();
        let control = plane(&tm1);

        let err = control
            .cell_value("Nope", &ElementAddress::parse_delimited("Actual"))
            .await
            .expect_err("missing cube should fail");

        assert!(err.is_not_found());
        assert_eq!(tm1.closed(), 1);
    }

    #[tokio::test]
    async fn empty_inputs_are_rejected_before_opening() {
        let tm1 = MockTm1::new();
        let control = plane(&tm1);

        assert!(control.cell_value("Sales", &[]).await.is_err());
        assert!(control.execute_mdx("  ").await.is_err());
        assert_eq!(tm1.opened(), 0);
    }

    #[tokio::test]
    async fn mdx_rows_pass_through() {
        let query = "SELECT {[Month].[Jan]} ON 0 FROM [Sales]";
        let rows = vec![CellRow {
            coordinates: vec!["Jan".to_string()],
            value: CellValue::Number(7.0),
        }];
        let tm1 = MockTm1::new().with_mdx_rows(query, rows.clone());
        let control = plane(&tm1);

        assert_eq!(control.execute_mdx(query).await.expect("query should run"), rows);
    }
}
