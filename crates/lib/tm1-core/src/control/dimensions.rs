use tm1_types::{Dimension, EntityScope};

use super::{ControlError, ControlResult, Tm1ControlPlane, optional, or_absent};

impl Tm1ControlPlane {
    /// # Errors
    /// Returns `ControlError` if the session cannot be opened or the call fails.
    pub async fn dimension_names(&self, scope: EntityScope) -> ControlResult<Vec<String>> {
        self.scoped("dimension_names", |session| async move {
            session.dimension_names(scope).await
        })
        .await
    }

    /// # Errors
    /// Returns `ControlError` if the session cannot be opened or the call fails.
    pub async fn dimension_count(&self, skip_control_dims: bool) -> ControlResult<usize> {
        let names = self
            .dimension_names(EntityScope::skip_control(skip_control_dims))
            .await?;
        Ok(names.len())
    }

    /// # Errors
    /// Returns `ControlError` if the session cannot be opened or the call fails.
    pub async fn dimension_exists(&self, dimension_name: &str) -> ControlResult<bool> {
        self.scoped("dimension_exists", |session| async move {
            or_absent(session.dimension_exists(dimension_name).await, || false)
        })
        .await
    }

    /// Dimension with hierarchies, elements and edges, `None` when missing.
    ///
    /// # Errors
    /// Returns `ControlError` if the session cannot be opened or the call fails.
    pub async fn dimension(&self, dimension_name: &str) -> ControlResult<Option<Dimension>> {
        self.scoped("get_dimension", |session| async move {
            optional(session.dimension(dimension_name).await)
        })
        .await
    }

    /// Evaluates an MDX set expression over a dimension and returns the
    /// element names. A missing dimension yields an empty list.
    ///
    /// # Errors
    /// Returns `ControlError::InvalidInput` for an empty expression, and
    /// `ControlError::Session` if the server rejects it.
    pub async fn execute_dimension_mdx(
        &self,
        dimension_name: &str,
        mdx: &str,
    ) -> ControlResult<Vec<String>> {
        if mdx.trim().is_empty() {
            return Err(ControlError::InvalidInput("mdx is required".to_string()));
        }
        self.scoped("execute_dimension_mdx", |session| async move {
            if !session.dimension_exists(dimension_name).await? {
                return Ok(Vec::new());
            }
            or_absent(session.execute_set_mdx(mdx).await, Vec::new)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::tests::plane;
    use crate::mock::MockTm1;
    use tm1_types::ElementType;

    fn model() -> MockTm1 {
        MockTm1::new()
            .with_hierarchy(
                "Month",
                &[
                    ("Q1", ElementType::Consolidated),
                    ("Jan", ElementType::Numeric),
                    ("Feb", ElementType::Numeric),
                ],
                &[("Q1", "Jan"), ("Q1", "Feb")],
            )
            .with_hierarchy("}Clients", &[("Admin", ElementType::String)], &[])
    }

    #[tokio::test]
    async fn dimension_count_can_skip_control_dimensions() {
        let tm1 = model();
        let control = plane(&tm1);

        assert_eq!(control.dimension_count(false).await.expect("count should run"), 2);
        assert_eq!(control.dimension_count(true).await.expect("count should run"), 1);
        assert_eq!(
            control
                .dimension_names(EntityScope::Model)
                .await
                .expect("listing should run"),
            vec!["Month"]
        );
    }

    #[tokio::test]
    async fn missing_dimension_reads_are_empty() {
        let tm1 = model();
        let control = plane(&tm1);

        assert!(!control.dimension_exists("Nope").await.expect("check should run"));
        assert_eq!(control.dimension("Nope").await.expect("read should run"), None);
        assert!(control
            .execute_dimension_mdx("Nope", "{[Nope].MEMBERS}")
            .await
            .expect("read should run")
            .is_empty());
        assert_eq!(tm1.opened(), tm1.closed());
    }

    #[tokio::test]
    async fn dimension_mdx_returns_member_names() {
        let mdx = "{TM1SUBSETALL([Month])}";
        let tm1 = model().with_set_result(mdx, &["Q1", "Jan", "Feb"]);
        let control = plane(&tm1);

        let names = control
            .execute_dimension_mdx("Month", mdx)
            .await
            .expect("set should evaluate");

        assert_eq!(names, vec!["Q1", "Jan", "Feb"]);
    }
}
