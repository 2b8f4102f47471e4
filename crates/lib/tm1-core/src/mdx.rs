//! MDX text builders and cellset flattening.

use std::collections::BTreeMap;

use tm1_types::{CellRow, CellValue, ElementAddress};

use crate::session::{SessionError, SessionResult};

/// Escapes a name for use inside `[...]`.
#[must_use]
pub fn escape(name: &str) -> String {
    name.replace(']', "]]")
}

/// Unique member name `[dimension].[hierarchy].[element]`.
#[must_use]
pub fn member(dimension: &str, hierarchy: &str, element: &str) -> String {
    format!(
        "[{}].[{}].[{}]",
        escape(dimension),
        escape(hierarchy),
        escape(element)
    )
}

/// Builds a query that selects exactly one cell.
///
/// The first coordinate goes on the column axis and the remaining ones into
/// the slicer. Addresses without an explicit hierarchy use the same-named
/// hierarchy of their dimension.
///
/// # Errors
/// Returns `SessionError::InvalidInput` when the number of addresses differs
/// from the number of cube dimensions.
pub fn cell_query(
    cube_name: &str,
    dimensions: &[String],
    elements: &[ElementAddress],
) -> SessionResult<String> {
    if dimensions.is_empty() || dimensions.len() != elements.len() {
        return Err(SessionError::InvalidInput(format!(
            "cube '{cube_name}' has {} dimensions but {} elements were given",
            dimensions.len(),
            elements.len()
        )));
    }

    let mut members = dimensions.iter().zip(elements).map(|(dimension, address)| {
        let hierarchy = address.hierarchy.as_deref().unwrap_or(dimension);
        member(dimension, hierarchy, &address.element)
    });

    let mut query = String::from("SELECT {");
    if let Some(column) = members.next() {
        query.push_str(&column);
    }
    query.push_str("} ON 0 FROM [");
    query.push_str(&escape(cube_name));
    query.push(']');

    let slicer: Vec<String> = members.collect();
    if !slicer.is_empty() {
        query.push_str(" WHERE (");
        query.push_str(&slicer.join(", "));
        query.push(')');
    }
    Ok(query)
}

/// Set expression that is non-empty when `element` sits below `ancestor`,
/// using `TM1DRILLDOWNMEMBER`.
#[must_use]
pub fn drill_down_ancestor_set(
    dimension: &str,
    hierarchy: &str,
    ancestor: &str,
    element: &str,
) -> String {
    format!(
        "{{INTERSECT({{TM1DRILLDOWNMEMBER({{{}}}, ALL, RECURSIVE)}}, {{{}}})}}",
        member(dimension, hierarchy, ancestor),
        member(dimension, hierarchy, element)
    )
}

/// Same check as [`drill_down_ancestor_set`] using `DESCENDANTS`.
#[must_use]
pub fn descendants_ancestor_set(
    dimension: &str,
    hierarchy: &str,
    ancestor: &str,
    element: &str,
) -> String {
    format!(
        "{{INTERSECT({{DESCENDANTS({})}}, {{{}}})}}",
        member(dimension, hierarchy, ancestor),
        member(dimension, hierarchy, element)
    )
}

/// Flattens cellset axes and ordinals into one row per cell.
///
/// `axes[i][j]` holds the member names of tuple `j` on axis `i`. Ordinals
/// follow the server layout, where axis 0 varies fastest.
#[must_use]
pub fn rows_from_cellset(
    axes: &[Vec<Vec<String>>],
    cells: impl IntoIterator<Item = (usize, CellValue)>,
) -> Vec<CellRow> {
    let ordered: BTreeMap<usize, CellValue> = cells.into_iter().collect();
    ordered
        .into_iter()
        .map(|(ordinal, value)| {
            let mut remaining = ordinal;
            let mut coordinates = Vec::new();
            for axis in axes.iter().filter(|axis| !axis.is_empty()) {
                let index = remaining % axis.len();
                remaining /= axis.len();
                coordinates.extend(axis[index].iter().cloned());
            }
            CellRow { coordinates, value }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(values: &[&str]) -> Vec<String> {
        values.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn member_escapes_closing_brackets() {
        assert_eq!(member("Dim", "Dim", "a]b"), "[Dim].[Dim].[a]]b]");
    }

    #[test]
    fn cell_query_puts_first_member_on_columns() {
        let dimensions = names(&["Version", "Region", "Month"]);
        let elements = ElementAddress::parse_delimited("Actual,Alt::North,Jan");
        let query = cell_query("Sales", &dimensions, &elements).expect("query should build");
        assert_eq!(
            query,
            "SELECT {[Version].[Version].[Actual]} ON 0 FROM [Sales] WHERE ([Region].[Alt].[North], [Month].[Month].[Jan])"
        );
    }

    #[test]
    fn cell_query_rejects_wrong_arity() {
        let dimensions = names(&["Version", "Region"]);
        let elements = ElementAddress::parse_delimited("Actual");
        let err = cell_query("Sales", &dimensions, &elements).expect_err("arity should fail");
        assert!(matches!(err, SessionError::InvalidInput(_)));
    }

    #[test]
    fn ancestor_sets_reference_both_members() {
        let set = drill_down_ancestor_set("Month", "Month", "Q1", "Jan");
        assert_eq!(
            set,
            "{INTERSECT({TM1DRILLDOWNMEMBER({[Month].[Month].[Q1]}, ALL, RECURSIVE)}, {[Month].[Month].[Jan]})}"
        );
        let set = descendants_ancestor_set("Month", "Month", "Q1", "Jan");
        assert_eq!(
            set,
            "{INTERSECT({DESCENDANTS([Month].[Month].[Q1])}, {[Month].[Month].[Jan]})}"
        );
    }

    #[test]
    fn cellset_rows_vary_first_axis_fastest() {
        let axes = vec![
            vec![names(&["Jan"]), names(&["Feb"])],
            vec![names(&["North"]), names(&["South"])],
        ];
        let cells = vec![
            (3, CellValue::Number(4.0)),
            (0, CellValue::Number(1.0)),
            (1, CellValue::Empty),
        ];
        let rows = rows_from_cellset(&axes, cells);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].coordinates, names(&["Jan", "North"]));
        assert_eq!(rows[1].coordinates, names(&["Feb", "North"]));
        assert_eq!(rows[2].coordinates, names(&["Feb", "South"]));
        assert_eq!(rows[2].value, CellValue::Number(4.0));
    }
}
