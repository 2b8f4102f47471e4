pub const CONTROL_PREFIX: char = '}';

pub const CUBE_PROPERTIES: &str = "}CubeProperties";
pub const PROPERTY_VMM: &str = "VMM";
pub const PROPERTY_VMT: &str = "VMT";

pub const TABLE_TI_DOC: &str = "ti_doc";

/// Depth used when a consolidation is expanded without an explicit limit.
pub const DEFAULT_CONSOLIDATION_DEPTH: u32 = 99;

/// Separates an explicit hierarchy from an element in a cell address.
pub const HIERARCHY_ELEMENT_SEPARATOR: &str = "::";

pub const METHOD_TI: &str = "TI";
pub const METHOD_DRILL_DOWN: &str = "TM1DrillDownMember";
pub const METHOD_DESCENDANTS: &str = "Descendants";

#[must_use]
pub fn is_control_name(name: &str) -> bool {
    name.starts_with(CONTROL_PREFIX)
}

/// Normalizes a name the way the server compares object names.
#[must_use]
pub fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|ch| !ch.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Compares two object names ignoring case and spaces.
#[must_use]
pub fn names_match(left: &str, right: &str) -> bool {
    normalize_name(left) == normalize_name(right)
}
