//! Row structs mapping database tables to core domain types.

pub mod caption;
pub mod dataset;
pub mod job;

/// Decode a JSONB array of strings, tolerating nulls and odd shapes.
pub(crate) fn flags_from_json(value: Option<serde_json::Value>) -> Option<Vec<String>> {
    let array = value?;
    let items = array.as_array()?;
    Some(
        items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
    )
}

/// Encode a string slice as a JSONB array.
pub(crate) fn flags_to_json(flags: Option<&[String]>) -> Option<serde_json::Value> {
    flags.map(|f| serde_json::json!(f))
}
