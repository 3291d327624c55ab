// ABOUTME: Wire shapes for the REST query engine and document endpoints
// ABOUTME: Row responses are decoded into opaque rows; empty bodies mean no rows

use serde::Deserialize;

use crate::engine::Row;

/// Body of a rows response: `{"columns": [...], "rows": [{...}, ...]}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RowsResponse {
    #[serde(default)]
    pub columns: Vec<ColumnHeader>,
    #[serde(default)]
    pub rows: Vec<Row>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ColumnHeader {
    pub name: String,
}

impl RowsResponse {
    /// Decode a response body. A blank body is an empty result.
    pub fn parse(body: &str) -> Result<Self, serde_json::Error> {
        if body.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(body)
    }
}
