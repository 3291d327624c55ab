// ABOUTME: Reads the new watermark out of a max-value query result
// ABOUTME: Absent or malformed results are errors, never a silent reuse of the old value

use super::CONSTRAINT_ALIAS;
use crate::engine::Row;
use crate::error::MaxValueError;
use crate::sanitize::sanitize;

/// Extract the sanitized constraint value from a max-value result.
///
/// The result must be exactly one row with a scalar under
/// [`CONSTRAINT_ALIAS`].
pub fn extract_max_value(rows: &[Row]) -> Result<String, MaxValueError> {
    let row = match rows {
        [] => return Err(MaxValueError::NoRows),
        [row] => row,
        _ => return Err(MaxValueError::TooManyRows(rows.len())),
    };

    if row.get(CONSTRAINT_ALIAS).is_none() {
        return Err(MaxValueError::MissingField(CONSTRAINT_ALIAS.to_string()));
    }

    row.field_text(CONSTRAINT_ALIAS)
        .map(|value| sanitize(&value))
        .ok_or_else(|| MaxValueError::NotScalar(CONSTRAINT_ALIAS.to_string()))
}
