// ABOUTME: Watermark state - the resume point for the next extraction cycle
// ABOUTME: Also defines the persisted document shape and its access-control descriptor

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The highest constraint-column value already processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Watermark {
    /// Column the watermark is tracked on
    pub constraint_column: String,
    /// Last processed value; `None` until the first non-empty cycle
    pub value: Option<String>,
    /// Number of rows delivered by the cycle that set `value`
    pub row_count: u64,
    /// When `value` was recorded
    pub observed_at: DateTime<Utc>,
}

impl Watermark {
    /// Create an empty watermark (read everything on the next cycle)
    pub fn new(constraint_column: &str) -> Self {
        Self {
            constraint_column: constraint_column.to_string(),
            value: None,
            row_count: 0,
            observed_at: Utc::now(),
        }
    }

    /// Record the result of a successful cycle
    pub fn update(&mut self, value: &str, row_count: u64) {
        self.value = Some(value.to_string());
        self.row_count = row_count;
        self.observed_at = Utc::now();
    }

    /// Persisted form, or `None` if no value has been recorded yet.
    pub fn to_document(&self) -> Option<WatermarkDocument> {
        let value = self.value.as_ref()?;
        Some(WatermarkDocument {
            last_updated: self.observed_at,
            constraint_column: self.constraint_column.clone(),
            last_value: value.clone(),
            row_count: self.row_count.to_string(),
        })
    }
}

/// On-disk / on-server shape of a persisted watermark.
///
/// ```json
/// {
///   "lastUpdated": "2024-06-01T10:00:00Z",
///   "constraintColumn": "ID",
///   "lastValue": "15",
///   "rowCount": "3"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatermarkDocument {
    pub last_updated: DateTime<Utc>,
    pub constraint_column: String,
    pub last_value: String,
    /// Kept as a string so external tooling can read it without numeric coercion
    pub row_count: String,
}

impl WatermarkDocument {
    /// Convert back into a [`Watermark`], rejecting a non-numeric row count.
    pub fn into_watermark(self) -> Result<Watermark, String> {
        let row_count = self
            .row_count
            .trim()
            .parse::<u64>()
            .map_err(|e| format!("rowCount '{}' is not a number: {}", self.row_count, e))?;
        Ok(Watermark {
            constraint_column: self.constraint_column,
            value: Some(self.last_value),
            row_count,
            observed_at: self.last_updated,
        })
    }
}

/// Capabilities a role can be granted on the watermark document.
pub const CAPABILITIES: [&str; 4] = ["read", "update", "insert", "execute"];

/// A single role/capability grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permission {
    pub role: String,
    pub capability: String,
}

impl Permission {
    /// Parse a `role,capability,role,capability` descriptor.
    ///
    /// An empty descriptor yields no grants.
    pub fn parse_list(descriptor: &str) -> Result<Vec<Permission>, String> {
        let tokens: Vec<&str> = descriptor
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect();

        if tokens.len() % 2 != 0 {
            return Err(format!(
                "expected role,capability pairs but got {} tokens in '{}'",
                tokens.len(),
                descriptor
            ));
        }

        tokens
            .chunks(2)
            .map(|pair| {
                let (role, capability) = (pair[0], pair[1]);
                if !CAPABILITIES.contains(&capability) {
                    return Err(format!(
                        "unknown capability '{}' for role '{}' (expected one of {})",
                        capability,
                        role,
                        CAPABILITIES.join(", ")
                    ));
                }
                Ok(Permission {
                    role: role.to_string(),
                    capability: capability.to_string(),
                })
            })
            .collect()
    }
}
