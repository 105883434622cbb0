use serde::Serialize;
use serde_json::{Map, Value};

use super::error::{DriveError, Result};

/// One row or document, keyed by column/field name.
pub type Record = Map<String, Value>;

/// JSON value handed back to the caller.
///
/// Row-shaped reads (warehouse, relational, document collections) produce an
/// array of records; a single-document read produces a bare record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum NormalizedResult {
    Records(Vec<Record>),
    Document(Record),
}

impl NormalizedResult {
    pub fn len(&self) -> usize {
        match self {
            Self::Records(records) => records.len(),
            Self::Document(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Normalize to the array shape, wrapping a single document.
    pub fn into_array(self) -> Self {
        match self {
            Self::Document(record) => Self::Records(vec![record]),
            records => records,
        }
    }

    pub fn to_json_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| DriveError::read_failure(format!("failed to encode result: {e}")))
    }
}
