//! Append-only record of simulated tamper events.

use serde::{Deserialize, Serialize};

use crate::tamper::Propagation;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TamperRecord {
    pub replica_id: String,
    pub block_index: u64,
    /// RFC3339 time the tamper was applied.
    pub time: String,
    pub note: String,
    pub propagation: Propagation,
}

/// Records can only be appended; there is no edit or removal path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct AuditLog {
    records: Vec<TamperRecord>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn append(&mut self, record: TamperRecord) {
        self.records.push(record);
    }

    /// Oldest first.
    pub fn records(&self) -> &[TamperRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
