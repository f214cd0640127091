//! Range encoding for [`crate::protocol::Command::RangeQuery`].

use serde::{Deserialize, Serialize};

/// `{ startKey, endKey (inclusive), limit (0=unlimited), comparatorName }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub start_key: Vec<u8>,
    pub end_key: Vec<u8>,
    pub limit: usize,
    pub comparator_name: String,
}

impl Range {
    pub fn new(
        start_key: impl Into<Vec<u8>>,
        end_key: impl Into<Vec<u8>>,
        limit: usize,
        comparator_name: impl Into<String>,
    ) -> Self {
        Self {
            start_key: start_key.into(),
            end_key: end_key.into(),
            limit,
            comparator_name: comparator_name.into(),
        }
    }

    pub fn is_unlimited(&self) -> bool {
        self.limit == 0
    }
}
