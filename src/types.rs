use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One survey row: column name to cell value.
pub type Record = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sign {
    #[serde(rename = "+")]
    Plus,
    #[serde(rename = "-")]
    Minus,
}

/// A derived total column, e.g. `Q608_total = Q601 + Q602 - Q603`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SumColumnSpec {
    pub column_name: String,
    #[serde(rename = "data")]
    pub terms: BTreeMap<String, Sign>,
}

/// Counts describing what happened to the non-responders during matching.
/// Rows that match neither exactly nor through the regionless fallback are
/// left out of the output; `unmatched` makes that loss visible. A fallback
/// row paired with several regionless factor rows is emitted once per pair;
/// `duplicated` holds the extra rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchCounts {
    pub exact: usize,
    pub fallback: usize,
    pub unmatched: usize,
    #[serde(default)]
    pub duplicated: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyReport {
    pub non_responders: usize,
    pub without_previous: usize,
    pub matches: MatchCounts,
    pub output_rows: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: String,
    pub input_rows: usize,
    pub output_rows: usize,
    pub output_key: String,
}
