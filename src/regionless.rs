// Regionless fallback for non-responders without an exact factor.
//
// Non-responders are joined to the factors on every distinct-value column.
// Those that find nothing are retried against the factors computed with the
// region dimension ignored (rows whose region is the regionless code),
// joined on the remaining dimensions. When region was the only dimension
// there is nothing left to join on and every unmatched row is paired with
// every regionless factor row.
use crate::columns::{ColumnNaming, FACTOR_PREFIX};
use crate::constants::REGIONLESS_STAGE;
use crate::error::{ImputationError, Result};
use crate::table::Table;
use crate::types::MatchCounts;
use serde_json::Value;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct RegionlessParams {
    pub distinct_values: Vec<String>,
    pub region_column: String,
    pub regionless_code: i64,
}

#[derive(Debug, Clone, Default)]
pub struct FallbackOutcome {
    pub rows: Table,
    pub counts: MatchCounts,
}

pub fn fill_missing_factors(
    non_responders: &Table,
    factors: &Table,
    params: &RegionlessParams,
    naming: &ColumnNaming,
) -> Result<FallbackOutcome> {
    let distinct_values = &params.distinct_values;
    if !distinct_values.contains(&params.region_column) {
        return Err(ImputationError::validation(
            REGIONLESS_STAGE,
            format!(
                "region column '{}' is not one of the distinct values",
                params.region_column
            ),
        ));
    }
    let projection = naming.produce_columns(FACTOR_PREFIX, distinct_values);
    factors.require_columns(&projection, REGIONLESS_STAGE)?;
    non_responders.require_columns(distinct_values, REGIONLESS_STAGE)?;
    let factors = factors.select(&projection);

    let exact = non_responders.inner_join(&factors, distinct_values)?;
    let mut counts = MatchCounts {
        exact: non_responders.len() - exact.unmatched.len(),
        ..MatchCounts::default()
    };
    info!(matched = counts.exact, "Merged non-responders with factors");

    if exact.unmatched.is_empty() {
        return Ok(FallbackOutcome {
            rows: exact.joined,
            counts,
        });
    }

    let merge_values: Vec<String> = distinct_values
        .iter()
        .filter(|c| **c != params.region_column)
        .cloned()
        .collect();
    // A null in a join column can never match; gaps elsewhere do not matter.
    let dropped = non_responders.take(&exact.unmatched).filter(|r| {
        merge_values
            .iter()
            .all(|c| r.get(c).is_some_and(|v| !v.is_null()))
    });
    let regionless = factors.filter_eq(&params.region_column, &Value::from(params.regionless_code));
    debug!(
        dropped = dropped.len(),
        regionless = regionless.len(),
        ?merge_values,
        "retrying unmatched rows against regionless factors"
    );

    let (fallback, fallback_matched) = if merge_values.is_empty() {
        let matched = if regionless.is_empty() { 0 } else { dropped.len() };
        (dropped.cartesian_product(&regionless)?, matched)
    } else {
        let outcome = dropped.inner_join(&regionless, &merge_values)?;
        (outcome.joined, dropped.len() - outcome.unmatched.len())
    };

    counts.fallback = fallback_matched;
    counts.unmatched = exact.unmatched.len() - fallback_matched;
    counts.duplicated = fallback.len() - fallback_matched;
    if counts.duplicated > 0 {
        warn!(
            duplicated = counts.duplicated,
            "several regionless factor rows matched the same non-responder; the row is emitted once per factor row"
        );
    }
    if counts.unmatched > 0 {
        warn!(
            unmatched = counts.unmatched,
            "non-responders with no exact or regionless factor are left out"
        );
    }
    info!(fallback = counts.fallback, "Merged missing rows with regionless factors");

    Ok(FallbackOutcome {
        rows: exact.joined.concat(fallback),
        counts,
    })
}
