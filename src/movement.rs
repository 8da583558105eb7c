use crate::columns::ColumnNaming;
use crate::constants::MOVEMENT_STAGE;
use crate::error::Result;
use crate::table::Table;
use crate::types::Record;
use crate::util::{key_of, number_value, optional_numeric};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, info};

#[derive(Debug, Clone, Default)]
pub struct PeriodSplit {
    pub current: Table,
    pub previous: Table,
}

/// Separate a combined snapshot into its current and previous period rows.
pub fn split_periods(
    table: &Table,
    period_column: &str,
    current_period: &Value,
    previous_period: &Value,
) -> Result<PeriodSplit> {
    table.require_columns(&[period_column], MOVEMENT_STAGE)?;
    Ok(PeriodSplit {
        current: table.filter_eq(period_column, current_period),
        previous: table.filter_eq(period_column, previous_period),
    })
}

/// Relative change between periods. A zero previous value gives 0.0 rather
/// than a division failure.
pub fn movement(current: f64, previous: f64) -> f64 {
    if previous != 0.0 {
        (current - previous) / previous
    } else {
        0.0
    }
}

/// Add a `movement_<q>` column to one current-period row. Without a
/// previous-period partner, or with a `null` on either side, the movement is
/// 0.0.
pub fn movement_row(current: &Record, previous: Option<&Record>, naming: &ColumnNaming) -> Result<Record> {
    let mut out = current.clone();
    for cols in naming {
        let now = optional_numeric(current, &cols.question, MOVEMENT_STAGE)?;
        let before = match previous {
            Some(prev) => optional_numeric(prev, &cols.question, MOVEMENT_STAGE)?,
            None => None,
        };
        let value = match (now, before) {
            (Some(now), Some(before)) => movement(now, before),
            _ => 0.0,
        };
        out.insert(cols.movement.clone(), number_value(value));
    }
    Ok(out)
}

/// Movements for every current-period row, paired with the previous period
/// by reference id. The previous-period rows are appended and every gap in
/// the question and movement columns of the combined table is filled with
/// 0.0.
pub fn compute_movements(
    current: &Table,
    previous: &Table,
    reference: &str,
    naming: &ColumnNaming,
) -> Result<Table> {
    let mut required = vec![reference.to_string()];
    required.extend(naming.questions());
    current.require_columns(&required, MOVEMENT_STAGE)?;
    previous.require_columns(&required, MOVEMENT_STAGE)?;

    let mut by_reference: HashMap<String, &Record> = HashMap::new();
    for row in previous.iter() {
        if let Some(id) = row.get(reference) {
            by_reference.entry(key_of(id)).or_insert(row);
        }
    }

    let mut rows = Vec::with_capacity(current.len());
    let mut paired = 0usize;
    for row in current.iter() {
        let partner = row
            .get(reference)
            .and_then(|id| by_reference.get(&key_of(id)).copied());
        if partner.is_some() {
            paired += 1;
        }
        rows.push(movement_row(row, partner, naming)?);
    }
    debug!(
        current = current.len(),
        previous = previous.len(),
        paired,
        "paired current rows with previous period"
    );
    for cols in naming {
        info!("Calculated movement for {}", cols.question);
    }

    let mut filled = naming.questions();
    filled.extend(naming.iter().map(|c| c.movement.clone()));
    Table::new(rows)
        .concat(previous.clone())
        .fill_missing(&filled, 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ImputationError;
    use serde_json::json;

    fn table(value: Value) -> Table {
        Table::from_value(value, "test").unwrap()
    }

    fn naming() -> ColumnNaming {
        ColumnNaming::new(&["Q1", "Q2"]).unwrap()
    }

    #[test]
    fn movement_matches_worked_examples() {
        assert!((movement(120.0, 100.0) - 0.2).abs() < 1e-12);
        assert!((movement(80.0, 100.0) + 0.2).abs() < 1e-12);
    }

    #[test]
    fn zero_previous_gives_zero_movement() {
        for current in [0.0, 5.0, -3.0, 1e9] {
            assert_eq!(movement(current, 0.0), 0.0);
        }
    }

    #[test]
    fn pairs_rows_by_reference_not_position() {
        let current = table(json!([
            {"ref": "B", "period": 201809, "Q1": 80, "Q2": 10},
            {"ref": "A", "period": 201809, "Q1": 120, "Q2": 0}
        ]));
        let previous = table(json!([
            {"ref": "A", "period": 201806, "Q1": 100, "Q2": 0},
            {"ref": "B", "period": 201806, "Q1": 100, "Q2": 20}
        ]));
        let out = compute_movements(&current, &previous, "ref", &naming()).unwrap();
        assert_eq!(out.len(), 4);
        let b = &out.rows()[0];
        let a = &out.rows()[1];
        assert!((b["movement_Q1"].as_f64().unwrap() + 0.2).abs() < 1e-12);
        assert!((b["movement_Q2"].as_f64().unwrap() + 0.5).abs() < 1e-12);
        assert!((a["movement_Q1"].as_f64().unwrap() - 0.2).abs() < 1e-12);
        assert_eq!(a["movement_Q2"], json!(0.0));
        // previous rows are kept, with movement cells filled
        assert_eq!(out.rows()[2]["period"], json!(201806));
        assert_eq!(out.rows()[2]["movement_Q1"], json!(0.0));
    }

    #[test]
    fn unmatched_current_rows_get_zero_movement() {
        let current = table(json!([{"ref": "Z", "Q1": 50, "Q2": 7}]));
        let previous = table(json!([{"ref": "A", "Q1": 100, "Q2": 1}]));
        let out = compute_movements(&current, &previous, "ref", &naming()).unwrap();
        assert_eq!(out.rows()[0]["movement_Q1"], json!(0.0));
        assert_eq!(out.rows()[0]["Q1"], json!(50));
    }

    #[test]
    fn blank_answers_are_filled_with_zero() {
        let current = table(json!([{"ref": "A", "Q1": null, "Q2": 4}]));
        let previous = table(json!([{"ref": "A", "Q1": 10, "Q2": null}]));
        let out = compute_movements(&current, &previous, "ref", &naming()).unwrap();
        assert_eq!(out.rows()[0]["Q1"], json!(0.0));
        assert_eq!(out.rows()[0]["movement_Q1"], json!(0.0));
        assert_eq!(out.rows()[0]["movement_Q2"], json!(0.0));
        assert_eq!(out.rows()[1]["Q2"], json!(0.0));
        assert_eq!(out.rows()[1]["movement_Q2"], json!(0.0));
    }

    #[test]
    fn split_periods_filters_on_normalised_period() {
        let t = table(json!([
            {"period": 201809}, {"period": "201806"}, {"period": 201803}
        ]));
        let split = split_periods(&t, "period", &json!("201809"), &json!(201806)).unwrap();
        assert_eq!(split.current.len(), 1);
        assert_eq!(split.previous.len(), 1);
    }

    #[test]
    fn missing_question_column_is_a_key_error() {
        let current = table(json!([{"ref": "A", "Q1": 1}]));
        let previous = table(json!([{"ref": "A", "Q1": 1, "Q2": 1}]));
        match compute_movements(&current, &previous, "ref", &naming()) {
            Err(ImputationError::SchemaMismatch { column, stage }) => {
                assert_eq!(column, "Q2");
                assert_eq!(stage, MOVEMENT_STAGE);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn text_values_are_type_errors() {
        let current = table(json!([{"ref": "A", "Q1": "lots", "Q2": 1}]));
        let previous = table(json!([{"ref": "A", "Q1": 1, "Q2": 1}]));
        assert!(matches!(
            compute_movements(&current, &previous, "ref", &naming()),
            Err(ImputationError::TypeMismatch { .. })
        ));
    }
}
