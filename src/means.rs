use crate::columns::ColumnNaming;
use crate::constants::MEANS_STAGE;
use crate::error::{ImputationError, Result};
use crate::frame::{key_exprs, key_frame, positions, ROW};
use crate::table::Table;
use crate::types::Record;
use crate::util::{number_value, numeric};
use polars::prelude::*;
use serde_json::Value;
use tracing::info;

/// Aggregate responder movements into one row per cell.
///
/// Cells are the distinct combinations of `distinct_values`. Each output row
/// carries the cell's dimension values, the `carry` columns taken from the
/// cell's first row (land/marine flag, period), and per question the mean
/// movement (`mean_<q>`) and the number of contributing rows
/// (`movement_<q>_count`). Cells appear in order of first appearance.
pub fn compute_means(
    rows: &Table,
    distinct_values: &[String],
    carry: &[String],
    naming: &ColumnNaming,
) -> Result<Table> {
    if distinct_values.is_empty() {
        return Err(ImputationError::validation(
            MEANS_STAGE,
            "no distinct value columns supplied",
        ));
    }
    rows.require_columns(distinct_values, MEANS_STAGE)?;
    rows.require_columns(carry, MEANS_STAGE)?;

    let mut frame = key_frame(rows.rows(), distinct_values, ROW)?;
    let mut aggs = vec![col(ROW).first()];
    for cols in naming {
        let movements = rows
            .iter()
            .map(|r| numeric(r, &cols.movement, MEANS_STAGE))
            .collect::<Result<Vec<f64>>>()?;
        frame.with_column(Series::new(cols.movement.as_str().into(), movements))?;
        aggs.push(col(cols.movement.as_str()).mean().alias(cols.mean.as_str()));
        aggs.push(
            col(cols.movement.as_str())
                .count()
                .cast(DataType::Int64)
                .alias(cols.movement_count.as_str()),
        );
    }
    let cells = frame
        .lazy()
        .group_by_stable(key_exprs(distinct_values.len()))
        .agg(aggs)
        .collect()?;

    let mut out: Vec<Record> = positions(&cells, ROW)?
        .into_iter()
        .map(|first| {
            let first = &rows.rows()[first];
            distinct_values
                .iter()
                .chain(carry.iter())
                .filter_map(|c| first.get(c).map(|v| (c.clone(), v.clone())))
                .collect()
        })
        .collect();
    for cols in naming {
        let means = cells.column(&cols.mean)?.as_materialized_series().f64()?;
        let counts = cells.column(&cols.movement_count)?.as_materialized_series().i64()?;
        for ((record, mean), count) in out.iter_mut().zip(means.into_iter()).zip(counts.into_iter()) {
            record.insert(cols.mean.clone(), number_value(mean.unwrap_or(0.0)));
            record.insert(cols.movement_count.clone(), Value::from(count.unwrap_or(0)));
        }
    }
    info!(cells = out.len(), "Calculated means for {} questions", naming.len());
    Ok(Table::new(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn means_and_counts_per_cell() {
        let rows = Table::from_value(
            json!([
                {"region": 1, "strata": "A", "land_or_marine": "L", "movement_Q1": 0.2},
                {"region": 1, "strata": "A", "land_or_marine": "L", "movement_Q1": 0.4},
                {"region": 2, "strata": "A", "land_or_marine": "M", "movement_Q1": -0.1}
            ]),
            "test",
        )
        .unwrap();
        let naming = ColumnNaming::new(&["Q1"]).unwrap();
        let distinct = vec!["region".to_string(), "strata".to_string()];
        let carry = vec!["land_or_marine".to_string()];
        let out = compute_means(&rows, &distinct, &carry, &naming).unwrap();
        assert_eq!(out.len(), 2);
        let first = &out.rows()[0];
        assert!((first["mean_Q1"].as_f64().unwrap() - 0.3).abs() < 1e-12);
        assert_eq!(first["movement_Q1_count"], json!(2));
        assert_eq!(first["land_or_marine"], json!("L"));
        assert_eq!(out.rows()[1]["movement_Q1_count"], json!(1));
        assert_eq!(out.rows()[1]["region"], json!(2));
    }

    #[test]
    fn cells_group_on_normalised_keys_in_first_appearance_order() {
        let rows = Table::from_value(
            json!([
                {"region": 3, "movement_Q1": 0.5, "movement_Q2": 1.0},
                {"region": 1, "movement_Q1": 0.1, "movement_Q2": 0.0},
                {"region": "3", "movement_Q1": -0.5, "movement_Q2": 0.0},
                {"region": 3.0, "movement_Q1": 0.3, "movement_Q2": 2.0}
            ]),
            "test",
        )
        .unwrap();
        let naming = ColumnNaming::new(&["Q1", "Q2"]).unwrap();
        let distinct = vec!["region".to_string()];
        let out = compute_means(&rows, &distinct, &[], &naming).unwrap();
        assert_eq!(out.len(), 2);
        let first = &out.rows()[0];
        assert_eq!(first["region"], json!(3));
        assert_eq!(first["movement_Q1_count"], json!(3));
        assert!((first["mean_Q1"].as_f64().unwrap() - 0.1).abs() < 1e-12);
        assert!((first["mean_Q2"].as_f64().unwrap() - 1.0).abs() < 1e-12);
        assert_eq!(out.rows()[1]["region"], json!(1));
    }

    #[test]
    fn null_movement_is_a_type_error() {
        let rows = Table::from_value(json!([{"region": 1, "movement_Q1": null}]), "test").unwrap();
        let naming = ColumnNaming::new(&["Q1"]).unwrap();
        let distinct = vec!["region".to_string()];
        assert!(matches!(
            compute_means(&rows, &distinct, &[], &naming),
            Err(ImputationError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn missing_dimension_is_a_key_error() {
        let rows = Table::from_value(json!([{"movement_Q1": 0.2}]), "test").unwrap();
        let naming = ColumnNaming::new(&["Q1"]).unwrap();
        let distinct = vec!["region".to_string()];
        assert!(matches!(
            compute_means(&rows, &distinct, &[], &naming),
            Err(ImputationError::SchemaMismatch { .. })
        ));
    }
}
