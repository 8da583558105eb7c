// Polars views over record tables.
//
// Records stay JSON objects. A frame built here holds row positions and the
// normalised key cells, so joins, group-bys and de-duplication run in polars
// and the records are then copied by position.
use crate::error::Result;
use crate::types::Record;
use crate::util::key_of;
use polars::prelude::*;

pub const ROW: &str = "__row";
pub const PARTNER: &str = "__partner";

pub fn key_column(i: usize) -> String {
    format!("__key_{}", i)
}

pub fn key_exprs(n: usize) -> Vec<Expr> {
    (0..n).map(|i| col(key_column(i))).collect()
}

/// Row positions under `index`, plus one string column per `on` column
/// holding the normalised cell. A missing cell becomes an empty key, so rows
/// that both lack a column still pair up.
pub fn key_frame<S: AsRef<str>>(rows: &[Record], on: &[S], index: &str) -> Result<DataFrame> {
    let positions: Vec<u32> = (0..rows.len()).map(|i| i as u32).collect();
    let mut columns: Vec<Column> = vec![Series::new(index.into(), positions).into()];
    for (i, c) in on.iter().enumerate() {
        let keys: Vec<String> = rows
            .iter()
            .map(|r| r.get(c.as_ref()).map(key_of).unwrap_or_default())
            .collect();
        columns.push(Series::new(key_column(i).into(), keys).into());
    }
    Ok(DataFrame::new(columns)?)
}

/// The row positions stored in `column`.
pub fn positions(frame: &DataFrame, column: &str) -> Result<Vec<usize>> {
    let values = frame.column(column)?.as_materialized_series().u32()?;
    Ok(values.into_iter().flatten().map(|p| p as usize).collect())
}

fn pairs(frame: &DataFrame) -> Result<Vec<(usize, usize)>> {
    let mut out: Vec<(usize, usize)> = positions(frame, ROW)?
        .into_iter()
        .zip(positions(frame, PARTNER)?)
        .collect();
    out.sort_unstable();
    Ok(out)
}

/// `(left, right)` position pairs of an inner join on `on`, in left order.
/// With no join columns every row pairs with every row.
pub fn join_pairs<S: AsRef<str>>(
    left: &[Record],
    right: &[Record],
    on: &[S],
) -> Result<Vec<(usize, usize)>> {
    if on.is_empty() {
        return cross_pairs(left, right);
    }
    let keys = key_exprs(on.len());
    let joined = key_frame(left, on, ROW)?
        .lazy()
        .join(
            key_frame(right, on, PARTNER)?.lazy(),
            keys.clone(),
            keys,
            JoinArgs::new(JoinType::Inner),
        )
        .collect()?;
    pairs(&joined)
}

/// `(left, right)` position pairs of the cartesian product.
pub fn cross_pairs(left: &[Record], right: &[Record]) -> Result<Vec<(usize, usize)>> {
    let no_keys: &[&str] = &[];
    let crossed = key_frame(left, no_keys, ROW)?
        .lazy()
        .cross_join(key_frame(right, no_keys, PARTNER)?.lazy(), None)
        .collect()?;
    pairs(&crossed)
}

/// Position of the first row carrying each distinct key, in order of first
/// appearance.
pub fn first_of_each(keys: Vec<String>) -> Result<Vec<usize>> {
    let rows: Vec<u32> = (0..keys.len()).map(|i| i as u32).collect();
    let frame = DataFrame::new(vec![
        Series::new(ROW.into(), rows).into(),
        Series::new(key_column(0).into(), keys).into(),
    ])?;
    let firsts = frame
        .lazy()
        .group_by_stable(key_exprs(1))
        .agg([col(ROW).first()])
        .collect()?;
    positions(&firsts, ROW)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn records(value: serde_json::Value) -> Vec<Record> {
        value
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_object().cloned().unwrap())
            .collect()
    }

    #[test]
    fn key_frame_normalises_cells() {
        let rows = records(json!([{"region": 14}, {"region": "14.0"}, {}]));
        let frame = key_frame(&rows, &["region"], ROW).unwrap();
        assert_eq!(frame.height(), 3);
        let keys = frame
            .column(&key_column(0))
            .unwrap()
            .as_materialized_series()
            .str()
            .unwrap()
            .into_iter()
            .map(|k| k.unwrap_or_default().to_string())
            .collect::<Vec<_>>();
        assert_eq!(keys, vec!["14", "14", ""]);
    }

    #[test]
    fn join_pairs_follow_left_order() {
        let left = records(json!([{"k": 2}, {"k": 1}, {"k": 3}]));
        let right = records(json!([{"k": 1}, {"k": 2}, {"k": 2}]));
        assert_eq!(
            join_pairs(&left, &right, &["k"]).unwrap(),
            vec![(0, 1), (0, 2), (1, 0)]
        );
    }

    #[test]
    fn cross_pairs_cover_every_combination() {
        let left = records(json!([{}, {}]));
        let right = records(json!([{}, {}, {}]));
        assert_eq!(cross_pairs(&left, &right).unwrap().len(), 6);
        assert!(cross_pairs(&left, &[]).unwrap().is_empty());
    }

    #[test]
    fn first_of_each_keeps_first_appearance() {
        let keys = ["b", "a", "b", "c", "a"].iter().map(|s| s.to_string()).collect();
        assert_eq!(first_of_each(keys).unwrap(), vec![0, 1, 3]);
    }
}
