// In-memory row-set shared by every stage.
//
// A `Table` is a list of JSON-object records, the same shape the stages
// exchange as `orient=records` snapshots. Columns are whatever keys the
// records carry; operations that need a column check for it up front and
// fail with a key error instead of silently skipping rows. Joins, grouping
// and null filling are done in polars over the positions and keys of the
// records (see `frame`).
use crate::error::{ImputationError, Result};
use crate::frame::{cross_pairs, first_of_each, join_pairs};
use crate::types::Record;
use crate::util::{key_of, number_value};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Table {
    rows: Vec<Record>,
}

/// Result of an inner join: joined rows plus the indices of left rows that
/// found no partner.
#[derive(Debug, Clone, Default)]
pub struct JoinOutcome {
    pub joined: Table,
    pub unmatched: Vec<usize>,
}

impl Table {
    pub fn new(rows: Vec<Record>) -> Self {
        Self { rows }
    }

    /// Interpret an arbitrary JSON value as a row-set. Anything other than an
    /// array of objects is an input format error.
    pub fn from_value(value: Value, stage: &'static str) -> Result<Self> {
        let Value::Array(items) = value else {
            return Err(ImputationError::input_format(
                stage,
                "expected an array of records",
            ));
        };
        let mut rows = Vec::with_capacity(items.len());
        for (idx, item) in items.into_iter().enumerate() {
            match item {
                Value::Object(map) => rows.push(map),
                _ => {
                    return Err(ImputationError::input_format(
                        stage,
                        format!("record {} is not an object", idx),
                    ))
                }
            }
        }
        Ok(Self { rows })
    }

    pub fn from_json_str(s: &str, stage: &'static str) -> Result<Self> {
        let value: Value = serde_json::from_str(s)
            .map_err(|e| ImputationError::input_format(stage, e.to_string()))?;
        Self::from_value(value, stage)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.rows)?)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Record] {
        &self.rows
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.rows.iter()
    }

    /// Column names in order of first appearance across all rows.
    pub fn columns(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for row in &self.rows {
            for key in row.keys() {
                if seen.insert(key.as_str()) {
                    out.push(key.clone());
                }
            }
        }
        out
    }

    /// Fail with a key error naming the first column some row lacks.
    pub fn require_columns<S: AsRef<str>>(&self, columns: &[S], stage: &'static str) -> Result<()> {
        for column in columns {
            let column = column.as_ref();
            if self.rows.iter().any(|r| !r.contains_key(column)) {
                return Err(ImputationError::missing_column(stage, column));
            }
        }
        Ok(())
    }

    pub fn filter<F>(&self, mut keep: F) -> Table
    where
        F: FnMut(&Record) -> bool,
    {
        Table::new(self.rows.iter().filter(|r| keep(r)).cloned().collect())
    }

    /// Rows whose `column` equals `wanted` under key normalisation.
    pub fn filter_eq(&self, column: &str, wanted: &Value) -> Table {
        let wanted = key_of(wanted);
        self.filter(|r| r.get(column).map(key_of).as_deref() == Some(wanted.as_str()))
    }

    pub fn concat(mut self, other: Table) -> Table {
        self.rows.extend(other.rows);
        self
    }

    /// Keep only the listed columns, in every row.
    pub fn select<S: AsRef<str>>(&self, columns: &[S]) -> Table {
        let rows = self
            .rows
            .iter()
            .map(|r| {
                columns
                    .iter()
                    .filter_map(|c| r.get(c.as_ref()).map(|v| (c.as_ref().to_string(), v.clone())))
                    .collect()
            })
            .collect();
        Table::new(rows)
    }

    pub fn drop_columns<S: AsRef<str>>(mut self, columns: &[S]) -> Table {
        for row in &mut self.rows {
            for c in columns {
                row.remove(c.as_ref());
            }
        }
        self
    }

    pub fn rename_columns(mut self, renames: &[(String, String)]) -> Table {
        for row in &mut self.rows {
            for (from, to) in renames {
                if let Some(v) = row.remove(from) {
                    row.insert(to.clone(), v);
                }
            }
        }
        self
    }

    /// Set `column` to `value` on every row.
    pub fn with_column(mut self, column: &str, value: Value) -> Table {
        for row in &mut self.rows {
            row.insert(column.to_string(), value.clone());
        }
        self
    }

    /// Drop exact duplicate records, keeping the first occurrence.
    pub fn dedup(self) -> Result<Table> {
        let encoded = self
            .rows
            .iter()
            .map(|r| Value::Object(r.clone()).to_string())
            .collect();
        let keep = first_of_each(encoded)?;
        Ok(self.take(&keep))
    }

    /// Replace absent and `null` cells of the listed columns with `fill`.
    /// Cells that hold a value are left as they are.
    pub fn fill_missing<S: AsRef<str>>(mut self, columns: &[S], fill: f64) -> Result<Table> {
        let gap = |v: Option<&Value>| v.map_or(true, Value::is_null);
        let mut series: Vec<Column> = Vec::with_capacity(columns.len());
        for c in columns {
            let cells: Vec<Option<f64>> = self
                .rows
                .iter()
                .map(|r| match r.get(c.as_ref()) {
                    Some(Value::Number(n)) => n.as_f64(),
                    _ => None,
                })
                .collect();
            series.push(Series::new(c.as_ref().into(), cells).into());
        }
        if series.is_empty() {
            return Ok(self);
        }
        let filled = DataFrame::new(series)?
            .lazy()
            .with_columns(
                columns
                    .iter()
                    .map(|c| col(c.as_ref()).fill_null(lit(fill)))
                    .collect::<Vec<_>>(),
            )
            .collect()?;
        for c in columns {
            let c = c.as_ref();
            let values = filled.column(c)?.as_materialized_series().f64()?;
            for (row, value) in self.rows.iter_mut().zip(values.into_iter()) {
                if let (true, Some(value)) = (gap(row.get(c)), value) {
                    row.insert(c.to_string(), number_value(value));
                }
            }
        }
        Ok(self)
    }

    /// Inner join on the `on` columns. Joined rows keep every left column and
    /// gain the right columns the left row does not already have. A left row
    /// with several partners appears once per partner.
    pub fn inner_join<S: AsRef<str>>(&self, right: &Table, on: &[S]) -> Result<JoinOutcome> {
        let pairs = join_pairs(&self.rows, &right.rows, on)?;
        let mut matched = vec![false; self.rows.len()];
        let joined = pairs
            .iter()
            .map(|&(l, r)| {
                matched[l] = true;
                merge_records(&self.rows[l], &right.rows[r])
            })
            .collect();
        let unmatched = matched
            .iter()
            .enumerate()
            .filter(|(_, m)| !**m)
            .map(|(idx, _)| idx)
            .collect();
        Ok(JoinOutcome {
            joined: Table::new(joined),
            unmatched,
        })
    }

    /// Every left row paired with every right row, left columns winning.
    pub fn cartesian_product(&self, right: &Table) -> Result<Table> {
        let rows = cross_pairs(&self.rows, &right.rows)?
            .into_iter()
            .map(|(l, r)| merge_records(&self.rows[l], &right.rows[r]))
            .collect();
        Ok(Table::new(rows))
    }

    /// Rows at the given indices, in index order.
    pub fn take(&self, indices: &[usize]) -> Table {
        Table::new(
            indices
                .iter()
                .filter_map(|i| self.rows.get(*i).cloned())
                .collect(),
        )
    }
}

impl IntoIterator for Table {
    type Item = Record;
    type IntoIter = std::vec::IntoIter<Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

fn merge_records(left: &Record, right: &Record) -> Record {
    let mut out = left.clone();
    for (k, v) in right {
        if !out.contains_key(k) {
            out.insert(k.clone(), v.clone());
        }
    }
    out
}
