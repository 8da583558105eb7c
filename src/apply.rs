use crate::columns::ColumnNaming;
use crate::constants::APPLY_STAGE;
use crate::error::Result;
use crate::table::Table;
use crate::types::{Record, Sign, SumColumnSpec};
use crate::util::{number_value, numeric, round_half_even};
use serde_json::Value;
use tracing::info;

/// Signed sum of the term columns, truncated toward zero.
pub fn sum_terms(row: &Record, spec: &SumColumnSpec) -> Result<i64> {
    let mut total = 0.0_f64;
    for (column, sign) in &spec.terms {
        let v = numeric(row, column, APPLY_STAGE)?;
        match sign {
            Sign::Plus => total += v,
            Sign::Minus => total -= v,
        }
    }
    Ok(total.trunc() as i64)
}

/// Impute one non-responder row: `<q> = round_half_even(prev_<q> *
/// imputation_factor_<q>)`, then the sum columns, then drop the working
/// `prev_`/`imputation_factor_` columns.
pub fn apply_row(row: &Record, naming: &ColumnNaming, sum_columns: &[SumColumnSpec]) -> Result<Record> {
    let mut out = row.clone();
    for cols in naming {
        let previous = numeric(row, &cols.previous, APPLY_STAGE)?;
        let factor = numeric(row, &cols.factor, APPLY_STAGE)?;
        out.insert(
            cols.question.clone(),
            number_value(round_half_even(previous * factor)),
        );
    }
    for spec in sum_columns {
        let total = sum_terms(&out, spec)?;
        out.insert(spec.column_name.clone(), Value::from(total));
    }
    for cols in naming {
        out.remove(&cols.previous);
        out.remove(&cols.factor);
    }
    Ok(out)
}

pub fn apply_factors(rows: &Table, naming: &ColumnNaming, sum_columns: &[SumColumnSpec]) -> Result<Table> {
    let out = rows
        .iter()
        .map(|row| apply_row(row, naming, sum_columns))
        .collect::<Result<Vec<_>>>()?;
    for cols in naming {
        info!("Completed imputation of {}", cols.question);
    }
    Ok(Table::new(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ImputationError;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn row(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn spec(name: &str, terms: &[(&str, Sign)]) -> SumColumnSpec {
        SumColumnSpec {
            column_name: name.to_string(),
            terms: terms.iter().map(|(c, s)| (c.to_string(), *s)).collect::<BTreeMap<_, _>>(),
        }
    }

    #[test]
    fn imputes_with_bankers_rounding() {
        let naming = ColumnNaming::new(&["Q1"]).unwrap();
        let out = apply_row(
            &row(json!({"prev_Q1": 1, "imputation_factor_Q1": 2.5, "Q1": 0})),
            &naming,
            &[],
        )
        .unwrap();
        assert_eq!(out["Q1"], json!(2.0));

        let out = apply_row(
            &row(json!({"prev_Q1": 3, "imputation_factor_Q1": 2.5})),
            &naming,
            &[],
        )
        .unwrap();
        assert_eq!(out["Q1"], json!(8.0));

        let out = apply_row(
            &row(json!({"prev_Q1": 2.0, "imputation_factor_Q1": 2.5})),
            &naming,
            &[],
        )
        .unwrap();
        assert_eq!(out["Q1"], json!(5.0));
        assert!(!out.contains_key("prev_Q1"));
        assert!(!out.contains_key("imputation_factor_Q1"));
    }

    #[test]
    fn sum_columns_are_signed_and_truncated() {
        let s = spec("total", &[("A", Sign::Plus), ("B", Sign::Plus), ("C", Sign::Minus)]);
        assert_eq!(sum_terms(&row(json!({"A": 10, "B": 5, "C": 3})), &s).unwrap(), 12);
        assert_eq!(
            sum_terms(&row(json!({"A": 10.7, "B": 5.6, "C": 3.1})), &s).unwrap(),
            13
        );
        assert_eq!(sum_terms(&row(json!({"A": 0, "B": 0, "C": 2.5})), &s).unwrap(), -2);
    }

    #[test]
    fn sums_use_imputed_values() {
        let naming = ColumnNaming::new(&["Q1", "Q2"]).unwrap();
        let s = spec("Q_total", &[("Q1", Sign::Plus), ("Q2", Sign::Plus)]);
        let out = apply_row(
            &row(json!({
                "prev_Q1": 10, "imputation_factor_Q1": 1.5,
                "prev_Q2": 4, "imputation_factor_Q2": 1,
                "Q1": 0, "Q2": 0
            })),
            &naming,
            &[s],
        )
        .unwrap();
        assert_eq!(out["Q_total"], json!(19));
    }

    #[test]
    fn reapplying_gives_identical_results() {
        let naming = ColumnNaming::new(&["Q1"]).unwrap();
        let s = spec("total", &[("Q1", Sign::Plus)]);
        let input = Table::from_value(
            json!([
                {"ref": 1, "prev_Q1": 7, "imputation_factor_Q1": 1.25},
                {"ref": 2, "prev_Q1": 40, "imputation_factor_Q1": 0.95}
            ]),
            "test",
        )
        .unwrap();
        let first = apply_factors(&input, &naming, &[s.clone()]).unwrap();
        let readded: Vec<Record> = first
            .iter()
            .zip(input.iter())
            .map(|(out, inp)| {
                let mut r = out.clone();
                r.insert("prev_Q1".to_string(), inp["prev_Q1"].clone());
                r.insert("imputation_factor_Q1".to_string(), inp["imputation_factor_Q1"].clone());
                r
            })
            .collect();
        let second = apply_factors(&Table::new(readded), &naming, &[s]).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn missing_previous_column_is_a_key_error() {
        let naming = ColumnNaming::new(&["Q1"]).unwrap();
        match apply_row(&row(json!({"imputation_factor_Q1": 1.0})), &naming, &[]) {
            Err(ImputationError::SchemaMismatch { column, .. }) => assert_eq!(column, "prev_Q1"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn text_factor_is_a_type_error() {
        let naming = ColumnNaming::new(&["Q1"]).unwrap();
        assert!(matches!(
            apply_row(
                &row(json!({"prev_Q1": 1, "imputation_factor_Q1": "high"})),
                &naming,
                &[]
            ),
            Err(ImputationError::TypeMismatch { .. })
        ));
    }
}
