use crate::columns::ColumnNaming;
use crate::table::Table;
use serde_json::Value;

/// Add a zeroed `atyp_<q>` flag column per question, ready for outlier
/// detection downstream.
pub fn add_atypical_columns(table: Table, naming: &ColumnNaming) -> Table {
    naming
        .iter()
        .fold(table, |t, cols| t.with_column(&cols.atypical, Value::from(0)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn every_row_gets_zeroed_flags() {
        let t = Table::from_value(json!([{"Q1": 4}, {"Q1": 5, "atyp_Q1": 1}]), "test").unwrap();
        let naming = ColumnNaming::new(&["Q1", "Q2"]).unwrap();
        let out = add_atypical_columns(t, &naming);
        for row in out.iter() {
            assert_eq!(row["atyp_Q1"], json!(0));
            assert_eq!(row["atyp_Q2"], json!(0));
        }
    }
}
