// Derived column names for the question list.
//
// Every stage works with columns named after the questions (`prev_Q601`,
// `imputation_factor_Q601`, ...). They are built once here from a validated
// question list instead of being string-built at each use.
use crate::constants::CONFIG_STAGE;
use crate::error::{ImputationError, Result};
use std::collections::HashSet;

pub const MOVEMENT_PREFIX: &str = "movement_";
pub const MEAN_PREFIX: &str = "mean_";
pub const PREVIOUS_PREFIX: &str = "prev_";
pub const FACTOR_PREFIX: &str = "imputation_factor_";
pub const ATYPICAL_PREFIX: &str = "atyp_";
pub const COUNT_SUFFIX: &str = "_count";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionColumns {
    pub question: String,
    pub movement: String,
    pub movement_count: String,
    pub mean: String,
    pub previous: String,
    pub factor: String,
    pub atypical: String,
}

impl QuestionColumns {
    fn new(question: &str) -> Self {
        Self {
            question: question.to_string(),
            movement: format!("{}{}", MOVEMENT_PREFIX, question),
            movement_count: format!("{}{}{}", MOVEMENT_PREFIX, question, COUNT_SUFFIX),
            mean: format!("{}{}", MEAN_PREFIX, question),
            previous: format!("{}{}", PREVIOUS_PREFIX, question),
            factor: format!("{}{}", FACTOR_PREFIX, question),
            atypical: format!("{}{}", ATYPICAL_PREFIX, question),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnNaming {
    columns: Vec<QuestionColumns>,
}

impl ColumnNaming {
    pub fn new<S: AsRef<str>>(questions: &[S]) -> Result<Self> {
        if questions.is_empty() {
            return Err(ImputationError::validation(
                CONFIG_STAGE,
                "questions list is empty",
            ));
        }
        let mut seen = HashSet::new();
        let mut columns = Vec::with_capacity(questions.len());
        for q in questions {
            let q = q.as_ref().trim();
            if q.is_empty() {
                return Err(ImputationError::validation(
                    CONFIG_STAGE,
                    "questions list contains an empty name",
                ));
            }
            if !seen.insert(q.to_string()) {
                return Err(ImputationError::validation(
                    CONFIG_STAGE,
                    format!("question '{}' is listed twice", q),
                ));
            }
            columns.push(QuestionColumns::new(q));
        }
        Ok(Self { columns })
    }

    pub fn iter(&self) -> std::slice::Iter<'_, QuestionColumns> {
        self.columns.iter()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn questions(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.question.clone()).collect()
    }

    pub fn previous(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.previous.clone()).collect()
    }

    pub fn factors(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.factor.clone()).collect()
    }

    pub fn atypicals(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.atypical.clone()).collect()
    }

    /// `prefix + question` for every question, followed by `extra`.
    pub fn produce_columns<S: AsRef<str>>(&self, prefix: &str, extra: &[S]) -> Vec<String> {
        self.columns
            .iter()
            .map(|c| format!("{}{}", prefix, c.question))
            .chain(extra.iter().map(|e| e.as_ref().to_string()))
            .collect()
    }

    /// `(question, prev_question)` pairs for renaming a previous-period table.
    pub fn previous_renames(&self) -> Vec<(String, String)> {
        self.columns
            .iter()
            .map(|c| (c.question.clone(), c.previous.clone()))
            .collect()
    }
}

impl<'a> IntoIterator for &'a ColumnNaming {
    type Item = &'a QuestionColumns;
    type IntoIter = std::slice::Iter<'a, QuestionColumns>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_derived_names() {
        let naming = ColumnNaming::new(&["Q1", "Q2"]).unwrap();
        let q1 = naming.iter().next().unwrap();
        assert_eq!(q1.movement, "movement_Q1");
        assert_eq!(q1.movement_count, "movement_Q1_count");
        assert_eq!(q1.mean, "mean_Q1");
        assert_eq!(q1.previous, "prev_Q1");
        assert_eq!(q1.factor, "imputation_factor_Q1");
        assert_eq!(q1.atypical, "atyp_Q1");
    }

    #[test]
    fn produce_columns_appends_extras() {
        let naming = ColumnNaming::new(&["Q1", "Q2"]).unwrap();
        assert_eq!(
            naming.produce_columns(FACTOR_PREFIX, &["region", "strata"]),
            vec![
                "imputation_factor_Q1",
                "imputation_factor_Q2",
                "region",
                "strata"
            ]
        );
    }

    #[test]
    fn rejects_bad_question_lists() {
        let empty: [&str; 0] = [];
        assert!(matches!(
            ColumnNaming::new(&empty),
            Err(ImputationError::Validation { .. })
        ));
        assert!(ColumnNaming::new(&["Q1", " "]).is_err());
        assert!(ColumnNaming::new(&["Q1", "Q1"]).is_err());
    }
}
