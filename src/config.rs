use crate::columns::ColumnNaming;
use crate::constants::CONFIG_STAGE;
use crate::error::{ImputationError, Result};
use crate::factors::{FactorConfig, FACTOR_PARAMETERS};
use crate::regionless::RegionlessParams;
use crate::types::SumColumnSpec;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct RawConfig {
    questions: Vec<String>,
    distinct_values: Vec<String>,
    #[serde(default = "default_reference_column")]
    reference_column: String,
    #[serde(default = "default_period_column")]
    period_column: String,
    #[serde(default = "default_response_type_column")]
    response_type_column: String,
    current_period: Value,
    previous_period: Value,
    regionless: RawRegionless,
    factors: BTreeMap<String, Value>,
    #[serde(default)]
    sum_columns: Vec<SumColumnSpec>,
    snapshots: SnapshotKeys,
}

#[derive(Debug, Deserialize)]
struct RawRegionless {
    region_column: String,
    regionless_code: i64,
}

fn default_reference_column() -> String {
    "responder_id".to_string()
}

fn default_period_column() -> String {
    "period".to_string()
}

fn default_response_type_column() -> String {
    "response_type".to_string()
}

/// Names of the snapshots each stage reads and writes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SnapshotKeys {
    pub current_data: String,
    pub previous_data: String,
    #[serde(default = "default_movement_key")]
    pub movement: String,
    #[serde(default = "default_means_key")]
    pub means: String,
    #[serde(default = "default_factors_key")]
    pub factors: String,
    #[serde(default = "default_imputed_key")]
    pub imputed: String,
    #[serde(default = "default_atypicals_key")]
    pub atypicals: String,
}

fn default_movement_key() -> String {
    "movement_output.json".to_string()
}

fn default_means_key() -> String {
    "means_output.json".to_string()
}

fn default_factors_key() -> String {
    "factors_output.json".to_string()
}

fn default_imputed_key() -> String {
    "imputed_output.json".to_string()
}

fn default_atypicals_key() -> String {
    "atypicals_output.json".to_string()
}

/// Validated, immutable settings for one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub naming: ColumnNaming,
    pub distinct_values: Vec<String>,
    pub reference_column: String,
    pub period_column: String,
    pub response_type_column: String,
    pub current_period: Value,
    pub previous_period: Value,
    pub regionless: RegionlessParams,
    pub factors: FactorConfig,
    pub sum_columns: Vec<SumColumnSpec>,
    pub snapshots: SnapshotKeys,
}

fn period_value(name: &str, value: Value) -> Result<Value> {
    match value {
        Value::Number(_) => Ok(value),
        Value::String(ref s) if !s.trim().is_empty() => Ok(value),
        other => Err(ImputationError::validation(
            CONFIG_STAGE,
            format!("{} must be a number or non-empty string, got {}", name, other),
        )),
    }
}

impl PipelineConfig {
    /// Read a TOML file. Factor parameters may be overridden from the
    /// environment (`FIRST_THRESHOLD`, ..., `THIRD_IMPUTATION_FACTOR`).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ImputationError::validation(
                CONFIG_STAGE,
                format!("failed to read config file '{}': {}", path.display(), e),
            )
        })?;
        Self::from_toml_str_with(&content, |name| std::env::var(name.to_uppercase()).ok())
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Self::from_toml_str_with(content, |_| None)
    }

    /// Parse and validate, consulting `override_for` for each factor
    /// parameter before falling back to the file value.
    pub fn from_toml_str_with<F>(content: &str, override_for: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut raw: RawConfig = toml::from_str(content)?;
        for name in FACTOR_PARAMETERS {
            if let Some(v) = override_for(name) {
                raw.factors.insert(name.to_string(), Value::String(v));
            }
        }
        Self::validate(raw)
    }

    fn validate(raw: RawConfig) -> Result<Self> {
        let naming = ColumnNaming::new(&raw.questions)?;

        if raw.distinct_values.is_empty() {
            return Err(ImputationError::validation(
                CONFIG_STAGE,
                "distinct_values is empty",
            ));
        }
        if raw.distinct_values.iter().any(|d| d.trim().is_empty()) {
            return Err(ImputationError::validation(
                CONFIG_STAGE,
                "distinct_values contains an empty name",
            ));
        }
        if !raw.distinct_values.contains(&raw.regionless.region_column) {
            return Err(ImputationError::validation(
                CONFIG_STAGE,
                format!(
                    "region column '{}' missing from distinct_values",
                    raw.regionless.region_column
                ),
            ));
        }

        let current_period = period_value("current_period", raw.current_period)?;
        let previous_period = period_value("previous_period", raw.previous_period)?;

        for spec in &raw.sum_columns {
            if spec.column_name.trim().is_empty() || spec.terms.is_empty() {
                return Err(ImputationError::validation(
                    CONFIG_STAGE,
                    "sum column needs a column_name and at least one term",
                ));
            }
        }

        let mut factors = FactorConfig::from_params(&raw.factors)?;
        // Factors are banded on the same region column the fallback uses.
        if !raw.factors.contains_key("region_column") {
            factors.region_column = raw.regionless.region_column.clone();
        }

        Ok(Self {
            naming,
            regionless: RegionlessParams {
                distinct_values: raw.distinct_values.clone(),
                region_column: raw.regionless.region_column,
                regionless_code: raw.regionless.regionless_code,
            },
            distinct_values: raw.distinct_values,
            reference_column: raw.reference_column,
            period_column: raw.period_column,
            response_type_column: raw.response_type_column,
            current_period,
            previous_period,
            factors,
            sum_columns: raw.sum_columns,
            snapshots: raw.snapshots,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Sign;

    const SAMPLE: &str = r#"
questions = ["Q601", "Q602"]
distinct_values = ["region", "strata"]
current_period = 201809
previous_period = "201806"

[regionless]
region_column = "region"
regionless_code = 14

[factors]
first_threshold = 7
second_threshold = "7"
third_threshold = 9
first_imputation_factor = 1
second_imputation_factor = 1
third_imputation_factor = 1

[[sum_columns]]
column_name = "Q608_total"
data = { Q601 = "+", Q602 = "-" }

[snapshots]
current_data = "current.json"
previous_data = "previous.csv"
"#;

    #[test]
    fn loads_sample_with_defaults() {
        let config = PipelineConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.naming.questions(), vec!["Q601", "Q602"]);
        assert_eq!(config.reference_column, "responder_id");
        assert_eq!(config.factors.second_threshold, 7);
        assert_eq!(config.factors.special_region, 14);
        assert_eq!(config.regionless.regionless_code, 14);
        assert_eq!(config.sum_columns[0].terms["Q602"], Sign::Minus);
        assert_eq!(config.snapshots.factors, "factors_output.json");
    }

    #[test]
    fn environment_overrides_factor_parameters() {
        let config = PipelineConfig::from_toml_str_with(SAMPLE, |name| {
            (name == "third_threshold").then(|| "2".to_string())
        })
        .unwrap();
        assert_eq!(config.factors.third_threshold, 2);
        assert_eq!(config.factors.first_threshold, 7);
    }

    #[test]
    fn non_numeric_threshold_is_a_validation_error() {
        let bad = SAMPLE.replace("third_threshold = 9", "third_threshold = \"nine\"");
        assert!(matches!(
            PipelineConfig::from_toml_str(&bad),
            Err(ImputationError::Validation { .. })
        ));
    }

    #[test]
    fn region_column_must_be_a_distinct_value() {
        let bad = SAMPLE.replace("[\"region\", \"strata\"]", "[\"strata\"]");
        assert!(matches!(
            PipelineConfig::from_toml_str(&bad),
            Err(ImputationError::Validation { .. })
        ));
    }

    #[test]
    fn malformed_toml_is_reported() {
        assert!(matches!(
            PipelineConfig::from_toml_str("questions = ["),
            Err(ImputationError::Toml(_))
        ));
    }
}
