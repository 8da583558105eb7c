// Banded imputation factors.
//
// Each cell aggregate gets one factor per question. Cells with too few
// contributing responders fall back to a fixed factor, the rest use their
// mean movement. Which threshold/fallback pair applies depends on the cell:
//
// | region          | land/marine | threshold          | fallback                   |
// |-----------------|-------------|--------------------|----------------------------|
// | special region  | `L`         | `first_threshold`  | `first_imputation_factor`  |
// | special region  | other       | `second_threshold` | `second_imputation_factor` |
// | any other       | any         | `third_threshold`  | `third_imputation_factor`  |
use crate::columns::ColumnNaming;
use crate::constants::{DEFAULT_REGIONLESS_CODE, FACTORS_STAGE, LAND_CODE};
use crate::error::{ImputationError, Result};
use crate::table::Table;
use crate::types::Record;
use crate::util::{key_of, number_value, numeric};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactorConfig {
    pub first_threshold: i64,
    pub second_threshold: i64,
    pub third_threshold: i64,
    pub first_imputation_factor: i64,
    pub second_imputation_factor: i64,
    pub third_imputation_factor: i64,
    pub special_region: i64,
    pub region_column: String,
    pub land_or_marine_column: String,
}

pub const FACTOR_PARAMETERS: [&str; 6] = [
    "first_threshold",
    "second_threshold",
    "third_threshold",
    "first_imputation_factor",
    "second_imputation_factor",
    "third_imputation_factor",
];

fn integer_param(params: &BTreeMap<String, Value>, name: &str) -> Result<i64> {
    let invalid = |found: &Value| {
        ImputationError::validation(
            FACTORS_STAGE,
            format!("{} must be an integer, got {}", name, found),
        )
    };
    match params.get(name) {
        None => Err(ImputationError::validation(
            FACTORS_STAGE,
            format!("{} is required", name),
        )),
        Some(Value::Number(n)) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => Ok(i),
            (None, Some(f)) if f.fract() == 0.0 => Ok(f as i64),
            _ => Err(invalid(&Value::Number(n.clone()))),
        },
        Some(Value::String(s)) => s.trim().parse::<i64>().map_err(|_| invalid(&Value::String(s.clone()))),
        Some(other) => Err(invalid(other)),
    }
}

fn text_param(params: &BTreeMap<String, Value>, name: &str, default: &str) -> Result<String> {
    match params.get(name) {
        None => Ok(default.to_string()),
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Some(other) => Err(ImputationError::validation(
            FACTORS_STAGE,
            format!("{} must be a column name, got {}", name, other),
        )),
    }
}

impl FactorConfig {
    /// Build from loosely typed parameters. The six threshold/factor values
    /// accept integers or numeric strings; `special_region`,
    /// `region_column` and `land_or_marine_column` are optional.
    pub fn from_params(params: &BTreeMap<String, Value>) -> Result<Self> {
        let special_region = if params.contains_key("special_region") {
            integer_param(params, "special_region")?
        } else {
            DEFAULT_REGIONLESS_CODE
        };
        Ok(Self {
            first_threshold: integer_param(params, "first_threshold")?,
            second_threshold: integer_param(params, "second_threshold")?,
            third_threshold: integer_param(params, "third_threshold")?,
            first_imputation_factor: integer_param(params, "first_imputation_factor")?,
            second_imputation_factor: integer_param(params, "second_imputation_factor")?,
            third_imputation_factor: integer_param(params, "third_imputation_factor")?,
            special_region,
            region_column: text_param(params, "region_column", "region")?,
            land_or_marine_column: text_param(params, "land_or_marine_column", "land_or_marine")?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Band {
    SpecialLand,
    SpecialMarine,
    Other,
}

#[derive(Debug, Clone)]
pub struct FactorCalculator {
    config: FactorConfig,
}

impl FactorCalculator {
    pub fn new(config: FactorConfig) -> Self {
        Self { config }
    }

    pub fn band(&self, region: &Value, land_or_marine: &Value) -> Band {
        if key_of(region) == self.config.special_region.to_string() {
            if key_of(land_or_marine) == LAND_CODE {
                Band::SpecialLand
            } else {
                Band::SpecialMarine
            }
        } else {
            Band::Other
        }
    }

    fn threshold_and_fallback(&self, band: Band) -> (i64, i64) {
        let c = &self.config;
        match band {
            Band::SpecialLand => (c.first_threshold, c.first_imputation_factor),
            Band::SpecialMarine => (c.second_threshold, c.second_imputation_factor),
            Band::Other => (c.third_threshold, c.third_imputation_factor),
        }
    }

    /// Below the band's threshold the fixed fallback wins, otherwise the
    /// mean movement is the factor.
    pub fn factor(&self, band: Band, count: f64, mean: f64) -> Value {
        let (threshold, fallback) = self.threshold_and_fallback(band);
        if count < threshold as f64 {
            Value::from(fallback)
        } else {
            number_value(mean)
        }
    }

    /// One aggregate row with an `imputation_factor_<q>` column per question.
    pub fn factor_row(&self, row: &Record, naming: &ColumnNaming) -> Result<Record> {
        let region = row
            .get(&self.config.region_column)
            .ok_or_else(|| ImputationError::missing_column(FACTORS_STAGE, &self.config.region_column))?;
        let land_or_marine = row.get(&self.config.land_or_marine_column).ok_or_else(|| {
            ImputationError::missing_column(FACTORS_STAGE, &self.config.land_or_marine_column)
        })?;
        let band = self.band(region, land_or_marine);

        let mut out = row.clone();
        for cols in naming {
            let count = numeric(row, &cols.movement_count, FACTORS_STAGE)?;
            let mean = numeric(row, &cols.mean, FACTORS_STAGE)?;
            out.insert(cols.factor.clone(), self.factor(band, count, mean));
        }
        Ok(out)
    }

    pub fn compute_factors(&self, aggregates: &Table, naming: &ColumnNaming) -> Result<Table> {
        let rows = aggregates
            .iter()
            .map(|row| self.factor_row(row, naming))
            .collect::<Result<Vec<_>>>()?;
        for cols in naming {
            info!("Calculated factors for {}", cols.question);
        }
        Ok(Table::new(rows))
    }
}

pub fn compute_factors(aggregates: &Table, naming: &ColumnNaming, config: &FactorConfig) -> Result<Table> {
    FactorCalculator::new(config.clone()).compute_factors(aggregates, naming)
}
