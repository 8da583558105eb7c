// Method handlers and the hand-off between a stage and its method.
//
// A stage prepares data and hands a `MethodRequest` to the next stage
// through a `StageInvoker`; the method answers with `{success, data}` or
// `{success: false, error}`. `LocalInvoker` runs the method in-process.
use crate::apply::apply_factors;
use crate::columns::ColumnNaming;
use crate::constants::{
    APPLY_METHOD, APPLY_STAGE, FACTORS_METHOD, FACTORS_STAGE, MEANS_METHOD, MEANS_STAGE,
    MOVEMENT_METHOD, MOVEMENT_STAGE,
};
use crate::error::{ImputationError, Result};
use crate::factors::{FactorCalculator, FactorConfig};
use crate::means::compute_means;
use crate::movement::{compute_movements, split_periods};
use crate::table::Table;
use crate::types::SumColumnSpec;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum MethodRequest {
    Movement {
        data: Table,
        questions: Vec<String>,
        reference_column: String,
        period_column: String,
        current_period: Value,
        previous_period: Value,
    },
    Means {
        data: Table,
        questions: Vec<String>,
        distinct_values: Vec<String>,
        carry: Vec<String>,
    },
    Factors {
        data: Table,
        questions: Vec<String>,
        factors: FactorConfig,
    },
    Apply {
        data: Table,
        questions: Vec<String>,
        sum_columns: Vec<SumColumnSpec>,
    },
}

impl MethodRequest {
    pub fn method_name(&self) -> &'static str {
        match self {
            MethodRequest::Movement { .. } => MOVEMENT_METHOD,
            MethodRequest::Means { .. } => MEANS_METHOD,
            MethodRequest::Factors { .. } => FACTORS_METHOD,
            MethodRequest::Apply { .. } => APPLY_METHOD,
        }
    }

    fn stage(&self) -> &'static str {
        match self {
            MethodRequest::Movement { .. } => MOVEMENT_STAGE,
            MethodRequest::Means { .. } => MEANS_STAGE,
            MethodRequest::Factors { .. } => FACTORS_STAGE,
            MethodRequest::Apply { .. } => APPLY_STAGE,
        }
    }
}

/// Error class of a failed method, carried in the response so the calling
/// stage can raise the same kind of error the method hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureKind {
    Validation { message: String },
    SchemaMismatch { column: String },
    TypeMismatch { column: String, found: String },
    InputFormat { message: String },
}

impl FailureKind {
    pub fn of(error: &ImputationError) -> Option<Self> {
        match error {
            ImputationError::Validation { message, .. } => Some(FailureKind::Validation {
                message: message.clone(),
            }),
            ImputationError::SchemaMismatch { column, .. } => Some(FailureKind::SchemaMismatch {
                column: column.clone(),
            }),
            ImputationError::TypeMismatch { column, found, .. } => Some(FailureKind::TypeMismatch {
                column: column.clone(),
                found: found.clone(),
            }),
            ImputationError::InputFormat { message, .. } => Some(FailureKind::InputFormat {
                message: message.clone(),
            }),
            _ => None,
        }
    }

    fn into_error(self, stage: &'static str) -> ImputationError {
        match self {
            FailureKind::Validation { message } => ImputationError::Validation { stage, message },
            FailureKind::SchemaMismatch { column } => ImputationError::SchemaMismatch { stage, column },
            FailureKind::TypeMismatch { column, found } => ImputationError::TypeMismatch {
                stage,
                column,
                found,
            },
            FailureKind::InputFormat { message } => ImputationError::InputFormat { stage, message },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Table>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
}

impl MethodResponse {
    pub fn ok(data: Table) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            failure: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            failure: None,
        }
    }

    /// A failed response that keeps the error's class.
    pub fn from_error(error: &ImputationError) -> Self {
        Self {
            failure: FailureKind::of(error),
            ..Self::failed(error.to_string())
        }
    }

    /// The data of a successful response. A failed one becomes the error
    /// class it carries, or a `MethodFailure` when it carries none.
    pub fn into_table(self, stage: &'static str) -> Result<Table> {
        match (self.success, self.data) {
            (true, Some(data)) => Ok(data),
            (true, None) => Err(ImputationError::input_format(
                stage,
                "method reported success without data",
            )),
            (false, _) => Err(match self.failure {
                Some(kind) => kind.into_error(stage),
                None => ImputationError::MethodFailure {
                    stage,
                    message: self.error.unwrap_or_else(|| "no error message".to_string()),
                },
            }),
        }
    }
}

/// Run a method to completion. All-or-nothing: any error discards the
/// partial result.
pub fn run_method(request: &MethodRequest) -> Result<Table> {
    match request {
        MethodRequest::Movement {
            data,
            questions,
            reference_column,
            period_column,
            current_period,
            previous_period,
        } => {
            let naming = ColumnNaming::new(questions)?;
            let split = split_periods(data, period_column, current_period, previous_period)?;
            compute_movements(&split.current, &split.previous, reference_column, &naming)
        }
        MethodRequest::Means {
            data,
            questions,
            distinct_values,
            carry,
        } => {
            let naming = ColumnNaming::new(questions)?;
            compute_means(data, distinct_values, carry, &naming)
        }
        MethodRequest::Factors {
            data,
            questions,
            factors,
        } => {
            let naming = ColumnNaming::new(questions)?;
            FactorCalculator::new(factors.clone()).compute_factors(data, &naming)
        }
        MethodRequest::Apply {
            data,
            questions,
            sum_columns,
        } => {
            let naming = ColumnNaming::new(questions)?;
            apply_factors(data, &naming, sum_columns)
        }
    }
}

/// Hands a request to the named next stage.
pub trait StageInvoker {
    fn invoke_next_stage(&self, name: &str, request: &MethodRequest) -> Result<MethodResponse>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LocalInvoker;

impl StageInvoker for LocalInvoker {
    fn invoke_next_stage(&self, name: &str, request: &MethodRequest) -> Result<MethodResponse> {
        if name != request.method_name() {
            return Ok(MethodResponse::failed(format!(
                "{} cannot handle a {} request",
                name,
                request.method_name()
            )));
        }
        info!("{} Method Begun", request.stage());
        Ok(match run_method(request) {
            Ok(data) => {
                info!("Successfully completed module: {}", request.stage());
                MethodResponse::ok(data)
            }
            Err(e) => {
                error!("{}", e);
                MethodResponse::from_error(&e)
            }
        })
    }
}
