use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImputationError {
    #[error("Parameter validation error in {stage}: {message}")]
    Validation { stage: &'static str, message: String },

    #[error("Key error in {stage}: column '{column}' not found")]
    SchemaMismatch { stage: &'static str, column: String },

    #[error("Type error in {stage}: column '{column}' holds {found}, expected a number")]
    TypeMismatch {
        stage: &'static str,
        column: String,
        found: String,
    },

    #[error("Input format error in {stage}: {message}")]
    InputFormat { stage: &'static str, message: String },

    #[error("Method failure reported to {stage}: {message}")]
    MethodFailure { stage: &'static str, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Table operation failed: {0}")]
    Frame(#[from] polars::prelude::PolarsError),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),
}

impl ImputationError {
    pub fn validation(stage: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            stage,
            message: message.into(),
        }
    }

    pub fn missing_column(stage: &'static str, column: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            stage,
            column: column.into(),
        }
    }

    pub fn input_format(stage: &'static str, message: impl Into<String>) -> Self {
        Self::InputFormat {
            stage,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ImputationError>;
