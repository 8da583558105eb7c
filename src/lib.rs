// Survey imputation: movements, banded imputation factors, regionless
// fallback matching and factor application over in-memory survey tables.

pub mod apply;
pub mod atypicals;
pub mod columns;
pub mod config;
pub mod constants;
pub mod error;
pub mod factors;
pub mod frame;
pub mod logging;
pub mod means;
pub mod methods;
pub mod movement;
pub mod output;
pub mod pipeline;
pub mod regionless;
pub mod storage;
pub mod table;
pub mod types;
pub mod util;

pub use error::{ImputationError, Result};
pub use table::Table;
