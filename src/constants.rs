// Stage names used in error context and log lines.
pub const MOVEMENT_STAGE: &str = "Calculate Movement";
pub const MEANS_STAGE: &str = "Calculate Means";
pub const FACTORS_STAGE: &str = "Calculate Factors";
pub const REGIONLESS_STAGE: &str = "Regionless Fallback";
pub const APPLY_STAGE: &str = "Apply Factors";
pub const ATYPICALS_STAGE: &str = "Atypicals";
pub const CONFIG_STAGE: &str = "Configuration";
pub const STORAGE_STAGE: &str = "Snapshot Store";

// Method names understood by the in-process invoker.
pub const MOVEMENT_METHOD: &str = "calculate_movement_method";
pub const MEANS_METHOD: &str = "calculate_means_method";
pub const FACTORS_METHOD: &str = "calculate_imputation_factors_method";
pub const APPLY_METHOD: &str = "apply_factors_method";

// Response-type codes carried by survey rows.
pub const NON_RESPONDER_CODE: i64 = 1;
pub const RESPONDER_CODE: i64 = 2;

/// Region code for "no specific region" (Great Britain as a whole).
pub const DEFAULT_REGIONLESS_CODE: i64 = 14;

pub const LAND_CODE: &str = "L";
