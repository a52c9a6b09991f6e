pub const DEFAULT_SEED: u64 = 42;
pub const DEFAULT_N_FOLDS: usize = 10;
pub const DEFAULT_K_MIN: usize = 1;
pub const DEFAULT_K_MAX: usize = 20;
pub const DEFAULT_N_REPEATS: usize = 15;
pub const DEFAULT_MISSING_THRESHOLD: f64 = 0.9;

/// Label of the baseline entry in an importance report.
pub const FULL_MODEL_LABEL: &str = "_full_model_";
/// Reserved category for labels never observed in the training data.
pub const NOVEL_CATEGORY: &str = "__novel__";
/// Cell values read as missing from text input.
pub const MISSING_TOKENS: [&str; 5] = ["NA", "NaN", "nan", "null", "NULL"];

pub const TARGET_COLUMN: &str = "t_cap";
pub const NUMERIC_COLUMNS: [&str; 6] = ["t_rsa", "t_hh", "p_year", "t_ttlh", "xlong", "ylat"];
pub const CATEGORICAL_COLUMNS: [&str; 1] = ["retrofit"];
