//! Pipeline Configuration
//!
//! Defines the configuration structures used by the preprocessing step and the
//! model selection pipeline, together with JSON IO and environment overrides.
use crate::constants::{
    CATEGORICAL_COLUMNS, DEFAULT_K_MAX, DEFAULT_K_MIN, DEFAULT_MISSING_THRESHOLD, DEFAULT_N_FOLDS,
    DEFAULT_N_REPEATS, DEFAULT_SEED, NUMERIC_COLUMNS, TARGET_COLUMN,
};
use crate::errors::KnnError;
use crate::utils::{validate_count_parameter, validate_float_parameter};
use log::debug;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::str::FromStr;

pub const ENV_SEED: &str = "TURBINE_KNN_SEED";
pub const ENV_FOLDS: &str = "TURBINE_KNN_FOLDS";
pub const ENV_K_MIN: &str = "TURBINE_KNN_K_MIN";
pub const ENV_K_MAX: &str = "TURBINE_KNN_K_MAX";
pub const ENV_REPEATS: &str = "TURBINE_KNN_REPEATS";
pub const ENV_THREADS: &str = "TURBINE_KNN_THREADS";

fn default_target() -> String {
    TARGET_COLUMN.to_string()
}
fn default_numeric_features() -> Vec<String> {
    NUMERIC_COLUMNS.iter().map(|s| s.to_string()).collect()
}
fn default_categorical_features() -> Vec<String> {
    CATEGORICAL_COLUMNS.iter().map(|s| s.to_string()).collect()
}
fn default_missing_threshold() -> f64 {
    DEFAULT_MISSING_THRESHOLD
}
fn default_seed() -> u64 {
    DEFAULT_SEED
}
fn default_n_folds() -> usize {
    DEFAULT_N_FOLDS
}
fn default_k_values() -> Vec<usize> {
    (DEFAULT_K_MIN..=DEFAULT_K_MAX).collect()
}
fn default_n_repeats() -> usize {
    DEFAULT_N_REPEATS
}

/// Which columns are modelled and how they are cleaned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessorConfig {
    /// Continuous target column.
    #[serde(default = "default_target")]
    pub target: String,
    /// Features standardized to zero mean and unit variance.
    #[serde(default = "default_numeric_features")]
    pub numeric_features: Vec<String>,
    /// Features one-hot encoded against the training label set.
    #[serde(default = "default_categorical_features")]
    pub categorical_features: Vec<String>,
    /// Columns never used as features, such as identifiers.
    #[serde(default)]
    pub drop_columns: Vec<String>,
    /// Columns with a larger share of missing values are dropped.
    #[serde(default = "default_missing_threshold")]
    pub missing_threshold: f64,
}

impl Default for PreprocessorConfig {
    fn default() -> Self {
        PreprocessorConfig {
            target: default_target(),
            numeric_features: default_numeric_features(),
            categorical_features: default_categorical_features(),
            drop_columns: Vec::new(),
            missing_threshold: DEFAULT_MISSING_THRESHOLD,
        }
    }
}

/// Configuration of the full model selection pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub preprocessing: PreprocessorConfig,
    /// Seed for fold assignment and permutation shuffles.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Number of cross-validation folds.
    #[serde(default = "default_n_folds")]
    pub n_folds: usize,
    /// Candidate neighbor counts, evaluated in this order.
    #[serde(default = "default_k_values")]
    pub k_values: Vec<usize>,
    /// Shuffles per feature for permutation importance.
    #[serde(default = "default_n_repeats")]
    pub n_repeats: usize,
    /// Number of threads for parallel tasks, the global rayon pool if `None`.
    #[serde(default)]
    pub num_threads: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            preprocessing: PreprocessorConfig::default(),
            seed: DEFAULT_SEED,
            n_folds: DEFAULT_N_FOLDS,
            k_values: default_k_values(),
            n_repeats: DEFAULT_N_REPEATS,
            num_threads: None,
        }
    }
}

fn parse_var<T: FromStr>(name: &str, value: &str, expected: &str) -> Result<T, KnnError> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| KnnError::InvalidParameter(name.to_string(), expected.to_string(), value.to_string()))
}

impl PipelineConfig {
    /// Set the seed.
    pub fn set_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the number of folds.
    pub fn set_n_folds(mut self, n_folds: usize) -> Self {
        self.n_folds = n_folds;
        self
    }

    /// Set the candidate neighbor counts.
    pub fn set_k_values(mut self, k_values: Vec<usize>) -> Self {
        self.k_values = k_values;
        self
    }

    /// Set the number of permutation repeats.
    pub fn set_n_repeats(mut self, n_repeats: usize) -> Self {
        self.n_repeats = n_repeats;
        self
    }

    /// Set the number of threads.
    pub fn set_num_threads(mut self, num_threads: Option<usize>) -> Self {
        self.num_threads = num_threads;
        self
    }

    /// Set the preprocessing configuration.
    pub fn set_preprocessing(mut self, preprocessing: PreprocessorConfig) -> Self {
        self.preprocessing = preprocessing;
        self
    }

    /// Apply overrides from the process environment.
    pub fn with_env_overrides(self) -> Result<Self, KnnError> {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from a variable lookup, used by [`Self::with_env_overrides`].
    ///
    /// The K range variables replace the grid with a contiguous range; a missing bound
    /// keeps the current grid's bound.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, KnnError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup(ENV_SEED) {
            self.seed = parse_var(ENV_SEED, &v, "an unsigned integer")?;
        }
        if let Some(v) = lookup(ENV_FOLDS) {
            self.n_folds = parse_var(ENV_FOLDS, &v, "an unsigned integer")?;
        }
        if let Some(v) = lookup(ENV_REPEATS) {
            self.n_repeats = parse_var(ENV_REPEATS, &v, "an unsigned integer")?;
        }
        if let Some(v) = lookup(ENV_THREADS) {
            self.num_threads = Some(parse_var(ENV_THREADS, &v, "an unsigned integer")?);
        }
        let k_min = lookup(ENV_K_MIN)
            .map(|v| parse_var::<usize>(ENV_K_MIN, &v, "an unsigned integer"))
            .transpose()?;
        let k_max = lookup(ENV_K_MAX)
            .map(|v| parse_var::<usize>(ENV_K_MAX, &v, "an unsigned integer"))
            .transpose()?;
        if k_min.is_some() || k_max.is_some() {
            let lo = k_min.or_else(|| self.k_values.iter().min().copied()).unwrap_or(DEFAULT_K_MIN);
            let hi = k_max.or_else(|| self.k_values.iter().max().copied()).unwrap_or(DEFAULT_K_MAX);
            self.k_values = (lo..=hi).collect();
        }
        debug!(
            "Configuration after overrides: seed {}, {} folds, {} candidate k, {} repeats.",
            self.seed,
            self.n_folds,
            self.k_values.len(),
            self.n_repeats
        );
        Ok(self)
    }

    /// Check every parameter before any computation begins.
    pub fn validate(&self) -> Result<(), KnnError> {
        validate_float_parameter(
            self.preprocessing.missing_threshold,
            0.0,
            1.0,
            "missing_threshold",
        )?;
        validate_count_parameter(self.n_folds, 2, "n_folds")?;
        validate_count_parameter(self.n_repeats, 1, "n_repeats")?;
        if self.k_values.is_empty() {
            return Err(KnnError::InvalidParameter(
                "k_values".to_string(),
                "a non-empty grid".to_string(),
                "an empty grid".to_string(),
            ));
        }
        for k in &self.k_values {
            validate_count_parameter(*k, 1, "k_values")?;
        }
        if let Some(t) = self.num_threads {
            validate_count_parameter(t, 1, "num_threads")?;
        }
        Ok(())
    }
}

/// IO
pub trait ConfigIO: Serialize + DeserializeOwned + Sized {
    /// Save a configuration as a json object to a file.
    ///
    /// * `path` - Path to save the configuration.
    fn save_config<P: AsRef<Path>>(&self, path: P) -> Result<(), KnnError> {
        fs::write(path, self.json_dump()?).map_err(|e| KnnError::UnableToWrite(e.to_string()))
    }

    /// Dump a configuration as a json object
    fn json_dump(&self) -> Result<String, KnnError> {
        serde_json::to_string(self).map_err(|e| KnnError::UnableToWrite(e.to_string()))
    }

    /// Load a configuration from Json string
    ///
    /// * `json_str` - String object, which can be serialized to json.
    fn from_json(json_str: &str) -> Result<Self, KnnError> {
        serde_json::from_str::<Self>(json_str).map_err(|e| KnnError::UnableToRead(e.to_string()))
    }

    /// Load a configuration from a path to a json object.
    ///
    /// * `path` - Path to load the configuration from.
    fn load_config<P: AsRef<Path>>(path: P) -> Result<Self, KnnError> {
        let json_str = fs::read_to_string(path).map_err(|e| KnnError::UnableToRead(e.to_string()))?;
        Self::from_json(&json_str)
    }
}

impl ConfigIO for PipelineConfig {}
impl ConfigIO for PreprocessorConfig {}
