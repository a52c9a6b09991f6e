//! Preprocessing
//!
//! Turns raw tables into the dense, standardized feature matrix the KNN regressor
//! consumes. All statistics are learned from the training table and replayed
//! unchanged on any later table, so no information from test data reaches the
//! fitted parameters.
//!
//! Encoded feature layout: surviving numeric features first, in configuration
//! order, each standardized to zero mean and unit variance; then every surviving
//! categorical feature as one indicator column per training label followed by a
//! reserved indicator for labels never seen in training.
use crate::config::PreprocessorConfig;
use crate::constants::NOVEL_CATEGORY;
use crate::data::Matrix;
use crate::errors::KnnError;
use crate::table::{Column, RawTable};
use crate::utils::validate_float_parameter;
use hashbrown::HashSet;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Mean and standard deviation of one numeric feature, learned from training rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnScaling {
    pub name: String,
    pub mean: f64,
    /// Sample standard deviation (n - 1 denominator).
    pub std: f64,
}

impl ColumnScaling {
    fn fit(name: &str, values: &[f64]) -> Self {
        let n = values.len();
        let mean = values.iter().sum::<f64>() / n as f64;
        let std = if n < 2 {
            0.0
        } else {
            (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64).sqrt()
        };
        ColumnScaling {
            name: name.to_string(),
            mean,
            std,
        }
    }

    /// Standardize a value. A constant training column standardizes to zero.
    pub fn transform(&self, value: f64) -> f64 {
        if self.std > 0.0 && self.std.is_finite() {
            (value - self.mean) / self.std
        } else {
            0.0
        }
    }

    /// Map a standardized value back to original units.
    pub fn inverse_transform(&self, value: f64) -> f64 {
        value * self.std + self.mean
    }
}

/// Per-feature standardization parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizationParameters {
    pub columns: Vec<ColumnScaling>,
}

impl NormalizationParameters {
    pub fn get(&self, name: &str) -> Option<&ColumnScaling> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Reverse the standardization of a feature column.
    pub fn inverse_transform(&self, name: &str, values: &[f64]) -> Result<Vec<f64>, KnnError> {
        let scaling = self
            .get(name)
            .ok_or_else(|| KnnError::Schema(format!("No normalization parameters for column {}.", name)))?;
        Ok(values.iter().map(|v| scaling.inverse_transform(*v)).collect())
    }
}

/// Fixed label set of one categorical feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryEncoding {
    pub name: String,
    /// Sorted labels seen in training.
    pub labels: Vec<String>,
}

impl CategoryEncoding {
    /// Number of indicator columns, including the novel category.
    pub fn width(&self) -> usize {
        self.labels.len() + 1
    }

    /// Indicator position of a label, the last position for unseen labels.
    pub fn position(&self, label: &str) -> usize {
        self.labels
            .binary_search_by(|l| l.as_str().cmp(label))
            .unwrap_or(self.labels.len())
    }

    fn indicator_names(&self) -> impl Iterator<Item = String> + '_ {
        self.labels
            .iter()
            .map(move |l| format!("{}={}", self.name, l))
            .chain(std::iter::once(format!("{}={}", self.name, NOVEL_CATEGORY)))
    }
}

/// Encoded columns derived from one source feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureGroup {
    pub name: String,
    pub columns: Range<usize>,
}

/// Everything learned by [`FeaturePreprocessor::fit_transform`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessingParams {
    pub target: String,
    /// Columns removed because too large a share of their values was missing.
    pub dropped_columns: Vec<String>,
    pub normalization: NormalizationParameters,
    pub categories: Vec<CategoryEncoding>,
}

impl PreprocessingParams {
    /// Total number of encoded feature columns.
    pub fn n_encoded(&self) -> usize {
        self.normalization.columns.len() + self.categories.iter().map(|c| c.width()).sum::<usize>()
    }

    pub fn feature_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.normalization.columns.iter().map(|c| c.name.clone()).collect();
        for cat in &self.categories {
            names.extend(cat.indicator_names());
        }
        names
    }

    pub fn feature_groups(&self) -> Vec<FeatureGroup> {
        let mut groups = Vec::new();
        let mut start = 0;
        for c in &self.normalization.columns {
            groups.push(FeatureGroup {
                name: c.name.clone(),
                columns: start..start + 1,
            });
            start += 1;
        }
        for cat in &self.categories {
            groups.push(FeatureGroup {
                name: cat.name.clone(),
                columns: start..start + cat.width(),
            });
            start += cat.width();
        }
        groups
    }
}

/// Encoded, standardized data ready for the regressor.
#[derive(Debug, Clone)]
pub struct PreparedData {
    /// Column major feature values.
    pub features: Vec<f64>,
    pub rows: usize,
    pub feature_names: Vec<String>,
    pub groups: Vec<FeatureGroup>,
    pub target: Option<Vec<f64>>,
}

impl PreparedData {
    pub fn cols(&self) -> usize {
        self.feature_names.len()
    }

    /// Borrow the features as a column major matrix over every row.
    pub fn matrix(&self) -> Matrix<'_, f64> {
        Matrix::new(&self.features, self.rows, self.cols())
    }

    pub fn target(&self) -> Result<&[f64], KnnError> {
        self.target
            .as_deref()
            .ok_or_else(|| KnnError::Schema("Prepared data carries no target column.".to_string()))
    }

    /// Values of one encoded column.
    pub fn column(&self, name: &str) -> Option<&[f64]> {
        let j = self.feature_names.iter().position(|n| n == name)?;
        Some(&self.features[j * self.rows..(j + 1) * self.rows])
    }
}

fn parse_numeric(column: &Column, name: &str, row: usize) -> Result<Option<f64>, KnnError> {
    match column.numeric_value(row) {
        Ok(Some(v)) if !v.is_finite() => Err(KnnError::Schema(format!(
            "Column {} holds a non-finite value {} in row {}.",
            name, v, row
        ))),
        Ok(v) => Ok(v),
        Err(text) => Err(KnnError::Schema(format!(
            "Column {} is declared numeric but row {} holds {:?}.",
            name, row, text
        ))),
    }
}

/// Learns column drops, category label sets and standardization from a training table.
pub struct FeaturePreprocessor {
    config: PreprocessorConfig,
}

impl FeaturePreprocessor {
    pub fn new(config: PreprocessorConfig) -> Result<Self, KnnError> {
        validate_float_parameter(config.missing_threshold, 0.0, 1.0, "missing_threshold")?;
        Ok(FeaturePreprocessor { config })
    }

    pub fn config(&self) -> &PreprocessorConfig {
        &self.config
    }

    /// Clean, encode and standardize a training table.
    ///
    /// Columns whose missing proportion exceeds the threshold are dropped first, then
    /// any row with a missing value in the target or a surviving feature is dropped.
    pub fn fit_transform(&self, train: &RawTable) -> Result<(PreparedData, PreprocessingParams), KnnError> {
        let cfg = &self.config;
        let target_col = train.column(&cfg.target)?;
        for name in cfg.numeric_features.iter().chain(&cfg.categorical_features) {
            train.column(name)?;
        }

        let mut dropped_columns = Vec::new();
        for name in train.names() {
            if *name == cfg.target {
                continue;
            }
            let fraction = train.missing_fraction(name)?;
            if fraction > cfg.missing_threshold {
                info!(
                    "Dropping column {} with {:.1}% missing values.",
                    name,
                    fraction * 100.0
                );
                dropped_columns.push(name.clone());
            }
        }

        let survives = |name: &String| !dropped_columns.contains(name) && !cfg.drop_columns.contains(name);
        let numeric: Vec<&String> = cfg.numeric_features.iter().filter(|n| survives(*n)).collect();
        let categorical: Vec<&String> = cfg.categorical_features.iter().filter(|n| survives(*n)).collect();

        // Parse every numeric cell up front so a malformed cell is reported even when its row
        // would later be filtered.
        let mut numeric_values: Vec<Vec<Option<f64>>> = Vec::with_capacity(numeric.len());
        for name in &numeric {
            let col = train.column(name)?;
            let parsed = (0..train.n_rows())
                .map(|i| parse_numeric(col, name, i))
                .collect::<Result<Vec<_>, _>>()?;
            numeric_values.push(parsed);
        }
        let target_values = (0..train.n_rows())
            .map(|i| parse_numeric(target_col, &cfg.target, i))
            .collect::<Result<Vec<_>, _>>()?;
        let mut label_values: Vec<Vec<Option<String>>> = Vec::with_capacity(categorical.len());
        for name in &categorical {
            let col = train.column(name)?;
            label_values.push((0..train.n_rows()).map(|i| col.label_value(i)).collect());
        }

        let kept: Vec<usize> = (0..train.n_rows())
            .filter(|&i| {
                target_values[i].is_some()
                    && numeric_values.iter().all(|c| c[i].is_some())
                    && label_values.iter().all(|c| c[i].is_some())
            })
            .collect();
        let n_dropped = train.n_rows() - kept.len();
        if n_dropped > 0 {
            warn!("Dropping {} of {} training rows with missing values.", n_dropped, train.n_rows());
        }
        if kept.is_empty() {
            return Err(KnnError::DegenerateData(
                "No training rows remain after removing missing values.".to_string(),
            ));
        }

        let mut scalings = Vec::with_capacity(numeric.len());
        let mut numeric_kept: Vec<Vec<f64>> = Vec::with_capacity(numeric.len());
        for (name, values) in numeric.iter().zip(&numeric_values) {
            let v: Vec<f64> = kept.iter().filter_map(|&i| values[i]).collect();
            let scaling = ColumnScaling::fit(name, &v);
            if scaling.std == 0.0 {
                warn!("Column {} has no variance in the training data, it standardizes to zero.", name);
            }
            scalings.push(scaling);
            numeric_kept.push(v);
        }

        let mut categories = Vec::with_capacity(categorical.len());
        let mut labels_kept: Vec<Vec<String>> = Vec::with_capacity(categorical.len());
        for (name, values) in categorical.iter().zip(&label_values) {
            let v: Vec<String> = kept.iter().filter_map(|&i| values[i].clone()).collect();
            let unique: HashSet<&String> = v.iter().collect();
            let mut labels: Vec<String> = unique.into_iter().cloned().collect();
            labels.sort();
            categories.push(CategoryEncoding {
                name: name.to_string(),
                labels,
            });
            labels_kept.push(v);
        }

        let params = PreprocessingParams {
            target: cfg.target.clone(),
            dropped_columns,
            normalization: NormalizationParameters { columns: scalings },
            categories,
        };
        let target: Vec<f64> = kept.iter().filter_map(|&i| target_values[i]).collect();
        let prepared = encode(&params, kept.len(), &numeric_kept, &labels_kept, Some(target));
        info!(
            "Prepared {} training rows with {} encoded features.",
            prepared.rows,
            prepared.cols()
        );
        Ok((prepared, params))
    }

    /// Apply learned parameters to another table.
    ///
    /// Every row is kept so outputs line up with the input order. A missing value in a
    /// used feature is rejected. Labels unseen in training map to the novel category. The
    /// target is carried when the table has it.
    pub fn transform(&self, table: &RawTable, params: &PreprocessingParams) -> Result<PreparedData, KnnError> {
        let n = table.n_rows();
        let mut numeric_values = Vec::with_capacity(params.normalization.columns.len());
        for scaling in &params.normalization.columns {
            let col = table.column(&scaling.name)?;
            let mut values = Vec::with_capacity(n);
            for i in 0..n {
                let v = parse_numeric(col, &scaling.name, i)?.ok_or_else(|| {
                    KnnError::Schema(format!("Column {} has a missing value in row {}.", scaling.name, i))
                })?;
                values.push(v);
            }
            numeric_values.push(values);
        }

        let mut label_values = Vec::with_capacity(params.categories.len());
        for cat in &params.categories {
            let col = table.column(&cat.name)?;
            let mut values = Vec::with_capacity(n);
            let mut n_novel = 0;
            for i in 0..n {
                let label = col.label_value(i).ok_or_else(|| {
                    KnnError::Schema(format!("Column {} has a missing value in row {}.", cat.name, i))
                })?;
                if cat.position(&label) == cat.labels.len() {
                    n_novel += 1;
                }
                values.push(label);
            }
            if n_novel > 0 {
                info!("Column {} has {} rows with labels unseen in training.", cat.name, n_novel);
            }
            label_values.push(values);
        }

        let target = if table.has_column(&params.target) {
            let col = table.column(&params.target)?;
            let values = (0..n)
                .map(|i| parse_numeric(col, &params.target, i))
                .collect::<Result<Option<Vec<f64>>, _>>()?;
            if values.is_none() {
                debug!("Target {} has missing values, it is not carried.", params.target);
            }
            values
        } else {
            None
        };

        Ok(encode(params, n, &numeric_values, &label_values, target))
    }
}

fn encode(
    params: &PreprocessingParams,
    rows: usize,
    numeric: &[Vec<f64>],
    labels: &[Vec<String>],
    target: Option<Vec<f64>>,
) -> PreparedData {
    let mut features = Vec::with_capacity(rows * params.n_encoded());
    for (scaling, values) in params.normalization.columns.iter().zip(numeric) {
        features.extend(values.iter().map(|v| scaling.transform(*v)));
    }
    for (cat, values) in params.categories.iter().zip(labels) {
        let positions: Vec<usize> = values.iter().map(|l| cat.position(l)).collect();
        for j in 0..cat.width() {
            features.extend(positions.iter().map(|&p| if p == j { 1.0 } else { 0.0 }));
        }
    }
    PreparedData {
        features,
        rows,
        feature_names: params.feature_names(),
        groups: params.feature_groups(),
        target,
    }
}
