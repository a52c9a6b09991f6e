//! Cross Validation
//!
//! Seeded v-fold splitting and a grid search over the neighbor count.
use crate::data::Matrix;
use crate::errors::KnnError;
use crate::knn::KnnRegressor;
use crate::metric::{is_comparison_better, mean_squared_error};
use crate::utils::{mean, validate_count_parameter};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Cross-validated error of one neighbor count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CvEntry {
    pub k: usize,
    /// Mean of the per-fold MSE values.
    pub mse: f64,
    pub rmse: f64,
    pub fold_mse: Vec<f64>,
}

/// Grid search results, in the order of the requested grid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CvTable {
    pub entries: Vec<CvEntry>,
    /// Neighbor counts that some fold could not support.
    pub skipped: Vec<usize>,
}

impl CvTable {
    /// Build a table from `(k, mse)` pairs without fold detail.
    pub fn from_pairs(pairs: &[(usize, f64)]) -> Self {
        CvTable {
            entries: pairs
                .iter()
                .map(|&(k, mse)| CvEntry {
                    k,
                    mse,
                    rmse: mse.sqrt(),
                    fold_mse: Vec::new(),
                })
                .collect(),
            skipped: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn mse(&self, k: usize) -> Option<f64> {
        self.entries.iter().find(|e| e.k == k).map(|e| e.mse)
    }
}

/// Drives repeated fit and evaluate cycles over seeded folds.
#[derive(Debug, Clone)]
pub struct CrossValidator {
    n_folds: usize,
    seed: u64,
    num_threads: Option<usize>,
}

impl CrossValidator {
    /// * `n_folds` - Number of folds, at least 2.
    /// * `seed` - Seed of the row shuffle that assigns folds.
    pub fn new(n_folds: usize, seed: u64) -> Result<Self, KnnError> {
        validate_count_parameter(n_folds, 2, "n_folds")?;
        Ok(CrossValidator {
            n_folds,
            seed,
            num_threads: None,
        })
    }

    /// Run the grid search in a dedicated pool of this many threads.
    pub fn with_num_threads(mut self, num_threads: Option<usize>) -> Self {
        self.num_threads = num_threads;
        self
    }

    pub fn n_folds(&self) -> usize {
        self.n_folds
    }

    /// Partition `0..n_rows` into `n_folds` disjoint groups whose sizes differ by at most one.
    ///
    /// Rows are shuffled with the validator's seed and dealt out in turn. Each fold is
    /// returned sorted.
    pub fn split(&self, n_rows: usize) -> Result<Vec<Vec<usize>>, KnnError> {
        if n_rows < self.n_folds {
            return Err(KnnError::DegenerateData(format!(
                "{} rows cannot be split into {} folds.",
                n_rows, self.n_folds
            )));
        }
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut order: Vec<usize> = (0..n_rows).collect();
        order.shuffle(&mut rng);
        let mut folds = vec![Vec::with_capacity(n_rows / self.n_folds + 1); self.n_folds];
        for (pos, row) in order.into_iter().enumerate() {
            folds[pos % self.n_folds].push(row);
        }
        for fold in folds.iter_mut() {
            fold.sort_unstable();
        }
        Ok(folds)
    }

    /// Cross-validated MSE for every candidate neighbor count.
    ///
    /// For each fold, a model is fit on the remaining rows and scored on the fold; a
    /// candidate's MSE is the mean of its fold MSE values. One neighbor search per held
    /// out row serves every candidate.
    ///
    /// A candidate larger than the smallest training split is skipped with a warning
    /// and listed in [`CvTable::skipped`]; the search fails only when no candidate is
    /// left.
    ///
    /// * `x` - Features; every row of its index takes part.
    /// * `y` - Targets, indexed like `x`.
    /// * `k_values` - Candidate neighbor counts.
    pub fn grid_search(&self, x: &Matrix<f64>, y: &[f64], k_values: &[usize]) -> Result<CvTable, KnnError> {
        if k_values.is_empty() {
            return Err(KnnError::InvalidParameter(
                "k_values".to_string(),
                "a non-empty grid".to_string(),
                "an empty grid".to_string(),
            ));
        }
        for k in k_values {
            validate_count_parameter(*k, 1, "k_values")?;
        }
        if y.len() != x.rows {
            return Err(KnnError::Schema(format!(
                "Target has {} values but the feature matrix has {} rows.",
                y.len(),
                x.rows
            )));
        }

        let rows = &x.index;
        let folds: Vec<Vec<usize>> = self
            .split(rows.len())?
            .into_iter()
            .map(|fold| {
                let mut f: Vec<usize> = fold.into_iter().map(|p| rows[p]).collect();
                f.sort_unstable();
                f
            })
            .collect();
        if folds.iter().any(|f| f.is_empty()) {
            return Err(KnnError::DegenerateData("A cross-validation fold is empty.".to_string()));
        }
        let largest_fold = folds.iter().map(|f| f.len()).max().unwrap_or(0);
        let min_train = rows.len() - largest_fold;

        let mut usable = Vec::with_capacity(k_values.len());
        let mut skipped = Vec::new();
        for &k in k_values {
            if k > min_train {
                warn!(
                    "Skipping k = {}, a fold only has {} training rows.",
                    k, min_train
                );
                skipped.push(k);
            } else {
                usable.push(k);
            }
        }
        if usable.is_empty() {
            return Err(KnnError::DegenerateData(format!(
                "No candidate k fits the {} training rows of a fold.",
                min_train
            )));
        }

        let evaluate = || -> Result<Vec<Vec<f64>>, KnnError> {
            folds
                .par_iter()
                .map(|fold| self.evaluate_fold(x, y, fold, &usable))
                .collect()
        };
        let per_fold = match self.num_threads {
            Some(n) => rayon::ThreadPoolBuilder::new()
                .num_threads(n)
                .build()
                .map_err(|e| {
                    KnnError::InvalidParameter("num_threads".to_string(), "a usable pool size".to_string(), e.to_string())
                })?
                .install(evaluate)?,
            None => evaluate()?,
        };

        let entries: Vec<CvEntry> = usable
            .iter()
            .enumerate()
            .map(|(j, &k)| {
                let fold_mse: Vec<f64> = per_fold.iter().map(|f| f[j]).collect();
                let mse = mean(&fold_mse);
                debug!("k = {}, cross-validated MSE {:.6}", k, mse);
                CvEntry {
                    k,
                    mse,
                    rmse: mse.sqrt(),
                    fold_mse,
                }
            })
            .collect();
        info!(
            "Grid search evaluated {} candidates over {} folds.",
            entries.len(),
            self.n_folds
        );
        Ok(CvTable { entries, skipped })
    }

    fn evaluate_fold(&self, x: &Matrix<f64>, y: &[f64], fold: &[usize], ks: &[usize]) -> Result<Vec<f64>, KnnError> {
        let train_index: Vec<usize> = x.index.iter().copied().filter(|r| fold.binary_search(r).is_err()).collect();
        let k_max = ks.iter().copied().max().unwrap_or(1);
        let train = Matrix::with_index(x.data, x.rows, x.cols, train_index);
        let model = KnnRegressor::fit(&train, y, k_max)?;
        let held_out = Matrix::with_index(x.data, x.rows, x.cols, fold.to_vec());
        let actual: Vec<f64> = fold.iter().map(|&r| y[r]).collect();
        let preds = model.predict_for_ks(&held_out, ks)?;
        Ok(preds.iter().map(|p| mean_squared_error(&actual, p)).collect())
    }

    /// The neighbor count with the lowest MSE, the smallest such count on ties.
    pub fn select_best(table: &CvTable) -> Result<usize, KnnError> {
        let mut best: Option<&CvEntry> = None;
        for entry in &table.entries {
            best = match best {
                None => Some(entry),
                Some(b) => {
                    let tie = entry.mse == b.mse && entry.k < b.k;
                    if is_comparison_better(b.mse, entry.mse, false) || tie {
                        Some(entry)
                    } else {
                        Some(b)
                    }
                }
            };
        }
        best.map(|b| b.k).ok_or_else(|| {
            KnnError::InvalidParameter(
                "cv_table".to_string(),
                "at least one evaluated k".to_string(),
                "an empty table".to_string(),
            )
        })
    }
}
