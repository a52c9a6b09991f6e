//! Permutation Importance
//!
//! A feature's importance is the model error after its values are shuffled across
//! rows, which breaks the feature's link to the target while keeping its marginal
//! distribution. Encoded columns that come from one source feature are shuffled
//! together with a single permutation.
use crate::constants::FULL_MODEL_LABEL;
use crate::data::Matrix;
use crate::errors::KnnError;
use crate::knn::KnnRegressor;
use crate::metric::mean_squared_error;
use crate::preprocessing::FeatureGroup;
use crate::utils::{derive_seed, mean, validate_count_parameter};
use hashbrown::HashMap;
use log::info;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Degraded errors of one feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub name: String,
    /// MSE after each shuffle, in repeat order.
    pub losses: Vec<f64>,
    pub mean_loss: f64,
}

impl FeatureImportance {
    /// Mean increase of the MSE over the unshuffled model.
    pub fn increase_over(&self, baseline: f64) -> f64 {
        self.mean_loss - baseline
    }
}

/// Importance of every feature group, plus the unshuffled reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportanceReport {
    /// MSE of the model on unshuffled data.
    pub baseline_mse: f64,
    /// One entry per feature group, in input order.
    pub features: Vec<FeatureImportance>,
}

impl ImportanceReport {
    /// Features sorted ascending by mean degraded MSE, so the most important is last.
    pub fn ranking(&self) -> Vec<&FeatureImportance> {
        let mut ranked: Vec<&FeatureImportance> = self.features.iter().collect();
        ranked.sort_by(|a, b| a.mean_loss.partial_cmp(&b.mean_loss).unwrap_or(Ordering::Equal));
        ranked
    }

    pub fn get(&self, name: &str) -> Option<&FeatureImportance> {
        self.features.iter().find(|f| f.name == name)
    }

    /// Loss distributions keyed by feature name, with the baseline under `_full_model_`.
    pub fn as_map(&self) -> HashMap<String, Vec<f64>> {
        let mut map: HashMap<String, Vec<f64>> = self
            .features
            .iter()
            .map(|f| (f.name.clone(), f.losses.clone()))
            .collect();
        map.insert(FULL_MODEL_LABEL.to_string(), vec![self.baseline_mse]);
        map
    }
}

/// Feature groups of single columns, named after the columns.
pub fn single_column_groups(names: &[String]) -> Vec<FeatureGroup> {
    names
        .iter()
        .enumerate()
        .map(|(j, name)| FeatureGroup {
            name: name.clone(),
            columns: j..j + 1,
        })
        .collect()
}

pub struct PermutationImportance {
    n_repeats: usize,
    seed: u64,
}

impl PermutationImportance {
    /// * `n_repeats` - Shuffles per feature.
    /// * `seed` - Base seed; each (repeat, feature) pair draws from its own stream.
    pub fn new(n_repeats: usize, seed: u64) -> Result<Self, KnnError> {
        validate_count_parameter(n_repeats, 1, "n_repeats")?;
        Ok(PermutationImportance { n_repeats, seed })
    }

    /// Compute degraded MSE for every feature group.
    ///
    /// Only the rows of `x.index` are used. The model and `x` are left untouched;
    /// shuffles act on a copy.
    ///
    /// * `model` - Fitted regressor.
    /// * `x` - Features, in the layout the model was fit on.
    /// * `y` - Targets, indexed like `x`.
    /// * `groups` - Column groups to permute.
    pub fn compute(
        &self,
        model: &KnnRegressor,
        x: &Matrix<f64>,
        y: &[f64],
        groups: &[FeatureGroup],
    ) -> Result<ImportanceReport, KnnError> {
        if y.len() != x.rows {
            return Err(KnnError::Schema(format!(
                "Target has {} values but the feature matrix has {} rows.",
                y.len(),
                x.rows
            )));
        }
        if let Some(g) = groups.iter().find(|g| g.columns.end > x.cols || g.columns.is_empty()) {
            return Err(KnnError::Schema(format!(
                "Feature {} spans columns {:?}, the matrix has {}.",
                g.name, g.columns, x.cols
            )));
        }

        // Compact copy of the selected rows, column major.
        let rows = x.index.len();
        let mut base = Vec::with_capacity(rows * x.cols);
        for j in 0..x.cols {
            base.extend(x.index.iter().map(|&r| *x.get(r, j)));
        }
        let actual: Vec<f64> = x.index.iter().map(|&r| y[r]).collect();
        let baseline_mse = mean_squared_error(&actual, &model.predict(&Matrix::new(&base, rows, x.cols))?);

        let units: Vec<(usize, usize)> = (0..groups.len())
            .flat_map(|g| (0..self.n_repeats).map(move |r| (g, r)))
            .collect();
        let losses: Vec<f64> = units
            .par_iter()
            .map(|&(g, r)| -> Result<f64, KnnError> {
                let group = &groups[g];
                let mut rng = StdRng::seed_from_u64(derive_seed(self.seed, r as u64, g as u64));
                let mut perm: Vec<usize> = (0..rows).collect();
                perm.shuffle(&mut rng);
                let mut shuffled = base.clone();
                for j in group.columns.clone() {
                    let col = &base[j * rows..(j + 1) * rows];
                    for (dst, &src) in shuffled[j * rows..(j + 1) * rows].iter_mut().zip(&perm) {
                        *dst = col[src];
                    }
                }
                let preds = model.predict(&Matrix::new(&shuffled, rows, x.cols))?;
                Ok(mean_squared_error(&actual, &preds))
            })
            .collect::<Result<Vec<f64>, KnnError>>()?;

        let features: Vec<FeatureImportance> = groups
            .iter()
            .enumerate()
            .map(|(g, group)| {
                let l = losses[g * self.n_repeats..(g + 1) * self.n_repeats].to_vec();
                FeatureImportance {
                    name: group.name.clone(),
                    mean_loss: mean(&l),
                    losses: l,
                }
            })
            .collect();
        info!(
            "Permutation importance over {} features with {} repeats, baseline MSE {:.6}.",
            features.len(),
            self.n_repeats,
            baseline_mse
        );
        Ok(ImportanceReport { baseline_mse, features })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Column 0 drives the target, column 1 is unrelated noise.
    fn signal_and_noise(n: usize) -> (Vec<f64>, Vec<f64>) {
        let mut rng = StdRng::seed_from_u64(5);
        let mut noise: Vec<f64> = (0..n).map(|i| i as f64 / n as f64).collect();
        noise.shuffle(&mut rng);
        let signal: Vec<f64> = (0..n).map(|i| i as f64 / n as f64).collect();
        let y: Vec<f64> = signal.iter().map(|s| 10.0 * s).collect();
        let mut x = signal;
        x.extend(noise);
        (x, y)
    }

    #[test]
    fn test_signal_outranks_noise() {
        let n = 200;
        let (x, y) = signal_and_noise(n);
        let m = Matrix::new(&x, n, 2);
        let model = KnnRegressor::fit(&m, &y, 5).unwrap();
        let names = vec!["signal".to_string(), "noise".to_string()];
        let report = PermutationImportance::new(10, 42)
            .unwrap()
            .compute(&model, &m, &y, &single_column_groups(&names))
            .unwrap();
        let ranking: Vec<&str> = report.ranking().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(ranking, vec!["noise", "signal"]);
        let signal = report.get("signal").unwrap();
        let noise = report.get("noise").unwrap();
        assert_eq!(signal.losses.len(), 10);
        assert!(signal.increase_over(report.baseline_mse) > 10.0 * noise.increase_over(report.baseline_mse));
    }

    #[test]
    fn test_noise_feature_stays_near_baseline() {
        // Noise on the same scale as the signal; the target depends on the signal only.
        let n = 400;
        let (x, y) = signal_and_noise(n);
        let m = Matrix::new(&x, n, 2);
        let model = KnnRegressor::fit(&m, &y, 5).unwrap();
        let names = vec!["signal".to_string(), "noise".to_string()];
        let report = PermutationImportance::new(30, 7)
            .unwrap()
            .compute(&model, &m, &y, &single_column_groups(&names))
            .unwrap();
        let noise = report.get("noise").unwrap();
        let signal = report.get("signal").unwrap();
        assert_eq!(noise.losses.len(), 30);
        assert!(noise.increase_over(report.baseline_mse).abs() < 0.01 * signal.increase_over(report.baseline_mse));
    }

    #[test]
    fn test_reproducible_and_input_untouched() {
        let n = 50;
        let (x, y) = signal_and_noise(n);
        let x_before = x.clone();
        let m = Matrix::new(&x, n, 2);
        let model = KnnRegressor::fit(&m, &y, 3).unwrap();
        let groups = single_column_groups(&["a".to_string(), "b".to_string()]);
        let pi = PermutationImportance::new(4, 9).unwrap();
        let first = pi.compute(&model, &m, &y, &groups).unwrap();
        let second = pi.compute(&model, &m, &y, &groups).unwrap();
        assert_eq!(first, second);
        assert_eq!(x, x_before);
        // Different repeats draw different permutations.
        let a = &first.get("a").unwrap().losses;
        assert!(a.iter().any(|l| *l != a[0]));
    }

    #[test]
    fn test_grouped_columns_and_map() {
        let n = 30;
        let (x, y) = signal_and_noise(n);
        let m = Matrix::new(&x, n, 2);
        let model = KnnRegressor::fit(&m, &y, 2).unwrap();
        let groups = vec![FeatureGroup {
            name: "both".to_string(),
            columns: 0..2,
        }];
        let report = PermutationImportance::new(3, 1)
            .unwrap()
            .compute(&model, &m, &y, &groups)
            .unwrap();
        let map = report.as_map();
        assert_eq!(map.len(), 2);
        assert_eq!(map[FULL_MODEL_LABEL], vec![report.baseline_mse]);
        assert_eq!(map["both"].len(), 3);
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(matches!(PermutationImportance::new(0, 1), Err(KnnError::InvalidParameter(_, _, _))));
        let x = vec![0.0, 1.0, 2.0];
        let y = vec![0.0, 1.0, 2.0];
        let m = Matrix::new(&x, 3, 1);
        let model = KnnRegressor::fit(&m, &y, 1).unwrap();
        let groups = vec![FeatureGroup {
            name: "missing".to_string(),
            columns: 1..2,
        }];
        let pi = PermutationImportance::new(2, 1).unwrap();
        assert!(matches!(pi.compute(&model, &m, &y, &groups), Err(KnnError::Schema(_))));
    }
}
