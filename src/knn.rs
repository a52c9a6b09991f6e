//! K-Nearest-Neighbors Regressor
//!
//! A lazy, brute force regressor: fitting copies the training rows, and each
//! prediction averages the targets of the `k` training rows closest to the query
//! under Euclidean distance. Equal distances are ordered by training row position,
//! which makes the neighbor set, and so every prediction, deterministic.
use crate::data::{Matrix, RowMajorMatrix};
use crate::errors::KnnError;
use rayon::prelude::*;
use std::cmp::Ordering;

/// A training row near a query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Position of the row in the fitted training data.
    pub index: usize,
    pub distance: f64,
}

fn neighbor_order(a: &Neighbor, b: &Neighbor) -> Ordering {
    a.distance.total_cmp(&b.distance).then(a.index.cmp(&b.index))
}

#[inline]
fn euclidean_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum::<f64>().sqrt()
}

/// Fitted KNN regressor. Immutable once fit.
#[derive(Debug, Clone)]
pub struct KnnRegressor {
    train: RowMajorMatrix<f64>,
    labels: Vec<f64>,
    k: usize,
}

impl KnnRegressor {
    /// Fit the model on the rows selected by `x.index`.
    ///
    /// * `x` - Training features; only the rows in its index are stored.
    /// * `y` - Targets for every row of `x`, indexed like `x`.
    /// * `k` - Number of neighbors, between 1 and the number of selected rows.
    pub fn fit(x: &Matrix<f64>, y: &[f64], k: usize) -> Result<Self, KnnError> {
        if y.len() != x.rows {
            return Err(KnnError::Schema(format!(
                "Target has {} values but the feature matrix has {} rows.",
                y.len(),
                x.rows
            )));
        }
        let n = x.n_selected();
        if k < 1 || k > n {
            return Err(KnnError::InvalidParameter(
                "k".to_string(),
                format!("an integer within range 1 and {}", n),
                k.to_string(),
            ));
        }
        Ok(KnnRegressor {
            train: RowMajorMatrix::from_matrix(x),
            labels: x.index.iter().map(|&i| y[i]).collect(),
            k,
        })
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn n_train(&self) -> usize {
        self.labels.len()
    }

    pub fn n_features(&self) -> usize {
        self.train.cols
    }

    pub fn labels(&self) -> &[f64] {
        &self.labels
    }

    /// The `k` nearest training rows to `row`, closest first.
    ///
    /// `k` is capped at the number of training rows.
    pub fn kneighbors(&self, row: &[f64], k: usize) -> Vec<Neighbor> {
        let mut neighbors: Vec<Neighbor> = (0..self.train.rows)
            .map(|i| Neighbor {
                index: i,
                distance: euclidean_distance(row, self.train.get_row(i)),
            })
            .collect();
        let k = k.min(neighbors.len());
        if k == 0 {
            return Vec::new();
        }
        if k < neighbors.len() {
            neighbors.select_nth_unstable_by(k - 1, neighbor_order);
            neighbors.truncate(k);
        }
        neighbors.sort_unstable_by(neighbor_order);
        neighbors
    }

    fn check_query(&self, x: &Matrix<f64>) -> Result<(), KnnError> {
        if x.cols != self.train.cols {
            return Err(KnnError::Schema(format!(
                "Query has {} features but the model was fit on {}.",
                x.cols, self.train.cols
            )));
        }
        Ok(())
    }

    /// Predict every row selected by `x.index`, in index order.
    pub fn predict(&self, x: &Matrix<f64>) -> Result<Vec<f64>, KnnError> {
        self.check_query(x)?;
        let k = self.k;
        Ok(x.index
            .par_iter()
            .map(|&r| {
                let sum = self
                    .kneighbors(&x.get_row(r), k)
                    .iter()
                    .map(|n| self.labels[n.index])
                    .fold(0.0, |acc, v| acc + v);
                sum / k as f64
            })
            .collect())
    }

    /// Predict with several neighbor counts from a single neighbor search per row.
    ///
    /// Returns one prediction vector per entry of `ks`. Each vector is identical to what
    /// `predict` returns for a model fit with that `k`.
    pub fn predict_for_ks(&self, x: &Matrix<f64>, ks: &[usize]) -> Result<Vec<Vec<f64>>, KnnError> {
        self.check_query(x)?;
        let n = self.n_train();
        if let Some(&bad) = ks.iter().find(|&&k| k < 1 || k > n) {
            return Err(KnnError::InvalidParameter(
                "k".to_string(),
                format!("an integer within range 1 and {}", n),
                bad.to_string(),
            ));
        }
        let k_max = ks.iter().copied().max().unwrap_or(0);
        let per_row: Vec<Vec<f64>> = x
            .index
            .par_iter()
            .map(|&r| {
                let neighbors = self.kneighbors(&x.get_row(r), k_max);
                let mut prefix = Vec::with_capacity(neighbors.len());
                let mut acc = 0.0;
                for nb in &neighbors {
                    acc += self.labels[nb.index];
                    prefix.push(acc);
                }
                ks.iter().map(|&k| prefix[k - 1] / k as f64).collect()
            })
            .collect();
        Ok((0..ks.len())
            .map(|j| per_row.iter().map(|p| p[j]).collect())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_fit_rejects_bad_k() {
        let x = vec![1.0, 2.0, 3.0];
        let m = Matrix::new(&x, 3, 1);
        let y = vec![1.0, 2.0, 3.0];
        assert!(matches!(KnnRegressor::fit(&m, &y, 0), Err(KnnError::InvalidParameter(_, _, _))));
        assert!(matches!(KnnRegressor::fit(&m, &y, 4), Err(KnnError::InvalidParameter(_, _, _))));
        assert!(matches!(KnnRegressor::fit(&m, &y[..2], 1), Err(KnnError::Schema(_))));
        assert!(KnnRegressor::fit(&m, &y, 3).is_ok());
    }

    #[test]
    fn test_k1_recovers_training_label() {
        // Single feature equal to the target.
        let x: Vec<f64> = (0..20).map(|i| i as f64 * 1.5).collect();
        let y = x.clone();
        let m = Matrix::new(&x, 20, 1);
        let model = KnnRegressor::fit(&m, &y, 1).unwrap();
        let q = vec![x[7]];
        let preds = model.predict(&Matrix::new(&q, 1, 1)).unwrap();
        assert_eq!(preds, vec![y[7]]);
    }

    #[test]
    fn test_k1_exact_row_multi_feature() {
        // Column major, 4 rows, 2 features.
        let x = vec![0.0, 1.0, 5.0, 9.0, 2.0, -1.0, 3.0, 0.5];
        let y = vec![10.0, 20.0, 30.0, 40.0];
        let model = KnnRegressor::fit(&Matrix::new(&x, 4, 2), &y, 1).unwrap();
        let q = vec![5.0, 3.0];
        assert_eq!(model.predict(&Matrix::new(&q, 1, 2)).unwrap(), vec![30.0]);
    }

    #[test]
    fn test_k_equals_n_is_constant() {
        let x = vec![0.0, 1.0, 5.0, 9.0, 2.0, -1.0, 3.0, 0.5];
        let y = vec![10.0, 20.0, 30.0, 45.0];
        let model = KnnRegressor::fit(&Matrix::new(&x, 4, 2), &y, 4).unwrap();
        let q = vec![100.0, -3.0, 0.0, 7.0, 2.0, 8.0];
        let preds = model.predict(&Matrix::new(&q, 3, 2)).unwrap();
        for p in preds {
            assert_relative_eq!(p, 26.25);
        }
    }

    #[test]
    fn test_ties_break_on_lowest_index() {
        // Rows 1 and 2 are both at distance 1 from the query.
        let x = vec![10.0, -1.0, 1.0, 5.0];
        let y = vec![0.0, 100.0, 200.0, 300.0];
        let model = KnnRegressor::fit(&Matrix::new(&x, 4, 1), &y, 1).unwrap();
        let q = vec![0.0];
        assert_eq!(model.predict(&Matrix::new(&q, 1, 1)).unwrap(), vec![100.0]);
        let neighbors = model.kneighbors(&q, 3);
        let order: Vec<usize> = neighbors.iter().map(|n| n.index).collect();
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[test]
    fn test_zero_features() {
        let x: Vec<f64> = Vec::new();
        let y = vec![1.0, 2.0, 3.0, 4.0];
        let model = KnnRegressor::fit(&Matrix::new(&x, 4, 0), &y, 2).unwrap();
        let q: Vec<f64> = Vec::new();
        let preds = model.predict(&Matrix::new(&q, 2, 0)).unwrap();
        assert_eq!(preds, vec![1.5, 1.5]);
    }

    #[test]
    fn test_fit_uses_index() {
        let x = vec![0.0, 1.0, 2.0, 3.0];
        let y = vec![0.0, 10.0, 20.0, 30.0];
        let m = Matrix::with_index(&x, 4, 1, vec![3, 1]);
        let model = KnnRegressor::fit(&m, &y, 1).unwrap();
        assert_eq!(model.n_train(), 2);
        assert_eq!(model.labels(), &[30.0, 10.0]);
        let q = vec![0.2];
        assert_eq!(model.predict(&Matrix::new(&q, 1, 1)).unwrap(), vec![10.0]);
    }

    #[test]
    fn test_query_dimension_mismatch() {
        let x = vec![0.0, 1.0];
        let y = vec![0.0, 1.0];
        let model = KnnRegressor::fit(&Matrix::new(&x, 2, 1), &y, 1).unwrap();
        let q = vec![0.0, 1.0];
        assert!(matches!(model.predict(&Matrix::new(&q, 1, 2)), Err(KnnError::Schema(_))));
    }

    #[test]
    fn test_predict_for_ks_matches_predict() {
        let n = 30;
        let x: Vec<f64> = (0..n * 2).map(|i| ((i * 37) % 11) as f64 * 0.3).collect();
        let y: Vec<f64> = (0..n).map(|i| ((i * 13) % 7) as f64 + 0.1 * i as f64).collect();
        let m = Matrix::new(&x, n, 2);
        let q: Vec<f64> = (0..10).map(|i| i as f64 * 0.25).collect();
        let qm = Matrix::new(&q, 5, 2);
        let ks = vec![1, 3, 7, 30];
        let model = KnnRegressor::fit(&m, &y, 30).unwrap();
        let many = model.predict_for_ks(&qm, &ks).unwrap();
        for (j, &k) in ks.iter().enumerate() {
            let single = KnnRegressor::fit(&m, &y, k).unwrap().predict(&qm).unwrap();
            assert_eq!(many[j], single);
        }
        assert!(model.predict_for_ks(&qm, &[31]).is_err());
    }
}
