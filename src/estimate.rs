//! Error Estimate
//!
//! Generalization error is the mean cross-validated MSE over every evaluated
//! neighbor count, not the error at the selected count alone. The result does not
//! depend on which `k` won the search.
use crate::errors::KnnError;
use crate::validation::CvTable;

pub struct ErrorEstimator;

impl ErrorEstimator {
    /// Mean of the MSE values of every evaluated `k`.
    pub fn estimate(table: &CvTable) -> Result<f64, KnnError> {
        if table.is_empty() {
            return Err(KnnError::InvalidParameter(
                "cv_table".to_string(),
                "at least one evaluated k".to_string(),
                "an empty table".to_string(),
            ));
        }
        Ok(table.entries.iter().map(|e| e.mse).sum::<f64>() / table.len() as f64)
    }

    /// The estimate in target units.
    pub fn estimate_rmse(table: &CvTable) -> Result<f64, KnnError> {
        Ok(Self::estimate(table)?.sqrt())
    }
}
