//! Pipeline
//!
//! Composes preprocessing, the cross-validated search over `k`, the final fit,
//! permutation importance and the error estimate. Each stage takes the previous
//! stage's output by reference and nothing is shared between stages.
use crate::config::PipelineConfig;
use crate::errors::KnnError;
use crate::estimate::ErrorEstimator;
use crate::importance::{ImportanceReport, PermutationImportance};
use crate::knn::KnnRegressor;
use crate::preprocessing::{FeaturePreprocessor, PreprocessingParams};
use crate::table::RawTable;
use crate::validation::{CrossValidator, CvTable};
use log::info;
use std::time::Instant;

/// Everything the pipeline produces.
#[derive(Debug, Clone)]
pub struct PipelineResult {
    /// One prediction per test row, in test order.
    pub predictions: Vec<f64>,
    pub cv_table: CvTable,
    pub best_k: usize,
    pub importance: ImportanceReport,
    /// Mean cross-validated MSE over the whole grid.
    pub error_estimate: f64,
    /// Model refit on every training row with `best_k`.
    pub model: KnnRegressor,
    pub params: PreprocessingParams,
}

pub struct CapacityPipeline {
    config: PipelineConfig,
}

impl CapacityPipeline {
    /// Create a pipeline, rejecting an invalid configuration up front.
    pub fn new(config: PipelineConfig) -> Result<Self, KnnError> {
        config.validate()?;
        Ok(CapacityPipeline { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every stage on a training and a test table.
    pub fn run(&self, train: &RawTable, test: &RawTable) -> Result<PipelineResult, KnnError> {
        match self.config.num_threads {
            Some(n) => rayon::ThreadPoolBuilder::new()
                .num_threads(n)
                .build()
                .map_err(|e| {
                    KnnError::InvalidParameter("num_threads".to_string(), "a usable pool size".to_string(), e.to_string())
                })?
                .install(|| self.run_stages(train, test)),
            None => self.run_stages(train, test),
        }
    }

    fn run_stages(&self, train: &RawTable, test: &RawTable) -> Result<PipelineResult, KnnError> {
        let cfg = &self.config;
        let start = Instant::now();

        let preprocessor = FeaturePreprocessor::new(cfg.preprocessing.clone())?;
        let (train_data, params) = preprocessor.fit_transform(train)?;
        let test_data = preprocessor.transform(test, &params)?;
        let x = train_data.matrix();
        let y = train_data.target()?;

        let validator = CrossValidator::new(cfg.n_folds, cfg.seed)?;
        let cv_table = validator.grid_search(&x, y, &cfg.k_values)?;
        let best_k = CrossValidator::select_best(&cv_table)?;
        info!(
            "Selected k = {} with cross-validated MSE {:.6}.",
            best_k,
            cv_table.mse(best_k).unwrap_or(f64::NAN)
        );

        let model = KnnRegressor::fit(&x, y, best_k)?;
        let predictions = model.predict(&test_data.matrix())?;

        let importance =
            PermutationImportance::new(cfg.n_repeats, cfg.seed)?.compute(&model, &x, y, &train_data.groups)?;
        let error_estimate = ErrorEstimator::estimate(&cv_table)?;
        info!(
            "Pipeline finished in {:.2}s, estimated generalization MSE {:.6}.",
            start.elapsed().as_secs_f64(),
            error_estimate
        );

        Ok(PipelineResult {
            predictions,
            cv_table,
            best_k,
            importance,
            error_estimate,
            model,
            params,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PreprocessorConfig;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    // Synthetic turbines: capacity follows rotor swept area, retrofit adds a bump,
    // latitude is noise.
    fn turbines(n: usize, seed: u64, with_target: bool) -> RawTable {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut rsa = Vec::with_capacity(n);
        let mut ylat = Vec::with_capacity(n);
        let mut retrofit = Vec::with_capacity(n);
        let mut cap = Vec::with_capacity(n);
        for _ in 0..n {
            let area: f64 = rng.gen_range(2000.0..12000.0);
            let r = rng.gen_bool(0.2);
            rsa.push(Some(area));
            ylat.push(Some(rng.gen_range(25.0..49.0)));
            retrofit.push(Some(if r { "1" } else { "0" }.to_string()));
            cap.push(Some(0.25 * area + if r { 300.0 } else { 0.0 }));
        }
        let table = RawTable::new()
            .with_numeric("t_rsa", rsa)
            .unwrap()
            .with_numeric("ylat", ylat)
            .unwrap()
            .with_text("retrofit", retrofit)
            .unwrap()
            .with_numeric("t_manu_notes", vec![None; n])
            .unwrap();
        if with_target {
            table.with_numeric("t_cap", cap).unwrap()
        } else {
            table
        }
    }

    fn config() -> PipelineConfig {
        PipelineConfig::default()
            .set_preprocessing(PreprocessorConfig {
                numeric_features: vec!["t_rsa".to_string(), "ylat".to_string()],
                ..PreprocessorConfig::default()
            })
            .set_n_folds(5)
            .set_k_values((1..=8).collect())
            .set_n_repeats(5)
    }

    #[test]
    fn test_pipeline_end_to_end() {
        let train = turbines(150, 1, true);
        let test = turbines(20, 2, false);
        let result = CapacityPipeline::new(config()).unwrap().run(&train, &test).unwrap();

        assert_eq!(result.predictions.len(), 20);
        assert!(result.predictions.iter().all(|p| p.is_finite()));
        assert_eq!(result.cv_table.len(), 8);
        assert!((1..=8).contains(&result.best_k));
        assert_eq!(result.model.k(), result.best_k);
        assert_eq!(result.model.n_train(), 150);
        assert!(result.params.dropped_columns.contains(&"t_manu_notes".to_string()));

        let expected = result.cv_table.entries.iter().map(|e| e.mse).sum::<f64>() / 8.0;
        assert_eq!(result.error_estimate, expected);

        let names: Vec<&str> = result.importance.features.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["t_rsa", "ylat", "retrofit"]);
        let ranking = result.importance.ranking();
        assert_eq!(ranking.last().unwrap().name, "t_rsa");
    }

    #[test]
    fn test_pipeline_is_reproducible() {
        let train = turbines(80, 3, true);
        let test = turbines(10, 4, false);
        let cfg = config().set_num_threads(Some(2));
        let a = CapacityPipeline::new(cfg.clone()).unwrap().run(&train, &test).unwrap();
        let b = CapacityPipeline::new(cfg.set_num_threads(Some(1)))
            .unwrap()
            .run(&train, &test)
            .unwrap();
        assert_eq!(a.predictions, b.predictions);
        assert_eq!(a.cv_table, b.cv_table);
        assert_eq!(a.importance, b.importance);
    }

    #[test]
    fn test_invalid_config_fails_fast() {
        let cfg = config().set_k_values(Vec::new());
        assert!(matches!(CapacityPipeline::new(cfg), Err(KnnError::InvalidParameter(_, _, _))));
    }

    #[test]
    fn test_test_table_missing_column() {
        let train = turbines(50, 5, true);
        let test = RawTable::new().with_numeric("t_rsa", vec![Some(1.0)]).unwrap();
        let res = CapacityPipeline::new(config()).unwrap().run(&train, &test);
        assert!(matches!(res, Err(KnnError::Schema(_))));
    }
}
