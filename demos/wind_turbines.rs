//! Wind Turbine Capacity – KNN with Cross-Validated K
//! ===================================================
//! Predict turbine capacity (`t_cap`, kW) from rotor swept area, hub height,
//! year operational, total height, location and the retrofit flag. The
//! neighbor count is chosen by 10-fold cross-validation over K = 1..20, then
//! permutation importance and a grid-averaged error estimate are reported.
//!
//! Settings can be overridden with `TURBINE_KNN_SEED`, `TURBINE_KNN_FOLDS`,
//! `TURBINE_KNN_K_MIN`, `TURBINE_KNN_K_MAX`, `TURBINE_KNN_REPEATS` and
//! `TURBINE_KNN_THREADS`.
//!
//! ```bash
//! cargo run --release --example wind_turbines -- train.csv test.csv [predictions.csv]
//! ```

use std::env;
use std::error::Error;
use std::fs::File;
use turbine_knn::constants::{FULL_MODEL_LABEL, TARGET_COLUMN};
use turbine_knn::table::write_column_csv;
use turbine_knn::utils::fmt_vec_output;
use turbine_knn::{CapacityPipeline, PipelineConfig, RawTable};

fn main() -> Result<(), Box<dyn Error>> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        eprintln!("usage: {} <train.csv> <test.csv> [predictions.csv]", args[0]);
        std::process::exit(2);
    }

    // ------------------------------------------------------------------
    // 1. Load tables and configuration
    // ------------------------------------------------------------------
    let train = RawTable::from_csv_path(&args[1])?;
    let test = RawTable::from_csv_path(&args[2])?;
    println!("Train: {} rows x {} columns", train.n_rows(), train.n_cols());
    println!("Test:  {} rows x {} columns", test.n_rows(), test.n_cols());

    let config = PipelineConfig::default().with_env_overrides()?;

    // ------------------------------------------------------------------
    // 2. Run the pipeline
    // ------------------------------------------------------------------
    let result = CapacityPipeline::new(config)?.run(&train, &test)?;

    if !result.params.dropped_columns.is_empty() {
        println!(
            "\nDropped mostly-missing columns: {}",
            result.params.dropped_columns.join(", ")
        );
    }

    // ------------------------------------------------------------------
    // 3. Report
    // ------------------------------------------------------------------
    println!("\n{:>4}  {:>14}  {:>10}", "K", "CV MSE", "CV RMSE");
    for e in &result.cv_table.entries {
        let marker = if e.k == result.best_k { " <-" } else { "" };
        println!("{:>4}  {:>14.2}  {:>10.2}{}", e.k, e.mse, e.rmse, marker);
    }
    if !result.cv_table.skipped.is_empty() {
        println!("Skipped K: {:?}", result.cv_table.skipped);
    }

    println!("\nPermutation importance (mean MSE after shuffling, most important last):");
    println!("  {:<14} {:>14.2}", FULL_MODEL_LABEL, result.importance.baseline_mse);
    for f in result.importance.ranking() {
        println!("  {:<14} {:>14.2}  [{}]", f.name, f.mean_loss, fmt_vec_output(&f.losses));
    }

    println!(
        "\nEstimated generalization MSE: {:.2} (RMSE {:.2})",
        result.error_estimate,
        result.error_estimate.sqrt()
    );

    // ------------------------------------------------------------------
    // 4. Predictions
    // ------------------------------------------------------------------
    match args.get(3) {
        Some(path) => {
            write_column_csv(File::create(path)?, TARGET_COLUMN, &result.predictions)?;
            println!("Wrote {} predictions to {}", result.predictions.len(), path);
        }
        None => {
            let head: Vec<f64> = result.predictions.iter().take(10).copied().collect();
            println!("First predictions: {}", fmt_vec_output(&head));
        }
    }

    Ok(())
}
