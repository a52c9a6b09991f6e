// Modules
pub mod config;
pub mod constants;
pub mod data;
pub mod errors;
pub mod estimate;
pub mod importance;
pub mod knn;
pub mod metric;
pub mod pipeline;
pub mod preprocessing;
pub mod table;
pub mod utils;
pub mod validation;

// Individual classes, and functions
pub use config::{ConfigIO, PipelineConfig, PreprocessorConfig};
pub use data::Matrix;
pub use errors::KnnError;
pub use estimate::ErrorEstimator;
pub use importance::{ImportanceReport, PermutationImportance};
pub use knn::KnnRegressor;
pub use pipeline::{CapacityPipeline, PipelineResult};
pub use preprocessing::FeaturePreprocessor;
pub use table::RawTable;
pub use validation::{CrossValidator, CvTable};
