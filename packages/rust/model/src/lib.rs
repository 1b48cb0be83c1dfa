//! Feature scaling, classification and evaluation for diagflow.

pub mod artifact;
pub mod classifier;
pub mod codec;
pub mod metrics;
pub mod scaler;
pub mod split;

pub use artifact::{TrainedModel, TrainingMetadata};
pub use classifier::{Classifier, FitReport, LogisticRegression, SolverConfig};
pub use metrics::{ClassReport, ConfusionMatrix, MetricsReport, format_classification_report};
pub use scaler::ScalerModel;
pub use split::{StratifiedSplit, stratified_split, test_size};
