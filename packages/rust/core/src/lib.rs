//! Pipeline stages and orchestration for diagflow.
//!
//! Each stage reads its inputs from an [`diagflow_storage::ArtifactStore`]
//! and writes exactly one new generation of its outputs:
//! ingest → preprocess → train → evaluate → export.
//! [`pipeline::run_pipeline`] chains them with a bounded retry policy.

pub mod evaluate;
pub mod export;
pub mod ingest;
pub mod pipeline;
pub mod preprocess;
pub mod remote;
pub mod sample;
pub mod train;

pub use evaluate::{EvaluateOutput, evaluate};
pub use export::{DeliveredArtifact, ExportConfig, ExportMode, export};
pub use ingest::ingest;
pub use pipeline::{
    PipelineConfig, PipelineError, PipelineReport, ProgressReporter, RetryPolicy, SilentProgress,
    run_pipeline,
};
pub use preprocess::{PreprocessOutput, preprocess};
pub use remote::{HttpObjectUploader, ObjectUploader};
pub use train::{TrainOutput, TrainingWarning, train};
