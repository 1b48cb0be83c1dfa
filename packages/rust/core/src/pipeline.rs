//! End-to-end run: ingest → preprocess → train → evaluate → export.

use std::future::Future;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use diagflow_shared::{
    AppConfig, ArtifactKey, ArtifactLocation, DiagflowError, PreprocessConfig, RunId, StageName,
    TrainingConfig,
};
use diagflow_storage::ArtifactStore;
use tracing::{error, info, instrument, warn};

use crate::evaluate::{EvaluateOutput, evaluate};
use crate::export::{DeliveredArtifact, ExportConfig, export};
use crate::ingest::ingest;
use crate::preprocess::{PreprocessOutput, preprocess};
use crate::remote::ObjectUploader;
use crate::train::{TrainOutput, train};

/// Bounded retry for transient stage failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first.
    pub retries: u32,
    /// Wait before each retry.
    pub delay: Duration,
}

impl RetryPolicy {
    /// Run every stage exactly once.
    pub fn none() -> Self {
        Self {
            retries: 0,
            delay: Duration::ZERO,
        }
    }
}

impl From<&AppConfig> for RetryPolicy {
    fn from(config: &AppConfig) -> Self {
        Self {
            retries: config.orchestrator.retries,
            delay: Duration::from_secs(config.orchestrator.retry_delay_secs),
        }
    }
}

/// Everything a full run needs.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// External headerless source; `None` selects the synthetic sample.
    pub source: Option<PathBuf>,
    pub preprocess: PreprocessConfig,
    pub training: TrainingConfig,
    pub export: ExportConfig,
    pub retry: RetryPolicy,
}

impl From<&AppConfig> for PipelineConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            source: config.paths.source_csv.as_ref().map(PathBuf::from),
            preprocess: PreprocessConfig::from(config),
            training: TrainingConfig::from(config),
            export: ExportConfig::from(config),
            retry: RetryPolicy::from(config),
        }
    }
}

/// A stage failure that stopped the run.
#[derive(Debug, thiserror::Error)]
#[error("stage {stage} failed with {kind} after {attempts} attempt(s): {source}", kind = .source.kind())]
pub struct PipelineError {
    pub stage: StageName,
    pub attempts: u32,
    #[source]
    pub source: DiagflowError,
}

/// Outputs of a successful run.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub run_id: RunId,
    pub raw: ArtifactLocation,
    pub preprocess: PreprocessOutput,
    pub train: TrainOutput,
    pub evaluate: EvaluateOutput,
    pub delivered: Vec<DeliveredArtifact>,
    pub elapsed: Duration,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when a stage starts its first attempt.
    fn stage_started(&self, stage: StageName);
    /// Called before a transient failure is retried.
    fn stage_retrying(&self, stage: StageName, attempt: u32, error: &DiagflowError);
    /// Called when a stage has written its primary output.
    fn stage_finished(&self, stage: StageName, location: &ArtifactLocation);
    /// Called when the run completes.
    fn done(&self, report: &PipelineReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn stage_started(&self, _stage: StageName) {}
    fn stage_retrying(&self, _stage: StageName, _attempt: u32, _error: &DiagflowError) {}
    fn stage_finished(&self, _stage: StageName, _location: &ArtifactLocation) {}
    fn done(&self, _report: &PipelineReport) {}
}

/// Run the five stages in order, stopping at the first failure.
///
/// Transient failures (`Io`, `Network`) are retried up to
/// `config.retry.retries` times; anything else halts the run immediately.
#[instrument(skip_all, fields(run_id = tracing::field::Empty))]
pub async fn run_pipeline<U: ObjectUploader>(
    store: &dyn ArtifactStore,
    config: &PipelineConfig,
    uploader: &U,
    progress: &dyn ProgressReporter,
) -> std::result::Result<PipelineReport, PipelineError> {
    let start = Instant::now();
    let run_id = RunId::new();
    tracing::Span::current().record("run_id", tracing::field::display(&run_id));
    info!(%run_id, "starting pipeline run");

    let retry = &config.retry;
    let source = config.source.as_deref();
    let raw_key = &ArtifactKey::raw_dataset();
    let clean_key = &ArtifactKey::clean_dataset();
    let model_key = &ArtifactKey::model();
    let held_out_key = &ArtifactKey::held_out();

    let raw = run_stage(StageName::Ingest, retry, progress, move || async move {
        ingest(store, source)
    })
    .await?;
    progress.stage_finished(StageName::Ingest, &raw);

    let preprocessed = run_stage(StageName::Preprocess, retry, progress, move || async move {
        preprocess(store, raw_key, &config.preprocess)
    })
    .await?;
    progress.stage_finished(StageName::Preprocess, &preprocessed.clean);

    let trained = run_stage(StageName::Train, retry, progress, move || async move {
        train(store, clean_key, &config.training)
    })
    .await?;
    progress.stage_finished(StageName::Train, &trained.model);

    let evaluated = run_stage(StageName::Evaluate, retry, progress, move || async move {
        evaluate(store, model_key, held_out_key)
    })
    .await?;
    progress.stage_finished(StageName::Evaluate, &evaluated.metrics);

    let delivered = run_stage(StageName::Export, retry, progress, move || async move {
        export(store, &config.export, uploader).await
    })
    .await?;
    if let Some(first) = delivered.first() {
        progress.stage_finished(StageName::Export, &first.location);
    }

    let report = PipelineReport {
        run_id,
        raw,
        preprocess: preprocessed,
        train: trained,
        evaluate: evaluated,
        delivered,
        elapsed: start.elapsed(),
    };
    info!(
        accuracy = report.evaluate.report.accuracy,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "pipeline complete"
    );
    progress.done(&report);
    Ok(report)
}

/// Run one stage under the retry policy.
async fn run_stage<T, F, Fut>(
    stage: StageName,
    policy: &RetryPolicy,
    progress: &dyn ProgressReporter,
    mut attempt_once: F,
) -> std::result::Result<T, PipelineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = diagflow_shared::Result<T>>,
{
    progress.stage_started(stage);
    let mut attempt = 1;
    loop {
        match attempt_once().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt <= policy.retries => {
                warn!(
                    %stage,
                    attempt,
                    error = %e,
                    delay_secs = policy.delay.as_secs(),
                    "transient failure, retrying"
                );
                progress.stage_retrying(stage, attempt, &e);
                tokio::time::sleep(policy.delay).await;
                attempt += 1;
            }
            Err(source) => {
                error!(%stage, kind = source.kind(), attempts = attempt, error = %source, "stage failed");
                return Err(PipelineError {
                    stage,
                    attempts: attempt,
                    source,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use diagflow_dataset::{FEATURE_NAMES, Table};
    use diagflow_model::MetricsReport;
    use diagflow_storage::{FsArtifactStore, MemoryArtifactStore};

    use crate::export::tests::RecordingUploader;

    fn temp_path(label: &str) -> PathBuf {
        std::env::temp_dir().join(format!("diagflow-{label}-{}", uuid::Uuid::now_v7()))
    }

    /// Headerless 32-column file: 12 benign then 8 malignant, far apart on every feature.
    fn write_synthetic_source(path: &std::path::Path, label_for: impl Fn(usize) -> &'static str) {
        let mut out = String::new();
        for i in 0..20 {
            let label = label_for(i);
            let base = if label == "M" { 20.0 } else { 10.0 };
            out.push_str(&format!("{},{label}", 9000 + i));
            for j in 0..30 {
                out.push_str(&format!(",{}", base + j as f64 + 0.1 * (i % 7) as f64));
            }
            out.push('\n');
        }
        std::fs::write(path, out).unwrap();
    }

    fn separable_label(i: usize) -> &'static str {
        if i < 12 { "B" } else { "M" }
    }

    fn config(source: Option<PathBuf>, export_dir: PathBuf) -> PipelineConfig {
        PipelineConfig {
            source,
            preprocess: PreprocessConfig::default(),
            training: TrainingConfig::default(),
            export: ExportConfig {
                mode: "local".into(),
                out_dir: export_dir,
                bucket: None,
                prefix: String::new(),
            },
            retry: RetryPolicy::none(),
        }
    }

    #[derive(Default)]
    struct RecordingProgress {
        events: Mutex<Vec<String>>,
    }

    impl ProgressReporter for RecordingProgress {
        fn stage_started(&self, stage: StageName) {
            self.events.lock().unwrap().push(format!("start {stage}"));
        }
        fn stage_retrying(&self, stage: StageName, attempt: u32, _error: &DiagflowError) {
            self.events
                .lock()
                .unwrap()
                .push(format!("retry {stage} {attempt}"));
        }
        fn stage_finished(&self, stage: StageName, _location: &ArtifactLocation) {
            self.events.lock().unwrap().push(format!("finish {stage}"));
        }
        fn done(&self, _report: &PipelineReport) {
            self.events.lock().unwrap().push("done".into());
        }
    }

    #[tokio::test]
    async fn synthetic_end_to_end_run() {
        let root = temp_path("e2e");
        let source = root.join("source.csv");
        std::fs::create_dir_all(&root).unwrap();
        write_synthetic_source(&source, separable_label);

        let store = FsArtifactStore::open(root.join("results")).unwrap();
        let config = config(Some(source), root.join("export"));
        let progress = RecordingProgress::default();

        let report = run_pipeline(&store, &config, &RecordingUploader::default(), &progress)
            .await
            .unwrap();

        let clean = Table::from_csv(&store.get(&ArtifactKey::clean_dataset()).unwrap(), true)
            .unwrap();
        assert_eq!(clean.n_rows(), 20);
        assert_eq!(clean.missing_count(&FEATURE_NAMES), 0);

        assert_eq!(report.train.train_rows, 16);
        assert_eq!(report.train.test_rows, 4);
        assert!(report.evaluate.report.accuracy >= 0.8);

        let metrics_bytes = store.get(&ArtifactKey::metrics()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&metrics_bytes).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object.len(), 4);
        for key in ["accuracy", "precision", "recall", "f1"] {
            assert!(object.contains_key(key), "missing {key}");
        }

        let exported = std::fs::read(root.join("export").join("model.bin")).unwrap();
        assert_eq!(exported, store.get(&ArtifactKey::model()).unwrap());
        assert_eq!(report.delivered.len(), 2);

        let events = progress.events.lock().unwrap().clone();
        assert_eq!(events.first().map(String::as_str), Some("start ingest"));
        assert_eq!(events.last().map(String::as_str), Some("done"));
        assert!(events.iter().all(|e| !e.starts_with("retry")));

        std::fs::remove_dir_all(&root).ok();
    }

    #[tokio::test]
    async fn synthetic_sample_end_to_end_run() {
        let export_dir = temp_path("synthetic-export");
        let store = MemoryArtifactStore::new();
        let report = run_pipeline(
            &store,
            &config(None, export_dir.clone()),
            &RecordingUploader::default(),
            &SilentProgress,
        )
        .await
        .unwrap();

        assert_eq!(report.preprocess.rows, 569);
        assert_eq!(report.train.test_rows, 114);
        let metrics =
            MetricsReport::from_json(&store.get(&ArtifactKey::metrics()).unwrap()).unwrap();
        assert!(metrics.accuracy > 0.9, "accuracy {}", metrics.accuracy);
        assert_eq!(metrics, report.evaluate.report);

        std::fs::remove_dir_all(&export_dir).ok();
    }

    #[tokio::test]
    async fn permanent_failure_halts_without_retry() {
        let root = temp_path("halt");
        let source = root.join("source.csv");
        std::fs::create_dir_all(&root).unwrap();
        write_synthetic_source(&source, |i| if i % 2 == 0 { "B" } else { "X" });

        let store = MemoryArtifactStore::new();
        let mut config = config(Some(source), root.join("export"));
        config.retry = RetryPolicy {
            retries: 3,
            delay: Duration::ZERO,
        };

        let err = run_pipeline(&store, &config, &RecordingUploader::default(), &SilentProgress)
            .await
            .unwrap_err();
        assert_eq!(err.stage, StageName::Preprocess);
        assert_eq!(err.attempts, 1);
        assert_eq!(err.source.kind(), "DataQualityError");
        assert!(err.to_string().contains("stage preprocess failed with DataQualityError"));

        assert!(store.exists(&ArtifactKey::raw_dataset()));
        assert!(!store.exists(&ArtifactKey::clean_dataset()));
        assert!(!store.exists(&ArtifactKey::model()));

        std::fs::remove_dir_all(&root).ok();
    }

    #[tokio::test]
    async fn missing_source_stops_at_ingest() {
        let store = MemoryArtifactStore::new();
        let config = config(Some(temp_path("absent")), temp_path("unused"));
        let err = run_pipeline(&store, &config, &RecordingUploader::default(), &SilentProgress)
            .await
            .unwrap_err();
        assert_eq!(err.stage, StageName::Ingest);
        assert_eq!(err.source.kind(), "NotFound");
        assert!(store.keys().is_empty());
    }

    #[tokio::test]
    async fn transient_export_failure_is_retried() {
        let store = MemoryArtifactStore::new();
        let mut config = config(None, PathBuf::new());
        config.export = ExportConfig {
            mode: "remote".into(),
            out_dir: PathBuf::new(),
            bucket: Some("ml-artifacts".into()),
            prefix: "bc_demo/".into(),
        };
        config.retry = RetryPolicy {
            retries: 1,
            delay: Duration::ZERO,
        };
        let progress = RecordingProgress::default();

        let uploader = RecordingUploader::failing(1);
        let report = run_pipeline(&store, &config, &uploader, &progress)
            .await
            .unwrap();
        assert_eq!(report.delivered.len(), 2);
        assert!(
            progress
                .events
                .lock()
                .unwrap()
                .contains(&"retry export 1".to_string())
        );

        // Retries exhausted: the network error surfaces with the attempt count.
        let uploader = RecordingUploader::failing(10);
        let err = run_pipeline(&store, &config, &uploader, &SilentProgress)
            .await
            .unwrap_err();
        assert_eq!(err.stage, StageName::Export);
        assert_eq!(err.attempts, 2);
        assert!(err.source.is_transient());
    }

    #[test]
    fn retry_policy_from_config() {
        let policy = RetryPolicy::from(&AppConfig::default());
        assert_eq!(policy.retries, 1);
        assert_eq!(policy.delay, Duration::from_secs(300));
    }
}
