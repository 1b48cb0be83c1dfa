//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use diagflow_core::{
    ExportConfig, HttpObjectUploader, PipelineConfig, PipelineReport, ProgressReporter,
    evaluate, export, ingest, preprocess, run_pipeline, train,
};
use diagflow_shared::{
    AppConfig, ArtifactKey, ArtifactLocation, DiagflowError, PreprocessConfig, StageName,
    TrainingConfig, init_config, load_config, load_config_from,
};
use diagflow_storage::FsArtifactStore;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// diagflow: train and evaluate a benign/malignant diagnostic classifier.
#[derive(Parser)]
#[command(
    name = "diagflow",
    version,
    about = "Ingest, preprocess, train, evaluate and export a binary diagnostic classifier.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Artifact store root (defaults to `[paths] results_dir`).
    #[arg(long, env = "OUT_DIR", global = true)]
    pub out_dir: Option<PathBuf>,

    /// Config file (defaults to ~/.diagflow/diagflow.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Write the raw dataset from the synthetic sample or a headerless CSV.
    Ingest {
        /// Headerless flat file (id, diagnosis, 30 features).
        #[arg(long, env = "SOURCE_CSV")]
        source: Option<PathBuf>,
    },

    /// Clean, validate and scale the raw dataset.
    Preprocess {
        /// Raw dataset key or path.
        #[arg(long, env = "RAW_CSV")]
        raw_csv: Option<String>,

        /// Fail unless there are exactly 30 feature columns.
        #[arg(long)]
        strict_feature_count: bool,
    },

    /// Split the clean dataset and fit the classifier.
    Train {
        /// Clean dataset key or path.
        #[arg(long, env = "CLEAN_CSV")]
        clean_csv: Option<String>,

        /// Split seed.
        #[arg(long)]
        seed: Option<u64>,

        /// Fraction of rows held out.
        #[arg(long)]
        test_fraction: Option<f64>,
    },

    /// Score the model on the held-out set and write metrics.
    Evaluate {
        /// Model key or path.
        #[arg(long, env = "MODEL_PATH")]
        model: Option<String>,

        /// Held-out set key or path.
        #[arg(long, env = "TEST_CSV")]
        test_csv: Option<String>,
    },

    /// Deliver the model and metrics.
    Export {
        /// local or remote.
        #[arg(long, env = "EXPORT_MODE")]
        mode: Option<String>,

        /// Bucket for remote mode.
        #[arg(long, env = "EXPORT_BUCKET")]
        bucket: Option<String>,

        /// Object key prefix for remote mode.
        #[arg(long, env = "EXPORT_PREFIX")]
        prefix: Option<String>,

        /// Destination directory for local mode.
        #[arg(long)]
        export_dir: Option<PathBuf>,
    },

    /// Run all five stages in order.
    Run {
        /// Headerless flat file; the synthetic sample is used when omitted.
        #[arg(long, env = "SOURCE_CSV")]
        source: Option<PathBuf>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "diagflow=info",
        1 => "diagflow=debug",
        _ => "diagflow=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    // Init must work even when the existing config file does not parse.
    if matches!(
        cli.command,
        Command::Config {
            action: ConfigAction::Init
        }
    ) {
        return cmd_config_init();
    }

    let Cli {
        out_dir,
        config,
        command,
        ..
    } = cli;
    let ctx = Context::load(config, out_dir)?;

    match command {
        Command::Ingest { source } => cmd_ingest(&ctx, source),
        Command::Preprocess {
            raw_csv,
            strict_feature_count,
        } => cmd_preprocess(&ctx, raw_csv, strict_feature_count),
        Command::Train {
            clean_csv,
            seed,
            test_fraction,
        } => cmd_train(&ctx, clean_csv, seed, test_fraction),
        Command::Evaluate { model, test_csv } => cmd_evaluate(&ctx, model, test_csv),
        Command::Export {
            mode,
            bucket,
            prefix,
            export_dir,
        } => cmd_export(ctx, mode, bucket, prefix, export_dir).await,
        Command::Run { source } => cmd_run(&ctx, source).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(&ctx),
        },
    }
}

/// Resolved config plus the artifact store root.
struct Context {
    config: AppConfig,
    store_root: PathBuf,
}

impl Context {
    fn load(config_path: Option<PathBuf>, out_dir: Option<PathBuf>) -> Result<Self> {
        let config = match config_path {
            Some(path) => load_config_from(&path)?,
            None => load_config()?,
        };
        let store_root = out_dir.unwrap_or_else(|| PathBuf::from(&config.paths.results_dir));
        Ok(Self { config, store_root })
    }

    fn store(&self) -> Result<FsArtifactStore> {
        Ok(FsArtifactStore::open(&self.store_root)?)
    }
}

/// Input key from a flag/env value, or the canonical key.
fn key_or(value: Option<String>, default: ArtifactKey) -> ArtifactKey {
    value.map(ArtifactKey::new).unwrap_or(default)
}

fn print_output(label: &str, location: &ArtifactLocation) {
    println!("  {label:<9} {location}");
}

// ---------------------------------------------------------------------------
// Stage commands
// ---------------------------------------------------------------------------

fn cmd_ingest(ctx: &Context, source: Option<PathBuf>) -> Result<()> {
    let store = ctx.store()?;
    let source = source.or_else(|| ctx.config.paths.source_csv.as_ref().map(PathBuf::from));
    info!(source = ?source, "ingesting dataset");

    let location = ingest(&store, source.as_deref())?;
    print_output("Raw:", &location);
    Ok(())
}

fn cmd_preprocess(ctx: &Context, raw_csv: Option<String>, strict: bool) -> Result<()> {
    let store = ctx.store()?;
    let raw_key = key_or(raw_csv, ArtifactKey::raw_dataset());
    let mut config = PreprocessConfig::from(&ctx.config);
    config.strict_feature_count |= strict;

    let out = preprocess(&store, &raw_key, &config)?;
    print_output("Clean:", &out.clean);
    print_output("Scaler:", &out.scaler);
    Ok(())
}

fn cmd_train(
    ctx: &Context,
    clean_csv: Option<String>,
    seed: Option<u64>,
    test_fraction: Option<f64>,
) -> Result<()> {
    let store = ctx.store()?;
    let clean_key = key_or(clean_csv, ArtifactKey::clean_dataset());
    let mut config = TrainingConfig::from(&ctx.config);
    if let Some(seed) = seed {
        config.seed = seed;
    }
    if let Some(fraction) = test_fraction {
        config.test_fraction = fraction;
    }

    let out = train(&store, &clean_key, &config)?;
    for warning in &out.warnings {
        println!("  warning: {warning}");
    }
    print_output("Model:", &out.model);
    print_output("Held-out:", &out.held_out);
    Ok(())
}

fn cmd_evaluate(ctx: &Context, model: Option<String>, test_csv: Option<String>) -> Result<()> {
    let store = ctx.store()?;
    let model_key = key_or(model, ArtifactKey::model());
    let held_out_key = key_or(test_csv, ArtifactKey::held_out());

    let out = evaluate(&store, &model_key, &held_out_key)?;
    println!("{}", serde_json::to_string_pretty(&out.report)?);
    print_output("Metrics:", &out.metrics);
    Ok(())
}

async fn cmd_export(
    mut ctx: Context,
    mode: Option<String>,
    bucket: Option<String>,
    prefix: Option<String>,
    export_dir: Option<PathBuf>,
) -> Result<()> {
    let section = &mut ctx.config.export;
    if let Some(mode) = mode {
        section.mode = mode;
    }
    if bucket.is_some() {
        section.bucket = bucket;
    }
    if let Some(prefix) = prefix {
        section.prefix = prefix;
    }
    if let Some(dir) = export_dir {
        section.out_dir = dir.to_string_lossy().to_string();
    }

    let store = ctx.store()?;
    let config = ExportConfig::from(&ctx.config);
    let uploader = uploader(&ctx.config)?;

    let delivered = export(&store, &config, &uploader).await?;
    for artifact in &delivered {
        println!(
            "  {}  {} bytes  sha256:{}",
            artifact.location, artifact.size_bytes, artifact.sha256
        );
    }
    Ok(())
}

async fn cmd_run(ctx: &Context, source: Option<PathBuf>) -> Result<()> {
    let store = ctx.store()?;
    let mut config = PipelineConfig::from(&ctx.config);
    if source.is_some() {
        config.source = source;
    }
    let uploader = uploader(&ctx.config)?;

    info!(
        store = %store.root().display(),
        retries = config.retry.retries,
        "running full pipeline"
    );

    let reporter = CliProgress::new();
    let result = run_pipeline(&store, &config, &uploader, &reporter).await;
    if result.is_err() {
        reporter.spinner.finish_and_clear();
    }
    let report = result?;

    let metrics = &report.evaluate.report;
    println!();
    println!("  Pipeline run {} complete", report.run_id);
    print_output("Raw:", &report.raw);
    print_output("Clean:", &report.preprocess.clean);
    print_output("Model:", &report.train.model);
    print_output("Metrics:", &report.evaluate.metrics);
    for artifact in &report.delivered {
        print_output("Exported:", &artifact.location);
    }
    for warning in &report.train.warnings {
        println!("  warning: {warning}");
    }
    println!(
        "  Accuracy {:.4}  Precision {:.4}  Recall {:.4}  F1 {:.4}",
        metrics.accuracy, metrics.precision, metrics.recall, metrics.f1
    );
    println!("  Time:     {:.1}s", report.elapsed.as_secs_f64());
    println!();

    Ok(())
}

fn uploader(config: &AppConfig) -> Result<Option<HttpObjectUploader>> {
    let section = &config.export;
    HttpObjectUploader::for_mode(&section.mode, &section.endpoint, &section.token_env)
        .map_err(|e| eyre!("cannot set up remote export: {e}"))
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn stage_started(&self, stage: StageName) {
        self.spinner.set_message(format!("Running {stage}"));
    }

    fn stage_retrying(&self, stage: StageName, attempt: u32, error: &DiagflowError) {
        self.spinner
            .set_message(format!("Retrying {stage} after attempt {attempt}: {}", error.kind()));
    }

    fn stage_finished(&self, stage: StageName, location: &ArtifactLocation) {
        self.spinner
            .println(format!("  ✓ {:<10} {location}", stage.as_str()));
    }

    fn done(&self, _report: &PipelineReport) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// Config commands
// ---------------------------------------------------------------------------

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(ctx: &Context) -> Result<()> {
    let toml_str = toml::to_string_pretty(&ctx.config)?;
    println!("{toml_str}");
    println!("# artifact store: {}", ctx.store_root.display());
    Ok(())
}
