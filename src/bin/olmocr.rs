//! olmOCR driver CLI.
//!
//! Usage examples:
//!   Single document, results written to ./out:
//!     $ OLMOCR_CHROME_BIN=/path/to/chrome \
//!       cargo run --bin olmocr -- run --file scan.pdf --out-dir out
//!   Several documents as concurrent jobs:
//!     $ cargo run --bin olmocr -- batch a.pdf b.pdf --page-limit 3

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand};
use log::{error, info};
use olmocr_driver::artifacts::{self, ERROR_SCREENSHOT};
use olmocr_driver::config::{DriverConfig, DriverConfigOverrides, Verbosity};
use olmocr_driver::jobs::{DriverRunner, JobRegistry, JobStatus};
use olmocr_driver::logging::DriverLogger;
use olmocr_driver::pipeline::{FailureScreenshot, OcrPipeline};
use olmocr_driver::runtime::ChromiumoxideRuntime;
use olmocr_driver::types::ProcessingRequest;

#[derive(Parser)]
#[command(
    name = "olmocr",
    author,
    version,
    about = "Drive the olmOCR web demo from the command line"
)]
struct Cli {
    /// Increase log verbosity (pass twice for DEBUG).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Process one document and write the result files.
    Run(RunArgs),
    /// Process several documents concurrently and print the job records.
    Batch(BatchArgs),
}

#[derive(Args)]
struct SharedArgs {
    /// Maximum number of pages to collect.
    #[arg(long)]
    page_limit: Option<usize>,

    /// Give up when no result is recognised within this many milliseconds.
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Site to drive instead of the configured one.
    #[arg(long)]
    target_url: Option<String>,

    /// Show the launched browser window.
    #[arg(long)]
    show_browser: bool,
}

#[derive(Args)]
struct RunArgs {
    /// Document to upload.
    #[arg(long)]
    file: PathBuf,

    /// Directory receiving resp.txt, raw-page-N files and failure artifacts.
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,

    #[command(flatten)]
    shared: SharedArgs,
}

#[derive(Args)]
struct BatchArgs {
    /// Documents to upload.
    #[arg(required = true)]
    files: Vec<PathBuf>,

    #[command(flatten)]
    shared: SharedArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_env_logger(cli.verbose);

    match cli.command {
        Command::Run(args) => run_single(args, cli.verbose).await,
        Command::Batch(args) => run_batch(args, cli.verbose).await,
    }
}

async fn run_single(args: RunArgs, verbose: u8) -> Result<()> {
    let config = build_config(&args.shared, verbose)?;
    let request = build_request(args.file.clone(), &args.shared, &config);

    tokio::fs::create_dir_all(&args.out_dir)
        .await
        .with_context(|| format!("failed to create {}", args.out_dir.display()))?;

    let pipeline = OcrPipeline::new(config, ChromiumoxideRuntime::new());
    let hook = FailureScreenshot::new(args.out_dir.join(ERROR_SCREENSHOT), pipeline.logger());

    info!("Processing {}", args.file.display());
    match pipeline.run_with_hooks(&request, &hook).await {
        Ok(result) => {
            let written = artifacts::write_result(&args.out_dir, &result)
                .await
                .context("failed to write result files")?;
            info!(
                "Finished with {} result, wrote {} file(s) to {}",
                result.kind(),
                written.len(),
                args.out_dir.display()
            );
            Ok(())
        }
        Err(err) => {
            let path = artifacts::write_error(&args.out_dir, &err)
                .await
                .context("failed to write error report")?;
            error!("OCR run failed, details in {}", path.display());
            Err(anyhow::Error::new(err).context("OCR run failed"))
        }
    }
}

async fn run_batch(args: BatchArgs, verbose: u8) -> Result<()> {
    let config = build_config(&args.shared, verbose)?;
    let logger = DriverLogger::from_config(&config);
    let requests: Vec<ProcessingRequest> = args
        .files
        .iter()
        .map(|file| build_request(file.clone(), &args.shared, &config))
        .collect();

    let registry = JobRegistry::new(DriverRunner::new(config), logger);
    let mut ids = Vec::with_capacity(requests.len());
    for request in requests {
        ids.push(registry.submit(request).await);
    }

    let mut failed = 0usize;
    for id in ids {
        if let Some(record) = registry.wait_for(id).await {
            if record.status == JobStatus::Failed {
                failed += 1;
            }
        }
    }

    let records = registry.list().await;
    println!(
        "{}",
        serde_json::to_string_pretty(&records).context("failed to serialise job records")?
    );

    if failed > 0 {
        return Err(anyhow!("{failed} of {} job(s) failed", records.len()));
    }
    Ok(())
}

fn build_config(shared: &SharedArgs, verbose: u8) -> Result<DriverConfig> {
    let base = DriverConfig::from_env().context("invalid driver configuration")?;

    let mut overrides = DriverConfigOverrides::default();
    if shared.show_browser {
        overrides = overrides.headless(false);
    }
    if let Some(url) = &shared.target_url {
        overrides = overrides.target_url(url.clone());
    }
    if verbose > 0 {
        overrides.verbose = Some(verbosity_from_count(verbose));
    }

    Ok(base.with_overrides(overrides))
}

fn build_request(file: PathBuf, shared: &SharedArgs, config: &DriverConfig) -> ProcessingRequest {
    ProcessingRequest::new(file)
        .with_page_limit(shared.page_limit.unwrap_or(config.page_limit))
        .with_overall_timeout(
            shared
                .timeout_ms
                .map(Duration::from_millis)
                .unwrap_or_else(|| config.overall_timeout()),
        )
}

fn verbosity_from_count(count: u8) -> Verbosity {
    match count {
        0 => Verbosity::Minimal,
        1 => Verbosity::Medium,
        _ => Verbosity::Detailed,
    }
}

/// `log` filter used when `RUST_LOG` is unset.
fn default_log_filter(verbose: u8) -> &'static str {
    if verbose >= 2 { "debug" } else { "info" }
}

fn init_env_logger(verbose: u8) {
    if env::var("RUST_LOG").is_err() {
        unsafe {
            env::set_var("RUST_LOG", default_log_filter(verbose));
        }
    }

    let _ = env_logger::Builder::from_env(env_logger::Env::default())
        .format_timestamp_secs()
        .try_init();
}
