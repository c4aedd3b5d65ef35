//! `quietcut` command-line host.
//!
//! Loads settings, applies flag overrides, then runs one job per folder code.
//! Jobs are CPU-bound, so each one goes to `tokio::task::spawn_blocking`; at
//! most `concurrency` of them run at once. Every outcome is printed as one
//! JSON document on stdout, logs go to stderr.

mod settings;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::bail;
use clap::Parser;
use quietcut_core::{JobOutcome, JobRunner};
use settings::{load_settings, Settings, DEFAULT_SETTINGS_FILE};
use tokio::sync::Semaphore;
use tokio::task::JoinError;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "quietcut")]
#[command(about = "Silence analysis and silence-guided splitting of recordings on a local volume")]
#[command(version)]
struct Cli {
    /// Folder codes under <volume>/uploads/ to process
    #[arg(required = true)]
    codes: Vec<String>,

    /// Settings file (JSON); missing file means defaults
    #[arg(long, default_value = DEFAULT_SETTINGS_FILE)]
    settings: PathBuf,

    /// Volume root holding uploads/
    #[arg(long)]
    volume: Option<PathBuf>,

    /// Comma-separated stages: metadata,silence,plan,extract
    #[arg(long, value_delimiter = ',')]
    stages: Option<Vec<String>>,

    /// Detection scheduling: auto, sequential or parallel
    #[arg(long)]
    mode: Option<String>,

    /// Parallel detection workers (0 = all cores)
    #[arg(long)]
    workers: Option<usize>,

    /// Fixed silence threshold in dBFS (default: file loudness - 16 dB)
    #[arg(long, allow_hyphen_values = true)]
    threshold: Option<f64>,

    /// Minimum silence length in ms
    #[arg(long)]
    min_silence: Option<u32>,

    /// Analysis window step in ms
    #[arg(long)]
    seek_step: Option<u32>,

    /// Output sample rate of extracted pieces
    #[arg(long)]
    sample_rate: Option<u32>,

    /// Jobs run at the same time
    #[arg(long)]
    concurrency: Option<usize>,

    /// Pretty-print outcomes
    #[arg(long)]
    pretty: bool,
}

fn apply_overrides(settings: &mut Settings, cli: &Cli) {
    if let Some(v) = &cli.volume {
        settings.volume_root = v.clone();
    }
    if let Some(stages) = &cli.stages {
        settings.stages = stages.clone();
    }
    if let Some(mode) = &cli.mode {
        settings.detection_mode = mode.clone();
    }
    if let Some(workers) = cli.workers {
        settings.workers = workers;
    }
    if let Some(t) = cli.threshold {
        settings.silence_thresh_db = Some(t);
    }
    if let Some(ms) = cli.min_silence {
        settings.min_silence_len_ms = ms;
    }
    if let Some(ms) = cli.seek_step {
        settings.seek_step_ms = ms;
    }
    if let Some(rate) = cli.sample_rate {
        settings.target_sample_rate = rate;
    }
    if let Some(n) = cli.concurrency {
        settings.concurrency = n;
    }
    settings.normalize();
}

/// A job whose task panicked or was cancelled becomes a failed outcome so the
/// rest of the batch still runs.
fn joined_outcome(code: &str, joined: Result<JobOutcome, JoinError>) -> JobOutcome {
    match joined {
        Ok(outcome) => outcome,
        Err(err) => {
            let reason = if err.is_panic() {
                let payload = err.into_panic();
                let msg = payload
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".into());
                format!("job panicked: {msg}")
            } else {
                "job cancelled".to_string()
            };
            error!(code, reason = %reason, "job task did not complete");
            JobOutcome {
                success: false,
                special_folder_code: code.to_string(),
                error: Some(reason),
                report: None,
            }
        }
    }
}

fn render(outcome: &JobOutcome, pretty: bool) -> anyhow::Result<String> {
    let json = if pretty {
        serde_json::to_string_pretty(outcome)?
    } else {
        serde_json::to_string(outcome)?
    };
    Ok(json)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("quietcut=info")),
        )
        .init();

    let cli = Cli::parse();
    let mut settings = load_settings(&cli.settings);
    apply_overrides(&mut settings, &cli);

    let config = settings.job_config();
    info!(
        volume = %config.volume_root.display(),
        stages = ?config.stages,
        mode = ?config.detection_mode,
        jobs = cli.codes.len(),
        "quietcut starting"
    );
    if !config.volume_root.is_dir() {
        warn!(volume = %config.volume_root.display(), "volume root does not exist");
    }

    let runner = Arc::new(JobRunner::new(config));
    let permits = Arc::new(Semaphore::new(settings.concurrency));

    let mut handles = Vec::with_capacity(cli.codes.len());
    for code in &cli.codes {
        let runner = Arc::clone(&runner);
        let permits = Arc::clone(&permits);
        let code = code.clone();
        handles.push(tokio::spawn(async move {
            // The semaphore is never closed.
            let _permit = permits.acquire_owned().await;
            let job_code = code.clone();
            joined_outcome(&code, tokio::task::spawn_blocking(move || runner.run(&job_code)).await)
        }));
    }

    let mut failed = 0usize;
    for (code, handle) in cli.codes.iter().zip(handles) {
        let outcome = joined_outcome(code, handle.await);
        if !outcome.success {
            failed += 1;
        }
        println!("{}", render(&outcome, cli.pretty)?);
    }

    if failed > 0 {
        bail!("{failed} of {} jobs failed", cli.codes.len());
    }
    Ok(())
}
