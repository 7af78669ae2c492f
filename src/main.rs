use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pocrunner::catalog;
use pocrunner::config::Config;
use pocrunner::engine::ResultCollector;
use pocrunner::models::CheckResult;
use pocrunner::runner::{Runner, ScanInputs, ScanSummary};

#[derive(Parser)]
#[command(
    name = "pocrunner",
    version,
    about = "Rate-limited PoC scanner with background target liveness tracking",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json)
    #[arg(long, global = true)]
    log_format: Option<String>,

    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(clap::Args, Debug, Default)]
struct TargetArgs {
    /// Target host or URL (repeatable)
    #[arg(short, long = "target")]
    targets: Vec<String>,

    /// File with one target per line
    #[arg(short = 'l', long)]
    target_file: Option<PathBuf>,

    /// Liveness probe concurrency
    #[arg(long)]
    fingerprint_concurrency: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every PoC against every target
    Scan {
        #[command(flatten)]
        targets: TargetArgs,

        /// Directory of PoC files (*.toml)
        #[arg(short, long)]
        pocs: PathBuf,

        /// Checks per second
        #[arg(short, long)]
        rate_limit: Option<u32>,

        /// Maximum concurrently running checks (defaults to the rate limit)
        #[arg(long)]
        concurrency: Option<usize>,

        /// Request failures before an alive target is re-probed
        #[arg(long)]
        max_host_error: Option<u32>,

        /// Skip the liveness pass before dispatch
        #[arg(long, default_value = "false")]
        no_finger: bool,

        /// Only run the liveness pass
        #[arg(long, default_value = "false")]
        only_finger: bool,

        /// Append findings as JSON lines to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Classify targets as alive or dead
    Probe {
        #[command(flatten)]
        targets: TargetArgs,
    },

    /// List the PoCs in a directory
    ListPocs {
        /// Directory of PoC files (*.toml)
        #[arg(short, long)]
        pocs: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref())?;

    if let Some(format) = cli.log_format {
        config.logging.format = format;
    }

    // Initialize tracing/logging
    setup_tracing(&config.logging.format, &config.logging.level, cli.verbose)?;

    tracing::info!("pocrunner starting");

    match cli.command {
        Commands::Scan {
            targets,
            pocs,
            rate_limit,
            concurrency,
            max_host_error,
            no_finger,
            only_finger,
            output,
        } => {
            if let Some(v) = rate_limit {
                config.scan.rate_limit = v;
            }
            if let Some(v) = concurrency {
                config.scan.concurrency = Some(v);
            }
            if let Some(v) = max_host_error {
                config.scan.max_host_error = v;
            }
            config.scan.no_finger |= no_finger;
            config.scan.only_finger |= only_finger;

            tracing::info!(
                pocs = %pocs.display(),
                rate_limit = config.scan.rate_limit,
                pool_size = config.pool_size(),
                output = ?output,
                "Starting scan command"
            );
            scan(config, targets, &pocs, output).await?;
        }

        Commands::Probe { targets } => {
            config.scan.no_finger = false;
            config.scan.only_finger = true;

            tracing::info!("Starting probe command");
            probe(config, targets).await?;
        }

        Commands::ListPocs { pocs } => {
            list_pocs(&pocs)?;
        }
    }

    tracing::info!("pocrunner completed successfully");
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => Config::default(),
    };
    config.apply_env();
    Ok(config)
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("pocrunner=debug,info")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("pocrunner={level},warn")))
    };

    // Findings go to stdout; logs stay on stderr.
    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty().with_writer(std::io::stderr))
                .init();
        }
    }

    Ok(())
}

/// Cancellation token that fires on Ctrl-C
fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping scan");
            trigger.cancel();
        }
    });
    token
}

fn apply_target_args(config: &mut Config, args: &TargetArgs) -> Result<catalog::TargetList> {
    if let Some(v) = args.fingerprint_concurrency {
        config.scan.fingerprint_concurrency = v;
    }

    let list = catalog::load_targets(&args.targets, args.target_file.as_deref())?;
    if list.is_empty() {
        anyhow::bail!("No valid targets given (use --target or --target-file)");
    }
    Ok(list)
}

async fn scan(
    mut config: Config,
    targets: TargetArgs,
    pocs_dir: &Path,
    output: Option<PathBuf>,
) -> Result<()> {
    let targets = apply_target_args(&mut config, &targets)?;
    let pocs = catalog::load_pocs(pocs_dir)
        .with_context(|| format!("Failed to load PoCs from {}", pocs_dir.display()))?;

    let (tx, rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(write_results(rx, output));

    let runner = Runner::from_config(config, ResultCollector::with_sink(tx))?;
    let summary = runner
        .run(ScanInputs { targets, pocs }, shutdown_token())
        .await?;

    // The collector inside the runner holds the last sender.
    drop(runner);
    let written = writer.await.context("Result writer panicked")??;

    print_summary(&summary, written);
    Ok(())
}

async fn probe(mut config: Config, targets: TargetArgs) -> Result<()> {
    let targets = apply_target_args(&mut config, &targets)?;

    let runner = Runner::from_config(config, ResultCollector::new())?;
    let summary = runner
        .run(
            ScanInputs {
                targets,
                pocs: Vec::new(),
            },
            shutdown_token(),
        )
        .await?;

    for (target, state) in runner.registry().snapshot() {
        let line = serde_json::json!({ "target": target, "state": state.as_str() });
        println!("{line}");
    }

    print_summary(&summary, 0);
    Ok(())
}

fn list_pocs(dir: &Path) -> Result<()> {
    let pocs = catalog::load_pocs(dir)
        .with_context(|| format!("Failed to load PoCs from {}", dir.display()))?;

    for poc in &pocs {
        println!(
            "{:<32} {:<9} {} {}  {}",
            poc.id,
            poc.severity.as_str(),
            poc.request.method,
            poc.request.path,
            poc.display_name()
        );
    }
    eprintln!("{} PoCs", pocs.len());
    Ok(())
}

async fn write_results(
    mut rx: mpsc::UnboundedReceiver<CheckResult>,
    output: Option<PathBuf>,
) -> Result<usize> {
    let mut sink: Box<dyn tokio::io::AsyncWrite + Unpin + Send> = match &output {
        Some(path) => Box::new(
            tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .await
                .with_context(|| format!("Failed to open output file: {}", path.display()))?,
        ),
        None => Box::new(tokio::io::stdout()),
    };

    let mut written = 0;
    while let Some(result) = rx.recv().await {
        let line = result.to_json_line()?;
        sink.write_all(line.as_bytes()).await?;
        written += 1;
    }
    sink.flush().await?;
    Ok(written)
}

fn print_summary(summary: &ScanSummary, findings: usize) {
    eprintln!();
    eprintln!("Scan summary");
    if let Some(prepass) = &summary.prepass {
        eprintln!(
            "  Liveness pass: {} probed, {} alive, {} dead",
            prepass.probed, prepass.alive, prepass.dead
        );
    }
    if let Some(dispatch) = &summary.dispatch {
        eprintln!(
            "  Dispatch: {} PoCs x {} targets, {} executed, {} skipped, {} rejected targets in {:.1}s",
            dispatch.pocs,
            dispatch.targets,
            dispatch.executed,
            dispatch.skipped_malformed,
            dispatch.bad_targets,
            dispatch.elapsed.as_secs_f64()
        );
        if dispatch.cancelled {
            eprintln!("  Scan was interrupted");
        }
        eprintln!("  Findings: {findings}");
    }
    eprintln!(
        "  Targets: {} alive, {} dead, {} pending recheck",
        summary.liveness.alive, summary.liveness.dead, summary.liveness.needs_recheck
    );
}
