use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use profilesnap::{
    artifact,
    capture::{chromium::ChromiumBrowser, CaptureUnit},
    config::Config,
    observability::format_bytes,
    retention,
    store::{ContentStore, GitHubStore},
    workflow::Workflow,
};
use tracing::{info, warn};

#[derive(Parser)]
#[command(
    name = "profilesnap",
    about = "Profile screenshot automation — capture, publish, patch, sweep",
    version
)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Data directory for config.toml and local screenshot copies
    #[arg(long, env = "PROFILESNAP_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "PROFILESNAP_LOG")]
    log: Option<String>,

    /// Log output format: "pretty" (default) or "json"
    #[arg(long, env = "PROFILESNAP_LOG_FORMAT")]
    log_format: Option<String>,

    /// Write logs to this file path (rotated daily). Optional.
    #[arg(long, env = "PROFILESNAP_LOG_FILE")]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full pipeline (default when no subcommand given).
    ///
    /// Captures the configured profile page, publishes the screenshot under
    /// the artifact prefix, rewrites the target document to reference it,
    /// and sweeps old screenshots down to the retention bound.
    ///
    /// Examples:
    ///   profilesnap run
    ///   profilesnap run --dry-run
    ///   profilesnap
    Run {
        /// Capture only — no remote write, no document change, no sweep
        #[arg(long)]
        dry_run: bool,
    },
    /// Capture only, writing the screenshot to a local file.
    ///
    /// Useful for checking viewport, anchor, and hide-selector settings
    /// before letting a scheduled run publish anything.
    ///
    /// Examples:
    ///   profilesnap capture
    ///   profilesnap capture --output /tmp/profile.png
    Capture {
        /// Output file (default: {data_dir}/screenshots/{today}.png)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Sweep old screenshots down to the retention bound.
    ///
    /// Lists the artifact prefix, keeps the most recent entries, deletes
    /// the rest. Names that cannot be dated are never touched.
    ///
    /// Examples:
    ///   profilesnap sweep
    ///   profilesnap sweep --keep 10
    Sweep {
        /// Override the configured retention count
        #[arg(long)]
        keep: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let command = args.command.unwrap_or(Command::Run { dry_run: false });

    let dry_run = matches!(command, Command::Run { dry_run: true });
    let config = Config::load(args.data_dir, args.log, args.log_format, dry_run)
        .context("configuration error")?;

    let _log_guard = init_logging(&config.log, &config.log_format, args.log_file.as_deref());

    match command {
        Command::Run { .. } => run_pipeline(Arc::new(config)).await,
        Command::Capture { output } => capture_once(&config, output).await,
        Command::Sweep { keep } => sweep_now(&config, keep).await,
    }
}

async fn run_pipeline(config: Arc<Config>) -> Result<()> {
    let store = build_store(&config)?;
    if !config.dry_run {
        // Non-fatal: a collaborator token fails here but may still write.
        if let Err(e) = store.verify_identity().await {
            warn!(err = %e, "could not verify the authenticated user — continuing");
        }
    }
    let store: Arc<dyn ContentStore> = Arc::new(store);

    let workflow = Workflow::new(config, Arc::new(ChromiumBrowser::new()), store);
    let report = match workflow.run().await {
        Ok(report) => report,
        Err(e) => {
            let stage = e.stage();
            return Err(anyhow::Error::new(e).context(format!("run failed in {stage} stage")));
        }
    };

    if let Some(sweep) = &report.sweep {
        for warning in &sweep.warnings {
            warn!(path = %warning.path, reason = %warning.reason, "sweep warning");
        }
    }
    info!(
        artifact = %report.filename,
        dry_run = report.dry_run,
        degraded = report.degraded_capture,
        "done"
    );
    Ok(())
}

async fn capture_once(config: &Config, output: Option<PathBuf>) -> Result<()> {
    let unit = CaptureUnit::new(Arc::new(ChromiumBrowser::new()));
    let snapshot = unit
        .capture(&config.capture_request())
        .await
        .context("capture failed")?;

    let output = output.unwrap_or_else(|| {
        config
            .screenshots_dir()
            .join(artifact::name_for(chrono::Utc::now().date_naive()))
    });
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("could not create {}", parent.display()))?;
    }
    std::fs::write(&output, &snapshot.bytes)
        .with_context(|| format!("could not write {}", output.display()))?;

    info!(
        path = %output.display(),
        size = %format_bytes(snapshot.bytes.len() as u64),
        degraded = snapshot.degraded,
        "screenshot written"
    );
    println!("{}", output.display());
    Ok(())
}

async fn sweep_now(config: &Config, keep: Option<usize>) -> Result<()> {
    let store = build_store(config)?;
    let keep = keep.unwrap_or(config.keep_count);

    let report = retention::sweep(&store, &config.artifact_prefix, keep).await;
    for warning in &report.warnings {
        warn!(path = %warning.path, reason = %warning.reason, "sweep warning");
    }
    info!(deleted = report.deleted, kept = report.kept, "sweep done");
    Ok(())
}

fn build_store(config: &Config) -> Result<GitHubStore> {
    // A dry run never talks to the store, so an absent token is fine there.
    let token = if config.dry_run {
        config.token.clone().unwrap_or_default()
    } else {
        config.require_token()?.to_string()
    };
    GitHubStore::new(&config.api_base_url, &config.repo, &config.branch, token)
        .context("could not build GitHub client")
}

/// Set up the tracing subscriber. With a log file, logs go to stdout and a
/// daily-rotated file; the returned guard must live as long as the process.
fn init_logging(
    log_level: &str,
    log_format: &str,
    log_file: Option<&Path>,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let use_json = log_format == "json";

    if let Some(path) = log_file {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let filename = path
            .file_name()
            .unwrap_or_else(|| std::ffi::OsStr::new("profilesnap.log"));

        // Ensure the directory exists before tracing-appender tries to open it.
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!(
                "warn: could not create log directory '{}': {e} — falling back to stdout",
                dir.display()
            );
            if use_json {
                tracing_subscriber::fmt().json().with_env_filter(log_level).init();
            } else {
                tracing_subscriber::fmt().with_env_filter(log_level).compact().init();
            }
            return None;
        }

        let appender = tracing_appender::rolling::daily(dir, filename);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);

        if use_json {
            tracing_subscriber::registry()
                .with(EnvFilter::new(log_level))
                .with(fmt::layer().json())
                .with(fmt::layer().json().with_writer(non_blocking))
                .init();
        } else {
            tracing_subscriber::registry()
                .with(EnvFilter::new(log_level))
                .with(fmt::layer().compact())
                .with(fmt::layer().with_writer(non_blocking))
                .init();
        }
        Some(guard)
    } else if use_json {
        tracing_subscriber::fmt().json().with_env_filter(log_level).init();
        None
    } else {
        tracing_subscriber::fmt().with_env_filter(log_level).compact().init();
        None
    }
}
