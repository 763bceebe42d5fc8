//! Cache Warden CLI
//!
//! Entry point for the `cache-warden` command-line tool.

use std::env;
use std::path::{Path, PathBuf};
use std::process;

use cache_warden::config::{ConfigError, Context, EffectiveConfig, Environment};
use cache_warden::prune::PruneReport;
use cache_warden::retention::RetentionWindow;
use cache_warden::{ci, disk, CiError};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use tracing_subscriber::EnvFilter;
use warden_doctor::Issues;
use warden_exec::SystemRunner;

const LOG_ENV: &str = "CACHE_WARDEN_LOG";
const CONFIG_ENV: &str = "CACHE_WARDEN_CONFIG";

#[derive(Parser)]
#[command(name = "cache-warden")]
#[command(about = "CI cache pruning and disk usage reporting", version)]
struct Cli {
    /// Project config file (default: nearest cache-warden.toml)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Retention window, e.g. 10d or 2w
    #[arg(long, global = true)]
    retention: Option<RetentionWindow>,

    /// Seconds to wait for a cache lock; 0 waits forever
    #[arg(long, global = true)]
    lock_timeout: Option<u64>,

    /// Log filter, e.g. debug or cache_warden=trace (overrides CACHE_WARDEN_LOG)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the environment is set up correctly
    Doctor,

    /// Point Conan at this runner's own cache directory
    ConfigureCachePath,

    /// Print the number of clang-tidy cache entries
    CtcacheInfo,

    /// Remove clang-tidy cache entries outside the retention window
    CtcachePrune {
        /// Show what would be removed without removing it
        #[arg(long)]
        dry_run: bool,
    },

    /// Remove a stale clang-tidy cache lock
    CtcacheUnlock,

    /// Run before every CI job
    CiPre,

    /// Run after every CI job, including cancelled ones
    CiPost,

    /// Prune every per-runner Conan cache
    CiPruneConanCache {
        /// Show what would be removed without removing it
        #[arg(long)]
        dry_run: bool,
    },

    /// Prune a local directory cache store
    PruneDir {
        /// Root of the store
        root: PathBuf,

        /// Show what would be removed without removing it
        #[arg(long)]
        dry_run: bool,
    },

    /// Print total, used and free space for each path
    DiskUsage {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Print the merged configuration and where it came from
    ShowConfig,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("config file not found: {0}")]
    MissingConfig(PathBuf),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Ci(#[from] CiError),

    #[error("failed to serialize config: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Doctor(#[from] Issues),
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    match run(cli) {
        Ok(()) => {}
        Err(CliError::Doctor(issues)) => {
            print!("{}", issues);
            process::exit(1);
        }
        Err(e) => {
            tracing::error!("{}", e);
            process::exit(1);
        }
    }
}

/// `--log-level` wins over `CACHE_WARDEN_LOG`; anything unparsable falls back to `info`.
fn log_filter(level: Option<&str>) -> EnvFilter {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level).ok(),
        None => EnvFilter::try_from_env(LOG_ENV).ok(),
    };
    filter.unwrap_or_else(|| EnvFilter::new("info"))
}

fn init_tracing(level: Option<&str>) {
    // stdout carries tables and reports
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(level))
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<(), CliError> {
    let env = Environment::capture();
    let config = load_config(&cli, &env.cwd)?;
    let ctx = Context::new(config.settings()?, env);
    let runner = SystemRunner;

    match cli.command {
        Commands::Doctor => run_doctor(&ctx, &runner)?,
        Commands::ConfigureCachePath => {
            if let Some(storage) = ci::configure_conan_cache_path(&ctx)? {
                println!("Conan cache path: {}", storage.display());
            }
        }
        Commands::CtcacheInfo => {
            let count = ci::ctcache_info(&ctx)?;
            println!("Found {} cache entries in {}", count, ctx.ctcache_dir().display());
        }
        Commands::CtcachePrune { dry_run } => print_report(&ci::ctcache_prune(&ctx, &runner, dry_run)?),
        Commands::CtcacheUnlock => {
            ci::ctcache_unlock(&ctx)?;
        }
        Commands::CiPre => println!("{}", ci::pre(&ctx, &runner)?),
        Commands::CiPost => println!("{}", ci::post(&ctx)?),
        Commands::CiPruneConanCache { dry_run } => {
            for report in ci::prune_conan_caches(&ctx, &runner, dry_run)? {
                print_report(&report);
            }
        }
        Commands::PruneDir { root, dry_run } => print_report(&ci::prune_dir(&ctx, &root, dry_run)?),
        Commands::DiskUsage { paths } => disk::print_report(&paths),
        Commands::ShowConfig => println!("{}", config.to_json()?),
    }
    Ok(())
}

/// Layers: host file, project file, then CLI flags.
fn load_config(cli: &Cli, cwd: &Path) -> Result<EffectiveConfig, CliError> {
    let host = dirs::config_dir().map(|dir| dir.join("cache-warden").join("config.toml"));

    let explicit = cli
        .config
        .clone()
        .or_else(|| env::var_os(CONFIG_ENV).filter(|v| !v.is_empty()).map(PathBuf::from));
    let project = match explicit {
        Some(path) if !path.is_file() => return Err(CliError::MissingConfig(path)),
        Some(path) => Some(path),
        None => warden_doctor::find_project_file(cwd),
    };

    Ok(EffectiveConfig::build(
        host.as_deref(),
        project.as_deref(),
        cli_overrides(cli),
    )?)
}

fn cli_overrides(cli: &Cli) -> Option<Value> {
    let mut overrides = Map::new();
    if let Some(retention) = cli.retention {
        overrides.insert("retention".to_string(), Value::String(retention.to_string()));
    }
    if let Some(secs) = cli.lock_timeout {
        overrides.insert("lock_timeout_seconds".to_string(), Value::from(secs));
    }
    if overrides.is_empty() {
        None
    } else {
        Some(Value::Object(overrides))
    }
}

fn run_doctor(ctx: &Context, runner: &SystemRunner) -> Result<(), Issues> {
    warden_doctor::run_checks(
        "cache-warden",
        [
            warden_doctor::self_check(ctx.working_dir(), env!("CARGO_PKG_VERSION")),
            warden_doctor::git(runner),
            warden_doctor::conan_login(runner, &ctx.settings.tools.conan, &ctx.settings.doctor.remote),
        ],
    )?;
    println!("No issues found");
    Ok(())
}

fn print_report(report: &PruneReport) {
    println!("{}", report);
    for id in report.removed() {
        println!("  {}", id);
    }
}
