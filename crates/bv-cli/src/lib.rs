use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use bv_core::Bead;
use bv_fs::{load_config, resolve_config_path, AppConfig, BeadStore};
use bv_hooks::HookRunner;
use bv_tui::TuiOptions;
use bv_updater::{check_for_updates, CURRENT_VERSION};

const UPDATE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "bv", version, about = "Browse beads in the terminal")]
struct Cli {
    /// Config file to use instead of the default location.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Directory holding issues.jsonl.
    #[arg(long, global = true)]
    beads_dir: Option<PathBuf>,
    /// Write logs to this file.
    #[arg(long, global = true, env = "BV_LOG_FILE")]
    log_file: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// List beads.
    List,
    /// Show the tutorial and context help keys.
    Keys,
    /// Check for a newer release.
    CheckUpdate {
        /// Release endpoint overriding the configured one.
        #[arg(long)]
        url: Option<String>,
    },
    /// Run a hook from the config file.
    Hook { name: String },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_file.as_deref(), cli.command.is_none())?;

    let config_path = resolve_config_path(cli.config.as_deref())?;
    let config = load_config(&config_path)
        .with_context(|| format!("failed to load config {}", config_path.display()))?;
    let beads_dir = cli.beads_dir.unwrap_or_else(|| config.beads_dir());
    tracing::debug!(
        config = %config_path.display(),
        beads = %beads_dir.display(),
        "configuration resolved"
    );

    match cli.command {
        None => run_tui(&config, beads_dir),
        Some(Command::List) => list_beads(&beads_dir),
        Some(Command::Keys) => {
            println!("{}", keys_text(&config)?);
            Ok(())
        }
        Some(Command::CheckUpdate { url }) => check_update(&config, url),
        Some(Command::Hook { name }) => run_hook(&config, &beads_dir, &name),
    }
}

/// Log to `log_file` when given. The TUI owns the terminal, so without a
/// file nothing is installed for it; subcommands log to stderr.
fn init_tracing(log_file: Option<&Path>, interactive: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None if interactive => {}
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

fn run_tui(config: &AppConfig, beads_dir: PathBuf) -> Result<()> {
    let store = BeadStore::open(beads_dir);
    let beads = store.load().context("failed to load beads")?;
    bv_tui::run(TuiOptions {
        beads,
        bindings: config.bindings()?,
        threshold: config.threshold(),
        source: store.path().to_path_buf(),
    })
}

fn list_beads(beads_dir: &Path) -> Result<()> {
    let beads = BeadStore::open(beads_dir)
        .load()
        .context("failed to load beads")?;
    for bead in &beads {
        println!("{}", bead_line(bead));
    }
    Ok(())
}

fn bead_line(bead: &Bead) -> String {
    format!(
        "{}\t{}\tP{}\t{}",
        bead.id,
        bead.status.as_str(),
        bead.priority,
        bead.title
    )
}

fn keys_text(config: &AppConfig) -> Result<String> {
    let bindings = config.bindings()?;
    let on_off = |flag: bool| if flag { "on" } else { "off" };
    Ok(format!(
        "{}\ndouble-tap: {} ({}ms)\nhelp modal space: {}",
        bindings.hint(),
        on_off(bindings.double_tap),
        config.threshold().as_millis(),
        on_off(bindings.help_modal_space),
    ))
}

fn check_update(config: &AppConfig, url: Option<String>) -> Result<()> {
    if !config.update.enabled && url.is_none() {
        println!("update checks are disabled");
        return Ok(());
    }
    let url = url.unwrap_or_else(|| config.update.url.clone());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to initialize runtime")?;
    let client = reqwest::Client::builder()
        .timeout(UPDATE_TIMEOUT)
        .build()
        .context("failed to build http client")?;

    match runtime
        .block_on(check_for_updates(&client, &url))
        .context("update check failed")?
    {
        Some(release) => println!("{} is available: {}", release.tag, release.url),
        None => println!("beadview {CURRENT_VERSION} is up to date"),
    }
    Ok(())
}

/// Hooks run from the project root, the directory holding the beads dir.
fn run_hook(config: &AppConfig, beads_dir: &Path, name: &str) -> Result<()> {
    let command = config
        .hooks
        .get(name)
        .ok_or_else(|| anyhow!("no hook named {name} in config"))?;
    let runner = match beads_dir.parent() {
        Some(root) if !root.as_os_str().is_empty() => HookRunner::with_working_dir(root),
        _ => HookRunner::new(),
    };
    let output = runner
        .run(name, command)
        .with_context(|| format!("hook {name} failed"))?;
    print!("{}", output.stdout);
    Ok(())
}
