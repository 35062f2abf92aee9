//! focusdeck CLI
//!
//! Brings the configured apps and integrations into "game mode" around a
//! game session:
//! - `start` / `stop`: run one half of the session
//! - `run`: start, wait for the game to exit, then stop
//! - `check` / `games`: inspect the configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use focusdeck_core::config::{Config, Directories, Phase};
use focusdeck_core::{AppManager, ProcessController};
use tokio::time::{Instant, sleep};
use tracing::{info, info_span, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// focusdeck - streaming/focus environment orchestrator
#[derive(Parser)]
#[command(name = "focusdeck")]
#[command(version, about, long_about = None)]
#[command(after_help = "\
Examples:
  focusdeck check valorant     Show what a session for 'valorant' would do
  focusdeck start valorant     Run the startup sequence
  focusdeck stop valorant      Run the shutdown sequence
  focusdeck run valorant       Start, wait for the game to exit, then stop
")]
struct Cli {
    /// Config file (defaults to the per-user config directory)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the startup sequence for a game
    Start { game: String },

    /// Run the shutdown sequence for a game
    Stop { game: String },

    /// Start, wait for the game process to appear and exit, then stop
    Run { game: String },

    /// Print the session, resolved actions and configuration problems for a game
    Check { game: String },

    /// List configured games
    Games,
}

/// Set up logging.
/// In debug builds, defaults to debug level and also logs to a timestamped file.
/// In release builds, defaults to info level and logs to stderr.
fn setup_logging(dirs: Option<&Directories>) {
    let default_level = if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "focusdeck={default_level},focusdeck_core={default_level},focusdeck_protocol={default_level}"
        ))
    });

    if cfg!(debug_assertions) {
        let log_dir = dirs.map_or_else(std::env::temp_dir, |d| d.logs.clone());
        let _ = std::fs::create_dir_all(&log_dir);
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let log_filename = format!("focusdeck-{timestamp}.log");
        let log_path = log_dir.join(&log_filename);

        let file_appender = tracing_appender::rolling::never(&log_dir, &log_filename);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        std::mem::forget(guard);

        let file_layer = fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .with_line_number(true);

        let stderr_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .with_target(true);

        tracing_subscriber::registry()
            .with(file_layer)
            .with(stderr_layer)
            .with(filter)
            .init();

        eprintln!("Logging to: {} (and stderr)", log_path.display());
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(filter)
            .init();
    }
}

fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        bail!("No config file at {}", path.display());
    }
    Config::load(path).with_context(|| format!("Failed to load {}", path.display()))
}

fn manager(config: Config, game: &str) -> Result<AppManager> {
    let span = info_span!("focusdeck", game = game);
    let process = ProcessController::system(info_span!(parent: &span, "process"));
    AppManager::for_game(config, game, process, span)
        .with_context(|| format!("Cannot set up a session for '{game}'"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let dirs = Directories::new();

    setup_logging(dirs.as_ref());

    let config_path = match (cli.config, &dirs) {
        (Some(path), _) => path,
        (None, Some(dirs)) => dirs.config_file.clone(),
        (None, None) => bail!("Cannot determine the config directory; pass --config"),
    };
    let config = load_config(&config_path)?;

    match cli.command {
        Commands::Start { game } => run_start(config, &game).await,
        Commands::Stop { game } => run_stop(config, &game).await,
        Commands::Run { game } => run_session(config, &game).await,
        Commands::Check { game } => run_check(&config, &game),
        Commands::Games => {
            run_games(&config);
            Ok(())
        }
    }
}

async fn run_start(config: Config, game: &str) -> Result<()> {
    let mut manager = manager(config, game)?;
    let ok = manager.run_startup_sequence().await;

    // The process exits after this command, so let background work finish
    for (name, state) in manager.task_states() {
        println!("Background task {name}: {state}, waiting for it");
    }
    for (name, state) in manager.cleanup().await {
        println!("Background task {name}: {state}");
    }
    if !ok {
        bail!("Startup for '{game}' finished with failures");
    }
    Ok(())
}

async fn run_stop(config: Config, game: &str) -> Result<()> {
    let mut manager = manager(config, game)?;
    if !manager.run_shutdown_sequence().await {
        bail!("Shutdown for '{game}' finished with failures");
    }
    Ok(())
}

async fn run_session(config: Config, game: &str) -> Result<()> {
    let game_config = config.game(game)?.clone();
    let timing = config.orchestrator.clone();
    let poll = Duration::from_millis(timing.game_poll_interval_ms.max(100));
    let watcher = ProcessController::system(info_span!("game", game = game));

    let mut manager = manager(config, game)?;
    let started = manager.run_startup_sequence().await;
    if !started {
        warn!("Startup for '{}' finished with failures, continuing", game);
    }

    if game_config.process_name.trim().is_empty() {
        warn!("No processName for '{}', waiting for Ctrl-C instead", game);
        tokio::signal::ctrl_c().await.context("Failed to wait for Ctrl-C")?;
    } else {
        wait_for_game(&watcher, &game_config.process_name, timing.game_start_timeout_ms, poll)
            .await?;
    }

    let stopped = manager.run_shutdown_sequence().await;
    if !(started && stopped) {
        bail!("Session for '{game}' finished with failures");
    }
    Ok(())
}

/// Wait for the game to appear, then for it to exit. Ctrl-C ends the wait early.
async fn wait_for_game(
    watcher: &ProcessController,
    pattern: &str,
    start_timeout_ms: u64,
    poll: Duration,
) -> Result<()> {
    let deadline = Instant::now() + Duration::from_millis(start_timeout_ms);
    let wait = async {
        info!("Waiting for {} to start", pattern);
        while !watcher.is_running(pattern) {
            if Instant::now() >= deadline {
                warn!("{} did not start within {}ms", pattern, start_timeout_ms);
                return;
            }
            sleep(poll).await;
        }

        info!("{} is running, waiting for it to exit", pattern);
        while watcher.is_running(pattern) {
            sleep(poll).await;
        }
        info!("{} exited", pattern);
    };

    tokio::select! {
        () = wait => Ok(()),
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to wait for Ctrl-C")?;
            info!("Interrupted, shutting the session down");
            Ok(())
        }
    }
}

fn run_check(config: &Config, game: &str) -> Result<()> {
    let manager = manager(config.clone(), game)?;

    println!("Session for '{game}':");
    for id in manager.session().ids() {
        println!(
            "  {:<16} start: {:<20} end: {}",
            id,
            manager.resolve_action(id, Phase::Start),
            manager.resolve_action(id, Phase::End)
        );
    }

    let issues = config.validate_game(game);
    if issues.is_empty() {
        println!("No problems found");
        return Ok(());
    }

    println!("Problems:");
    for issue in &issues {
        println!("  - {issue}");
    }
    bail!("{} problem(s) in the configuration for '{game}'", issues.len())
}

fn run_games(config: &Config) {
    let mut games: Vec<_> = config.games.iter().collect();
    games.sort_by(|a, b| a.0.cmp(b.0));

    if games.is_empty() {
        println!("No games configured");
        return;
    }
    for (id, game) in games {
        println!("{:<16} {}", id, game.name);
    }
}
