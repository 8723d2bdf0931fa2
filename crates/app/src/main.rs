use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use nowbar_core::{AppConfig, SourceId};
use nowbar_sources::{build_adapter, ChangeNotifier, PollWatcher, RefreshHint, SourceAdapter};
use nowbar_sync::{AdapterFactory, SeekTicker, Synchronizer};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

mod artwork;
mod statusline;

#[derive(Parser, Debug)]
#[command(name = "nowbar", about = "Now Playing -> status line companion")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    Run,
    Doctor,
    Status,
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cmd = cli.command.unwrap_or(Commands::Run);
    let cfg_path = cli.config.unwrap_or_else(default_config_path);

    match cmd {
        Commands::Config {
            action: ConfigAction::Init,
        } => {
            init_config(&cfg_path)?;
            println!("Initialized config at {}", cfg_path.display());
            Ok(())
        }
        Commands::Doctor => {
            let cfg = load_or_default(&cfg_path)?;
            init_logging(&cfg.log_level);
            doctor(&cfg).await
        }
        Commands::Status => {
            let cfg = load_or_default(&cfg_path)?;
            init_logging(&cfg.log_level);
            status(&cfg).await
        }
        Commands::Run => {
            let cfg = load_or_default(&cfg_path)?;
            init_logging(&cfg.log_level);
            run(cfg, cfg_path).await
        }
    }
}

async fn run(cfg: AppConfig, cfg_path: PathBuf) -> Result<()> {
    let command_timeout = Duration::from_millis(cfg.intervals.command_timeout_ms);
    let factory: AdapterFactory = Arc::new(move |id| build_adapter(id, command_timeout));

    let fetcher = artwork::HttpArtworkFetcher::new(Duration::from_millis(
        cfg.intervals.artwork_timeout_ms,
    ))?;

    let (follow_up_tx, mut follow_up_rx) = mpsc::channel(16);
    let mut sync = Synchronizer::new(cfg.source, factory, follow_up_tx)
        .with_artwork_fetcher(Arc::new(fetcher));

    let (mut notifier, mut hint_rx) = ChangeNotifier::new(cfg.source);
    let mut watcher_task = spawn_watcher(&cfg, &notifier, sync.adapter());

    let (tick_tx, mut tick_rx) = mpsc::channel(4);
    let mut ticker = SeekTicker::new(Duration::from_millis(cfg.intervals.tick_ms));

    let mut emitter = statusline::StatusLine::new(cfg.status_width);
    let mut events = sync.subscribe();

    let mut reload_rx = spawn_reload_listener();

    info!(source = %notifier.active(), "nowbar started");
    sync.refresh(RefreshHint::default(), Instant::now()).await;
    if !sync.state().is_idle() {
        ticker.start(tick_tx.clone());
    }

    loop {
        tokio::select! {
            Some(hint) = hint_rx.recv() => {
                sync.refresh(hint, Instant::now()).await;
                if sync.state().is_idle() {
                    ticker.pause();
                } else {
                    ticker.start(tick_tx.clone());
                }
            }
            Some(follow_up) = follow_up_rx.recv() => {
                sync.apply_follow_up(follow_up);
            }
            Some(()) = tick_rx.recv() => {
                sync.tick(Instant::now());
            }
            event = events.recv() => {
                match event {
                    Ok(event) => emitter.render(&event),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "event stream lagged");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
            Some(()) = reload_rx.recv() => {
                match load_or_default(&cfg_path) {
                    Ok(new_cfg) if new_cfg.source != sync.state().source => {
                        sync.switch_source(new_cfg.source, Instant::now()).await;
                        notifier.rebind(new_cfg.source);
                        watcher_task.abort();
                        watcher_task = spawn_watcher(&cfg, &notifier, sync.adapter());
                        info!(source = %new_cfg.source, "active source switched");
                    }
                    Ok(_) => debug!("configuration reloaded, source unchanged"),
                    Err(err) => error!(error = %err, "failed to reload config"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("received ctrl-c; shutting down");
                break;
            }
        }
    }

    watcher_task.abort();
    Ok(())
}

fn spawn_watcher(
    cfg: &AppConfig,
    notifier: &ChangeNotifier,
    adapter: Arc<dyn SourceAdapter>,
) -> JoinHandle<()> {
    let watcher = PollWatcher::new(&cfg.intervals, notifier.sender());
    tokio::spawn(watcher.run(adapter))
}

/// SIGHUP re-reads the config; that is how the active source is switched on
/// a running daemon.
fn spawn_reload_listener() -> mpsc::Receiver<()> {
    let (tx, rx) = mpsc::channel(4);

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        tokio::spawn(async move {
            if let Ok(mut sig) = signal(SignalKind::hangup()) {
                while sig.recv().await.is_some() {
                    let _ = tx.send(()).await;
                }
            }
        });
    }
    #[cfg(not(unix))]
    drop(tx);

    rx
}

async fn doctor(cfg: &AppConfig) -> Result<()> {
    println!("== nowbar doctor ==");

    let bridge_ok = automation_bridge_available().await;
    println!(
        "automation bridge (osascript): {}",
        if bridge_ok { "available" } else { "not available" }
    );

    let timeout = Duration::from_millis(cfg.intervals.command_timeout_ms);
    for source in [SourceId::Spotify, SourceId::AppleMusic] {
        let adapter = build_adapter(source, timeout);
        println!(
            "{} ({}): {}",
            source,
            source.bundle_id(),
            if adapter.is_running().await {
                "running"
            } else {
                "not running"
            }
        );
    }

    println!(
        "macOS automation: verify System Settings > Privacy & Security > Automation allows \
         nowbar (or your shell) to control Spotify and Music"
    );

    Ok(())
}

async fn status(cfg: &AppConfig) -> Result<()> {
    let timeout = Duration::from_millis(cfg.intervals.command_timeout_ms);
    let adapter = build_adapter(cfg.source, timeout);

    println!("source: {}", cfg.source);
    if !adapter.is_running().await {
        println!("state: not running");
        return Ok(());
    }

    println!("state: {:?}", adapter.player_state().await);
    match adapter.current_track().await {
        Some(track) => {
            println!("track: {} - {}", track.artist, track.title);
            if !track.album.is_empty() {
                println!("album: {}", track.album);
            }
            println!(
                "position: {} / {}",
                statusline::format_seconds(adapter.position().await),
                statusline::format_seconds(track.duration_secs)
            );
        }
        None => println!("track: <none>"),
    }

    Ok(())
}

async fn automation_bridge_available() -> bool {
    let probe = tokio::process::Command::new("osascript")
        .arg("-e")
        .arg("1")
        .output();
    matches!(
        tokio::time::timeout(Duration::from_secs(2), probe).await,
        Ok(Ok(output)) if output.status.success()
    )
}

fn default_config_path() -> PathBuf {
    let base = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    base.join("nowbar").join("config.toml")
}

fn init_config(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create config directory {}", parent.display()))?;
    }
    let cfg = AppConfig::default();
    let toml = toml::to_string_pretty(&cfg)?;
    std::fs::write(path, toml)
        .with_context(|| format!("failed to write config file {}", path.display()))?;
    Ok(())
}

fn load_or_default(path: &Path) -> Result<AppConfig> {
    let mut cfg = if !path.exists() {
        AppConfig::default()
    } else {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&data).with_context(|| format!("failed to parse {}", path.display()))?
    };
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

fn apply_env_overrides(cfg: &mut AppConfig) {
    if let Ok(v) = std::env::var("NOWBAR_SOURCE") {
        if let Ok(parsed) = v.parse::<SourceId>() {
            cfg.source = parsed;
        }
    }
    if let Ok(v) = std::env::var("NOWBAR_LOG_LEVEL") {
        if !v.trim().is_empty() {
            cfg.log_level = v;
        }
    }
}

fn init_logging(log_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_new(log_level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
