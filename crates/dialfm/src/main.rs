mod core;
mod dial;
mod display;
#[cfg(unix)]
mod mpv;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use dialfm_core::config::Config;
use dialfm_core::credentials::Credentials;
use dialfm_core::manifest::SyncManifest;
use dialfm_core::sync::{HttpCatalog, SyncEngine};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser, Debug)]
#[command(name = "dialfm", version, about = "Dial radio for a synced recordings catalog")]
struct Args {
    /// Config file (default: ~/.config/dialfm/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run one sync against the remote catalog and exit
    #[arg(long)]
    sync_only: bool,

    /// Dial reading before any input arrives, in tenths of a MHz
    #[arg(long, default_value_t = 1000)]
    frequency: u16,
}

fn init_logging(log_dir: &Path) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("creating log dir {}", log_dir.display()))?;
    let log_path = log_dir.join("dialfm.log");

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_ansi(false);
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("info,dialfm=debug,dialfm_core=debug")
            }),
        )
        .init();

    Ok(log_path)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    let log_path = init_logging(&config.paths.log_dir)?;
    info!("Log file: {:?}", log_path);
    info!(
        "Config loaded from: {:?}",
        args.config.clone().unwrap_or_else(Config::config_path)
    );

    let credentials = Credentials::load(&config.remote.credentials_file)?;
    let catalog = HttpCatalog::new(&config.remote, &credentials)?;
    let engine = SyncEngine::new(
        catalog,
        &config.paths.recordings_dir,
        &config.paths.manifest_file,
    );
    let local = engine.load_local();
    info!(
        "Cached manifest: {} stations, {} files",
        local.stations.len(),
        local.file_count()
    );

    if args.sync_only {
        let outcome = engine.sync(local).await;
        if let Some(e) = outcome.remote_error {
            anyhow::bail!("sync failed: {}", e);
        }
        info!("Sync complete: {:?}", outcome.report);
        return Ok(());
    }

    run_radio(config, engine, local, args.frequency).await
}

#[cfg(unix)]
async fn run_radio(
    config: Config,
    engine: SyncEngine<HttpCatalog>,
    local: SyncManifest,
    initial_frequency: u16,
) -> anyhow::Result<()> {
    use std::sync::Arc;

    use dialfm_core::catalog::FrequencyIndex;
    use dialfm_core::playback::PlaybackMachine;
    use dialfm_core::tuner::Tuner;

    let index = Arc::new(FrequencyIndex::build(&local.stations));
    let mixer = mpv::MpvMixer::spawn().await.context("starting mpv")?;
    let machine = PlaybackMachine::new(
        mixer,
        &config.paths.recordings_dir,
        &config.paths.static_sound,
        &config.playback,
    );
    let tuner = Tuner::new(index, config.playback.station_choice);

    // Event channel: dial ticks, sync results and shutdown all funnel into RadioCore
    let (event_tx, event_rx) = tokio::sync::mpsc::channel::<core::RadioEvent>(256);

    let radio_core = core::RadioCore::new(
        config.timing.clone(),
        tuner,
        machine,
        dial::StdinDial::spawn(initial_frequency),
        display::LogDisplay::default(),
    );

    core::spawn_ticker(config.timing.poll_interval(), event_tx.clone());
    core::spawn_sync(engine, local, config.timing.clone(), event_tx.clone());

    let shutdown_tx = event_tx;
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(core::RadioEvent::Shutdown).await;
        }
    });

    info!("Radio initialised, running event loop");
    radio_core.run(event_rx).await
}

#[cfg(not(unix))]
async fn run_radio(
    _config: Config,
    _engine: SyncEngine<HttpCatalog>,
    _local: SyncManifest,
    _initial_frequency: u16,
) -> anyhow::Result<()> {
    anyhow::bail!("the mpv audio backend needs unix domain sockets; only --sync-only is available here")
}
