mod autostart;
mod core;
mod fetcher;
mod http;
mod menu;
mod mpv;
mod notifier;
mod opener;
mod sinks;
mod thumb;
mod tray;

use kink_proto::config::Settings;
use kink_proto::platform;
use kink_proto::protocol::Command;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Setup file logging + stderr
    let local_dir = platform::local_dir();
    std::fs::create_dir_all(&local_dir)?;
    std::fs::create_dir_all(platform::temp_dir())?;
    let log_path = platform::log_path();

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
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,kink_playing=debug")),
        )
        .init();

    info!("Log file: {:?}", log_path);

    let paths = core::CorePaths::default();
    let (settings, first_run) = Settings::load_or_create(&paths.settings)?;
    info!("Settings loaded from: {:?}", paths.settings);

    // Command channel: HTTP control API, Ctrl-C and player failures funnel into PlayingCore
    let (cmd_tx, cmd_rx) = tokio::sync::mpsc::channel::<Command>(64);
    let cancel = CancellationToken::new();

    let tray = tray::SnapshotTray::new();
    let snapshot = tray.shared();
    let (player, player_handle) = mpv::MpvPlayer::spawn(cmd_tx.clone());
    let sinks = core::Sinks {
        tray: Box::new(tray),
        stream: Box::new(player),
        notifier: Box::new(notifier::DesktopNotifier::new(platform::APP_ID)),
        opener: Box::new(opener::DesktopOpener),
    };

    let source = fetcher::HttpStatusSource::new()?;

    let _http_handle = http::start_server(settings.control_port, snapshot, cmd_tx.clone());

    let signal_tx = cmd_tx.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received");
                let _ = signal_tx.send(Command::Quit).await;
            }
            Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
        }
    });
    if first_run {
        // let the user review the freshly written defaults
        let _ = cmd_tx.try_send(Command::EditSettings);
    }
    drop(cmd_tx);

    let playing_core = core::PlayingCore::new(settings, paths, source, sinks, cancel);
    info!("Initialised, running poll loop");
    let result = playing_core.run(cmd_rx).await;

    // core (and with it the last player sender) is gone; wait for mpv to exit
    if let Err(e) = player_handle.await {
        error!("mpv player task failed: {}", e);
    }
    info!("Exited");
    result
}
