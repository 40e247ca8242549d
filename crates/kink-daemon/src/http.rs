use crate::tray::{read_snapshot, SharedSnapshot, TraySnapshot};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use kink_proto::platform;
use kink_proto::protocol::Command;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{error, info};

#[derive(Clone)]
struct HttpState {
    snapshot: SharedSnapshot,
    cmd_tx: mpsc::Sender<Command>,
}

pub fn router(snapshot: SharedSnapshot, cmd_tx: mpsc::Sender<Command>) -> Router {
    Router::new()
        .route("/api/state", get(get_state))
        .route("/api/station/:id", get(switch_station).post(switch_station))
        .route("/api/playpause", get(play_pause).post(play_pause))
        .route("/api/current", get(show_current).post(show_current))
        .route("/api/settings", get(edit_settings).post(edit_settings))
        .route("/api/reload", get(reload).post(reload))
        .route("/api/site", get(open_site).post(open_site))
        .route("/api/history", get(open_history).post(open_history))
        .route("/api/quit", get(quit).post(quit))
        .with_state(HttpState { snapshot, cmd_tx })
}

/// Serve the control API on loopback. Port 0 disables it.
pub fn start_server(
    port: u16,
    snapshot: SharedSnapshot,
    cmd_tx: mpsc::Sender<Command>,
) -> Option<tokio::task::JoinHandle<()>> {
    if port == 0 {
        info!("HTTP control API disabled");
        return None;
    }

    Some(tokio::spawn(async move {
        let addr = platform::control_address(port);
        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind HTTP server to {}: {}", addr, e);
                return;
            }
        };

        info!("HTTP control API listening on http://{}", addr);

        if let Err(e) = axum::serve(listener, router(snapshot, cmd_tx)).await {
            error!("HTTP server error: {}", e);
        }
    }))
}

async fn dispatch(state: &HttpState, cmd: Command) -> StatusCode {
    info!("HTTP API: {:?}", cmd);
    if state.cmd_tx.send(cmd).await.is_err() {
        error!("Failed to send command, poll loop is gone");
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    StatusCode::OK
}

async fn get_state(State(state): State<HttpState>) -> Json<TraySnapshot> {
    Json(read_snapshot(&state.snapshot))
}

async fn switch_station(State(state): State<HttpState>, Path(id): Path<String>) -> StatusCode {
    dispatch(&state, Command::SwitchStation { station: id }).await
}

async fn play_pause(State(state): State<HttpState>) -> StatusCode {
    dispatch(&state, Command::PlayPause).await
}

async fn show_current(State(state): State<HttpState>) -> StatusCode {
    dispatch(&state, Command::ShowCurrent).await
}

async fn edit_settings(State(state): State<HttpState>) -> StatusCode {
    dispatch(&state, Command::EditSettings).await
}

async fn reload(State(state): State<HttpState>) -> StatusCode {
    dispatch(&state, Command::ReloadSettings).await
}

async fn open_site(State(state): State<HttpState>) -> StatusCode {
    dispatch(&state, Command::OpenSite).await
}

async fn open_history(State(state): State<HttpState>) -> StatusCode {
    dispatch(&state, Command::OpenHistory).await
}

async fn quit(State(state): State<HttpState>) -> StatusCode {
    dispatch(&state, Command::Quit).await
}
