/// mpv stream sink.
///
/// Architecture:
///
/// ```text
///   MpvPlayer (StreamSink) ── PlayerRequest ──► player_task
///                                                   │ owns MpvDriver
///                                                   ├── writer_task  ← MpvHandle::send → socket
///                                                   └── reader_task  ← JSON lines → matched reply
/// ```
///
/// The process is spawned lazily on the first `Play` and killed when every
/// `MpvPlayer` has been dropped.
///
/// Platform notes:
/// - Unix:   Unix domain sockets
/// - Windows: Named pipes  \\.\pipe\<name>
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, error, info, warn};

#[cfg(unix)]
use tokio::net::UnixStream;

#[cfg(windows)]
use tokio::net::windows::named_pipe::ClientOptions;

use kink_proto::protocol::Command;

use crate::sinks::StreamSink;

static NEXT_REQ_ID: AtomicU64 = AtomicU64::new(1);

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<anyhow::Result<Value>>>>>;

struct PendingRequest {
    req_id: u64,
    payload: String, // serialised JSON line (already has '\n')
    reply: oneshot::Sender<anyhow::Result<Value>>,
}

// ── handle ────────────────────────────────────────────────────────────────────

/// Cloneable handle to the mpv writer task.
#[derive(Clone)]
struct MpvHandle {
    tx: mpsc::Sender<PendingRequest>,
}

impl MpvHandle {
    async fn send(&self, command: Value) -> anyhow::Result<Value> {
        let req_id = NEXT_REQ_ID.fetch_add(1, Ordering::Relaxed);
        let msg = json!({ "command": command, "request_id": req_id });
        let mut raw = serde_json::to_string(&msg)?;
        raw.push('\n');

        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(PendingRequest {
                req_id,
                payload: raw,
                reply: reply_tx,
            })
            .await
            .map_err(|_| anyhow::anyhow!("mpv writer task gone"))?;

        tokio::time::timeout(tokio::time::Duration::from_secs(5), reply_rx)
            .await
            .map_err(|_| anyhow::anyhow!("mpv IPC timeout for req={}", req_id))?
            .map_err(|_| anyhow::anyhow!("mpv reply channel dropped req={}", req_id))?
    }

    async fn load_stream(&self, url: &str) -> anyhow::Result<()> {
        self.send(json!(["loadfile", url])).await?;
        self.set_pause(false).await
    }

    async fn set_pause(&self, paused: bool) -> anyhow::Result<()> {
        self.send(json!(["set_property", "pause", paused])).await?;
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        self.send(json!(["stop"])).await?;
        Ok(())
    }
}

// ── driver ────────────────────────────────────────────────────────────────────

/// Owns the mpv child process.
struct MpvDriver {
    socket_name: String,
    process: Option<tokio::process::Child>,
}

impl MpvDriver {
    fn new() -> Self {
        Self {
            socket_name: kink_proto::platform::mpv_socket_name(),
            process: None,
        }
    }

    fn process_alive(&mut self) -> bool {
        match self.process.as_mut() {
            Some(child) => child.try_wait().ok().flatten().is_none(),
            None => false,
        }
    }

    async fn kill(&mut self) {
        if let Some(mut p) = self.process.take() {
            let _ = p.kill().await;
        }
    }

    fn spawn_process(&mut self) -> anyhow::Result<()> {
        let mpv_binary = kink_proto::platform::find_mpv_binary()
            .ok_or_else(|| anyhow::anyhow!("mpv binary not found"))?;

        info!("mpv: spawning {:?}", mpv_binary);
        let child = tokio::process::Command::new(mpv_binary)
            .arg("--no-video")
            .arg("--idle=yes")
            .arg(kink_proto::platform::mpv_socket_arg())
            .arg("--quiet")
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()?;
        self.process = Some(child);
        Ok(())
    }

    #[cfg(unix)]
    async fn spawn_and_connect(&mut self) -> anyhow::Result<MpvHandle> {
        self.kill().await;

        let socket_path = std::path::PathBuf::from(&self.socket_name);
        let _ = tokio::fs::remove_file(&socket_path).await;

        self.spawn_process()?;

        // Wait for socket to appear
        for _ in 0..50 {
            tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
            if socket_path.exists() {
                break;
            }
        }
        if !socket_path.exists() {
            anyhow::bail!("mpv IPC socket did not appear");
        }

        let stream = UnixStream::connect(&socket_path).await?;
        info!("mpv: connected to IPC socket");
        let (read_half, write_half) = stream.into_split();
        Ok(start_io_tasks(read_half, write_half))
    }

    #[cfg(windows)]
    async fn spawn_and_connect(&mut self) -> anyhow::Result<MpvHandle> {
        self.kill().await;
        self.spawn_process()?;

        let pipe_path = format!(r"\\.\pipe\{}", self.socket_name);
        for _ in 0..50 {
            tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
            if let Ok(client) = ClientOptions::new().open(&pipe_path) {
                info!("mpv: connected to named pipe");
                let (read_half, write_half) = tokio::io::split(client);
                return Ok(start_io_tasks(read_half, write_half));
            }
        }
        anyhow::bail!("mpv named pipe did not appear")
    }
}

fn start_io_tasks<R, W>(read_half: R, write_half: W) -> MpvHandle
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
    W: tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
    let (cmd_tx, cmd_rx) = mpsc::channel::<PendingRequest>(64);

    tokio::spawn(writer_task(write_half, cmd_rx, pending.clone()));
    tokio::spawn(reader_task(BufReader::new(read_half), pending));

    MpvHandle { tx: cmd_tx }
}

// ── reader task ───────────────────────────────────────────────────────────────

async fn reader_task<R>(mut reader: BufReader<R>, pending: PendingMap)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                debug!("mpv reader: connection closed");
                fail_all(&pending, "mpv IPC connection closed").await;
                break;
            }
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let val: Value = match serde_json::from_str(trimmed) {
                    Ok(v) => v,
                    Err(e) => {
                        debug!("mpv reader: invalid json '{}': {}", trimmed, e);
                        continue;
                    }
                };

                let Some(req_id) = val.get("request_id").and_then(|v| v.as_u64()) else {
                    // events are not needed; playback state is tracked by the caller
                    debug!("mpv reader: event {}", trimmed);
                    continue;
                };

                let mut map = pending.lock().await;
                if let Some(tx) = map.remove(&req_id) {
                    let result = if val["error"].as_str() == Some("success") {
                        Ok(val)
                    } else {
                        let err = val["error"].as_str().unwrap_or("unknown error");
                        Err(anyhow::anyhow!("mpv error: {}", err))
                    };
                    let _ = tx.send(result);
                } else {
                    debug!("mpv reader: response for unknown req={}", req_id);
                }
            }
            Err(e) => {
                warn!("mpv reader: read error: {}", e);
                fail_all(&pending, "mpv IPC read error").await;
                break;
            }
        }
    }
}

async fn fail_all(pending: &PendingMap, reason: &str) {
    let mut map = pending.lock().await;
    for (_, tx) in map.drain() {
        let _ = tx.send(Err(anyhow::anyhow!("{}", reason)));
    }
}

// ── writer task ───────────────────────────────────────────────────────────────

async fn writer_task<W>(mut writer: W, mut rx: mpsc::Receiver<PendingRequest>, pending: PendingMap)
where
    W: tokio::io::AsyncWrite + Unpin,
{
    while let Some(req) = rx.recv().await {
        // Register reply channel before writing so reader can match it
        pending.lock().await.insert(req.req_id, req.reply);
        debug!("mpv writer: send req={} payload={}", req.req_id, req.payload.trim());
        if let Err(e) = writer.write_all(req.payload.as_bytes()).await {
            warn!("mpv writer: write error: {}", e);
            if let Some(tx) = pending.lock().await.remove(&req.req_id) {
                let _ = tx.send(Err(anyhow::anyhow!("mpv write error: {}", e)));
            }
            break;
        }
    }
    debug!("mpv writer: task exiting");
}

// ── player task ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
enum PlayerRequest {
    Play(String),
    Pause,
    Stop,
}

struct PlayerTask {
    driver: MpvDriver,
    handle: Option<MpvHandle>,
    loaded: Option<String>,
}

impl PlayerTask {
    async fn connected(&mut self) -> anyhow::Result<MpvHandle> {
        if let Some(handle) = &self.handle {
            if self.driver.process_alive() {
                return Ok(handle.clone());
            }
            warn!("mpv: process died, respawning");
            self.loaded = None;
        }
        let handle = self.driver.spawn_and_connect().await?;
        self.handle = Some(handle.clone());
        Ok(handle)
    }

    async fn handle(&mut self, req: PlayerRequest) -> anyhow::Result<()> {
        match req {
            PlayerRequest::Play(url) => {
                let mpv = self.connected().await?;
                if self.loaded.as_deref() == Some(url.as_str()) {
                    mpv.set_pause(false).await?;
                } else {
                    info!("mpv: loading {}", url);
                    mpv.load_stream(&url).await?;
                    self.loaded = Some(url);
                }
            }
            PlayerRequest::Pause => {
                if let Some(mpv) = &self.handle {
                    mpv.set_pause(true).await?;
                }
            }
            PlayerRequest::Stop => {
                if let Some(mpv) = &self.handle {
                    mpv.stop().await?;
                }
                self.loaded = None;
            }
        }
        Ok(())
    }
}

async fn player_task(mut rx: mpsc::Receiver<PlayerRequest>, failures: mpsc::Sender<Command>) {
    let mut task = PlayerTask {
        driver: MpvDriver::new(),
        handle: None,
        loaded: None,
    };
    while let Some(req) = rx.recv().await {
        debug!("mpv: request {:?}", req);
        let is_play = matches!(req, PlayerRequest::Play(_));
        if let Err(e) = task.handle(req).await {
            error!("mpv: {}", e);
            if is_play {
                report_failure(&failures, &e);
            }
        }
    }
    info!("mpv: player closed, stopping process");
    task.driver.kill().await;
}

/// Tell the poll loop that playback did not start.
fn report_failure(failures: &mpsc::Sender<Command>, err: &anyhow::Error) {
    let cmd = Command::StreamFailed {
        reason: err.to_string(),
    };
    if let Err(e) = failures.try_send(cmd) {
        warn!("mpv: could not report failure: {}", e);
    }
}

/// Stream sink backed by an mpv child process.
pub struct MpvPlayer {
    tx: mpsc::Sender<PlayerRequest>,
}

impl MpvPlayer {
    /// Start the player task. Failed plays are reported on `failures` as
    /// `Command::StreamFailed`. The returned handle completes once the player
    /// is dropped and mpv has been stopped.
    pub fn spawn(failures: mpsc::Sender<Command>) -> (Self, tokio::task::JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(32);
        let join = tokio::spawn(player_task(rx, failures));
        (Self { tx }, join)
    }

    fn request(&self, req: PlayerRequest) {
        if let Err(e) = self.tx.try_send(req) {
            warn!("mpv: dropping request: {}", e);
        }
    }
}

impl StreamSink for MpvPlayer {
    fn play_stream(&mut self, url: &str) {
        self.request(PlayerRequest::Play(url.to_string()));
    }

    fn pause_stream(&mut self) {
        self.request(PlayerRequest::Pause);
    }

    fn stop_stream(&mut self) {
        self.request(PlayerRequest::Stop);
    }
}
