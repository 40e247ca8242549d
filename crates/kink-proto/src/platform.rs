use std::path::{Path, PathBuf};

pub const APP_ID: &str = "kink-playing";

/// Icon name used for the tray and for connection notifications.
pub const APP_ICON: &str = "kink-playing";

/// Greyed-out tray icon shown while the status endpoint is unreachable.
pub const OFFLINE_ICON: &str = "kink-playing-grey";

pub const CONTROL_HOST: &str = "127.0.0.1";

pub fn control_address(port: u16) -> String {
    format!("{}:{}", CONTROL_HOST, port)
}

fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

/// `~/.kink-playing/` holds the settings file, the history log and the
/// daemon log.
pub fn local_dir() -> PathBuf {
    home_dir().join(format!(".{}", APP_ID))
}

pub fn settings_path() -> PathBuf {
    local_dir().join("settings.ini")
}

pub fn history_path() -> PathBuf {
    local_dir().join(format!("{}.csv", APP_ID))
}

pub fn log_path() -> PathBuf {
    local_dir().join(format!("{}.log", APP_ID))
}

pub fn temp_dir() -> PathBuf {
    std::env::temp_dir()
}

/// Cached album art for the song currently on air.
pub fn thumb_path() -> PathBuf {
    temp_dir().join(format!("{}.jpg", APP_ID))
}

pub fn autostart_path() -> PathBuf {
    // XDG autostart lives under ~/.config on every desktop we target
    home_dir()
        .join(".config")
        .join("autostart")
        .join(format!("{}-autostart.desktop", APP_ID))
}

#[cfg(unix)]
pub fn mpv_socket_name() -> String {
    format!("{}/{}-mpv.sock", temp_dir().display(), APP_ID)
}

#[cfg(windows)]
pub fn mpv_socket_name() -> String {
    format!("{}-mpv", APP_ID)
}

#[cfg(unix)]
pub fn mpv_socket_arg() -> String {
    format!("--input-ipc-server={}", mpv_socket_name())
}

#[cfg(windows)]
pub fn mpv_socket_arg() -> String {
    format!("--input-ipc-server=\\\\.\\pipe\\{}", mpv_socket_name())
}

#[cfg(unix)]
pub fn mpv_binary_name() -> &'static str {
    "mpv"
}

#[cfg(windows)]
pub fn mpv_binary_name() -> &'static str {
    "mpv.exe"
}

fn find_on_path(name: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(name))
        .find(|p| p.exists())
}

/// Find mpv for playback: beside the current executable first, then PATH.
pub fn find_mpv_binary() -> Option<PathBuf> {
    let exe_name = mpv_binary_name();

    if let Ok(current_exe) = std::env::current_exe() {
        if let Some(dir) = current_exe.parent() {
            let local_mpv = dir.join(exe_name);
            if local_mpv.exists() {
                return Some(local_mpv);
            }
        }
    }

    find_on_path(exe_name)
}

#[cfg(target_os = "macos")]
fn opener() -> &'static str {
    "open"
}

#[cfg(not(target_os = "macos"))]
fn opener() -> &'static str {
    "xdg-open"
}

/// Command that hands a URL or file to the desktop's default application.
/// The caller spawns it and reaps the child.
pub fn open_command(target: impl AsRef<std::ffi::OsStr>) -> std::process::Command {
    let mut cmd = std::process::Command::new(opener());
    cmd.arg(target)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null());
    cmd
}

pub fn ensure_parent(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}
