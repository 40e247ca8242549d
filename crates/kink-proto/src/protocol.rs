use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What the status endpoint reports for one station in one fetch.
///
/// Every text field is empty when the document does not carry it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct PlaybackStatus {
    pub connected: bool,
    pub artist: String,
    pub title: String,
    pub program: String,
    pub album_art_url: String,
}

impl PlaybackStatus {
    /// Extract `extended[station].{artist,title,album_art.320,program.title}`
    /// from the status document.
    pub fn from_document(doc: &Value, station: &str) -> Self {
        let entry = &doc["extended"][station];
        Self {
            connected: true,
            artist: text(&entry["artist"]),
            title: text(&entry["title"]),
            program: text(&entry["program"]["title"]),
            album_art_url: text(&entry["album_art"]["320"]),
        }
    }
}

fn text(value: &Value) -> String {
    value.as_str().unwrap_or_default().to_string()
}

/// Station ids from the document's `stations` object, sorted.
pub fn station_ids(doc: &Value) -> Vec<String> {
    let mut ids: Vec<String> = doc["stations"]
        .as_object()
        .map(|m| m.keys().cloned().collect())
        .unwrap_or_default();
    ids.sort();
    ids
}

/// Requests raised by the UI layer and consumed by the poll loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd")]
pub enum Command {
    SwitchStation { station: String },
    PlayPause,
    /// Re-show the notification for the song on air.
    ShowCurrent,
    /// Open the settings file in the default editor.
    EditSettings,
    ReloadSettings,
    OpenSite,
    OpenHistory,
    /// Raised by the player when a stream could not be started.
    StreamFailed { reason: String },
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TrayIcon {
    #[default]
    Normal,
    /// Muted variant shown while the status endpoint is unreachable.
    Offline,
}

impl TrayIcon {
    pub fn icon_name(&self) -> &'static str {
        match self {
            TrayIcon::Normal => crate::platform::APP_ICON,
            TrayIcon::Offline => crate::platform::OFFLINE_ICON,
        }
    }
}
