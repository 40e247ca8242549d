//! Tray snapshot: the render sink used when no toolkit is attached.
//!
//! The poll loop repaints into a shared snapshot; the control API serves it
//! to whatever front end draws the actual tray.
use std::sync::{Arc, RwLock};

use kink_proto::protocol::TrayIcon;
use serde::Serialize;
use tracing::debug;

use crate::menu::{MenuItem, MenuState};
use crate::sinks::TraySink;

#[derive(Debug, Clone, Default, Serialize)]
pub struct TraySnapshot {
    /// Incremented on every repaint so clients can spot changes.
    pub rev: u64,
    pub icon: TrayIcon,
    pub icon_name: String,
    pub online: bool,
    pub playing: bool,
    pub station: String,
    pub now_playing: Option<String>,
    pub menu: Vec<MenuItem>,
}

pub type SharedSnapshot = Arc<RwLock<TraySnapshot>>;

pub struct SnapshotTray {
    snapshot: SharedSnapshot,
}

impl SnapshotTray {
    pub fn new() -> Self {
        let snapshot = TraySnapshot {
            icon_name: TrayIcon::Normal.icon_name().to_string(),
            ..TraySnapshot::default()
        };
        Self {
            snapshot: Arc::new(RwLock::new(snapshot)),
        }
    }

    pub fn shared(&self) -> SharedSnapshot {
        Arc::clone(&self.snapshot)
    }

    fn update(&mut self, f: impl FnOnce(&mut TraySnapshot)) {
        // a poisoned lock only means a reader panicked mid-clone
        let mut guard = match self.snapshot.write() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard);
        guard.rev += 1;
    }
}

impl TraySink for SnapshotTray {
    fn repaint_menu(&mut self, menu: &MenuState) {
        debug!(
            "[tray] repaint: station={} online={} playing={}",
            menu.current_station, menu.online, menu.playing
        );
        let items = menu.build_menu();
        self.update(|s| {
            s.online = menu.online;
            s.playing = menu.playing;
            s.station = menu.current_station.clone();
            s.menu = items;
        });
    }

    fn set_tray_icon(&mut self, icon: TrayIcon) {
        debug!("[tray] icon → {}", icon.icon_name());
        self.update(|s| {
            s.icon = icon;
            s.icon_name = icon.icon_name().to_string();
        });
    }

    fn set_now_playing(&mut self, now_playing: Option<String>) {
        self.update(|s| s.now_playing = now_playing);
    }
}

pub fn read_snapshot(shared: &SharedSnapshot) -> TraySnapshot {
    match shared.read() {
        Ok(g) => g.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}
