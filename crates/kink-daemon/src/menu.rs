//! Toolkit-agnostic tray menu model.

use kink_proto::protocol::Command;
use serde::Serialize;

/// A single menu entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MenuItem {
    pub label: String,
    /// Icon name shown beside the label.
    pub icon: Option<String>,
    /// Whether the item is clickable.
    pub enabled: bool,
    /// Command raised on click. `None` for headers and separators.
    pub action: Option<Command>,
    /// Nested entries (the station list).
    pub submenu: Vec<MenuItem>,
}

impl MenuItem {
    fn action(label: impl Into<String>, action: Command) -> Self {
        Self {
            label: label.into(),
            icon: None,
            enabled: true,
            action: Some(action),
            submenu: Vec::new(),
        }
    }

    fn separator() -> Self {
        Self {
            label: String::new(),
            icon: None,
            enabled: false,
            action: None,
            submenu: Vec::new(),
        }
    }

    fn with_icon(mut self, icon: &str) -> Self {
        self.icon = Some(icon.to_string());
        self
    }

    #[cfg(test)]
    fn is_separator(&self) -> bool {
        self.label.is_empty() && self.action.is_none() && self.submenu.is_empty()
    }
}

/// Everything the menu depends on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MenuState {
    pub site_label: String,
    pub stations: Vec<String>,
    pub current_station: String,
    pub playing: bool,
    pub online: bool,
}

impl MenuState {
    pub fn build_menu(&self) -> Vec<MenuItem> {
        let mut items = Vec::new();

        items.push(MenuItem {
            label: "ꓘINK".into(),
            icon: None,
            enabled: true,
            action: None,
            submenu: vec![
                MenuItem::action(self.site_label.clone(), Command::OpenSite),
                MenuItem::separator(),
                MenuItem::action("Show played songs", Command::OpenHistory),
                MenuItem::separator(),
                MenuItem::action("Settings", Command::EditSettings),
                MenuItem::action("Reload settings", Command::ReloadSettings),
            ],
        });

        items.push(MenuItem::separator());
        let stations = self
            .stations
            .iter()
            .map(|s| {
                let item = MenuItem::action(
                    s.clone(),
                    Command::SwitchStation { station: s.clone() },
                );
                if *s == self.current_station {
                    item.with_icon("dialog-ok-apply")
                } else {
                    item
                }
            })
            .collect();
        items.push(MenuItem {
            label: "Stations".into(),
            icon: None,
            enabled: self.online,
            action: None,
            submenu: stations,
        });

        items.push(MenuItem::separator());
        let mut now_playing = MenuItem::action("Now playing", Command::ShowCurrent);
        now_playing.enabled = self.online;
        items.push(now_playing);

        items.push(MenuItem::separator());
        let mut play_pause = if self.playing {
            MenuItem::action("Pause", Command::PlayPause).with_icon("media-playback-pause")
        } else {
            MenuItem::action("Play", Command::PlayPause).with_icon("media-playback-start")
        };
        play_pause.enabled = self.online;
        items.push(play_pause);

        items.push(MenuItem::separator());
        items.push(MenuItem::action("Quit", Command::Quit));

        items
    }
}
