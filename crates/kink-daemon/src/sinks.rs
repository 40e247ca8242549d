//! Collaborators the poll loop drives. Each one is fire-and-forget: the loop
//! never waits on UI, audio or notification work.
use kink_proto::protocol::TrayIcon;

use crate::menu::MenuState;

/// A desktop notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub summary: String,
    /// Markup body, if any.
    pub body: Option<String>,
    /// Icon name or path to an image file.
    pub icon: Option<String>,
    /// Display time in seconds; zero or negative leaves it to the server.
    pub timeout_secs: i64,
}

/// Renders the tray: menu and icon.
pub trait TraySink: Send {
    fn repaint_menu(&mut self, menu: &MenuState);
    fn set_tray_icon(&mut self, icon: TrayIcon);
    /// Latest song shown to the user.
    fn set_now_playing(&mut self, _now_playing: Option<String>) {}
}

pub trait StreamSink: Send {
    fn play_stream(&mut self, url: &str);
    fn pause_stream(&mut self);
    fn stop_stream(&mut self);
}

pub trait NotifySink: Send {
    fn notify(&mut self, notice: Notice);
}

/// Hands URLs and files to the desktop's default application.
pub trait OpenSink: Send {
    fn open(&mut self, target: &str);
}
