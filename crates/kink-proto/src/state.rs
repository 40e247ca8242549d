use serde::Serialize;
use std::time::Duration;

/// Connectivity edge detected by [`PollerState::observe_reachability`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    /// First unreachable sample after being connected.
    Lost,
    /// First reachable sample after an outage.
    Restored,
    Unchanged,
}

/// State owned by the poll loop.
///
/// `was_connected` starts out true so that a failing first fetch is
/// reported as a lost connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PollerState {
    previous_title: String,
    was_connected: bool,
    current_station: String,
    poll_interval_secs: u64,
}

impl PollerState {
    pub fn new(station: impl Into<String>, poll_interval_secs: u64) -> Self {
        Self {
            previous_title: String::new(),
            was_connected: true,
            current_station: station.into(),
            poll_interval_secs: poll_interval_secs.max(1),
        }
    }

    pub fn previous_title(&self) -> &str {
        &self.previous_title
    }

    pub fn is_connected(&self) -> bool {
        self.was_connected
    }

    pub fn station(&self) -> &str {
        &self.current_station
    }

    /// Select another station. Returns false when it is already current.
    pub fn set_station(&mut self, station: &str) -> bool {
        if self.current_station == station {
            return false;
        }
        self.current_station = station.to_string();
        true
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn set_poll_interval(&mut self, secs: u64) {
        self.poll_interval_secs = secs.max(1);
    }

    /// Feed one reachability sample and report the edge it causes, if any.
    pub fn observe_reachability(&mut self, reachable: bool) -> Connectivity {
        match (self.was_connected, reachable) {
            (true, false) => {
                self.was_connected = false;
                Connectivity::Lost
            }
            (false, true) => {
                self.was_connected = true;
                Connectivity::Restored
            }
            _ => Connectivity::Unchanged,
        }
    }

    /// Feed a fetched title. Returns true when it is a song change, in which
    /// case it becomes the new previous title.
    pub fn observe_title(&mut self, title: &str) -> bool {
        if title.is_empty() || title == self.previous_title {
            return false;
        }
        self.previous_title = title.to_string();
        true
    }
}
