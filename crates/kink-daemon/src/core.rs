//! PlayingCore: single-owner poll loop for all mutable state.
//!
//! Owns `PollerState`, the history log, the thumbnail cache and the sinks.
//! Every `wait` seconds it samples the status endpoint and turns the sample
//! into at most one connectivity edge and at most one song change.
//!
//! UI requests arrive as `Command`s on an mpsc channel and are handled
//! between ticks without moving the next tick's deadline. Cancellation wakes
//! the inter-tick wait immediately; a fetch that is already in flight is
//! allowed to finish but no further fetch is issued.
use std::path::PathBuf;

use kink_proto::config::{self, Settings};
use kink_proto::history::{HistoryLog, HistoryRecord, RecentPair};
use kink_proto::platform::{self, APP_ICON};
use kink_proto::protocol::{Command, TrayIcon};
use kink_proto::state::{Connectivity, PollerState};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::autostart;
use crate::fetcher::StatusSource;
use crate::menu::MenuState;
use crate::sinks::{Notice, NotifySink, OpenSink, StreamSink, TraySink};
use crate::thumb::ThumbCache;

/// Files the core reads and writes.
#[derive(Debug, Clone)]
pub struct CorePaths {
    pub settings: PathBuf,
    pub history: PathBuf,
    pub thumb: PathBuf,
    pub autostart: PathBuf,
}

impl Default for CorePaths {
    fn default() -> Self {
        Self {
            settings: platform::settings_path(),
            history: platform::history_path(),
            thumb: platform::thumb_path(),
            autostart: platform::autostart_path(),
        }
    }
}

pub struct Sinks {
    pub tray: Box<dyn TraySink>,
    pub stream: Box<dyn StreamSink>,
    pub notifier: Box<dyn NotifySink>,
    pub opener: Box<dyn OpenSink>,
}

pub struct PlayingCore<S: StatusSource> {
    settings: Settings,
    paths: CorePaths,
    state: PollerState,
    history: HistoryLog,
    thumbs: ThumbCache,
    source: S,
    sinks: Sinks,
    /// True while the user wants the stream to be audible.
    playing: bool,
    cancel: CancellationToken,
}

impl<S: StatusSource> PlayingCore<S> {
    pub fn new(
        settings: Settings,
        paths: CorePaths,
        source: S,
        sinks: Sinks,
        cancel: CancellationToken,
    ) -> Self {
        let state = PollerState::new(settings.station.clone(), settings.wait);
        Self {
            history: HistoryLog::new(paths.history.clone()),
            thumbs: ThumbCache::new(paths.thumb.clone()),
            settings,
            paths,
            state,
            source,
            sinks,
            playing: false,
            cancel,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> &PollerState {
        &self.state
    }

    #[cfg(test)]
    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Run until cancelled or until every command sender is gone.
    pub async fn run(mut self, mut commands: mpsc::Receiver<Command>) -> anyhow::Result<()> {
        info!("PlayingCore: starting poll loop");
        self.start().await?;

        let cancel = self.cancel.clone();
        'poll: loop {
            if cancel.is_cancelled() {
                break;
            }
            self.tick().await;

            let deadline = Instant::now() + self.state.poll_interval();
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break 'poll,
                    cmd = commands.recv() => match cmd {
                        Some(cmd) => {
                            info!("PlayingCore: command {:?}", cmd);
                            self.handle_command(cmd).await;
                        }
                        None => {
                            info!("PlayingCore: command channel closed, shutting down");
                            cancel.cancel();
                            break 'poll;
                        }
                    },
                    _ = tokio::time::sleep_until(deadline) => break,
                }
            }
        }

        self.shutdown()
    }

    async fn start(&mut self) -> anyhow::Result<()> {
        self.history.truncate()?;
        self.apply_autostart();
        if self.settings.autoplay {
            self.sinks.stream.play_stream(self.settings.stream_for(self.state.station()));
            self.playing = true;
        }
        self.repaint().await;
        Ok(())
    }

    fn shutdown(&mut self) -> anyhow::Result<()> {
        info!("PlayingCore: stopping, station={}", self.state.station());
        self.sinks.stream.stop_stream();
        self.playing = false;
        config::save_station(&self.paths.settings, self.state.station())?;
        Ok(())
    }

    /// One poll cycle.
    pub async fn tick(&mut self) {
        let timeout = self.state.poll_interval();
        let reachable = self.source.is_reachable(&self.settings.json, timeout).await;

        match self.state.observe_reachability(reachable) {
            Connectivity::Lost => {
                warn!("Lost connection to {}", self.settings.json);
                self.repaint().await;
                self.sinks.tray.set_tray_icon(TrayIcon::Offline);
                self.sinks.notifier.notify(Notice {
                    summary: format!("Unable to connect to: {}", self.state.station()),
                    body: None,
                    icon: Some(APP_ICON.to_string()),
                    timeout_secs: self.settings.show_notification,
                });
            }
            Connectivity::Restored => {
                info!("Connection to {} restored", self.settings.json);
                self.repaint().await;
                self.sinks.tray.set_tray_icon(TrayIcon::Normal);
            }
            Connectivity::Unchanged => {}
        }

        if !reachable || self.cancel.is_cancelled() {
            return;
        }

        let Some(status) = self
            .source
            .fetch_status(&self.settings.json, self.state.station(), timeout)
            .await
        else {
            return;
        };
        if !self.state.observe_title(&status.title) {
            return;
        }

        let record = HistoryRecord::from_status(self.state.station(), &status);
        if let Err(e) = self.history.append(&record) {
            error!("Failed to append to {:?}: {}", self.history.path(), e);
            return;
        }
        self.show_song_info(1).await;
    }

    /// Present the `index`-th most recent song (1 = latest).
    async fn show_song_info(&mut self, index: usize) {
        let Some(RecentPair { selected, previous }) = self.history.recent(index) else {
            debug!("No song to show yet");
            return;
        };

        if selected.album_art_url.is_empty() {
            self.thumbs.clear().await;
        } else {
            let art_changed = previous
                .as_ref()
                .map_or(true, |p| p.album_art_url != selected.album_art_url);
            if !self.thumbs.exists() || art_changed || index > 1 {
                let timeout = self.state.poll_interval();
                match self.source.fetch_art(&selected.album_art_url, timeout).await {
                    Some(bytes) => self.thumbs.store(&bytes).await,
                    None => {
                        warn!("Album art {} unavailable", selected.album_art_url);
                        // never show the previous song's cover
                        self.thumbs.clear().await;
                    }
                }
            } else {
                debug!("Reusing cached album art");
            }
        }

        info!("Now playing: {}", selected.display());
        self.sinks.tray.set_now_playing(Some(selected.display()));

        if self.settings.notifications_enabled() {
            let icon = self
                .thumbs
                .exists()
                .then(|| self.thumbs.path().display().to_string());
            self.sinks.notifier.notify(Notice {
                summary: format!("{}: {}", selected.station, selected.program),
                body: Some(song_table(&selected)),
                icon,
                timeout_secs: self.settings.show_notification,
            });
        }
    }

    pub async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::SwitchStation { station } => self.switch_station(&station).await,
            Command::PlayPause => {
                if self.playing {
                    self.sinks.stream.pause_stream();
                    self.playing = false;
                } else {
                    self.sinks.stream.play_stream(self.settings.stream_for(self.state.station()));
                    self.playing = true;
                }
                self.repaint().await;
            }
            Command::ShowCurrent => {
                self.show_song_info(1).await;
                self.thumbs.clear().await;
            }
            Command::EditSettings => {
                let target = self.paths.settings.display().to_string();
                self.sinks.opener.open(&target);
            }
            Command::ReloadSettings => self.reload_settings().await,
            Command::OpenSite => self.sinks.opener.open(&self.settings.site),
            Command::OpenHistory => {
                let target = self.history.path().display().to_string();
                self.sinks.opener.open(&target);
            }
            Command::StreamFailed { reason } => self.stream_failed(&reason).await,
            Command::Quit => {
                info!("Quit requested");
                self.cancel.cancel();
            }
        }
    }

    async fn stream_failed(&mut self, reason: &str) {
        error!("Stream for {} failed: {}", self.state.station(), reason);
        if !self.playing {
            return;
        }
        self.playing = false;
        self.repaint().await;
        self.sinks.notifier.notify(Notice {
            summary: format!("Unable to play: {}", self.state.station()),
            body: Some(markup_escape(reason)),
            icon: Some(APP_ICON.to_string()),
            timeout_secs: self.settings.show_notification,
        });
    }

    async fn switch_station(&mut self, station: &str) {
        if !self.state.set_station(station) {
            return;
        }
        info!("Switch station: {}", station);

        if self.playing {
            self.sinks.stream.stop_stream();
            self.sinks.stream.play_stream(self.settings.stream_for(station));
        }
        self.repaint().await;
    }

    async fn reload_settings(&mut self) {
        let settings = match Settings::load(&self.paths.settings) {
            Ok(s) => s,
            Err(e) => {
                error!("Failed to reload {:?}: {}", self.paths.settings, e);
                return;
            }
        };
        info!("Settings reloaded from {:?}", self.paths.settings);

        let edited_station = (settings.station != self.settings.station)
            .then(|| settings.station.clone());
        self.state.set_poll_interval(settings.wait);
        self.settings = settings;
        self.apply_autostart();

        match edited_station {
            Some(station) => self.switch_station(&station).await,
            None => self.repaint().await,
        }
    }

    fn apply_autostart(&self) {
        if let Err(e) = autostart::apply(self.settings.autostart, &self.paths.autostart) {
            warn!("Failed to update autostart entry: {}", e);
        }
    }

    async fn repaint(&mut self) {
        let stations = if self.state.is_connected() {
            self.source
                .list_stations(&self.settings.json, self.state.poll_interval())
                .await
        } else {
            Vec::new()
        };
        let menu = MenuState {
            site_label: self.settings.site_label().to_string(),
            stations,
            current_station: self.state.station().to_string(),
            playing: self.playing,
            online: self.state.is_connected(),
        };
        self.sinks.tray.repaint_menu(&menu);
    }
}

fn markup_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Artist/title table for the notification body.
fn song_table(record: &HistoryRecord) -> String {
    let row = |label: &str, value: &str| {
        format!(
            "<tr><td><b>{}</b></td><td>:</td><td> </td><td>{}</td></tr>",
            label,
            markup_escape(value)
        )
    };
    let mut out = String::from("<table>");
    if !record.artist.is_empty() {
        out.push_str(&row("Artist", &record.artist));
    }
    if !record.title.is_empty() {
        out.push_str(&row("Title", &record.title));
    }
    out.push_str("</table>");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use kink_proto::protocol::PlaybackStatus;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    // ── scripted source ──────────────────────────────────────────────────────

    #[derive(Default)]
    struct Script {
        reachable: VecDeque<bool>,
        statuses: VecDeque<Option<PlaybackStatus>>,
        stations: Vec<String>,
        reach_calls: usize,
        art_calls: Vec<String>,
    }

    #[derive(Clone, Default)]
    struct FakeSource(Arc<Mutex<Script>>);

    impl FakeSource {
        fn reachable(&self, samples: &[bool]) {
            self.0.lock().unwrap().reachable.extend(samples);
        }

        fn song(&self, title: &str, art: &str) {
            self.0.lock().unwrap().statuses.push_back(Some(status(title, art)));
        }

        fn unavailable(&self) {
            self.0.lock().unwrap().statuses.push_back(None);
        }

        fn art_calls(&self) -> Vec<String> {
            self.0.lock().unwrap().art_calls.clone()
        }

        fn reach_calls(&self) -> usize {
            self.0.lock().unwrap().reach_calls
        }
    }

    fn status(title: &str, art: &str) -> PlaybackStatus {
        PlaybackStatus {
            connected: true,
            artist: format!("Artist {}", title),
            title: title.into(),
            program: "Show".into(),
            album_art_url: art.into(),
        }
    }

    impl StatusSource for FakeSource {
        async fn is_reachable(&self, _endpoint: &str, _timeout: Duration) -> bool {
            let mut s = self.0.lock().unwrap();
            s.reach_calls += 1;
            s.reachable.pop_front().unwrap_or(true)
        }

        async fn fetch_status(
            &self,
            _endpoint: &str,
            _station: &str,
            _timeout: Duration,
        ) -> Option<PlaybackStatus> {
            self.0.lock().unwrap().statuses.pop_front().flatten()
        }

        async fn list_stations(&self, _endpoint: &str, _timeout: Duration) -> Vec<String> {
            self.0.lock().unwrap().stations.clone()
        }

        async fn fetch_art(&self, url: &str, _timeout: Duration) -> Option<Vec<u8>> {
            self.0.lock().unwrap().art_calls.push(url.to_string());
            Some(url.as_bytes().to_vec())
        }
    }

    // ── recording sinks ──────────────────────────────────────────────────────

    #[derive(Debug, Clone, PartialEq)]
    enum Seen {
        Repaint { online: bool, playing: bool, station: String },
        Icon(TrayIcon),
        NowPlaying(Option<String>),
        Notify(Notice),
        Play(String),
        Pause,
        Stop,
        Open(String),
    }

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<Seen>>>);

    impl Recorder {
        fn push(&self, seen: Seen) {
            self.0.lock().unwrap().push(seen);
        }

        fn all(&self) -> Vec<Seen> {
            self.0.lock().unwrap().clone()
        }

        fn clear(&self) {
            self.0.lock().unwrap().clear();
        }

        fn notices(&self) -> Vec<Notice> {
            self.all()
                .into_iter()
                .filter_map(|s| match s {
                    Seen::Notify(n) => Some(n),
                    _ => None,
                })
                .collect()
        }
    }

    impl TraySink for Recorder {
        fn repaint_menu(&mut self, menu: &MenuState) {
            self.push(Seen::Repaint {
                online: menu.online,
                playing: menu.playing,
                station: menu.current_station.clone(),
            });
        }

        fn set_tray_icon(&mut self, icon: TrayIcon) {
            self.push(Seen::Icon(icon));
        }

        fn set_now_playing(&mut self, now_playing: Option<String>) {
            self.push(Seen::NowPlaying(now_playing));
        }
    }

    impl StreamSink for Recorder {
        fn play_stream(&mut self, url: &str) {
            self.push(Seen::Play(url.to_string()));
        }

        fn pause_stream(&mut self) {
            self.push(Seen::Pause);
        }

        fn stop_stream(&mut self) {
            self.push(Seen::Stop);
        }
    }

    impl NotifySink for Recorder {
        fn notify(&mut self, notice: Notice) {
            self.push(Seen::Notify(notice));
        }
    }

    impl OpenSink for Recorder {
        fn open(&mut self, target: &str) {
            self.push(Seen::Open(target.to_string()));
        }
    }

    // ── harness ──────────────────────────────────────────────────────────────

    struct Harness {
        core: PlayingCore<FakeSource>,
        source: FakeSource,
        seen: Recorder,
        paths: CorePaths,
        cancel: CancellationToken,
        _dir: tempfile::TempDir,
    }

    fn harness(settings_ini: &str) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let paths = CorePaths {
            settings: dir.path().join("settings.ini"),
            history: dir.path().join("kink-playing.csv"),
            thumb: dir.path().join("kink-playing.jpg"),
            autostart: dir.path().join("autostart").join("kink-playing-autostart.desktop"),
        };
        std::fs::write(&paths.settings, settings_ini).unwrap();
        let settings = Settings::load(&paths.settings).unwrap();

        let source = FakeSource::default();
        source.0.lock().unwrap().stations = vec!["kink".into(), "kinkdna".into()];
        let seen = Recorder::default();
        let sinks = Sinks {
            tray: Box::new(seen.clone()),
            stream: Box::new(seen.clone()),
            notifier: Box::new(seen.clone()),
            opener: Box::new(seen.clone()),
        };
        let cancel = CancellationToken::new();
        let core = PlayingCore::new(settings, paths.clone(), source.clone(), sinks, cancel.clone());
        Harness {
            core,
            source,
            seen,
            paths,
            cancel,
            _dir: dir,
        }
    }

    fn quiet() -> Harness {
        harness("[kink]\nwait = 1\nautoplay = 0\n")
    }

    fn history_titles(h: &Harness) -> Vec<String> {
        HistoryLog::new(h.paths.history.clone())
            .load()
            .into_iter()
            .map(|r| r.title)
            .collect()
    }

    // ── connectivity ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_outage_notifies_once_and_recovers_silently() {
        let mut h = quiet();
        h.core.start().await.unwrap();
        h.seen.clear();

        h.source.reachable(&[false, false, false, true]);
        for _ in 0..4 {
            h.core.tick().await;
        }

        let notices = h.seen.notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].summary, "Unable to connect to: kink");
        assert_eq!(notices[0].icon.as_deref(), Some("kink-playing"));

        let seen = h.seen.all();
        let icons: Vec<_> = seen
            .iter()
            .filter_map(|s| match s {
                Seen::Icon(i) => Some(*i),
                _ => None,
            })
            .collect();
        assert_eq!(icons, vec![TrayIcon::Offline, TrayIcon::Normal]);

        let repaints: Vec<bool> = seen
            .iter()
            .filter_map(|s| match s {
                Seen::Repaint { online, .. } => Some(*online),
                _ => None,
            })
            .collect();
        assert_eq!(repaints, vec![false, true]);
        assert!(h.core.state().is_connected());
    }

    #[tokio::test]
    async fn test_first_sample_failure_is_reported() {
        let mut h = quiet();
        h.source.reachable(&[false]);
        h.core.tick().await;
        assert_eq!(h.seen.notices().len(), 1);
        assert!(!h.core.state().is_connected());
    }

    #[tokio::test]
    async fn test_healthy_start_is_silent() {
        let mut h = quiet();
        h.source.reachable(&[true, true]);
        h.core.tick().await;
        h.core.tick().await;
        assert!(h.seen.all().is_empty());
    }

    #[tokio::test]
    async fn test_each_outage_notifies_again() {
        let mut h = quiet();
        h.source.reachable(&[false, true, false, false, true]);
        for _ in 0..5 {
            h.core.tick().await;
        }
        assert_eq!(h.seen.notices().len(), 2);
    }

    // ── song changes ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_song_changes_append_history_and_notify() {
        let mut h = quiet();
        h.core.start().await.unwrap();
        h.seen.clear();

        h.source.song("Song A", "http://x/a.jpg");
        h.source.song("Song A", "http://x/a.jpg");
        h.source.song("Song B", "http://x/b.jpg");
        for _ in 0..3 {
            h.core.tick().await;
        }

        assert_eq!(history_titles(&h), vec!["Song A", "Song B"]);
        assert_eq!(h.source.art_calls(), vec!["http://x/a.jpg", "http://x/b.jpg"]);

        let notices = h.seen.notices();
        assert_eq!(notices.len(), 2);
        assert_eq!(notices[0].summary, "kink: Show");
        let body = notices[1].body.as_deref().unwrap();
        assert!(body.contains("Artist Song B"));
        assert!(body.contains("Song B"));
        assert_eq!(
            notices[1].icon.as_deref(),
            Some(h.paths.thumb.display().to_string().as_str())
        );
        assert_eq!(std::fs::read(&h.paths.thumb).unwrap(), b"http://x/b.jpg");
        assert_eq!(h.core.state().previous_title(), "Song B");
    }

    #[tokio::test]
    async fn test_shared_cover_is_not_downloaded_twice() {
        let mut h = quiet();
        h.source.song("Song A", "http://x/a.jpg");
        h.source.song("Song B", "http://x/a.jpg");
        h.core.tick().await;
        h.core.tick().await;

        assert_eq!(history_titles(&h).len(), 2);
        assert_eq!(h.source.art_calls(), vec!["http://x/a.jpg"]);
    }

    #[tokio::test]
    async fn test_missing_cover_clears_cache() {
        let mut h = quiet();
        h.source.song("Song A", "http://x/a.jpg");
        h.source.song("Song B", "");
        h.core.tick().await;
        assert!(h.paths.thumb.exists());
        h.core.tick().await;
        assert!(!h.paths.thumb.exists());

        let notices = h.seen.notices();
        assert_eq!(notices.len(), 2);
        assert!(notices[1].icon.is_none());
    }

    #[tokio::test]
    async fn test_empty_or_failed_fetch_is_not_a_change() {
        let mut h = quiet();
        h.source.song("", "");
        h.source.unavailable();
        h.source.song("Song A", "");
        h.source.unavailable();
        h.source.song("Song A", "");
        for _ in 0..5 {
            h.core.tick().await;
        }
        assert_eq!(history_titles(&h), vec!["Song A"]);
        assert_eq!(h.seen.notices().len(), 1);
    }

    #[tokio::test]
    async fn test_no_fetch_while_offline() {
        let mut h = quiet();
        h.source.reachable(&[false]);
        h.source.song("Song A", "");
        h.core.tick().await;
        assert!(history_titles(&h).is_empty());

        // the queued status is consumed on the next reachable tick
        h.core.tick().await;
        assert_eq!(history_titles(&h), vec!["Song A"]);
    }

    #[tokio::test]
    async fn test_disabled_notifications_still_record_history() {
        let mut h = harness("[kink]\nwait = 1\nautoplay = 0\nshow_notification = 0\n");
        h.source.song("Song A", "http://x/a.jpg");
        h.source.song("Song B", "http://x/b.jpg");
        h.core.tick().await;
        h.core.tick().await;

        assert_eq!(history_titles(&h), vec!["Song A", "Song B"]);
        assert!(h.seen.notices().is_empty());
        assert!(h
            .seen
            .all()
            .contains(&Seen::NowPlaying(Some("Artist Song B - Song B".into()))));
    }

    #[tokio::test]
    async fn test_show_current_renotifies_and_drops_cover() {
        let mut h = quiet();
        h.source.song("Song A", "http://x/a.jpg");
        h.source.song("Song B", "http://x/a.jpg");
        h.core.tick().await;
        h.core.tick().await;

        h.core.handle_command(Command::ShowCurrent).await;
        assert_eq!(h.seen.notices().len(), 3);
        assert!(!h.paths.thumb.exists());
        // shared cover is still cached when re-shown
        assert_eq!(h.source.art_calls().len(), 1);

        // the next re-show has to fetch it again
        h.core.handle_command(Command::ShowCurrent).await;
        assert_eq!(h.source.art_calls().len(), 2);
    }

    #[tokio::test]
    async fn test_show_current_without_history_is_noop() {
        let mut h = quiet();
        h.core.handle_command(Command::ShowCurrent).await;
        assert!(h.seen.notices().is_empty());
    }

    // ── commands ─────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_autoplay_starts_stream() {
        let mut h = harness("[kink]\nautoplay = 1\nstation = kinkdna\n");
        h.core.start().await.unwrap();
        assert!(h.core.is_playing());
        let seen = h.seen.all();
        assert_eq!(
            seen[0],
            Seen::Play("http://playerservices.streamtheworld.com/pls/KINK_DNA.pls".into())
        );
        assert_eq!(
            seen[1],
            Seen::Repaint {
                online: true,
                playing: true,
                station: "kinkdna".into()
            }
        );
    }

    #[tokio::test]
    async fn test_play_pause_toggles() {
        let mut h = quiet();
        h.core.handle_command(Command::PlayPause).await;
        assert!(h.core.is_playing());
        h.core.handle_command(Command::PlayPause).await;
        assert!(!h.core.is_playing());

        let seen = h.seen.all();
        assert!(matches!(seen[0], Seen::Play(ref url) if url.ends_with("KINK.pls")));
        assert!(matches!(seen[1], Seen::Repaint { playing: true, .. }));
        assert_eq!(seen[2], Seen::Pause);
        assert!(matches!(seen[3], Seen::Repaint { playing: false, .. }));
    }

    #[tokio::test]
    async fn test_switch_station_restarts_playing_stream() {
        let mut h = harness("[kink]\nautoplay = 1\n");
        h.core.start().await.unwrap();
        h.seen.clear();

        h.core
            .handle_command(Command::SwitchStation {
                station: "kinkindie".into(),
            })
            .await;
        let seen = h.seen.all();
        assert_eq!(seen[0], Seen::Stop);
        assert!(matches!(seen[1], Seen::Play(ref url) if url.ends_with("KINKINDIE.pls")));
        assert!(matches!(seen[2], Seen::Repaint { ref station, .. } if station == "kinkindie"));
        assert_eq!(h.core.state().station(), "kinkindie");

        h.seen.clear();
        h.core
            .handle_command(Command::SwitchStation {
                station: "kinkindie".into(),
            })
            .await;
        assert!(h.seen.all().is_empty());
    }

    #[tokio::test]
    async fn test_switch_station_while_paused_stays_silent() {
        let mut h = quiet();
        h.core
            .handle_command(Command::SwitchStation {
                station: "kinkdna".into(),
            })
            .await;
        let seen = h.seen.all();
        assert_eq!(seen.len(), 1);
        assert!(matches!(seen[0], Seen::Repaint { .. }));
    }

    #[tokio::test]
    async fn test_reload_applies_new_settings() {
        let mut h = quiet();
        std::fs::write(
            &h.paths.settings,
            "[kink]\nwait = 3\nautoplay = 0\nautostart = 1\nshow_notification = 0\n",
        )
        .unwrap();
        h.core.handle_command(Command::ReloadSettings).await;

        assert_eq!(h.core.state().poll_interval(), Duration::from_secs(3));
        assert!(h.paths.autostart.exists());

        h.source.song("Song A", "");
        h.core.tick().await;
        assert!(h.seen.notices().is_empty());
    }

    #[tokio::test]
    async fn test_reload_follows_edited_station() {
        let mut h = quiet();
        std::fs::write(&h.paths.settings, "[kink]\nwait = 1\nstation = kinkdna\n").unwrap();
        h.core.handle_command(Command::ReloadSettings).await;
        assert_eq!(h.core.state().station(), "kinkdna");
    }

    #[tokio::test]
    async fn test_settings_menu_opens_settings_file() {
        let mut h = quiet();
        let menu = MenuState {
            site_label: "kink.nl".into(),
            stations: Vec::new(),
            current_station: "kink".into(),
            playing: false,
            online: true,
        }
        .build_menu();
        let action = menu[0]
            .submenu
            .iter()
            .find(|i| i.label == "Settings")
            .and_then(|i| i.action.clone())
            .unwrap();

        h.core.handle_command(action).await;
        assert_eq!(
            h.seen.all(),
            vec![Seen::Open(h.paths.settings.display().to_string())]
        );
    }

    #[tokio::test]
    async fn test_open_site_and_history() {
        let mut h = quiet();
        h.core.handle_command(Command::OpenSite).await;
        h.core.handle_command(Command::OpenHistory).await;
        assert_eq!(
            h.seen.all(),
            vec![
                Seen::Open("https://kink.nl".into()),
                Seen::Open(h.paths.history.display().to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_stream_failure_resets_playback() {
        let mut h = harness("[kink]\nautoplay = 1\n");
        h.core.start().await.unwrap();
        h.seen.clear();

        h.core
            .handle_command(Command::StreamFailed {
                reason: "mpv binary not found".into(),
            })
            .await;
        assert!(!h.core.is_playing());

        let seen = h.seen.all();
        assert!(matches!(seen[0], Seen::Repaint { playing: false, .. }));
        let notices = h.seen.notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].summary, "Unable to play: kink");
        assert_eq!(notices[0].body.as_deref(), Some("mpv binary not found"));

        // the next toggle tries to play again
        h.core.handle_command(Command::PlayPause).await;
        assert!(h.core.is_playing());
    }

    #[tokio::test]
    async fn test_stream_failure_while_paused_is_quiet() {
        let mut h = quiet();
        h.core
            .handle_command(Command::StreamFailed {
                reason: "gone".into(),
            })
            .await;
        assert!(h.seen.all().is_empty());
    }

    #[tokio::test]
    async fn test_quit_cancels() {
        let mut h = quiet();
        h.core.handle_command(Command::Quit).await;
        assert!(h.cancel.is_cancelled());
    }

    // ── loop ─────────────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn test_loop_ticks_every_interval_until_cancelled() {
        let h = quiet();
        h.source.reachable(&[false, false, false, true]);
        let (_tx, rx) = mpsc::channel(8);

        let source = h.source.clone();
        let seen = h.seen.clone();
        let cancel = h.cancel.clone();
        let task = tokio::spawn(h.core.run(rx));

        tokio::time::sleep(Duration::from_millis(3500)).await;
        cancel.cancel();
        task.await.unwrap().unwrap();

        assert_eq!(source.reach_calls(), 4);
        let lost = seen
            .notices()
            .iter()
            .filter(|n| n.summary.starts_with("Unable to connect"))
            .count();
        assert_eq!(lost, 1);
        assert_eq!(seen.all().last(), Some(&Seen::Stop));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_interrupts_long_wait() {
        let h = harness("[kink]\nwait = 600\nautoplay = 0\n");
        let (_tx, rx) = mpsc::channel(8);
        let source = h.source.clone();
        let cancel = h.cancel.clone();
        let task = tokio::spawn(h.core.run(rx));

        tokio::time::sleep(Duration::from_secs(1)).await;
        let before = tokio::time::Instant::now();
        cancel.cancel();
        task.await.unwrap().unwrap();

        assert_eq!(source.reach_calls(), 1);
        assert!(tokio::time::Instant::now() - before < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_quit_command_persists_station() {
        let h = harness("[kink]\nwait = 60\nautoplay = 1\nstation = kink\n");
        let (tx, rx) = mpsc::channel(8);
        let settings_path = h.paths.settings.clone();
        let seen = h.seen.clone();
        let task = tokio::spawn(h.core.run(rx));

        tx.send(Command::SwitchStation {
            station: "kinkdna".into(),
        })
        .await
        .unwrap();
        tx.send(Command::Quit).await.unwrap();
        task.await.unwrap().unwrap();

        let saved = Settings::load(&settings_path).unwrap();
        assert_eq!(saved.station, "kinkdna");
        assert_eq!(seen.all().last(), Some(&Seen::Stop));
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_command_channel_stops_loop() {
        let h = quiet();
        let (tx, rx) = mpsc::channel(8);
        let task = tokio::spawn(h.core.run(rx));
        drop(tx);
        task.await.unwrap().unwrap();
    }

    #[test]
    fn test_song_table_escapes_markup() {
        let record = HistoryRecord {
            station: "kink".into(),
            artist: "Simon & Garfunkel".into(),
            title: "<Untitled>".into(),
            program: String::new(),
            album_art_url: String::new(),
        };
        let table = song_table(&record);
        assert!(table.contains("Simon &amp; Garfunkel"));
        assert!(table.contains("&lt;Untitled&gt;"));
        assert!(table.starts_with("<table><tr><td><b>Artist</b>"));
    }
}
