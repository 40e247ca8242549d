//! Played-songs log.
//!
//! ## Schema (tab-separated, no header)
//!
//!   station  artist  title  program  album_art_url
//!
//! One row per detected song change, in play order. The log is truncated
//! when the daemon starts, so it only covers the current session.

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::platform;
use crate::protocol::PlaybackStatus;

const COLUMNS: usize = 5;

/// One row of the log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub station: String,
    pub artist: String,
    pub title: String,
    pub program: String,
    pub album_art_url: String,
}

impl HistoryRecord {
    pub fn from_status(station: &str, status: &PlaybackStatus) -> Self {
        Self {
            station: station.to_string(),
            artist: status.artist.clone(),
            title: status.title.clone(),
            program: status.program.clone(),
            album_art_url: status.album_art_url.clone(),
        }
    }

    /// "Artist - Title", or whichever half is known.
    pub fn display(&self) -> String {
        match (self.artist.is_empty(), self.title.is_empty()) {
            (false, false) => format!("{} - {}", self.artist, self.title),
            (false, true) => self.artist.clone(),
            _ => self.title.clone(),
        }
    }
}

/// A selected record and the one played right before it; used to decide
/// whether the cached album art is still valid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecentPair {
    pub selected: HistoryRecord,
    pub previous: Option<HistoryRecord>,
}

pub struct HistoryLog {
    path: PathBuf,
}

impl HistoryLog {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Start a fresh session log.
    pub fn truncate(&self) -> anyhow::Result<()> {
        platform::ensure_parent(&self.path)?;
        std::fs::write(&self.path, "")?;
        Ok(())
    }

    pub fn append(&self, record: &HistoryRecord) -> anyhow::Result<()> {
        platform::ensure_parent(&self.path)?;
        let mut f = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        f.write_all(encode_row(record).as_bytes())?;
        debug!("[history] appended {:?}", record.display());
        Ok(())
    }

    /// All well-formed rows in play order.
    pub fn load(&self) -> Vec<HistoryRecord> {
        let Ok(content) = std::fs::read_to_string(&self.path) else {
            return Vec::new();
        };
        content.lines().filter_map(parse_row).collect()
    }

    /// The `index`-th most recent record (1 = latest) and the one before it.
    pub fn recent(&self, index: usize) -> Option<RecentPair> {
        let index = index.max(1);
        let rows = self.load();
        let mut newest_first = rows.into_iter().rev().skip(index - 1);
        let selected = newest_first.next()?;
        let previous = newest_first.next();
        Some(RecentPair { selected, previous })
    }
}

fn encode_row(r: &HistoryRecord) -> String {
    format!(
        "{}\t{}\t{}\t{}\t{}\n",
        esc(&r.station),
        esc(&r.artist),
        esc(&r.title),
        esc(&r.program),
        esc(&r.album_art_url),
    )
}

fn esc(s: &str) -> String {
    s.replace('\t', " ").replace('\n', " ").replace('\r', "")
}

fn parse_row(line: &str) -> Option<HistoryRecord> {
    let cols: Vec<&str> = line.split('\t').collect();
    if cols.len() < COLUMNS {
        return None;
    }
    Some(HistoryRecord {
        station: cols[0].to_string(),
        artist: cols[1].to_string(),
        title: cols[2].to_string(),
        program: cols[3].to_string(),
        album_art_url: cols[4].to_string(),
    })
}
