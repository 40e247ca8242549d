//! `settings.ini` handling.
//!
//! The file holds a single `[kink]` section of `key = value` lines. Every key
//! the application reads has an entry in [`DEFAULTS`]; keys missing from the
//! file are appended back with their default so the user can see and edit
//! them.

use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use tracing::info;

use super::platform;

pub const SECTION: &str = "kink";

/// Every known setting with the value used when it is absent.
pub const DEFAULTS: &[(&str, &str)] = &[
    ("site", "https://kink.nl"),
    (
        "stream_kink",
        "https://playerservices.streamtheworld.com/pls/KINK.pls",
    ),
    (
        "stream_dna",
        "http://playerservices.streamtheworld.com/pls/KINK_DNA.pls",
    ),
    (
        "stream_indie",
        "https://playerservices.streamtheworld.com/pls/KINKINDIE.pls",
    ),
    (
        "stream_distortion",
        "https://playerservices.streamtheworld.com/pls/KINK_DISTORTION.pls",
    ),
    ("json", "https://api.kink.nl/static/now-playing.json"),
    ("station", "kink"),
    ("wait", "10"),
    ("show_notification", "10"),
    ("autostart", "0"),
    ("autoplay", "1"),
    ("control_port", "8991"),
];

/// Playlist URLs for each stream variant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Streams {
    pub kink: String,
    pub dna: String,
    pub indie: String,
    pub distortion: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Settings {
    pub site: String,
    pub streams: Streams,
    /// Now-playing status endpoint.
    pub json: String,
    /// Last selected station id.
    pub station: String,
    /// Poll interval in seconds, never below 1.
    pub wait: u64,
    /// Notification timeout in seconds. Zero or negative disables song
    /// notifications.
    pub show_notification: i64,
    pub autostart: bool,
    pub autoplay: bool,
    /// Port of the loopback control API, 0 to disable it.
    pub control_port: u16,
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_values(&BTreeMap::new())
    }
}

impl Settings {
    /// Load the settings file, creating it from the defaults when it does
    /// not exist and appending any missing keys.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        Self::load_or_create(path).map(|(settings, _)| settings)
    }

    /// Like [`Settings::load`], also reporting whether the file was created.
    pub fn load_or_create(path: &Path) -> anyhow::Result<(Self, bool)> {
        let created = !path.exists();
        if created {
            platform::ensure_parent(path)?;
            std::fs::write(path, default_file_contents())?;
            info!("Created default settings at {:?}", path);
        }

        let content = std::fs::read_to_string(path)?;
        let (settings, missing) = normalize(&content);
        if !missing.is_empty() {
            append_missing(path, &missing)?;
            info!("Appended missing settings {:?} to {:?}", missing, path);
        }
        Ok((settings, created))
    }

    fn from_values(values: &BTreeMap<String, String>) -> Self {
        let get = |key: &str| -> String {
            values
                .get(key)
                .cloned()
                .unwrap_or_else(|| default_for(key).to_string())
        };
        let int = |key: &str| -> i64 { str_int(&get(key), str_int(default_for(key), 0)) };

        Self {
            site: get("site"),
            streams: Streams {
                kink: get("stream_kink"),
                dna: get("stream_dna"),
                indie: get("stream_indie"),
                distortion: get("stream_distortion"),
            },
            json: get("json"),
            station: get("station"),
            wait: int("wait").max(1) as u64,
            show_notification: int("show_notification"),
            autostart: int("autostart") == 1,
            autoplay: int("autoplay") == 1,
            control_port: u16::try_from(int("control_port")).unwrap_or(8991),
        }
    }

    /// Playlist URL for a station id. Ids are matched by substring so
    /// variants such as `kinkdna` resolve to the DNA stream.
    pub fn stream_for(&self, station: &str) -> &str {
        if station.contains("dna") {
            &self.streams.dna
        } else if station.contains("indie") {
            &self.streams.indie
        } else if station.contains("distortion") {
            &self.streams.distortion
        } else {
            &self.streams.kink
        }
    }

    pub fn notifications_enabled(&self) -> bool {
        self.show_notification > 0
    }

    /// Label for the site menu entry: the last path segment of the site URL.
    pub fn site_label(&self) -> &str {
        let trimmed = self.site.trim_end_matches('/');
        match trimmed.rfind('/') {
            Some(idx) => &trimmed[idx + 1..],
            None => trimmed,
        }
    }
}

pub fn default_for(key: &str) -> &'static str {
    DEFAULTS
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, v)| *v)
        .unwrap_or("")
}

/// Parse an integer setting, falling back to `default` on anything that is
/// not a plain integer.
pub fn str_int(value: &str, default: i64) -> i64 {
    value.trim().parse().unwrap_or(default)
}

fn default_file_contents() -> String {
    let mut out = format!("[{}]\n", SECTION);
    for (key, value) in DEFAULTS {
        out.push_str(&format!("{} = {}\n", key, value));
    }
    out
}

/// Parse INI text into section → key → value. Keys are lower-cased; a key
/// without a delimiter gets an empty value.
pub fn parse_ini(content: &str) -> BTreeMap<String, BTreeMap<String, String>> {
    let mut sections: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
    let mut current: Option<String> = None;

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            let name = name.trim().to_string();
            sections.entry(name.clone()).or_default();
            current = Some(name);
            continue;
        }

        let Some(section) = current.as_ref() else {
            continue;
        };

        let (key, value) = match line.find(['=', ':']) {
            Some(idx) => (&line[..idx], line[idx + 1..].trim()),
            None => (line, ""),
        };
        sections
            .entry(section.clone())
            .or_default()
            .insert(key.trim().to_lowercase(), value.to_string());
    }

    sections
}

/// Build [`Settings`] from file content and report which known keys were
/// missing from the `[kink]` section.
pub fn normalize(content: &str) -> (Settings, Vec<(&'static str, &'static str)>) {
    let sections = parse_ini(content);
    let values = sections.get(SECTION).cloned().unwrap_or_default();

    let missing = DEFAULTS
        .iter()
        .filter(|(key, _)| !values.contains_key(*key))
        .copied()
        .collect();

    (Settings::from_values(&values), missing)
}

fn append_missing(path: &Path, missing: &[(&str, &str)]) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(path).unwrap_or_default();
    let has_section = parse_ini(&content).contains_key(SECTION);

    let mut f = std::fs::OpenOptions::new().append(true).open(path)?;
    if !has_section {
        write!(f, "\n[{}]\n", SECTION)?;
    }
    for (key, value) in missing {
        write!(f, "\n{} = {}\n", key, value)?;
    }
    Ok(())
}

/// Persist the selected station, keeping every other line of the file as
/// the user wrote it.
pub fn save_station(path: &Path, station: &str) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(path).unwrap_or_default();
    let mut lines: Vec<String> = content.lines().map(|l| l.to_string()).collect();

    let mut in_section = false;
    let mut section_end: Option<usize> = None;
    let mut replaced = false;

    for (idx, line) in lines.iter_mut().enumerate() {
        let trimmed = line.trim();
        if trimmed.starts_with('[') && trimmed.ends_with(']') {
            if in_section {
                section_end = Some(idx);
            }
            in_section = trimmed[1..trimmed.len() - 1].trim() == SECTION;
            continue;
        }
        if !in_section {
            continue;
        }
        let key = trimmed
            .find(['=', ':'])
            .map(|i| &trimmed[..i])
            .unwrap_or(trimmed)
            .trim()
            .to_lowercase();
        if key == "station" {
            *line = format!("station = {}", station);
            replaced = true;
            break;
        }
    }

    if !replaced {
        let entry = format!("station = {}", station);
        let has_section = parse_ini(&content).contains_key(SECTION);
        match section_end {
            Some(idx) => lines.insert(idx, entry),
            None if has_section => lines.push(entry),
            None => {
                lines.push(format!("[{}]", SECTION));
                lines.push(entry);
            }
        }
    }

    platform::ensure_parent(path)?;
    std::fs::write(path, lines.join("\n") + "\n")?;
    Ok(())
}
