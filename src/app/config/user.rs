use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::http::DEFAULT_USER_AGENT;
use crate::library::{PlaylistSort, ScanSettings, SortOrder, TrackSort};

/// User-editable configuration (read only by the app after load)
/// stored in `config.toml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserConfig {
    #[serde(default)]
    pub library: ScanSettings,
    /// How often the library is rescanned, in seconds.
    #[serde(default = "default_scan_interval_secs")]
    pub scan_interval_secs: u64,
    /// Position sampling period while playing, in milliseconds.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_true")]
    pub match_duration_when_searching: bool,
    #[serde(default)]
    pub mpd: MpdConfig,
    #[serde(default)]
    pub sort: SortConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MpdConfig {
    #[serde(default = "default_mpd_host")]
    pub host: String,
    #[serde(default = "default_mpd_port")]
    pub port: u16,
    /// MPD's own `music_directory`; defaults to the first library directory.
    #[serde(default)]
    pub music_directory: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SortConfig {
    #[serde(default)]
    pub tracks: TrackSort,
    #[serde(default)]
    pub track_order: SortOrder,
    #[serde(default)]
    pub playlists: PlaylistSort,
    #[serde(default)]
    pub playlist_order: SortOrder,
}

fn default_scan_interval_secs() -> u64 {
    5
}

fn default_tick_interval_ms() -> u64 {
    50
}

fn default_request_timeout_secs() -> u64 {
    180
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_true() -> bool {
    true
}

fn default_mpd_host() -> String {
    "localhost".to_string()
}

fn default_mpd_port() -> u16 {
    6600
}

impl Default for MpdConfig {
    fn default() -> Self {
        Self {
            host: default_mpd_host(),
            port: default_mpd_port(),
            music_directory: None,
        }
    }
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            library: ScanSettings::default(),
            scan_interval_secs: default_scan_interval_secs(),
            tick_interval_ms: default_tick_interval_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            user_agent: default_user_agent(),
            match_duration_when_searching: true,
            mpd: MpdConfig::default(),
            sort: SortConfig::default(),
        }
    }
}

impl UserConfig {
    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs.max(1))
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn mpd_music_directory(&self) -> PathBuf {
        self.mpd
            .music_directory
            .clone()
            .or_else(|| self.library.music_directories.first().cloned())
            .unwrap_or_else(|| PathBuf::from("."))
    }
}
