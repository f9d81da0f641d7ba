use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One audio file known to the library 🎵
///
/// Values are immutable snapshots: a rescan produces fresh instances and
/// equality over every field is what tells the reconciler that something
/// actually changed on disk.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Track {
    /// Stable identity across rescans.
    pub uri: String,
    pub title: Option<String>,
    pub album: Option<String>,
    pub artist: Option<String>,
    pub album_artist: Option<String>,
    pub genre: Option<String>,
    /// Raw tag value, e.g. "1994" or "1994-05-02".
    pub year: Option<String>,
    /// Raw tag value, e.g. "7", "07/12" or "1007".
    pub track_number: Option<String>,
    /// kbps
    pub bitrate: Option<u32>,
    pub duration_ms: u64,
    pub size: u64,
    /// Seconds since the unix epoch.
    pub date_modified: u64,
    pub path: PathBuf,
    pub cover_art: Option<String>,
}

impl Track {
    /// Minimal track for a path, every tag left empty.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            uri: path.to_string_lossy().to_string(),
            title: None,
            album: None,
            artist: None,
            album_artist: None,
            genre: None,
            year: None,
            track_number: None,
            bitrate: None,
            duration_ms: 0,
            size: 0,
            date_modified: 0,
            path,
            cover_art: None,
        }
    }

    /// Directory holding the file, used for folder playlists.
    pub fn folder(&self) -> Option<String> {
        self.path
            .parent()
            .map(|p| p.to_string_lossy().to_string())
            .filter(|p| !p.is_empty())
    }
}

/// Ordered list of tracks with an optional display name.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Playlist {
    pub name: Option<String>,
    pub tracks: Vec<Track>,
}

impl Playlist {
    pub fn new(name: Option<String>, tracks: Vec<Track>) -> Self {
        Self { name, tracks }
    }

    pub fn singleton(track: Track) -> Self {
        Self {
            name: None,
            tracks: vec![track],
        }
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn contains(&self, track: &Track) -> bool {
        self.tracks.contains(track)
    }

    pub fn position(&self, track: &Track) -> Option<usize> {
        self.tracks.iter().position(|t| t == track)
    }

    pub fn find_by_uri(&self, uri: &str) -> Option<&Track> {
        self.tracks.iter().find(|t| t.uri == uri)
    }

    /// Name to show, falling back to the label of the grouping it came from.
    pub fn display_name(&self, kind: PlaylistKind) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| kind.fallback_name().to_string())
    }
}

/// Which grouping a playlist belongs to. Only matters for fallback names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaylistKind {
    Album,
    Artist,
    Genre,
    Folder,
}

impl PlaylistKind {
    pub fn fallback_name(self) -> &'static str {
        match self {
            Self::Album => "Unknown album",
            Self::Artist => "Unknown artist",
            Self::Genre => "Unknown genre",
            Self::Folder => "Unknown folder",
        }
    }
}
