use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::app::state::PlaybackMode;
use crate::library::Playlist;

/// Automatically saved session state
/// stored in `session.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistentState {
    #[serde(default)]
    pub playlist: Option<Playlist>,
    #[serde(default)]
    pub playback_mode: PlaybackMode,
}

/// Durable home of the last queue and playback mode.
pub trait PlayerStore: Send {
    fn playlist(&self) -> Option<Playlist>;
    fn playback_mode(&self) -> PlaybackMode;
    fn set_playlist(&mut self, playlist: &Playlist) -> Result<()>;
    fn set_playback_mode(&mut self, mode: PlaybackMode) -> Result<()>;
}

/// Keeps the state in memory and rewrites the file on every change.
pub struct JsonSessionStore {
    path: PathBuf,
    state: PersistentState,
}

impl JsonSessionStore {
    /// Open `path`. A missing or unreadable file starts a fresh session.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = Self::read(&path).unwrap_or_else(|e| {
            if path.exists() {
                warn!(path = %path.display(), error = %e, "ignoring unreadable session file");
            }
            PersistentState::default()
        });
        Self { path, state }
    }

    fn read(path: &Path) -> Result<PersistentState> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content).context("Failed to parse session state")
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = serde_json::to_string(&self.state).context("Failed to encode session state")?;
        fs::write(&self.path, content)
            .with_context(|| format!("Failed to write {}", self.path.display()))
    }

    pub fn state(&self) -> &PersistentState {
        &self.state
    }
}

impl PlayerStore for JsonSessionStore {
    fn playlist(&self) -> Option<Playlist> {
        self.state.playlist.clone()
    }

    fn playback_mode(&self) -> PlaybackMode {
        self.state.playback_mode
    }

    fn set_playlist(&mut self, playlist: &Playlist) -> Result<()> {
        self.state.playlist = Some(playlist.clone());
        self.save()
    }

    fn set_playback_mode(&mut self, mode: PlaybackMode) -> Result<()> {
        self.state.playback_mode = mode;
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::Track;

    #[test]
    fn test_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("session.json");

        let playlist = Playlist::new(Some("Mix".into()), vec![Track::from_path("/m/a.flac")]);
        {
            let mut store = JsonSessionStore::open(&path);
            assert_eq!(store.playlist(), None);
            assert_eq!(store.playback_mode(), PlaybackMode::Repeat);
            store.set_playlist(&playlist).unwrap();
            store.set_playback_mode(PlaybackMode::Shuffle).unwrap();
        }

        let reopened = JsonSessionStore::open(&path);
        assert_eq!(reopened.playlist(), Some(playlist));
        assert_eq!(reopened.playback_mode(), PlaybackMode::Shuffle);
    }

    #[test]
    fn test_corrupt_file_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, "{{{").unwrap();

        let store = JsonSessionStore::open(&path);
        assert_eq!(store.state(), &PersistentState::default());
    }
}
