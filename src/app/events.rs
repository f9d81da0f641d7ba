use crate::error::NetworkError;
use crate::library::{Playlist, Track};

/// Things a user (or a front end) can ask the player to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    SelectTrack { track: Track, playlist: Playlist },
    Play,
    Pause,
    SeekNext,
    SeekPrevious,
    SeekTo(u64),
    CyclePlaybackMode,
    EnqueueNext(Track),
    AppendToQueue(Track),
    RequestLyrics,
    SetPlayerExpanded(bool),
}

/// Transient, user-facing messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    LyricsMissingTags,
    LyricsFailed(NetworkError),
    EngineFailed(String),
}

impl Notification {
    pub fn message(&self) -> String {
        match self {
            Self::LyricsMissingTags => "Track has no title or artist to look lyrics up with".into(),
            Self::LyricsFailed(NetworkError::NotFound) => "No lyrics found for this track".into(),
            Self::LyricsFailed(NetworkError::NoConnectivity) => "No internet connection".into(),
            Self::LyricsFailed(NetworkError::RequestTimeout) => "Lyrics request timed out".into(),
            Self::LyricsFailed(e) => format!("Could not load lyrics: {}", e),
            Self::EngineFailed(e) => format!("Playback error: {}", e),
        }
    }
}
