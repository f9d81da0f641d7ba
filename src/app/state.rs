use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::library::{Playlist, Track};
use crate::lyrics::Lyrics;
use crate::player::RepeatMode;

/// Repeat/shuffle behaviour as the user sees it 🔁
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlaybackMode {
    #[default]
    Repeat,
    RepeatOne,
    Shuffle,
}

impl PlaybackMode {
    /// Repeat -> RepeatOne -> Shuffle -> Repeat
    pub fn next(self) -> Self {
        match self {
            Self::Repeat => Self::RepeatOne,
            Self::RepeatOne => Self::Shuffle,
            Self::Shuffle => Self::Repeat,
        }
    }

    pub fn repeat_mode(self) -> RepeatMode {
        match self {
            Self::Repeat | Self::Shuffle => RepeatMode::All,
            Self::RepeatOne => RepeatMode::One,
        }
    }

    pub fn shuffle(self) -> bool {
        matches!(self, Self::Shuffle)
    }
}

/// What is playing, from which queue, where and how.
///
/// Owned by the orchestrator; everyone else sees published snapshots.
/// `current_track`, when set, is always an entry of `playlist`.
/// The queue and the lyrics are shared with every published snapshot, so
/// an unchanged queue compares by pointer and is never copied on a tick.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PlaybackState {
    pub playlist: Option<Arc<Playlist>>,
    pub current_track: Option<Track>,
    pub is_playing: bool,
    pub position_ms: u64,
    pub mode: PlaybackMode,
    pub lyrics: Option<Arc<Lyrics>>,
    pub is_loading_lyrics: bool,
    pub is_player_expanded: bool,
}

impl PlaybackState {
    /// Back to "nothing loaded". Mode and UI flags survive.
    pub fn reset_playback(&mut self) {
        self.playlist = None;
        self.current_track = None;
        self.is_playing = false;
        self.position_ms = 0;
        self.lyrics = None;
        self.is_loading_lyrics = false;
    }

    pub fn is_loaded(&self) -> bool {
        self.playlist.as_ref().is_some_and(|p| !p.is_empty())
    }

    pub fn current_index(&self) -> Option<usize> {
        let track = self.current_track.as_ref()?;
        self.playlist.as_ref()?.position(track)
    }

    /// Lyrics of the current track, if that is what is loaded.
    pub fn current_lyrics(&self) -> Option<&Lyrics> {
        let uri = &self.current_track.as_ref()?.uri;
        self.lyrics.as_deref().filter(|l| &l.uri == uri)
    }

    pub fn active_lyrics_line(&self) -> Option<usize> {
        self.current_lyrics()?.active_line(self.position_ms)
    }
}
