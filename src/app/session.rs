use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tokio::sync::{broadcast, mpsc, watch};

use super::config::{PlayerStore, UserConfig};
use super::events::{Command, Notification};
use super::orchestrator::{Message, Orchestrator};
use super::state::PlaybackState;
use crate::library::{LibraryResolver, Playlist, Track};
use crate::lyrics::LyricsResolver;
use crate::player::PlaybackEngine;

const INBOX_CAPACITY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub scan_interval: Duration,
    pub tick_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_secs(5),
            tick_interval: Duration::from_millis(50),
        }
    }
}

impl From<&UserConfig> for SessionConfig {
    fn from(config: &UserConfig) -> Self {
        Self {
            scan_interval: config.scan_interval(),
            tick_interval: config.tick_interval(),
        }
    }
}

/// Everything the orchestrator drives, handed over at start.
pub struct Collaborators {
    pub engine: Box<dyn PlaybackEngine>,
    pub resolver: Arc<dyn LibraryResolver>,
    pub store: Box<dyn PlayerStore>,
    pub lyrics: LyricsResolver,
}

/// Cheap, cloneable front door to a running player session.
#[derive(Clone)]
pub struct PlayerHandle {
    tx: mpsc::Sender<Message>,
    state: watch::Receiver<PlaybackState>,
    tracks: watch::Receiver<Vec<Track>>,
    notifications: broadcast::Sender<Notification>,
}

/// Start the orchestrator task. Must be called inside a tokio runtime.
pub fn spawn(collaborators: Collaborators, config: SessionConfig) -> PlayerHandle {
    let (tx, rx) = mpsc::channel(INBOX_CAPACITY);
    let orchestrator = Orchestrator::new(
        collaborators.engine,
        collaborators.store,
        collaborators.lyrics,
        config.tick_interval,
        &tx,
    );

    let handle = PlayerHandle {
        tx,
        state: orchestrator.subscribe_state(),
        tracks: orchestrator.subscribe_tracks(),
        notifications: orchestrator.notifier(),
    };

    tokio::spawn(orchestrator.run(rx, collaborators.resolver, config.scan_interval));
    handle
}

impl PlayerHandle {
    async fn send(&self, cmd: Command) -> Result<()> {
        self.tx
            .send(Message::Command(cmd))
            .await
            .map_err(|_| anyhow!("player session has ended"))
    }

    pub async fn select_track(&self, track: Track, playlist: Playlist) -> Result<()> {
        self.send(Command::SelectTrack { track, playlist }).await
    }

    pub async fn play(&self) -> Result<()> {
        self.send(Command::Play).await
    }

    pub async fn pause(&self) -> Result<()> {
        self.send(Command::Pause).await
    }

    pub async fn seek_next(&self) -> Result<()> {
        self.send(Command::SeekNext).await
    }

    pub async fn seek_previous(&self) -> Result<()> {
        self.send(Command::SeekPrevious).await
    }

    pub async fn seek_to(&self, position_ms: u64) -> Result<()> {
        self.send(Command::SeekTo(position_ms)).await
    }

    pub async fn cycle_playback_mode(&self) -> Result<()> {
        self.send(Command::CyclePlaybackMode).await
    }

    pub async fn enqueue_next(&self, track: Track) -> Result<()> {
        self.send(Command::EnqueueNext(track)).await
    }

    pub async fn append_to_queue(&self, track: Track) -> Result<()> {
        self.send(Command::AppendToQueue(track)).await
    }

    pub async fn request_lyrics(&self) -> Result<()> {
        self.send(Command::RequestLyrics).await
    }

    pub async fn set_player_expanded(&self, expanded: bool) -> Result<()> {
        self.send(Command::SetPlayerExpanded(expanded)).await
    }

    /// Latest published state.
    pub fn snapshot(&self) -> PlaybackState {
        self.state.borrow().clone()
    }

    pub fn state(&self) -> watch::Receiver<PlaybackState> {
        self.state.clone()
    }

    pub fn tracks(&self) -> watch::Receiver<Vec<Track>> {
        self.tracks.clone()
    }

    pub fn notifications(&self) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }

    /// Stop the session and wait until the orchestrator has let go of the
    /// engine, the ticker and the rescan loop.
    pub async fn shutdown(&self) {
        let _ = self.tx.send(Message::Shutdown).await;
        self.tx.closed().await;
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
