use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;

/// Reference to one entry of the engine queue. Carries the track identity,
/// so the orchestrator can map it back onto its logical playlist.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaItem {
    pub uri: String,
}

impl MediaItem {
    pub fn new(uri: impl Into<String>) -> Self {
        Self { uri: uri.into() }
    }
}

impl From<&crate::library::Track> for MediaItem {
    fn from(track: &crate::library::Track) -> Self {
        Self::new(track.uri.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RepeatMode {
    Off,
    #[default]
    All,
    One,
}

/// Callbacks an engine raises on its own schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    IsPlayingChanged(bool),
    /// The engine moved to another queue entry (or to none).
    ItemTransitioned(Option<MediaItem>),
}

/// Where an engine posts its callbacks. Cheap to clone; sending never
/// blocks the engine.
#[derive(Debug, Clone)]
pub struct EngineListener {
    tx: mpsc::Sender<EngineEvent>,
}

impl EngineListener {
    pub fn new(tx: mpsc::Sender<EngineEvent>) -> Self {
        Self { tx }
    }

    pub fn emit(&self, event: EngineEvent) {
        if let Err(e) = self.tx.try_send(event) {
            warn!("dropping engine event: {}", e);
        }
    }

    pub async fn emit_async(&self, event: EngineEvent) -> bool {
        self.tx.send(event).await.is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// The audio engine the orchestrator drives 🎛️
///
/// The orchestrator is the only caller; implementations are moved into it
/// at construction and never shared.
pub trait PlaybackEngine: Send {
    /// Register the callback sink. Called once, before any other command.
    fn set_listener(&mut self, listener: EngineListener);

    /// Replace the whole queue.
    fn load(&mut self, items: &[MediaItem]) -> Result<()>;
    fn insert(&mut self, index: usize, item: MediaItem) -> Result<()>;
    fn append(&mut self, item: MediaItem) -> Result<()>;
    fn clear(&mut self) -> Result<()>;

    fn play(&mut self) -> Result<()>;
    fn pause(&mut self) -> Result<()>;
    fn stop(&mut self) -> Result<()>;

    /// Jump to queue entry `index`, `offset_ms` into it.
    fn seek_to_item(&mut self, index: usize, offset_ms: u64) -> Result<()>;
    /// Seek within the current entry.
    fn seek(&mut self, position_ms: u64) -> Result<()>;
    fn seek_next(&mut self) -> Result<()>;
    fn seek_previous(&mut self) -> Result<()>;

    fn set_repeat_mode(&mut self, mode: RepeatMode) -> Result<()>;
    fn set_shuffle(&mut self, enabled: bool) -> Result<()>;

    fn current_index(&mut self) -> Option<usize>;
    fn current_item(&mut self) -> Option<MediaItem>;
    fn has_next(&mut self) -> bool;
    fn has_previous(&mut self) -> bool;
    fn position_ms(&mut self) -> u64;
    fn is_playing(&mut self) -> bool;
}
