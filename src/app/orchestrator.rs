//! The single writer of [`PlaybackState`].
//!
//! Every producer (front-end commands, engine callbacks, the library
//! rescan loop, the position ticker and lyrics lookups) posts a
//! [`Message`] into one bounded inbox. Messages are applied one at a time
//! and the resulting state is published once, only if it changed.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::config::PlayerStore;
use super::events::{Command, Notification};
use super::state::PlaybackState;
use crate::library::{LibraryResolver, Playlist, Track};
use crate::lyrics::{Lyrics, LyricsError, LyricsResolver};
use crate::player::{EngineEvent, EngineListener, MediaItem, PlaybackEngine};


const ENGINE_EVENT_CAPACITY: usize = 64;
const NOTIFICATION_CAPACITY: usize = 32;

pub enum Message {
    Command(Command),
    Engine(EngineEvent),
    LibraryScanned(Vec<Track>),
    /// Sample the engine position.
    Tick,
    LyricsFetched {
        uri: String,
        result: Result<Lyrics, LyricsError>,
    },
    Shutdown,
}

pub struct Orchestrator {
    state: PlaybackState,
    tracks: Vec<Track>,
    engine: Box<dyn PlaybackEngine>,
    store: Box<dyn PlayerStore>,
    lyrics: LyricsResolver,
    /// Uri of the lyrics lookup whose result will be applied.
    lyrics_in_flight: Option<String>,

    inbox: mpsc::WeakSender<Message>,
    engine_events: mpsc::Receiver<EngineEvent>,
    state_tx: watch::Sender<PlaybackState>,
    tracks_tx: watch::Sender<Vec<Track>>,
    notify_tx: broadcast::Sender<Notification>,

    tick_interval: Duration,
    ticker: Option<JoinHandle<()>>,
    reconciler: Option<JoinHandle<()>>,
}

impl Orchestrator {
    /// Take ownership of the engine and register as its listener.
    pub fn new(
        mut engine: Box<dyn PlaybackEngine>,
        store: Box<dyn PlayerStore>,
        lyrics: LyricsResolver,
        tick_interval: Duration,
        inbox: &mpsc::Sender<Message>,
    ) -> Self {
        let (event_tx, engine_events) = mpsc::channel(ENGINE_EVENT_CAPACITY);
        engine.set_listener(EngineListener::new(event_tx));

        let (state_tx, _) = watch::channel(PlaybackState::default());
        let (tracks_tx, _) = watch::channel(Vec::new());
        let (notify_tx, _) = broadcast::channel(NOTIFICATION_CAPACITY);

        Self {
            state: PlaybackState::default(),
            tracks: Vec::new(),
            engine,
            store,
            lyrics,
            lyrics_in_flight: None,
            inbox: inbox.downgrade(),
            engine_events,
            state_tx,
            tracks_tx,
            notify_tx,
            tick_interval,
            ticker: None,
            reconciler: None,
        }
    }

    pub fn subscribe_state(&self) -> watch::Receiver<PlaybackState> {
        self.state_tx.subscribe()
    }

    pub fn subscribe_tracks(&self) -> watch::Receiver<Vec<Track>> {
        self.tracks_tx.subscribe()
    }

    pub fn notifier(&self) -> broadcast::Sender<Notification> {
        self.notify_tx.clone()
    }

    /// Process messages until shutdown or until every sender is gone.
    pub async fn run(
        mut self,
        mut inbox: mpsc::Receiver<Message>,
        resolver: Arc<dyn LibraryResolver>,
        scan_interval: Duration,
    ) {
        self.restore_session();
        self.publish();
        self.start_reconciler(resolver, scan_interval);
        info!("player session started");

        loop {
            let msg = tokio::select! {
                msg = inbox.recv() => match msg {
                    Some(Message::Shutdown) | None => break,
                    Some(msg) => msg,
                },
                Some(event) = self.engine_events.recv() => Message::Engine(event),
            };
            self.handle(msg);
        }

        self.teardown();
        info!("player session ended");
    }

    /// Apply one message, then publish.
    pub(crate) fn handle(&mut self, msg: Message) {
        match msg {
            Message::Command(cmd) => self.execute(cmd),
            Message::Engine(event) => self.on_engine_event(event),
            Message::LibraryScanned(tracks) => self.reconcile(tracks),
            Message::Tick => self.sample_position(),
            Message::LyricsFetched { uri, result } => self.on_lyrics_fetched(uri, result),
            Message::Shutdown => self.teardown(),
        }
        self.publish();
    }

    fn publish(&self) {
        let current = &self.state;
        self.state_tx.send_if_modified(|published| {
            if published == current {
                false
            } else {
                *published = current.clone();
                true
            }
        });
    }

    fn notify(&self, notification: Notification) {
        // Nobody listening is fine.
        let _ = self.notify_tx.send(notification);
    }

    /// Run one engine operation; failures are logged and surfaced, never fatal.
    fn engine_call<F>(&mut self, what: &str, f: F)
    where
        F: FnOnce(&mut dyn PlaybackEngine) -> anyhow::Result<()>,
    {
        if let Err(e) = f(self.engine.as_mut()) {
            warn!(operation = what, error = %e, "engine call failed");
            self.notify(Notification::EngineFailed(format!("{}: {}", what, e)));
        }
    }

    fn execute(&mut self, cmd: Command) {
        debug!(?cmd, "command");
        match cmd {
            Command::SelectTrack { track, playlist } => self.select_track(track, playlist),
            Command::Play => {
                if self.state.is_loaded() {
                    self.engine_call("play", |e| e.play());
                }
            }
            Command::Pause => {
                if self.state.is_loaded() {
                    self.engine_call("pause", |e| e.pause());
                }
            }
            Command::SeekNext => {
                if self.state.is_loaded() && self.engine.has_next() {
                    self.engine_call("seek next", |e| e.seek_next());
                }
            }
            Command::SeekPrevious => self.seek_previous(),
            Command::SeekTo(position_ms) => {
                if self.state.is_loaded() {
                    self.engine_call("seek", |e| e.seek(position_ms));
                    self.state.position_ms = position_ms;
                }
            }
            Command::CyclePlaybackMode => self.cycle_playback_mode(),
            Command::EnqueueNext(track) => self.enqueue(track, true),
            Command::AppendToQueue(track) => self.enqueue(track, false),
            Command::RequestLyrics => self.request_lyrics(),
            Command::SetPlayerExpanded(expanded) => self.state.is_player_expanded = expanded,
        }
    }

    fn select_track(&mut self, track: Track, playlist: Playlist) {
        let Some(index) = playlist.position(&track) else {
            warn!(uri = %track.uri, "selected track is not part of the given playlist");
            return;
        };

        if self.state.playlist.as_deref() != Some(&playlist) {
            let items: Vec<MediaItem> = playlist.tracks.iter().map(MediaItem::from).collect();
            debug!(len = items.len(), "loading new queue");
            self.engine_call("load", |e| e.load(&items));
        }
        self.engine_call("seek to item", |e| e.seek_to_item(index, 0));

        if let Err(e) = self.store.set_playlist(&playlist) {
            warn!(error = %e, "failed to persist playlist");
        }

        self.engine_call("play", |e| e.play());

        self.state.playlist = Some(Arc::new(playlist));
        self.set_current_track(Some(track));
        self.state.position_ms = 0;
        self.state.is_playing = true;
        self.restart_ticker();
    }

    fn seek_previous(&mut self) {
        if !self.state.is_loaded() {
            return;
        }
        if self.engine.has_previous() {
            self.engine_call("seek previous", |e| e.seek_previous());
        } else {
            self.engine_call("seek", |e| e.seek(0));
            self.state.position_ms = 0;
        }
    }

    fn apply_playback_mode(&mut self) {
        let mode = self.state.mode;
        self.engine_call("set repeat mode", |e| e.set_repeat_mode(mode.repeat_mode()));
        self.engine_call("set shuffle", |e| e.set_shuffle(mode.shuffle()));
    }

    fn cycle_playback_mode(&mut self) {
        self.state.mode = self.state.mode.next();
        self.apply_playback_mode();
        if let Err(e) = self.store.set_playback_mode(self.state.mode) {
            warn!(error = %e, "failed to persist playback mode");
        }
    }

    /// Queue `track` right after the current item (`next`) or at the end.
    /// The logical playlist never holds duplicates; the engine queue may.
    fn enqueue(&mut self, track: Track, next: bool) {
        if !self.state.is_loaded() {
            let playlist = Playlist::singleton(track.clone());
            self.select_track(track, playlist);
            return;
        }

        if let Some(playlist) = self.state.playlist.as_mut() {
            if !playlist.contains(&track) {
                Arc::make_mut(playlist).tracks.push(track.clone());
            }
        }

        let item = MediaItem::from(&track);
        if next {
            match self.engine.current_index() {
                Some(index) => self.engine_call("insert", |e| e.insert(index + 1, item)),
                None => self.engine_call("append", |e| e.append(item)),
            }
        } else {
            self.engine_call("append", |e| e.append(item));
        }
    }

    fn on_engine_event(&mut self, event: EngineEvent) {
        debug!(?event, "engine event");
        match event {
            EngineEvent::IsPlayingChanged(playing) => {
                self.state.is_playing = playing;
                if playing {
                    self.restart_ticker();
                } else {
                    self.stop_ticker();
                    if self.state.is_loaded() {
                        self.state.position_ms = self.engine.position_ms();
                    }
                }
            }
            EngineEvent::ItemTransitioned(None) => {
                self.set_current_track(None);
                self.state.is_playing = false;
                self.state.position_ms = 0;
                self.stop_ticker();
            }
            EngineEvent::ItemTransitioned(Some(item)) => {
                let track = self
                    .state
                    .playlist
                    .as_ref()
                    .and_then(|p| p.find_by_uri(&item.uri))
                    .cloned();
                match track {
                    Some(track) => {
                        self.set_current_track(Some(track));
                        self.state.is_playing = true;
                        self.state.position_ms = 0;
                        self.restart_ticker();
                    }
                    None => warn!(uri = %item.uri, "engine moved to an item outside the playlist"),
                }
            }
        }
    }

    /// Changing tracks drops the previous track's lyrics.
    fn set_current_track(&mut self, track: Option<Track>) {
        let changed = self.state.current_track.as_ref().map(|t| &t.uri)
            != track.as_ref().map(|t| &t.uri);
        if changed {
            self.state.lyrics = None;
            self.state.is_loading_lyrics = false;
            self.lyrics_in_flight = None;
        }
        self.state.current_track = track;
    }

    fn sample_position(&mut self) {
        if self.state.is_playing && self.state.is_loaded() {
            self.state.position_ms = self.engine.position_ms();
        }
    }

    fn reconcile(&mut self, tracks: Vec<Track>) {
        if tracks == self.tracks {
            return;
        }
        info!(count = tracks.len(), "library changed");
        self.tracks = tracks;
        self.tracks_tx.send_replace(self.tracks.clone());

        let fresh_current = self.state.current_track.as_ref().map(|current| {
            self.tracks.iter().find(|t| t.uri == current.uri).cloned()
        });
        match fresh_current {
            Some(None) => {
                info!("current track left the library, resetting playback");
                self.reset_playback();
                return;
            }
            Some(Some(fresh)) => self.state.current_track = Some(fresh),
            None => {}
        }

        let by_uri: HashMap<&str, &Track> =
            self.tracks.iter().map(|t| (t.uri.as_str(), t)).collect();
        if let Some(playlist) = self.state.playlist.as_mut() {
            let stale = playlist
                .tracks
                .iter()
                .any(|entry| by_uri.get(entry.uri.as_str()).is_some_and(|fresh| entry != *fresh));
            if !stale {
                return;
            }
            for entry in Arc::make_mut(playlist).tracks.iter_mut() {
                if let Some(fresh) = by_uri.get(entry.uri.as_str()) {
                    if entry != *fresh {
                        *entry = (*fresh).clone();
                    }
                }
            }
        }
    }

    fn reset_playback(&mut self) {
        self.stop_ticker();
        self.engine_call("stop", |e| e.stop());
        self.engine_call("clear", |e| e.clear());
        self.state.reset_playback();
        self.lyrics_in_flight = None;
    }

    fn request_lyrics(&mut self) {
        let Some(track) = self.state.current_track.clone() else {
            return;
        };
        if self.state.current_lyrics().is_some()
            || self.lyrics_in_flight.as_deref() == Some(track.uri.as_str())
        {
            return;
        }
        let Some(tx) = self.inbox.upgrade() else {
            return;
        };

        self.state.lyrics = None;
        self.state.is_loading_lyrics = true;
        self.lyrics_in_flight = Some(track.uri.clone());

        let resolver = self.lyrics.clone();
        tokio::spawn(async move {
            let result = resolver.resolve(&track).await;
            let _ = tx
                .send(Message::LyricsFetched {
                    uri: track.uri,
                    result,
                })
                .await;
        });
    }

    fn on_lyrics_fetched(&mut self, uri: String, result: Result<Lyrics, LyricsError>) {
        if self.lyrics_in_flight.as_deref() != Some(uri.as_str()) {
            debug!(%uri, "dropping lyrics for a track that is no longer current");
            return;
        }
        self.lyrics_in_flight = None;
        self.state.is_loading_lyrics = false;

        match result {
            Ok(lyrics) => {
                if self.state.current_track.as_ref().map(|t| &t.uri) == Some(&uri) {
                    self.state.lyrics = Some(Arc::new(lyrics));
                }
            }
            Err(LyricsError::MissingTags) => self.notify(Notification::LyricsMissingTags),
            Err(LyricsError::Network(e)) => {
                debug!(%uri, error = %e, "lyrics lookup failed");
                self.notify(Notification::LyricsFailed(e));
            }
        }
    }

    /// Apply the persisted mode and pick up whatever the engine is
    /// already playing.
    fn restore_session(&mut self) {
        self.state.mode = self.store.playback_mode();
        self.apply_playback_mode();

        let Some(item) = self.engine.current_item() else {
            return;
        };
        let Some(playlist) = self.store.playlist() else {
            return;
        };
        let Some(track) = playlist.find_by_uri(&item.uri).cloned() else {
            debug!(uri = %item.uri, "engine item is not in the saved playlist");
            return;
        };

        info!(uri = %track.uri, "restoring previous session");
        self.state.playlist = Some(Arc::new(playlist));
        self.state.current_track = Some(track);
        self.state.is_playing = self.engine.is_playing();
        self.state.position_ms = self.engine.position_ms();
        if self.state.is_playing {
            self.restart_ticker();
        }
    }

    fn stop_ticker(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }

    /// Never more than one ticker: the old one is aborted first.
    fn restart_ticker(&mut self) {
        self.stop_ticker();
        let inbox = self.inbox.clone();
        let period = self.tick_interval;

        self.ticker = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(tx) = inbox.upgrade() else {
                    break;
                };
                // A full inbox just skips this sample.
                if let Err(mpsc::error::TrySendError::Closed(_)) = tx.try_send(Message::Tick) {
                    break;
                }
            }
        }));
    }

    fn start_reconciler(&mut self, resolver: Arc<dyn LibraryResolver>, period: Duration) {
        if let Some(old) = self.reconciler.take() {
            old.abort();
        }
        let inbox = self.inbox.clone();

        self.reconciler = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let scanner = resolver.clone();
                let tracks = match tokio::task::spawn_blocking(move || scanner.scan()).await {
                    Ok(tracks) => tracks,
                    Err(e) => {
                        warn!(error = %e, "library scan task failed");
                        continue;
                    }
                };
                let Some(tx) = inbox.upgrade() else {
                    break;
                };
                if tx.send(Message::LibraryScanned(tracks)).await.is_err() {
                    break;
                }
            }
        }));
    }

    fn teardown(&mut self) {
        self.stop_ticker();
        if let Some(reconciler) = self.reconciler.take() {
            reconciler.abort();
        }
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.teardown();
    }
}
