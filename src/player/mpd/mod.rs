use super::traits::{EngineEvent, EngineListener, MediaItem, PlaybackEngine, RepeatMode};
use anyhow::{Context, Result};
use mpd::{Client, Song, State};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// How often the watcher asks MPD for its status.
const WATCH_INTERVAL: Duration = Duration::from_millis(250);

/// One lazily (re)connected MPD socket.
struct MpdConnection {
    host: String,
    port: u16,
    client: Mutex<Option<Client>>,
}

impl MpdConnection {
    fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            client: Mutex::new(None),
        }
    }

    /// Run `f` against the client, reconnecting if necessary.
    fn with_client<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Client) -> Result<T>,
    {
        let mut client_guard = self
            .client
            .lock()
            .map_err(|_| anyhow::anyhow!("MPD client mutex poisoned"))?;

        let needs_connect = match client_guard.as_mut() {
            Some(client) => client.status().is_err(),
            None => true,
        };

        if needs_connect {
            let addr = format!("{}:{}", self.host, self.port);
            match Client::connect(&addr) {
                Ok(c) => *client_guard = Some(c),
                Err(e) => {
                    *client_guard = None;
                    return Err(anyhow::anyhow!("Failed to connect to MPD at {}: {}", addr, e));
                }
            }
        }

        match client_guard.as_mut() {
            Some(client) => f(client),
            None => Err(anyhow::anyhow!("No MPD connection")),
        }
    }
}

/// Maps track identities (absolute paths) onto MPD's music-directory
/// relative song paths and back.
#[derive(Clone)]
struct PathMapper {
    music_directory: PathBuf,
}

impl PathMapper {
    fn to_mpd(&self, uri: &str) -> String {
        Path::new(uri)
            .strip_prefix(&self.music_directory)
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_else(|_| uri.to_string())
    }

    fn to_uri(&self, file: &str) -> String {
        if file.starts_with('/') {
            file.to_string()
        } else {
            self.music_directory.join(file).to_string_lossy().to_string()
        }
    }

    fn song(&self, item: &MediaItem) -> Song {
        Song {
            file: self.to_mpd(&item.uri),
            ..Default::default()
        }
    }
}

/// Turns successive status polls into engine callbacks.
///
/// A single poll without a current song is held back: replacing the queue
/// briefly empties it, and reporting that would wipe the track that was
/// just selected. Only a second empty poll in a row is reported.
#[derive(Debug, Default)]
struct StatusTracker {
    last: Option<(bool, Option<String>)>,
    empty_pending: bool,
}

impl StatusTracker {
    fn observe(&mut self, playing: bool, uri: Option<String>) -> Vec<EngineEvent> {
        let Some((was_playing, last_uri)) = self.last.take() else {
            self.last = Some((playing, uri));
            return Vec::new();
        };

        if uri.is_none() && last_uri.is_some() && !self.empty_pending {
            self.empty_pending = true;
            self.last = Some((was_playing, last_uri));
            return Vec::new();
        }
        self.empty_pending = false;

        let mut events = Vec::new();
        if last_uri != uri {
            events.push(EngineEvent::ItemTransitioned(uri.clone().map(MediaItem::new)));
        }
        if was_playing != playing {
            events.push(EngineEvent::IsPlayingChanged(playing));
        }
        self.last = Some((playing, uri));
        events
    }
}

/// Playback engine backed by a running MPD server 🎵
///
/// MPD has no push callbacks, so a watcher task polls its status on a
/// second connection and turns changes into [`EngineEvent`]s.
pub struct MpdEngine {
    conn: Arc<MpdConnection>,
    paths: PathMapper,
    watcher: Option<JoinHandle<()>>,
}

impl MpdEngine {
    pub fn new(host: &str, port: u16, music_directory: impl Into<PathBuf>) -> Self {
        Self {
            conn: Arc::new(MpdConnection::new(host, port)),
            paths: PathMapper {
                music_directory: music_directory.into(),
            },
            watcher: None,
        }
    }

    /// Fail early when the server is unreachable.
    pub fn check_connection(&self) -> Result<()> {
        self.conn.with_client(|client| {
            client.status().context("Failed to query MPD status")?;
            Ok(())
        })
    }

    fn spawn_watcher(&self, listener: EngineListener) -> JoinHandle<()> {
        let conn = Arc::new(MpdConnection::new(&self.conn.host, self.conn.port));
        let paths = self.paths.clone();

        tokio::spawn(async move {
            let mut tracker = StatusTracker::default();
            let mut interval = tokio::time::interval(WATCH_INTERVAL);

            loop {
                interval.tick().await;
                if listener.is_closed() {
                    break;
                }

                let conn_poll = conn.clone();
                let polled = tokio::task::spawn_blocking(move || {
                    conn_poll.with_client(|client| {
                        let status = client.status()?;
                        let file = client.currentsong()?.map(|s| s.file);
                        Ok((status.state == State::Play, file))
                    })
                })
                .await;

                let (playing, file) = match polled {
                    Ok(Ok(v)) => v,
                    Ok(Err(e)) => {
                        debug!("MPD watcher poll failed: {}", e);
                        continue;
                    }
                    Err(_) => break,
                };

                for event in tracker.observe(playing, file.map(|f| paths.to_uri(&f))) {
                    if !listener.emit_async(event).await {
                        return;
                    }
                }
            }
        })
    }
}

impl Drop for MpdEngine {
    fn drop(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
    }
}

impl PlaybackEngine for MpdEngine {
    fn set_listener(&mut self, listener: EngineListener) {
        if let Some(old) = self.watcher.take() {
            old.abort();
        }
        self.watcher = Some(self.spawn_watcher(listener));
    }

    fn load(&mut self, items: &[MediaItem]) -> Result<()> {
        let songs: Vec<Song> = items.iter().map(|i| self.paths.song(i)).collect();
        self.conn.with_client(|client| {
            client.clear().context("Failed to clear queue")?;
            for song in &songs {
                client
                    .push(song)
                    .with_context(|| format!("Failed to queue {}", song.file))?;
            }
            Ok(())
        })
    }

    fn insert(&mut self, index: usize, item: MediaItem) -> Result<()> {
        let song = self.paths.song(&item);
        self.conn.with_client(|client| {
            client
                .insert(&song, index)
                .with_context(|| format!("Failed to insert {} at {}", song.file, index))?;
            Ok(())
        })
    }

    fn append(&mut self, item: MediaItem) -> Result<()> {
        let song = self.paths.song(&item);
        self.conn.with_client(|client| {
            client
                .push(&song)
                .with_context(|| format!("Failed to queue {}", song.file))?;
            Ok(())
        })
    }

    fn clear(&mut self) -> Result<()> {
        self.conn
            .with_client(|client| client.clear().context("Failed to clear queue"))
    }

    fn play(&mut self) -> Result<()> {
        self.conn
            .with_client(|client| client.play().context("Failed to start playback"))
    }

    fn pause(&mut self) -> Result<()> {
        self.conn
            .with_client(|client| client.pause(true).context("Failed to pause"))
    }

    fn stop(&mut self) -> Result<()> {
        self.conn
            .with_client(|client| client.stop().context("Failed to stop"))
    }

    fn seek_to_item(&mut self, index: usize, offset_ms: u64) -> Result<()> {
        self.conn.with_client(|client| {
            client
                .seek(index as u32, offset_ms as f64 / 1000.0)
                .context("Failed to seek to queue position")
        })
    }

    fn seek(&mut self, position_ms: u64) -> Result<()> {
        self.conn.with_client(|client| {
            let place = client.status()?.song.context("No song playing")?;
            client
                .seek(place.id, position_ms as f64 / 1000.0)
                .context("Failed to seek")
        })
    }

    fn seek_next(&mut self) -> Result<()> {
        self.conn
            .with_client(|client| client.next().context("Failed to skip to next track"))
    }

    fn seek_previous(&mut self) -> Result<()> {
        self.conn
            .with_client(|client| client.prev().context("Failed to skip to previous track"))
    }

    fn set_repeat_mode(&mut self, mode: RepeatMode) -> Result<()> {
        self.conn.with_client(|client| {
            match mode {
                RepeatMode::Off => {
                    client.repeat(false)?;
                    client.single(false)?;
                }
                RepeatMode::All => {
                    client.repeat(true)?;
                    client.single(false)?;
                }
                RepeatMode::One => {
                    client.repeat(true)?;
                    client.single(true)?;
                }
            }
            Ok(())
        })
    }

    fn set_shuffle(&mut self, enabled: bool) -> Result<()> {
        self.conn
            .with_client(|client| client.random(enabled).context("Failed to toggle shuffle"))
    }

    fn current_index(&mut self) -> Option<usize> {
        self.conn
            .with_client(|client| Ok(client.status()?.song.map(|p| p.pos as usize)))
            .unwrap_or_else(|e| {
                warn!("MPD status unavailable: {}", e);
                None
            })
    }

    fn current_item(&mut self) -> Option<MediaItem> {
        let paths = self.paths.clone();
        self.conn
            .with_client(|client| {
                Ok(client
                    .currentsong()?
                    .map(|s| MediaItem::new(paths.to_uri(&s.file))))
            })
            .ok()
            .flatten()
    }

    fn has_next(&mut self) -> bool {
        self.conn
            .with_client(|client| {
                let status = client.status()?;
                Ok(match status.song {
                    Some(place) => place.pos + 1 < status.queue_len || status.repeat,
                    None => false,
                })
            })
            .unwrap_or(false)
    }

    fn has_previous(&mut self) -> bool {
        self.conn
            .with_client(|client| Ok(client.status()?.song.map(|p| p.pos > 0).unwrap_or(false)))
            .unwrap_or(false)
    }

    fn position_ms(&mut self) -> u64 {
        self.conn
            .with_client(|client| {
                Ok(client
                    .status()?
                    .elapsed
                    .map(|t| t.as_millis() as u64)
                    .unwrap_or(0))
            })
            .unwrap_or(0)
    }

    fn is_playing(&mut self) -> bool {
        self.conn
            .with_client(|client| Ok(client.status()?.state == State::Play))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapper() -> PathMapper {
        PathMapper {
            music_directory: PathBuf::from("/home/me/Music"),
        }
    }

    #[test]
    fn test_paths_round_trip_through_music_directory() {
        let paths = mapper();
        let mpd = paths.to_mpd("/home/me/Music/Rock/a.flac");
        assert_eq!(mpd, "Rock/a.flac");
        assert_eq!(paths.to_uri(&mpd), "/home/me/Music/Rock/a.flac");
    }

    #[test]
    fn test_paths_outside_music_directory_pass_through() {
        let paths = mapper();
        assert_eq!(paths.to_mpd("/tmp/b.mp3"), "/tmp/b.mp3");
        assert_eq!(paths.to_uri("/tmp/b.mp3"), "/tmp/b.mp3");
    }

    fn uri(name: &str) -> Option<String> {
        Some(format!("/music/{}.flac", name))
    }

    #[test]
    fn test_first_poll_is_silent() {
        let mut tracker = StatusTracker::default();
        assert!(tracker.observe(true, uri("a")).is_empty());
        assert!(tracker.observe(true, uri("a")).is_empty());
    }

    #[test]
    fn test_song_and_state_changes_become_events() {
        let mut tracker = StatusTracker::default();
        tracker.observe(true, uri("a"));

        assert_eq!(
            tracker.observe(true, uri("b")),
            vec![EngineEvent::ItemTransitioned(Some(MediaItem::new("/music/b.flac")))]
        );
        assert_eq!(
            tracker.observe(false, uri("b")),
            vec![EngineEvent::IsPlayingChanged(false)]
        );
        assert_eq!(
            tracker.observe(true, uri("c")),
            vec![
                EngineEvent::ItemTransitioned(Some(MediaItem::new("/music/c.flac"))),
                EngineEvent::IsPlayingChanged(true),
            ]
        );
    }

    #[test]
    fn test_queue_replacement_gap_is_not_reported() {
        let mut tracker = StatusTracker::default();
        tracker.observe(true, uri("a"));

        // clear + push seen mid-way: stopped with no song.
        assert!(tracker.observe(false, None).is_empty());
        assert!(tracker.observe(true, uri("a")).is_empty());

        assert!(tracker.observe(false, None).is_empty());
        assert_eq!(
            tracker.observe(true, uri("b")),
            vec![EngineEvent::ItemTransitioned(Some(MediaItem::new("/music/b.flac")))]
        );
    }

    #[test]
    fn test_queue_end_is_reported_on_second_empty_poll() {
        let mut tracker = StatusTracker::default();
        tracker.observe(true, uri("a"));

        assert!(tracker.observe(false, None).is_empty());
        assert_eq!(
            tracker.observe(false, None),
            vec![
                EngineEvent::ItemTransitioned(None),
                EngineEvent::IsPlayingChanged(false),
            ]
        );
        assert!(tracker.observe(false, None).is_empty());
    }
}
