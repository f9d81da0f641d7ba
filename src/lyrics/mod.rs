pub mod cache;
pub mod lrclib;
pub mod synced;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::NetworkError;
use crate::library::Track;

pub use cache::{FileLyricsCache, LyricsCache};
pub use lrclib::LrclibProvider;
pub use synced::{active_line, parse_lrc, LyricLine};

/// Lyrics of one track. Both parts absent means "not found".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lyrics {
    pub uri: String,
    pub plain: Option<Vec<String>>,
    pub synced: Option<Vec<LyricLine>>,
}

impl Lyrics {
    /// Build from the raw text a provider returned. The synced text is
    /// parsed here; plain lines fall back to the synced text when the
    /// provider only had the timed version.
    pub fn from_raw(uri: impl Into<String>, plain: Option<&str>, synced: Option<&str>) -> Self {
        let synced = synced.and_then(parse_lrc);
        let plain = plain
            .filter(|p| !p.trim().is_empty())
            .map(|p| p.lines().map(|l| l.trim().to_string()).collect())
            .or_else(|| {
                synced
                    .as_ref()
                    .map(|lines: &Vec<LyricLine>| lines.iter().map(|l| l.text.clone()).collect())
            });

        Self {
            uri: uri.into(),
            plain,
            synced,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.plain.is_none() && self.synced.is_none()
    }

    pub fn active_line(&self, position_ms: u64) -> Option<usize> {
        self.synced
            .as_deref()
            .and_then(|lines| active_line(lines, position_ms))
    }
}

/// What a provider needs to find lyrics for a track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LyricsQuery {
    pub uri: String,
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub duration_ms: u64,
}

impl LyricsQuery {
    /// `None` when the track lacks a title or an artist.
    pub fn from_track(track: &Track) -> Option<Self> {
        let non_blank = |s: &Option<String>| s.clone().filter(|v| !v.trim().is_empty());
        Some(Self {
            uri: track.uri.clone(),
            title: non_blank(&track.title)?,
            artist: non_blank(&track.artist)?,
            album: non_blank(&track.album),
            duration_ms: track.duration_ms,
        })
    }
}

#[async_trait]
pub trait LyricsProvider: Send + Sync {
    async fn fetch(&self, query: &LyricsQuery) -> Result<Lyrics, NetworkError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LyricsError {
    #[error("track has no title or artist to search lyrics with")]
    MissingTags,
    #[error(transparent)]
    Network(#[from] NetworkError),
}

/// Cache first, provider second; fresh results are persisted before they
/// are handed back.
#[derive(Clone)]
pub struct LyricsResolver {
    provider: Arc<dyn LyricsProvider>,
    cache: Arc<dyn LyricsCache>,
    timeout: Duration,
}

impl LyricsResolver {
    pub fn new(
        provider: Arc<dyn LyricsProvider>,
        cache: Arc<dyn LyricsCache>,
        timeout: Duration,
    ) -> Self {
        Self {
            provider,
            cache,
            timeout,
        }
    }

    pub async fn resolve(&self, track: &Track) -> Result<Lyrics, LyricsError> {
        let cache = self.cache.clone();
        let uri = track.uri.clone();
        let cached = tokio::task::spawn_blocking(move || cache.get(&uri))
            .await
            .ok()
            .flatten();
        if let Some(lyrics) = cached {
            debug!(uri = %track.uri, "lyrics cache hit");
            return Ok(lyrics);
        }

        let query = LyricsQuery::from_track(track).ok_or(LyricsError::MissingTags)?;
        let lyrics = tokio::time::timeout(self.timeout, self.provider.fetch(&query))
            .await
            .map_err(NetworkError::from)??;

        let cache = self.cache.clone();
        let to_store = lyrics.clone();
        match tokio::task::spawn_blocking(move || cache.insert(&to_store)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(uri = %lyrics.uri, error = %e, "failed to cache lyrics"),
            Err(e) => warn!(error = %e, "lyrics cache task failed"),
        }

        Ok(lyrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        calls: AtomicUsize,
        result: Result<(), NetworkError>,
        delay: Duration,
    }

    #[async_trait]
    impl LyricsProvider for CountingProvider {
        async fn fetch(&self, query: &LyricsQuery) -> Result<Lyrics, NetworkError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.result?;
            Ok(Lyrics::from_raw(
                query.uri.clone(),
                Some("one\ntwo"),
                Some("[00:01.00]one\n[00:02.00]two"),
            ))
        }
    }

    fn provider(result: Result<(), NetworkError>) -> Arc<CountingProvider> {
        Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
            result,
            delay: Duration::ZERO,
        })
    }

    fn track(title: Option<&str>, artist: Option<&str>) -> Track {
        let mut t = Track::from_path(std::path::Path::new("/music/song.flac"));
        t.title = title.map(String::from);
        t.artist = artist.map(String::from);
        t.duration_ms = 200_000;
        t
    }

    #[test]
    fn test_from_raw_falls_back_to_synced_text() {
        let lyrics = Lyrics::from_raw("u", None, Some("[00:01.00] a \n[00:02.00]b"));
        assert_eq!(lyrics.plain, Some(vec!["a".to_string(), "b".to_string()]));
        assert_eq!(lyrics.active_line(1_500), Some(0));
    }

    #[test]
    fn test_from_raw_nothing() {
        let lyrics = Lyrics::from_raw("u", Some("   "), Some("no timestamps here"));
        assert!(lyrics.is_empty());
    }

    #[test]
    fn test_query_needs_title_and_artist() {
        assert!(LyricsQuery::from_track(&track(Some("T"), Some("A"))).is_some());
        assert!(LyricsQuery::from_track(&track(None, Some("A"))).is_none());
        assert!(LyricsQuery::from_track(&track(Some("T"), Some("  "))).is_none());
    }

    #[tokio::test]
    async fn test_fetch_is_cached_then_served_from_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(FileLyricsCache::new(dir.path()));
        let provider = provider(Ok(()));
        let resolver = LyricsResolver::new(provider.clone(), cache.clone(), Duration::from_secs(5));
        let t = track(Some("T"), Some("A"));

        let first = resolver.resolve(&t).await.unwrap();
        assert_eq!(cache.get(&t.uri), Some(first.clone()));

        let second = resolver.resolve(&t).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_tags_skip_network() {
        let dir = tempfile::tempdir().unwrap();
        let provider = provider(Ok(()));
        let resolver = LyricsResolver::new(
            provider.clone(),
            Arc::new(FileLyricsCache::new(dir.path())),
            Duration::from_secs(5),
        );

        let err = resolver.resolve(&track(None, Some("A"))).await.unwrap_err();
        assert_eq!(err, LyricsError::MissingTags);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_network_failure_is_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(FileLyricsCache::new(dir.path()));
        let resolver =
            LyricsResolver::new(provider(Err(NetworkError::NotFound)), cache.clone(), Duration::from_secs(5));
        let t = track(Some("T"), Some("A"));

        let err = resolver.resolve(&t).await.unwrap_err();
        assert_eq!(err, LyricsError::Network(NetworkError::NotFound));
        assert_eq!(cache.get(&t.uri), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_provider_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let slow = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
            result: Ok(()),
            delay: Duration::from_secs(600),
        });
        let resolver = LyricsResolver::new(
            slow,
            Arc::new(FileLyricsCache::new(dir.path())),
            Duration::from_secs(180),
        );

        let err = resolver.resolve(&track(Some("T"), Some("A"))).await.unwrap_err();
        assert_eq!(err, LyricsError::Network(NetworkError::RequestTimeout));
    }
}
