use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{broadcast, oneshot};
use tracing::{debug, info, warn};

use super::{Metadata, MetadataProvider, MetadataSearchResult, MetadataWriter};
use crate::error::{LocalError, NetworkError, PermissionToken};
use crate::library::Track;

/// Observable outcomes of a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataEvent {
    /// The write is parked until [`MetadataPipeline::grant`] or
    /// [`MetadataPipeline::deny`] is called with `id`.
    PermissionRequired { id: u64, token: PermissionToken },
    Committed { uri: String },
    Failed { uri: String, error: LocalError },
}

/// A draft ready for review. Cover art is fetched separately, so its
/// failure never costs the textual fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preview {
    pub metadata: Metadata,
    pub cover_art_error: Option<NetworkError>,
}

struct Inner {
    provider: Arc<dyn MetadataProvider>,
    writer: Arc<dyn MetadataWriter>,
    events: broadcast::Sender<MetadataEvent>,
    pending: Mutex<HashMap<u64, oneshot::Sender<bool>>>,
    next_id: AtomicU64,
    timeout: Duration,
    match_duration: bool,
}

/// Forgets a parked edit when its commit finishes or is dropped.
struct PendingGuard<'a> {
    inner: &'a Inner,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut pending) = self.inner.pending.lock() {
            pending.remove(&self.id);
        }
    }
}

/// Search, preview and commit of tag edits.
#[derive(Clone)]
pub struct MetadataPipeline {
    inner: Arc<Inner>,
}

impl MetadataPipeline {
    pub fn new(
        provider: Arc<dyn MetadataProvider>,
        writer: Arc<dyn MetadataWriter>,
        timeout: Duration,
        match_duration: bool,
    ) -> Self {
        let (events, _) = broadcast::channel(32);
        Self {
            inner: Arc::new(Inner {
                provider,
                writer,
                events,
                pending: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                timeout,
                match_duration,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MetadataEvent> {
        self.inner.events.subscribe()
    }

    fn emit(&self, event: MetadataEvent) {
        // No subscribers is fine.
        let _ = self.inner.events.send(event);
    }

    pub async fn search(
        &self,
        query: &str,
        expected_duration_ms: u64,
    ) -> Result<Vec<MetadataSearchResult>, NetworkError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(NetworkError::BadRequest);
        }
        let expected = self.inner.match_duration.then_some(expected_duration_ms);

        let results =
            tokio::time::timeout(self.inner.timeout, self.inner.provider.search(query, expected))
                .await??;
        debug!(query, count = results.len(), "metadata search finished");
        Ok(results)
    }

    pub async fn preview(&self, candidate: &MetadataSearchResult) -> Preview {
        let mut metadata = Metadata::from_search_result(candidate);
        let art = tokio::time::timeout(self.inner.timeout, self.inner.provider.cover_art(candidate))
            .await
            .map_err(NetworkError::from)
            .and_then(|r| r);

        let cover_art_error = match art {
            Ok(bytes) => {
                metadata.cover_art = Some(bytes);
                None
            }
            Err(e) => {
                debug!(release = ?candidate.release_id, error = %e, "cover art unavailable");
                Some(e)
            }
        };

        Preview {
            metadata,
            cover_art_error,
        }
    }

    async fn write(&self, track: &Track, metadata: &Metadata) -> Result<(), LocalError> {
        let writer = self.inner.writer.clone();
        let (track, metadata) = (track.clone(), metadata.clone());
        tokio::task::spawn_blocking(move || writer.write(&track, &metadata))
            .await
            .map_err(|e| LocalError::Unknown(e.to_string()))?
    }

    /// Write `metadata` into `track`'s file.
    ///
    /// A missing write permission parks the edit and emits
    /// [`MetadataEvent::PermissionRequired`]. After a grant the same pair is
    /// written exactly once more; a deny, or the pipeline going away, fails
    /// the edit with the original permission error.
    pub async fn commit(&self, track: Track, metadata: Metadata) -> Result<(), LocalError> {
        let result = match self.write(&track, &metadata).await {
            Err(LocalError::NoWritePermission(token)) => {
                self.await_grant(&track, &metadata, token).await
            }
            other => other,
        };

        match &result {
            Ok(()) => {
                info!(uri = %track.uri, "metadata committed");
                self.emit(MetadataEvent::Committed {
                    uri: track.uri.clone(),
                });
            }
            Err(error) => {
                warn!(uri = %track.uri, %error, "metadata commit failed");
                self.emit(MetadataEvent::Failed {
                    uri: track.uri.clone(),
                    error: error.clone(),
                });
            }
        }
        result
    }

    async fn await_grant(
        &self,
        track: &Track,
        metadata: &Metadata,
        token: PermissionToken,
    ) -> Result<(), LocalError> {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.inner
            .pending
            .lock()
            .map_err(|_| LocalError::Unknown("pending edits lock poisoned".to_string()))?
            .insert(id, tx);
        let _guard = PendingGuard {
            inner: &self.inner,
            id,
        };

        info!(id, %token, "write permission required");
        self.emit(MetadataEvent::PermissionRequired {
            id,
            token: token.clone(),
        });

        match rx.await {
            Ok(true) => self.write(track, metadata).await,
            Ok(false) | Err(_) => Err(LocalError::NoWritePermission(token)),
        }
    }

    fn resolve(&self, id: u64, granted: bool) -> bool {
        let sender = match self.inner.pending.lock() {
            Ok(mut pending) => pending.remove(&id),
            Err(_) => None,
        };
        match sender {
            Some(tx) => tx.send(granted).is_ok(),
            None => false,
        }
    }

    /// Resume a parked edit. Returns false for unknown ids.
    pub fn grant(&self, id: u64) -> bool {
        self.resolve(id, true)
    }

    pub fn deny(&self, id: u64) -> bool {
        self.resolve(id, false)
    }

    /// Fail every parked edit. Used on teardown.
    pub fn cancel_pending(&self) {
        if let Ok(mut pending) = self.inner.pending.lock() {
            pending.clear();
        }
    }

    pub fn pending_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self
            .inner
            .pending
            .lock()
            .map(|p| p.keys().copied().collect())
            .unwrap_or_default();
        ids.sort_unstable();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FakeProvider {
        art: Result<Vec<u8>, NetworkError>,
        last_expected: Mutex<Option<Option<u64>>>,
    }

    #[async_trait]
    impl MetadataProvider for FakeProvider {
        async fn search(
            &self,
            query: &str,
            expected_duration_ms: Option<u64>,
        ) -> Result<Vec<MetadataSearchResult>, NetworkError> {
            *self.last_expected.lock().unwrap() = Some(expected_duration_ms);
            Ok(vec![MetadataSearchResult {
                recording_id: query.to_string(),
                ..Default::default()
            }])
        }

        async fn cover_art(&self, _: &MetadataSearchResult) -> Result<Vec<u8>, NetworkError> {
            self.art.clone()
        }
    }

    /// Fails with the scripted errors first, then succeeds. Records every
    /// pair it was handed.
    struct ScriptedWriter {
        failures: Mutex<Vec<LocalError>>,
        calls: Mutex<Vec<(String, Metadata)>>,
    }

    impl ScriptedWriter {
        fn new(failures: Vec<LocalError>) -> Arc<Self> {
            Arc::new(Self {
                failures: Mutex::new(failures),
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    impl MetadataWriter for ScriptedWriter {
        fn write(&self, track: &Track, metadata: &Metadata) -> Result<(), LocalError> {
            self.calls
                .lock()
                .unwrap()
                .push((track.uri.clone(), metadata.clone()));
            let mut failures = self.failures.lock().unwrap();
            if failures.is_empty() {
                Ok(())
            } else {
                Err(failures.remove(0))
            }
        }
    }

    fn provider(art: Result<Vec<u8>, NetworkError>) -> Arc<FakeProvider> {
        Arc::new(FakeProvider {
            art,
            last_expected: Mutex::new(None),
        })
    }

    fn pipeline(writer: Arc<ScriptedWriter>) -> MetadataPipeline {
        MetadataPipeline::new(provider(Ok(vec![1])), writer, Duration::from_secs(5), true)
    }

    fn no_permission() -> LocalError {
        LocalError::NoWritePermission(PermissionToken("/m/a.flac".into()))
    }

    fn track() -> Track {
        Track::from_path(std::path::Path::new("/m/a.flac"))
    }

    fn draft() -> Metadata {
        Metadata {
            title: Some("New".into()),
            ..Default::default()
        }
    }

    async fn next_permission_request(rx: &mut broadcast::Receiver<MetadataEvent>) -> u64 {
        loop {
            if let MetadataEvent::PermissionRequired { id, .. } = rx.recv().await.unwrap() {
                return id;
            }
        }
    }

    #[tokio::test]
    async fn test_search_forwards_duration_only_when_enabled() {
        let fake = provider(Ok(vec![]));
        let on = MetadataPipeline::new(fake.clone(), ScriptedWriter::new(vec![]), Duration::from_secs(5), true);
        on.search("song", 123_000).await.unwrap();
        assert_eq!(*fake.last_expected.lock().unwrap(), Some(Some(123_000)));

        let off = MetadataPipeline::new(fake.clone(), ScriptedWriter::new(vec![]), Duration::from_secs(5), false);
        off.search("song", 123_000).await.unwrap();
        assert_eq!(*fake.last_expected.lock().unwrap(), Some(None));
    }

    #[tokio::test]
    async fn test_blank_query_is_rejected_locally() {
        let p = pipeline(ScriptedWriter::new(vec![]));
        assert_eq!(p.search("   ", 0).await.unwrap_err(), NetworkError::BadRequest);
    }

    #[tokio::test]
    async fn test_preview_keeps_draft_when_art_fails() {
        let p = MetadataPipeline::new(
            provider(Err(NetworkError::NotFound)),
            ScriptedWriter::new(vec![]),
            Duration::from_secs(5),
            true,
        );
        let candidate = MetadataSearchResult {
            recording_id: "r".into(),
            title: Some("Song".into()),
            genres: vec!["a".into(), "b".into()],
            ..Default::default()
        };

        let preview = p.preview(&candidate).await;
        assert_eq!(preview.cover_art_error, Some(NetworkError::NotFound));
        assert_eq!(preview.metadata.title.as_deref(), Some("Song"));
        assert_eq!(preview.metadata.genre.as_deref(), Some("a / b"));
        assert_eq!(preview.metadata.cover_art, None);
    }

    #[tokio::test]
    async fn test_preview_attaches_art() {
        let p = pipeline(ScriptedWriter::new(vec![]));
        let preview = p.preview(&MetadataSearchResult::default()).await;
        assert_eq!(preview.cover_art_error, None);
        assert_eq!(preview.metadata.cover_art, Some(vec![1]));
    }

    #[tokio::test]
    async fn test_commit_success() {
        let writer = ScriptedWriter::new(vec![]);
        let p = pipeline(writer.clone());
        let mut rx = p.subscribe();

        p.commit(track(), draft()).await.unwrap();
        assert_eq!(writer.calls.lock().unwrap().len(), 1);
        assert_eq!(
            rx.recv().await.unwrap(),
            MetadataEvent::Committed { uri: "/m/a.flac".into() }
        );
    }

    #[tokio::test]
    async fn test_grant_retries_exactly_once_with_same_pair() {
        let writer = ScriptedWriter::new(vec![no_permission()]);
        let p = pipeline(writer.clone());
        let mut rx = p.subscribe();

        let commit = tokio::spawn({
            let p = p.clone();
            async move { p.commit(track(), draft()).await }
        });

        let id = next_permission_request(&mut rx).await;
        assert_eq!(p.pending_ids(), vec![id]);
        assert!(p.grant(id));

        commit.await.unwrap().unwrap();
        let calls = writer.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], calls[1]);
        assert!(p.pending_ids().is_empty());
    }

    #[tokio::test]
    async fn test_second_permission_failure_is_terminal() {
        let writer = ScriptedWriter::new(vec![no_permission(), no_permission()]);
        let p = pipeline(writer.clone());
        let mut rx = p.subscribe();

        let commit = tokio::spawn({
            let p = p.clone();
            async move { p.commit(track(), draft()).await }
        });

        let id = next_permission_request(&mut rx).await;
        p.grant(id);

        assert_eq!(commit.await.unwrap().unwrap_err(), no_permission());
        assert_eq!(writer.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_deny_fails_without_retry() {
        let writer = ScriptedWriter::new(vec![no_permission()]);
        let p = pipeline(writer.clone());
        let mut rx = p.subscribe();

        let commit = tokio::spawn({
            let p = p.clone();
            async move { p.commit(track(), draft()).await }
        });

        let id = next_permission_request(&mut rx).await;
        assert!(p.deny(id));
        assert!(!p.grant(id));

        assert_eq!(commit.await.unwrap().unwrap_err(), no_permission());
        assert_eq!(writer.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_edit_fails_terminally() {
        let writer = ScriptedWriter::new(vec![no_permission()]);
        let p = pipeline(writer.clone());
        let mut rx = p.subscribe();

        let commit = tokio::spawn({
            let p = p.clone();
            async move { p.commit(track(), draft()).await }
        });

        next_permission_request(&mut rx).await;
        p.cancel_pending();

        assert_eq!(commit.await.unwrap().unwrap_err(), no_permission());
        assert_eq!(writer.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_other_local_errors_are_terminal() {
        let writer = ScriptedWriter::new(vec![LocalError::FailedToWrite("disk full".into())]);
        let p = pipeline(writer.clone());

        let err = p.commit(track(), draft()).await.unwrap_err();
        assert_eq!(err, LocalError::FailedToWrite("disk full".into()));
        assert_eq!(writer.calls.lock().unwrap().len(), 1);
        assert!(p.pending_ids().is_empty());
    }

    #[tokio::test]
    async fn test_dropped_commit_forgets_its_parked_edit() {
        let writer = ScriptedWriter::new(vec![no_permission()]);
        let p = pipeline(writer.clone());
        let mut rx = p.subscribe();

        let commit = tokio::spawn({
            let p = p.clone();
            async move { p.commit(track(), draft()).await }
        });

        let id = next_permission_request(&mut rx).await;
        assert_eq!(p.pending_ids(), vec![id]);

        commit.abort();
        assert!(commit.await.unwrap_err().is_cancelled());
        assert!(p.pending_ids().is_empty());
        assert!(!p.grant(id));
        assert_eq!(writer.calls.lock().unwrap().len(), 1);
    }
}
