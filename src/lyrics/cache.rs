use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use tracing::debug;

use super::Lyrics;
use crate::error::LocalError;

/// Lyrics kept across sessions, keyed by track identity.
pub trait LyricsCache: Send + Sync {
    fn get(&self, uri: &str) -> Option<Lyrics>;
    fn insert(&self, lyrics: &Lyrics) -> Result<(), LocalError>;
}

/// One JSON file per track 💾
pub struct FileLyricsCache {
    dir: PathBuf,
}

impl FileLyricsCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `<cache>/cantus/lyrics`, honoring XDG_CACHE_HOME.
    pub fn default_dir() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(|| {
                let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
                PathBuf::from(home).join(".cache")
            })
            .join("cantus")
            .join("lyrics")
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    // Hashed, fixed-length names keep arbitrary URIs out of the path.
    fn path_for(&self, uri: &str) -> PathBuf {
        let mut hasher = DefaultHasher::new();
        uri.hash(&mut hasher);
        self.dir.join(format!("{:016x}.json", hasher.finish()))
    }
}

impl LyricsCache for FileLyricsCache {
    fn get(&self, uri: &str) -> Option<Lyrics> {
        let path = self.path_for(uri);
        let file = fs::File::open(&path).ok()?;
        match serde_json::from_reader::<_, Lyrics>(file) {
            // Guard against hash collisions.
            Ok(lyrics) if lyrics.uri == uri => Some(lyrics),
            Ok(_) => None,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "ignoring corrupt lyrics cache entry");
                None
            }
        }
    }

    fn insert(&self, lyrics: &Lyrics) -> Result<(), LocalError> {
        fs::create_dir_all(&self.dir).map_err(LocalError::from_io_write(&self.dir))?;
        let path = self.path_for(&lyrics.uri);
        let json =
            serde_json::to_vec(lyrics).map_err(|e| LocalError::FailedToWrite(e.to_string()))?;
        fs::write(&path, json).map_err(LocalError::from_io_write(&path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_miss_then_hit() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileLyricsCache::new(dir.path().join("nested"));
        assert_eq!(cache.get("/m/a.flac"), None);

        let lyrics = Lyrics::from_raw("/m/a.flac", Some("la la"), Some("[00:01.00]la la"));
        cache.insert(&lyrics).unwrap();
        assert_eq!(cache.get("/m/a.flac"), Some(lyrics));
        assert_eq!(cache.get("/m/b.flac"), None);
    }

    #[test]
    fn test_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileLyricsCache::new(dir.path());
        cache.insert(&Lyrics::from_raw("u", Some("old"), None)).unwrap();
        cache.insert(&Lyrics::from_raw("u", Some("new"), None)).unwrap();
        assert_eq!(cache.get("u").unwrap().plain, Some(vec!["new".to_string()]));
    }

    #[test]
    fn test_corrupt_entry_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileLyricsCache::new(dir.path());
        fs::write(cache.path_for("u"), b"{not json").unwrap();
        assert_eq!(cache.get("u"), None);
    }
}
