use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use lofty::file::{AudioFile, TaggedFileExt};
use lofty::tag::{Accessor, ItemKey};
use serde::{Deserialize, Serialize};
use tracing::debug;
use walkdir::WalkDir;

use super::track::Track;

/// Source of the full track index.
///
/// Called periodically from the blocking pool, so implementations must be
/// idempotent and must not touch the files they report. A failed scan is
/// simply reported as whatever could be read (possibly nothing).
pub trait LibraryResolver: Send + Sync {
    fn scan(&self) -> Vec<Track>;
}

/// What the filesystem resolver looks at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSettings {
    #[serde(default = "default_music_dirs")]
    pub music_directories: Vec<PathBuf>,
    #[serde(default)]
    pub excluded_directories: Vec<PathBuf>,
    /// Shorter files (ringtones, notification sounds) are skipped.
    #[serde(default = "default_min_duration_ms")]
    pub min_duration_ms: u64,
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

fn default_music_dirs() -> Vec<PathBuf> {
    dirs::audio_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join("Music")))
        .into_iter()
        .collect()
}

fn default_min_duration_ms() -> u64 {
    30_000
}

fn default_extensions() -> Vec<String> {
    ["mp3", "flac", "ogg", "opus", "m4a", "aac", "wav", "wv", "ape", "aiff"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            music_directories: default_music_dirs(),
            excluded_directories: Vec::new(),
            min_duration_ms: default_min_duration_ms(),
            extensions: default_extensions(),
        }
    }
}

/// Walks the configured music directories and reads tags with lofty 📂
pub struct FsResolver {
    settings: ScanSettings,
}

impl FsResolver {
    pub fn new(settings: ScanSettings) -> Self {
        Self { settings }
    }

    fn is_audio_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|s| s.to_str())
            .map(|ext| {
                let ext = ext.to_ascii_lowercase();
                self.settings
                    .extensions
                    .iter()
                    .any(|e| e.trim_start_matches('.').eq_ignore_ascii_case(&ext))
            })
            .unwrap_or(false)
    }

    fn is_excluded(&self, path: &Path) -> bool {
        self.settings
            .excluded_directories
            .iter()
            .any(|dir| path.starts_with(dir))
    }

    /// Build a track for one file. Files lofty cannot parse are skipped.
    fn read_track(path: &Path) -> Option<Track> {
        let tagged_file = match lofty::read_from_path(path) {
            Ok(f) => f,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "skipping unreadable audio file");
                return None;
            }
        };

        let properties = tagged_file.properties();
        let meta = std::fs::metadata(path).ok();

        let mut track = Track::from_path(path);
        track.duration_ms = properties.duration().as_millis() as u64;
        track.bitrate = properties.audio_bitrate();
        track.size = meta.as_ref().map(|m| m.len()).unwrap_or(0);
        track.date_modified = meta
            .and_then(|m| m.modified().ok())
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(0);
        track.cover_art = Self::folder_cover(path);

        let tag = tagged_file
            .primary_tag()
            .or_else(|| tagged_file.first_tag());

        if let Some(tag) = tag {
            let non_empty = |s: Option<String>| s.filter(|v| !v.trim().is_empty());
            track.title = non_empty(tag.title().map(|s| s.to_string()));
            track.album = non_empty(tag.album().map(|s| s.to_string()));
            track.artist = non_empty(tag.artist().map(|s| s.to_string()));
            track.genre = non_empty(tag.genre().map(|s| s.to_string()));
            track.album_artist =
                non_empty(tag.get_string(&ItemKey::AlbumArtist).map(|s| s.to_string()));
            track.year = non_empty(
                tag.get_string(&ItemKey::Year)
                    .or_else(|| tag.get_string(&ItemKey::RecordingDate))
                    .map(|s| s.to_string()),
            );
            track.track_number =
                non_empty(tag.get_string(&ItemKey::TrackNumber).map(|s| s.to_string()));
        }

        Some(track)
    }

    /// A `cover.jpg`/`folder.jpg` sitting next to the file, if any.
    fn folder_cover(path: &Path) -> Option<String> {
        let dir = path.parent()?;
        ["cover.jpg", "cover.png", "folder.jpg", "folder.png"]
            .iter()
            .map(|name| dir.join(name))
            .find(|p| p.is_file())
            .map(|p| p.to_string_lossy().to_string())
    }
}

impl LibraryResolver for FsResolver {
    fn scan(&self) -> Vec<Track> {
        let mut tracks = Vec::new();

        for root in &self.settings.music_directories {
            for entry in WalkDir::new(root)
                .follow_links(true)
                .into_iter()
                .filter_entry(|e| !self.is_excluded(e.path()))
                .filter_map(Result::ok)
            {
                let path = entry.path();
                if !entry.file_type().is_file() || !self.is_audio_file(path) {
                    continue;
                }
                if let Some(track) = Self::read_track(path) {
                    if track.duration_ms >= self.settings.min_duration_ms {
                        tracks.push(track);
                    }
                }
            }
        }

        tracks.sort_by(|a, b| a.title.cmp(&b.title).then_with(|| a.uri.cmp(&b.uri)));
        tracks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn settings_for(dir: &Path) -> ScanSettings {
        ScanSettings {
            music_directories: vec![dir.to_path_buf()],
            ..ScanSettings::default()
        }
    }

    #[test]
    fn test_extension_matching() {
        let resolver = FsResolver::new(ScanSettings {
            extensions: vec![".FLAC".into(), "mp3".into()],
            ..ScanSettings::default()
        });
        assert!(resolver.is_audio_file(Path::new("/m/a.flac")));
        assert!(resolver.is_audio_file(Path::new("/m/b.MP3")));
        assert!(!resolver.is_audio_file(Path::new("/m/cover.jpg")));
        assert!(!resolver.is_audio_file(Path::new("/m/README")));
    }

    #[test]
    fn test_excluded_directories() {
        let resolver = FsResolver::new(ScanSettings {
            excluded_directories: vec![PathBuf::from("/m/podcasts")],
            ..ScanSettings::default()
        });
        assert!(resolver.is_excluded(Path::new("/m/podcasts/ep1.mp3")));
        assert!(!resolver.is_excluded(Path::new("/m/albums/a.mp3")));
    }

    #[test]
    fn test_scan_skips_garbage_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("broken.mp3"), b"not really audio").unwrap();
        fs::write(dir.path().join("notes.txt"), b"hello").unwrap();

        let resolver = FsResolver::new(settings_for(dir.path()));
        let first = resolver.scan();
        let second = resolver.scan();
        assert!(first.is_empty());
        assert_eq!(first, second);
    }

    #[test]
    fn test_scan_of_missing_directory_is_empty() {
        let resolver = FsResolver::new(settings_for(Path::new("/definitely/not/here")));
        assert!(resolver.scan().is_empty());
    }
}
