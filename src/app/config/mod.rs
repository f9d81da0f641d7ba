use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

pub mod persistence;
pub mod user;

pub use persistence::{JsonSessionStore, PersistentState, PlayerStore};
pub use user::{MpdConfig, SortConfig, UserConfig};

pub struct AppConfig;

impl AppConfig {
    pub fn get_config_dir() -> PathBuf {
        let base = dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
            .unwrap_or_else(|| PathBuf::from("."));
        let dir = base.join("cantus");

        // Ensure it exists
        if !dir.exists() {
            let _ = fs::create_dir_all(&dir);
        }

        dir
    }

    pub fn get_config_path() -> PathBuf {
        Self::get_config_dir().join("config.toml")
    }

    pub fn get_session_path() -> PathBuf {
        Self::get_config_dir().join("session.json")
    }

    pub fn get_log_dir() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("cantus")
            .join("logs")
    }

    /// Load `config.toml` from the default location.
    pub fn load() -> UserConfig {
        Self::load_from(&Self::get_config_path())
    }

    /// Load a config file, writing the defaults there when it is missing.
    /// A file that does not parse is reported and replaced by defaults in
    /// memory only.
    pub fn load_from(path: &Path) -> UserConfig {
        if path.exists() {
            match fs::read_to_string(path) {
                Ok(content) => toml::from_str(&content).unwrap_or_else(|e| {
                    warn!(path = %path.display(), error = %e, "invalid config, using defaults");
                    UserConfig::default()
                }),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "unreadable config, using defaults");
                    UserConfig::default()
                }
            }
        } else {
            // Create default config.toml if missing
            let c = UserConfig::default();
            if let Ok(content) = toml::to_string_pretty(&c) {
                if let Some(parent) = path.parent() {
                    let _ = fs::create_dir_all(parent);
                }
                match fs::write(path, content) {
                    Ok(()) => info!(path = %path.display(), "wrote default config"),
                    Err(e) => warn!(path = %path.display(), error = %e, "could not write default config"),
                }
            }
            c
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::TrackSort;

    #[test]
    fn test_missing_config_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = AppConfig::load_from(&path);
        assert_eq!(config, UserConfig::default());
        assert!(path.exists());

        // What was written reads back identically.
        assert_eq!(AppConfig::load_from(&path), config);
    }

    #[test]
    fn test_partial_config_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "scan_interval_secs = 30\n[mpd]\nport = 6601\n[sort]\ntracks = \"Album\"\n",
        )
        .unwrap();

        let config = AppConfig::load_from(&path);
        assert_eq!(config.scan_interval_secs, 30);
        assert_eq!(config.mpd.port, 6601);
        assert_eq!(config.mpd.host, "localhost");
        assert_eq!(config.sort.tracks, TrackSort::Album);
        assert_eq!(config.tick_interval_ms, 50);
        assert_eq!(config.request_timeout_secs, 180);
        assert!(config.match_duration_when_searching);
    }

    #[test]
    fn test_broken_config_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "scan_interval_secs = \"soon\"").unwrap();
        assert_eq!(AppConfig::load_from(&path), UserConfig::default());
    }
}
