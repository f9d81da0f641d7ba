use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::library::{PlaylistKind, TrackSort};

/// Cantus - a local-first music player core 🎵
#[derive(Parser, Debug)]
#[command(name = "cantus", version, about)]
pub struct Args {
    /// Use this config file instead of the default one
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Also log to stderr
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Cmd>,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Scan the library once and print it
    Scan {
        /// Only tracks matching this text
        #[arg(long, short = 'q')]
        query: Option<String>,

        #[arg(long, value_enum)]
        sort: Option<SortKey>,

        #[arg(long)]
        descending: bool,

        /// Print playlists of this grouping instead of tracks
        #[arg(long, value_enum)]
        group: Option<Grouping>,
    },
    /// Drive MPD interactively, one command per line on stdin
    #[cfg(feature = "mpd")]
    Run,
    /// Print the default config.toml to stdout
    GenerateConfig,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Title,
    Album,
    Artist,
    Genre,
    Year,
    TrackNumber,
    DateModified,
}

impl From<SortKey> for TrackSort {
    fn from(key: SortKey) -> Self {
        match key {
            SortKey::Title => TrackSort::Title,
            SortKey::Album => TrackSort::Album,
            SortKey::Artist => TrackSort::Artist,
            SortKey::Genre => TrackSort::Genre,
            SortKey::Year => TrackSort::Year,
            SortKey::TrackNumber => TrackSort::TrackNumber,
            SortKey::DateModified => TrackSort::DateModified,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grouping {
    Album,
    Artist,
    Genre,
    Folder,
}

impl From<Grouping> for PlaylistKind {
    fn from(group: Grouping) -> Self {
        match group {
            Grouping::Album => PlaylistKind::Album,
            Grouping::Artist => PlaylistKind::Artist,
            Grouping::Genre => PlaylistKind::Genre,
            Grouping::Folder => PlaylistKind::Folder,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_arguments() {
        let args = Args::parse_from([
            "cantus", "--verbose", "scan", "--query", "love", "--sort", "track-number", "--descending",
        ]);
        assert!(args.verbose);
        match args.command {
            Some(Cmd::Scan {
                query,
                sort,
                descending,
                group,
            }) => {
                assert_eq!(query.as_deref(), Some("love"));
                assert_eq!(sort, Some(SortKey::TrackNumber));
                assert!(descending);
                assert_eq!(group, None);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_global_config_flag() {
        let args = Args::parse_from(["cantus", "scan", "--group", "album", "--config", "/tmp/c.toml"]);
        assert_eq!(args.config, Some(PathBuf::from("/tmp/c.toml")));
        assert!(matches!(
            args.command,
            Some(Cmd::Scan {
                group: Some(Grouping::Album),
                ..
            })
        ));
    }
}
