pub mod musicbrainz;
pub mod pipeline;
pub mod writer;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{LocalError, NetworkError};
use crate::library::Track;

pub use musicbrainz::MusicBrainzProvider;
pub use pipeline::{MetadataEvent, MetadataPipeline, Preview};
pub use writer::LoftyWriter;

/// An edit draft. Reviewed before it is handed to a [`MetadataWriter`];
/// absent fields are left as they are in the file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub title: Option<String>,
    pub album: Option<String>,
    pub artist: Option<String>,
    pub album_artist: Option<String>,
    pub genre: Option<String>,
    pub year: Option<String>,
    pub track_number: Option<String>,
    #[serde(skip)]
    pub cover_art: Option<Vec<u8>>,
}

impl Metadata {
    /// Starting point for a manual edit.
    pub fn from_track(track: &Track) -> Self {
        Self {
            title: track.title.clone(),
            album: track.album.clone(),
            artist: track.artist.clone(),
            album_artist: track.album_artist.clone(),
            genre: track.genre.clone(),
            year: track.year.clone(),
            track_number: track.track_number.clone(),
            cover_art: None,
        }
    }

    pub fn from_search_result(result: &MetadataSearchResult) -> Self {
        Self {
            title: result.title.clone(),
            album: result.album.clone(),
            artist: result.artist.clone(),
            album_artist: result.album_artist.clone(),
            genre: (!result.genres.is_empty()).then(|| result.genres.join(" / ")),
            year: result.year.clone(),
            track_number: result.track_number.clone(),
            cover_art: None,
        }
    }
}

/// One candidate returned by a metadata search.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataSearchResult {
    pub recording_id: String,
    /// Needed to fetch cover art later.
    pub release_id: Option<String>,
    pub title: Option<String>,
    pub album: Option<String>,
    pub artist: Option<String>,
    pub album_artist: Option<String>,
    pub genres: Vec<String>,
    pub year: Option<String>,
    pub track_number: Option<String>,
    pub duration_ms: Option<u64>,
}

#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// `expected_duration_ms` lets the provider rank candidates by how
    /// close their length is to the file being tagged.
    async fn search(
        &self,
        query: &str,
        expected_duration_ms: Option<u64>,
    ) -> Result<Vec<MetadataSearchResult>, NetworkError>;

    async fn cover_art(&self, result: &MetadataSearchResult) -> Result<Vec<u8>, NetworkError>;
}

/// Writes a draft into the tags of a track's file. Blocking.
pub trait MetadataWriter: Send + Sync {
    fn write(&self, track: &Track, metadata: &Metadata) -> Result<(), LocalError>;
}
