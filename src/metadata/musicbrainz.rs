use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

use super::{MetadataProvider, MetadataSearchResult};
use crate::error::NetworkError;

pub const MUSICBRAINZ_URL: &str = "https://musicbrainz.org/ws/2/recording";
pub const COVER_ART_URL: &str = "https://coverartarchive.org/release";

/// Candidates further than this from the expected length are dropped.
const DURATION_TOLERANCE_MS: u64 = 10_000;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    recordings: Vec<Recording>,
}

#[derive(Debug, Deserialize)]
struct Recording {
    id: String,
    title: Option<String>,
    length: Option<u64>,
    #[serde(rename = "artist-credit", default)]
    artist_credit: Vec<ArtistCredit>,
    #[serde(default)]
    releases: Vec<Release>,
    #[serde(default)]
    tags: Vec<TagCount>,
}

#[derive(Debug, Deserialize)]
struct ArtistCredit {
    name: String,
    #[serde(default)]
    joinphrase: String,
}

#[derive(Debug, Deserialize)]
struct Release {
    id: String,
    title: Option<String>,
    date: Option<String>,
    #[serde(rename = "artist-credit", default)]
    artist_credit: Vec<ArtistCredit>,
    #[serde(default)]
    media: Vec<Medium>,
}

#[derive(Debug, Deserialize)]
struct Medium {
    #[serde(default)]
    track: Vec<MediumTrack>,
}

#[derive(Debug, Deserialize)]
struct MediumTrack {
    number: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagCount {
    name: String,
}

fn credit_string(credits: &[ArtistCredit]) -> Option<String> {
    if credits.is_empty() {
        return None;
    }
    Some(
        credits
            .iter()
            .map(|c| format!("{}{}", c.name, c.joinphrase))
            .collect::<String>()
            .trim()
            .to_string(),
    )
}

/// One candidate per (recording, release) pair; a recording without
/// releases still yields a single candidate.
fn candidates(recording: Recording) -> Vec<MetadataSearchResult> {
    let artist = credit_string(&recording.artist_credit);
    let genres: Vec<String> = recording.tags.iter().map(|t| t.name.clone()).collect();

    let base = MetadataSearchResult {
        recording_id: recording.id.clone(),
        title: recording.title.clone(),
        artist: artist.clone(),
        genres,
        duration_ms: recording.length,
        ..Default::default()
    };

    if recording.releases.is_empty() {
        return vec![base];
    }

    recording
        .releases
        .into_iter()
        .map(|release| MetadataSearchResult {
            release_id: Some(release.id),
            album: release.title,
            album_artist: credit_string(&release.artist_credit).or_else(|| artist.clone()),
            year: release
                .date
                .filter(|d| d.len() >= 4)
                .map(|d| d.chars().take(4).collect()),
            track_number: release
                .media
                .iter()
                .flat_map(|m| m.track.iter())
                .find_map(|t| t.number.clone()),
            ..base.clone()
        })
        .collect()
}

/// Drop candidates whose known length is too far from `expected_ms` and
/// order the rest by closeness. Unknown lengths go last.
fn rank_by_duration(results: &mut Vec<MetadataSearchResult>, expected_ms: u64) {
    results.retain(|r| {
        r.duration_ms
            .map(|d| d.abs_diff(expected_ms) <= DURATION_TOLERANCE_MS)
            .unwrap_or(true)
    });
    results.sort_by_key(|r| r.duration_ms.map(|d| d.abs_diff(expected_ms)).unwrap_or(u64::MAX));
}

/// Recording search on MusicBrainz, front covers from the Cover Art Archive.
pub struct MusicBrainzProvider {
    client: Client,
    search_url: String,
    cover_art_url: String,
}

impl MusicBrainzProvider {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            search_url: MUSICBRAINZ_URL.to_string(),
            cover_art_url: COVER_ART_URL.to_string(),
        }
    }
}

#[async_trait]
impl MetadataProvider for MusicBrainzProvider {
    async fn search(
        &self,
        query: &str,
        expected_duration_ms: Option<u64>,
    ) -> Result<Vec<MetadataSearchResult>, NetworkError> {
        let resp = self
            .client
            .get(&self.search_url)
            .header(ACCEPT, "application/json")
            .query(&[("query", query), ("fmt", "json")])
            .send()
            .await?;

        if resp.status() != StatusCode::OK {
            debug!(status = %resp.status(), query, "musicbrainz search failed");
            return Err(NetworkError::from_status(resp.status()));
        }

        let data: SearchResponse = resp.json().await.map_err(|_| NetworkError::ParseError)?;
        let mut results: Vec<MetadataSearchResult> =
            data.recordings.into_iter().flat_map(candidates).collect();
        if let Some(expected) = expected_duration_ms {
            rank_by_duration(&mut results, expected);
        }
        Ok(results)
    }

    async fn cover_art(&self, result: &MetadataSearchResult) -> Result<Vec<u8>, NetworkError> {
        let release_id = result.release_id.as_deref().ok_or(NetworkError::BadRequest)?;
        let url = format!("{}/{}/front-500", self.cover_art_url, release_id);

        let resp = self.client.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(NetworkError::from_status(resp.status()));
        }
        Ok(resp.bytes().await?.to_vec())
    }
}
