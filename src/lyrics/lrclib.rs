use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

use super::{Lyrics, LyricsProvider, LyricsQuery};
use crate::error::NetworkError;

pub const LRCLIB_URL: &str = "https://lrclib.net/api/get";

#[derive(Debug, Deserialize)]
struct LrclibResponse {
    #[serde(rename = "syncedLyrics")]
    synced_lyrics: Option<String>,
    #[serde(rename = "plainLyrics")]
    plain_lyrics: Option<String>,
    #[serde(default)]
    instrumental: bool,
}

/// Exact-match lookups against lrclib.net.
pub struct LrclibProvider {
    client: Client,
    url: String,
}

impl LrclibProvider {
    pub fn new(client: Client) -> Self {
        Self::with_url(client, LRCLIB_URL)
    }

    pub fn with_url(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    fn params(query: &LyricsQuery) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("track_name", query.title.clone()),
            ("artist_name", query.artist.clone()),
        ];
        if let Some(album) = &query.album {
            params.push(("album_name", album.clone()));
        }
        params.push(("duration", (query.duration_ms / 1000).to_string()));
        params
    }
}

#[async_trait]
impl LyricsProvider for LrclibProvider {
    async fn fetch(&self, query: &LyricsQuery) -> Result<Lyrics, NetworkError> {
        let resp = self
            .client
            .get(&self.url)
            .header(ACCEPT, "application/json")
            .query(&Self::params(query))
            .send()
            .await?;

        match resp.status() {
            StatusCode::OK => {}
            status => {
                debug!(%status, title = %query.title, "lrclib returned no lyrics");
                return Err(NetworkError::from_status(status));
            }
        }

        let data: LrclibResponse = resp.json().await.map_err(|_| NetworkError::ParseError)?;
        if data.instrumental {
            return Ok(Lyrics {
                uri: query.uri.clone(),
                plain: None,
                synced: None,
            });
        }

        Ok(Lyrics::from_raw(
            query.uri.clone(),
            data.plain_lyrics.as_deref(),
            data.synced_lyrics.as_deref(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_in_whole_seconds() {
        let query = LyricsQuery {
            uri: "/m/a.flac".into(),
            title: "Song".into(),
            artist: "Band".into(),
            album: Some("Record".into()),
            duration_ms: 215_999,
        };
        let params = LrclibProvider::params(&query);
        assert_eq!(
            params,
            vec![
                ("track_name", "Song".to_string()),
                ("artist_name", "Band".to_string()),
                ("album_name", "Record".to_string()),
                ("duration", "215".to_string()),
            ]
        );
    }

    #[test]
    fn test_album_is_optional() {
        let query = LyricsQuery {
            uri: "u".into(),
            title: "Song".into(),
            artist: "Band".into(),
            album: None,
            duration_ms: 1_000,
        };
        assert!(LrclibProvider::params(&query)
            .iter()
            .all(|(k, _)| *k != "album_name"));
    }

    #[test]
    fn test_response_shape() {
        let json = r#"{"id":1,"trackName":"Song","plainLyrics":"a\nb","syncedLyrics":"[00:01.00]a\n[00:02.00]b","instrumental":false}"#;
        let data: LrclibResponse = serde_json::from_str(json).unwrap();
        assert!(!data.instrumental);
        let lyrics = Lyrics::from_raw("u", data.plain_lyrics.as_deref(), data.synced_lyrics.as_deref());
        assert_eq!(lyrics.synced.unwrap().len(), 2);
    }
}
