//! Ordering and filtering of tracks and playlists.
//!
//! Everything here is pure: callers hand in a slice, get a new `Vec` back.
//! Absent values order before present ones when ascending (and after them
//! when descending), which is what `Option`'s `Ord` gives us for free.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use super::track::{Playlist, Track};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

impl SortOrder {
    fn apply(self, ord: Ordering) -> Ordering {
        match self {
            Self::Ascending => ord,
            Self::Descending => ord.reverse(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TrackSort {
    #[default]
    Title,
    Album,
    Artist,
    Genre,
    Year,
    TrackNumber,
    DateModified,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlaylistSort {
    #[default]
    Name,
    TrackCount,
}

/// Only the first ten characters of a genre take part in ordering.
const GENRE_KEY_LEN: usize = 10;

fn genre_key(track: &Track) -> Option<String> {
    track
        .genre
        .as_ref()
        .map(|g| g.chars().take(GENRE_KEY_LEN).collect())
}

/// Track number from the last two characters of the raw tag.
/// "1007" -> 7, "3/12" -> 12, "A" -> None.
pub fn track_number_key(track: &Track) -> Option<u32> {
    let raw = track.track_number.as_deref()?.trim();
    let chars: Vec<char> = raw.chars().collect();
    let tail: String = chars[chars.len().saturating_sub(2)..].iter().collect();
    tail.parse().ok()
}

fn compare_tracks(a: &Track, b: &Track, sort: TrackSort) -> Ordering {
    match sort {
        TrackSort::Title => a.title.cmp(&b.title),
        TrackSort::Album => a.album.cmp(&b.album),
        TrackSort::Artist => a.artist.cmp(&b.artist),
        TrackSort::Genre => genre_key(a).cmp(&genre_key(b)),
        TrackSort::Year => a.year.cmp(&b.year),
        TrackSort::TrackNumber => track_number_key(a).cmp(&track_number_key(b)),
        TrackSort::DateModified => a.date_modified.cmp(&b.date_modified),
    }
}

/// Stable sort of `tracks` by `sort` in `order`.
pub fn sort_tracks(tracks: &[Track], sort: TrackSort, order: SortOrder) -> Vec<Track> {
    let mut sorted = tracks.to_vec();
    sorted.sort_by(|a, b| order.apply(compare_tracks(a, b, sort)));
    sorted
}

pub fn sort_playlists(playlists: &[Playlist], sort: PlaylistSort, order: SortOrder) -> Vec<Playlist> {
    let mut sorted = playlists.to_vec();
    sorted.sort_by(|a, b| {
        let ord = match sort {
            PlaylistSort::Name => a.name.cmp(&b.name),
            PlaylistSort::TrackCount => a.len().cmp(&b.len()),
        };
        order.apply(ord)
    });
    sorted
}

/// Text a query is matched against.
fn searchable_text(track: &Track) -> String {
    [
        &track.title,
        &track.album,
        &track.artist,
        &track.album_artist,
        &track.genre,
        &track.year,
    ]
    .iter()
    .map(|field| field.as_deref().unwrap_or(""))
    .collect::<Vec<_>>()
    .join(" ")
}

/// Case-insensitive substring filter. A blank query keeps everything.
pub fn filter_tracks(tracks: &[Track], query: &str) -> Vec<Track> {
    let query = query.trim();
    if query.is_empty() {
        return tracks.to_vec();
    }
    let needle = query.to_lowercase();
    tracks
        .iter()
        .filter(|t| searchable_text(t).to_lowercase().contains(&needle))
        .cloned()
        .collect()
}
