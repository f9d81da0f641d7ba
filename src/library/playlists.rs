use std::collections::HashMap;

use super::track::{Playlist, PlaylistKind, Track};

/// Group tracks into playlists by `key`, keeping the order in which each
/// group (and each track within it) first appears.
fn group_by<F>(tracks: &[Track], key: F) -> Vec<Playlist>
where
    F: Fn(&Track) -> Option<String>,
{
    let mut index: HashMap<Option<String>, usize> = HashMap::new();
    let mut playlists: Vec<Playlist> = Vec::new();

    for track in tracks {
        let name = key(track);
        let slot = *index.entry(name.clone()).or_insert_with(|| {
            playlists.push(Playlist::new(name, Vec::new()));
            playlists.len() - 1
        });
        playlists[slot].tracks.push(track.clone());
    }

    playlists
}

/// Derived playlist groupings for one kind.
pub fn playlists_for(tracks: &[Track], kind: PlaylistKind) -> Vec<Playlist> {
    match kind {
        PlaylistKind::Album => group_by(tracks, |t| t.album.clone()),
        PlaylistKind::Artist => group_by(tracks, |t| t.artist.clone()),
        PlaylistKind::Genre => group_by(tracks, |t| t.genre.clone()),
        PlaylistKind::Folder => group_by(tracks, Track::folder),
    }
}
