pub mod playlists;
pub mod resolver;
pub mod sort;
pub mod track;

pub use playlists::playlists_for;
pub use resolver::{FsResolver, LibraryResolver, ScanSettings};
pub use sort::{filter_tracks, sort_playlists, sort_tracks, PlaylistSort, SortOrder, TrackSort};
pub use track::{Playlist, PlaylistKind, Track};
