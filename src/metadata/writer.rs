use std::io::Cursor;
use std::path::Path;

use lofty::config::WriteOptions;
use lofty::error::ErrorKind as LoftyErrorKind;
use lofty::file::{AudioFile, TaggedFileExt};
use lofty::picture::{Picture, PictureType};
use lofty::tag::{Accessor, ItemKey, Tag};
use tracing::{debug, info};

use super::{Metadata, MetadataWriter};
use crate::error::{LocalError, PermissionToken};
use crate::library::Track;

/// Tag writer built on lofty ✍️
#[derive(Debug, Default, Clone, Copy)]
pub struct LoftyWriter;

impl LoftyWriter {
    pub fn new() -> Self {
        Self
    }

    fn token(path: &Path) -> PermissionToken {
        PermissionToken(path.to_string_lossy().to_string())
    }

    fn map_lofty(path: &Path, e: lofty::error::LoftyError, writing: bool) -> LocalError {
        match e.kind() {
            LoftyErrorKind::Io(io) if io.kind() == std::io::ErrorKind::PermissionDenied => {
                if writing {
                    LocalError::NoWritePermission(Self::token(path))
                } else {
                    LocalError::NoReadPermission
                }
            }
            _ if writing => LocalError::FailedToWrite(format!("{}: {}", path.display(), e)),
            _ => LocalError::FailedToRead(format!("{}: {}", path.display(), e)),
        }
    }

    fn apply(tag: &mut Tag, metadata: &Metadata) -> Result<(), LocalError> {
        if let Some(title) = &metadata.title {
            tag.set_title(title.clone());
        }
        if let Some(album) = &metadata.album {
            tag.set_album(album.clone());
        }
        if let Some(artist) = &metadata.artist {
            tag.set_artist(artist.clone());
        }
        if let Some(genre) = &metadata.genre {
            tag.set_genre(genre.clone());
        }
        if let Some(album_artist) = &metadata.album_artist {
            tag.insert_text(ItemKey::AlbumArtist, album_artist.clone());
        }
        if let Some(year) = &metadata.year {
            tag.insert_text(ItemKey::Year, year.clone());
        }
        if let Some(track_number) = &metadata.track_number {
            tag.insert_text(ItemKey::TrackNumber, track_number.clone());
        }

        if let Some(bytes) = &metadata.cover_art {
            let mut picture = Picture::from_reader(&mut Cursor::new(bytes))
                .map_err(|e| LocalError::FailedToWrite(format!("unusable cover art: {}", e)))?;
            picture.set_pic_type(PictureType::CoverFront);
            tag.remove_picture_type(PictureType::CoverFront);
            tag.push_picture(picture);
        }
        Ok(())
    }
}

impl MetadataWriter for LoftyWriter {
    fn write(&self, track: &Track, metadata: &Metadata) -> Result<(), LocalError> {
        let path = track.path.as_path();

        let permissions = std::fs::metadata(path)
            .map_err(LocalError::from_io_read(path))?
            .permissions();
        if permissions.readonly() {
            return Err(LocalError::NoWritePermission(Self::token(path)));
        }

        let mut tagged_file =
            lofty::read_from_path(path).map_err(|e| Self::map_lofty(path, e, false))?;

        let tag_type = tagged_file.primary_tag_type();
        if tagged_file.tag(tag_type).is_none() {
            debug!(path = %path.display(), ?tag_type, "creating missing primary tag");
            tagged_file.insert_tag(Tag::new(tag_type));
        }
        let tag = tagged_file
            .tag_mut(tag_type)
            .ok_or_else(|| LocalError::Unknown("primary tag vanished".to_string()))?;

        Self::apply(tag, metadata)?;

        tagged_file
            .save_to_path(path, WriteOptions::default())
            .map_err(|e| Self::map_lofty(path, e, true))?;

        info!(path = %path.display(), "metadata written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_fails_to_read() {
        let track = Track::from_path(Path::new("/definitely/not/here.flac"));
        let err = LoftyWriter::new()
            .write(&track, &Metadata::default())
            .unwrap_err();
        assert!(matches!(err, LocalError::FailedToRead(_)));
    }

    #[test]
    fn test_readonly_file_needs_permission() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("song.mp3");
        std::fs::write(&path, b"whatever").unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_readonly(true);
        std::fs::set_permissions(&path, perms).unwrap();

        let track = Track::from_path(&path);
        let err = LoftyWriter::new()
            .write(&track, &Metadata::default())
            .unwrap_err();
        assert_eq!(
            err,
            LocalError::NoWritePermission(PermissionToken(path.to_string_lossy().to_string()))
        );
    }

    #[test]
    fn test_garbage_file_is_not_a_permission_problem() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("song.mp3");
        std::fs::write(&path, b"definitely not audio").unwrap();

        let err = LoftyWriter::new()
            .write(&Track::from_path(&path), &Metadata::default())
            .unwrap_err();
        assert!(matches!(err, LocalError::FailedToRead(_)));
    }
}
