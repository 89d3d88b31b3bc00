use thiserror::Error;

use crate::domain::hash::{AlbumId, TrackId};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("track {0} not found")]
    TrackNotFound(TrackId),

    #[error("album {0} not found")]
    AlbumNotFound(AlbumId),

    #[error("track {0} already exists")]
    DuplicateTrack(TrackId),

    #[error("album {0} already exists")]
    DuplicateAlbum(AlbumId),

    #[error("invalid draft: {0}")]
    InvalidDraft(String),

    #[error("track {track} has no playable audio file")]
    InvalidTrackFile { track: TrackId },

    #[error("filesystem error: {0}")]
    Fs(#[from] std::io::Error),

    #[error("invalid track id")]
    InvalidTrackId,

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}
