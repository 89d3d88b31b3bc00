use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use super::hash::{AlbumId, TrackId};

/// Represent a song in the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackId,
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub album_id: Option<AlbumId>,
    pub duration_secs: Option<u32>,
    pub lyrics: Option<String>,
    pub cover_image: Option<String>,
    pub audio_url: String,
    pub genre: Option<String>,
    pub release_year: Option<u32>,
    pub play_count: u64,
    pub is_published: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Where the audio of a track lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioSource {
    Remote(String),
    Local(PathBuf),
}

impl Track {
    pub fn duration(&self) -> Option<Duration> {
        self.duration_secs.map(|s| Duration::from_secs(u64::from(s)))
    }

    pub fn audio_source(&self) -> AudioSource {
        let url = self.audio_url.trim();
        if url.starts_with("http://") || url.starts_with("https://") {
            AudioSource::Remote(url.to_string())
        } else {
            AudioSource::Local(PathBuf::from(url.strip_prefix("file://").unwrap_or(url)))
        }
    }
}

fn published_by_default() -> bool {
    true
}

/// Fields an admin supplies when creating or editing a track
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackDraft {
    pub title: String,
    pub artist: String,
    #[serde(default)]
    pub album: Option<String>,
    #[serde(default)]
    pub album_id: Option<AlbumId>,
    #[serde(default)]
    pub duration_secs: Option<u32>,
    #[serde(default)]
    pub lyrics: Option<String>,
    #[serde(default)]
    pub cover_image: Option<String>,
    pub audio_url: String,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub release_year: Option<u32>,
    #[serde(default = "published_by_default")]
    pub is_published: bool,
}

impl TrackDraft {
    /// returns a description of the first missing required field
    pub fn missing_field(&self) -> Option<&'static str> {
        if self.title.trim().is_empty() {
            Some("title")
        } else if self.artist.trim().is_empty() {
            Some("artist")
        } else if self.audio_url.trim().is_empty() {
            Some("audio_url")
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Album {
    pub id: AlbumId,
    pub title: String,
    pub cover_image: Option<String>,
    pub release_year: Option<u32>,
    pub description: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlbumDraft {
    pub title: String,
    #[serde(default)]
    pub cover_image: Option<String>,
    #[serde(default)]
    pub release_year: Option<u32>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Album with the number of published songs in it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlbumSummary {
    pub album: Album,
    pub song_count: usize,
}
