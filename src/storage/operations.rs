use std::collections::HashSet;

use crate::{
    config::LibrarySource,
    domain::{
        hash::{AlbumId, TrackId},
        track::{Album, AlbumDraft, AlbumSummary, Track, TrackDraft},
    },
    storage::{
        db::{self, SecondsSinceUnix, system_time_to_i64},
        error::StorageError,
        fs::FsSnapshot,
        schema::{columns, tables},
    },
};

use columns::*;
use rusqlite::{Connection, OptionalExtension, Row, params};
use tables::*;

const TRACK_COLUMNS: &str = "id, title, artist, album, album_id, duration_secs, lyrics, \
     cover_image, audio_url, genre, release_year, play_count, is_published, created_at, updated_at";

const ALBUM_COLUMNS: &str = "id, title, cover_image, release_year, description, created_at";

/// Which tracks a listing includes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Published,
    All,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct CatalogCounts {
    pub tracks: usize,
    pub published: usize,
    pub albums: usize,
    pub likes: usize,
}

/// Main structure that implements all catalog logic
pub struct Storage {
    pub(crate) db: rusqlite::Connection,
    source: LibrarySource,
}

fn track_from_row(row: &Row) -> rusqlite::Result<Track> {
    Ok(Track {
        id: row.get(0)?,
        title: row.get(1)?,
        artist: row.get(2)?,
        album: row.get(3)?,
        album_id: row.get(4)?,
        duration_secs: row.get(5)?,
        lyrics: row.get(6)?,
        cover_image: row.get(7)?,
        audio_url: row.get(8)?,
        genre: row.get(9)?,
        release_year: row.get(10)?,
        play_count: row.get(11)?,
        is_published: row.get(12)?,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
    })
}

fn album_from_row(row: &Row) -> rusqlite::Result<Album> {
    Ok(Album {
        id: row.get(0)?,
        title: row.get(1)?,
        cover_image: row.get(2)?,
        release_year: row.get(3)?,
        description: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn blank_to_none(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn insert_track_row(
    conn: &Connection,
    id: &TrackId,
    draft: &TrackDraft,
    album: Option<&str>,
    now: SecondsSinceUnix,
) -> rusqlite::Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO {SONGS} ({ID}, {TITLE}, {ARTIST}, {ALBUM}, {ALBUM_ID}, {DURATION_SECS},
             {LYRICS}, {COVER_IMAGE}, {AUDIO_URL}, {GENRE}, {RELEASE_YEAR}, {IS_PUBLISHED},
             {CREATED_AT}, {UPDATED_AT})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)"
        ),
        params![
            id,
            draft.title.trim(),
            draft.artist.trim(),
            album,
            draft.album_id,
            draft.duration_secs,
            blank_to_none(&draft.lyrics),
            blank_to_none(&draft.cover_image),
            draft.audio_url.trim(),
            blank_to_none(&draft.genre),
            draft.release_year,
            draft.is_published,
            now,
        ],
    )?;
    Ok(())
}

impl Storage {
    /// when called, opens a data base connection
    pub fn new(
        db_config: crate::config::Database,
        lib_config: LibrarySource,
    ) -> Result<Self, StorageError> {
        let db: rusqlite::Connection = db::open(&db_config)?;
        Ok(Self::from_existing_conn(db, lib_config))
    }

    pub fn from_existing_conn(db: rusqlite::Connection, lib_config: LibrarySource) -> Self {
        Self {
            db,
            source: lib_config,
        }
    }

    // --------------------------------------------------
    // Tracks
    // --------------------------------------------------

    /// Registers a track described by a draft. Its id is derived from the audio locator.
    pub fn add_track(&mut self, draft: &TrackDraft) -> Result<Track, StorageError> {
        let album = self.validate_draft(draft)?;
        let id = TrackId::from_locator(&draft.audio_url);

        if self.track_exists(&id)? {
            return Err(StorageError::DuplicateTrack(id));
        }

        insert_track_row(&self.db, &id, draft, album.as_deref(), db::now()?)?;
        self.get_track(&id)
    }

    /// Rewrites a track's metadata. The audio locator is part of the track's identity
    /// and cannot change.
    pub fn update_track(&mut self, id: &TrackId, draft: &TrackDraft) -> Result<Track, StorageError> {
        let album = self.validate_draft(draft)?;

        let current = self.get_track(id)?;
        if draft.audio_url.trim() != current.audio_url {
            return Err(StorageError::InvalidDraft(
                "audio_url cannot change, add a new track instead".into(),
            ));
        }

        let updated = self.db.execute(
            &format!(
                "UPDATE {SONGS} SET {TITLE} = ?2, {ARTIST} = ?3, {ALBUM} = ?4, {ALBUM_ID} = ?5,
                 {DURATION_SECS} = ?6, {LYRICS} = ?7, {COVER_IMAGE} = ?8,
                 {GENRE} = ?9, {RELEASE_YEAR} = ?10, {IS_PUBLISHED} = ?11, {UPDATED_AT} = ?12
                 WHERE {ID} = ?1"
            ),
            params![
                id,
                draft.title.trim(),
                draft.artist.trim(),
                album,
                draft.album_id,
                draft.duration_secs,
                blank_to_none(&draft.lyrics),
                blank_to_none(&draft.cover_image),
                blank_to_none(&draft.genre),
                draft.release_year,
                draft.is_published,
                db::now()?,
            ],
        )?;

        if updated == 0 {
            return Err(StorageError::TrackNotFound(id.clone()));
        }
        self.get_track(id)
    }

    pub fn delete_track(&mut self, id: &TrackId) -> Result<(), StorageError> {
        let deleted = self
            .db
            .execute(&format!("DELETE FROM {SONGS} WHERE {ID} = ?1"), params![id])?;

        if deleted == 0 {
            return Err(StorageError::TrackNotFound(id.clone()));
        }
        Ok(())
    }

    /// flips the published flag, returns the new value
    pub fn toggle_published(&mut self, id: &TrackId) -> Result<bool, StorageError> {
        self.db
            .query_row(
                &format!(
                    "UPDATE {SONGS} SET {IS_PUBLISHED} = NOT {IS_PUBLISHED}, {UPDATED_AT} = ?2
                     WHERE {ID} = ?1 RETURNING {IS_PUBLISHED}"
                ),
                params![id, db::now()?],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| StorageError::TrackNotFound(id.clone()))
    }

    pub fn get_track(&self, id: &TrackId) -> Result<Track, StorageError> {
        self.db
            .query_row(
                &format!("SELECT {TRACK_COLUMNS} FROM {SONGS} WHERE {ID} = ?1"),
                params![id],
                track_from_row,
            )
            .optional()?
            .ok_or_else(|| StorageError::TrackNotFound(id.clone()))
    }

    /// resolves ids in order, keeping duplicates. Fails on the first unknown id
    pub fn get_tracks(&self, ids: &[TrackId]) -> Result<Vec<Track>, StorageError> {
        ids.iter().map(|id| self.get_track(id)).collect()
    }

    /// newest first
    pub fn list_tracks(&self, visibility: Visibility) -> Result<Vec<Track>, StorageError> {
        let filter = match visibility {
            Visibility::Published => format!("WHERE {IS_PUBLISHED} = 1"),
            Visibility::All => String::new(),
        };
        self.query_tracks(
            &format!(
                "SELECT {TRACK_COLUMNS} FROM {SONGS} {filter}
                 ORDER BY {CREATED_AT} DESC, rowid DESC"
            ),
            [],
        )
    }

    /// other published tracks, newest first
    pub fn related_tracks(&self, id: &TrackId, limit: u32) -> Result<Vec<Track>, StorageError> {
        self.query_tracks(
            &format!(
                "SELECT {TRACK_COLUMNS} FROM {SONGS}
                 WHERE {IS_PUBLISHED} = 1 AND {ID} != ?1
                 ORDER BY {CREATED_AT} DESC, rowid DESC LIMIT ?2"
            ),
            params![id, limit],
        )
    }

    /// published tracks whose title, artist, genre or lyrics contain the query, ignoring case
    pub fn search(&self, query: &str) -> Result<Vec<Track>, StorageError> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let matches = |field: &str| field.to_lowercase().contains(&query);

        let tracks = self.query_tracks(
            &format!(
                "SELECT {TRACK_COLUMNS} FROM {SONGS} WHERE {IS_PUBLISHED} = 1 ORDER BY {TITLE}"
            ),
            [],
        )?;

        Ok(tracks
            .into_iter()
            .filter(|t| {
                matches(&t.title)
                    || matches(&t.artist)
                    || t.genre.as_deref().is_some_and(matches)
                    || t.lyrics.as_deref().is_some_and(matches)
            })
            .collect())
    }

    pub fn genres(&self) -> Result<Vec<String>, StorageError> {
        let mut stmt = self.db.prepare(&format!(
            "SELECT DISTINCT {GENRE} FROM {SONGS}
             WHERE {IS_PUBLISHED} = 1 AND {GENRE} IS NOT NULL AND {GENRE} != ''
             ORDER BY {GENRE}"
        ))?;
        let genres = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(genres)
    }

    /// published tracks ordered by play count
    pub fn most_played(&self, limit: u32) -> Result<Vec<Track>, StorageError> {
        self.query_tracks(
            &format!(
                "SELECT {TRACK_COLUMNS} FROM {SONGS} WHERE {IS_PUBLISHED} = 1
                 ORDER BY {PLAY_COUNT} DESC, {TITLE} LIMIT ?1"
            ),
            params![limit],
        )
    }

    // --------------------------------------------------
    // Play counts
    // --------------------------------------------------

    /// single-statement increment, returns the new count
    pub fn increment_play_count(&mut self, id: &TrackId) -> Result<u64, StorageError> {
        self.db
            .query_row(
                &format!(
                    "UPDATE {SONGS} SET {PLAY_COUNT} = {PLAY_COUNT} + 1
                     WHERE {ID} = ?1 RETURNING {PLAY_COUNT}"
                ),
                params![id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| StorageError::TrackNotFound(id.clone()))
    }

    pub fn read_play_count(&self, id: &TrackId) -> Result<Option<u64>, StorageError> {
        Ok(self
            .db
            .query_row(
                &format!("SELECT {PLAY_COUNT} FROM {SONGS} WHERE {ID} = ?1"),
                params![id],
                |row| row.get(0),
            )
            .optional()?)
    }

    pub fn write_play_count(&mut self, id: &TrackId, count: u64) -> Result<(), StorageError> {
        let updated = self.db.execute(
            &format!("UPDATE {SONGS} SET {PLAY_COUNT} = ?2 WHERE {ID} = ?1"),
            params![id, count],
        )?;

        if updated == 0 {
            return Err(StorageError::TrackNotFound(id.clone()));
        }
        Ok(())
    }

    // --------------------------------------------------
    // Albums
    // --------------------------------------------------

    pub fn add_album(&mut self, draft: &AlbumDraft) -> Result<Album, StorageError> {
        if draft.title.trim().is_empty() {
            return Err(StorageError::InvalidDraft("title must not be empty".into()));
        }

        let id = AlbumId::from_title(&draft.title);
        if self.find_album(&id)?.is_some() {
            return Err(StorageError::DuplicateAlbum(id));
        }

        self.db.execute(
            &format!(
                "INSERT INTO {ALBUMS} ({ID}, {TITLE}, {COVER_IMAGE}, {RELEASE_YEAR}, {DESCRIPTION}, {CREATED_AT})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
            ),
            params![
                id,
                draft.title.trim(),
                blank_to_none(&draft.cover_image),
                draft.release_year,
                blank_to_none(&draft.description),
                db::now()?,
            ],
        )?;

        self.get_album(&id)
    }

    pub fn get_album(&self, id: &AlbumId) -> Result<Album, StorageError> {
        self.find_album(id)?
            .ok_or_else(|| StorageError::AlbumNotFound(id.clone()))
    }

    /// Deletes the album. Its songs stay in the catalog as singles.
    pub fn delete_album(&mut self, id: &AlbumId) -> Result<(), StorageError> {
        let tx = self.db.transaction()?;

        tx.execute(
            &format!("UPDATE {SONGS} SET {ALBUM} = NULL, {ALBUM_ID} = NULL WHERE {ALBUM_ID} = ?1"),
            params![id],
        )?;
        let deleted = tx.execute(&format!("DELETE FROM {ALBUMS} WHERE {ID} = ?1"), params![id])?;

        if deleted == 0 {
            return Err(StorageError::AlbumNotFound(id.clone()));
        }

        tx.commit()?;
        Ok(())
    }

    /// newest first, with the number of published songs in each
    pub fn list_albums(&self) -> Result<Vec<AlbumSummary>, StorageError> {
        let mut stmt = self.db.prepare(&format!(
            "SELECT {ALBUM_COLUMNS},
                (SELECT COUNT(*) FROM {SONGS} s WHERE s.{ALBUM_ID} = a.{ID} AND s.{IS_PUBLISHED} = 1)
             FROM {ALBUMS} a
             ORDER BY a.{CREATED_AT} DESC, a.rowid DESC"
        ))?;

        let albums = stmt
            .query_map([], |row| {
                Ok(AlbumSummary {
                    album: album_from_row(row)?,
                    song_count: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(albums)
    }

    /// the album with its published songs, by title
    pub fn album_tracks(&self, id: &AlbumId) -> Result<(Album, Vec<Track>), StorageError> {
        let album = self.get_album(id)?;
        let tracks = self.query_tracks(
            &format!(
                "SELECT {TRACK_COLUMNS} FROM {SONGS}
                 WHERE {ALBUM_ID} = ?1 AND {IS_PUBLISHED} = 1 ORDER BY {TITLE}"
            ),
            params![id],
        )?;
        Ok((album, tracks))
    }

    /// published songs that belong to no album, by title
    pub fn singles(&self) -> Result<Vec<Track>, StorageError> {
        self.query_tracks(
            &format!(
                "SELECT {TRACK_COLUMNS} FROM {SONGS}
                 WHERE {ALBUM_ID} IS NULL AND {IS_PUBLISHED} = 1 ORDER BY {TITLE}"
            ),
            [],
        )
    }

    // --------------------------------------------------
    // Likes
    // --------------------------------------------------

    /// likes or unlikes a track for a user, returns whether it is liked afterwards
    pub fn toggle_like(&mut self, user: &str, id: &TrackId) -> Result<bool, StorageError> {
        if !self.track_exists(id)? {
            return Err(StorageError::TrackNotFound(id.clone()));
        }

        let now = db::now()?;
        let tx = self.db.transaction()?;

        let removed = tx.execute(
            &format!("DELETE FROM {LIKES} WHERE {USER_ID} = ?1 AND {SONG_ID} = ?2"),
            params![user, id],
        )?;

        let liked = if removed == 0 {
            tx.execute(
                &format!("INSERT INTO {LIKES} ({USER_ID}, {SONG_ID}, {CREATED_AT}) VALUES (?1, ?2, ?3)"),
                params![user, id, now],
            )?;
            true
        } else {
            false
        };

        tx.commit()?;
        Ok(liked)
    }

    /// ids of tracks the user liked, most recent first
    pub fn liked_ids(&self, user: &str) -> Result<Vec<TrackId>, StorageError> {
        let mut stmt = self.db.prepare(&format!(
            "SELECT {SONG_ID} FROM {LIKES} WHERE {USER_ID} = ?1
             ORDER BY {CREATED_AT} DESC, rowid DESC"
        ))?;
        let ids = stmt
            .query_map(params![user], |row| row.get(0))?
            .collect::<Result<Vec<TrackId>, _>>()?;
        Ok(ids)
    }

    /// published tracks the user liked, most recent like first
    pub fn favorites(&self, user: &str) -> Result<Vec<Track>, StorageError> {
        let columns = TRACK_COLUMNS
            .split(", ")
            .map(|c| format!("s.{c}"))
            .collect::<Vec<_>>()
            .join(", ");
        self.query_tracks(
            &format!(
                "SELECT {columns} FROM {LIKES} l JOIN {SONGS} s ON s.{ID} = l.{SONG_ID}
                 WHERE l.{USER_ID} = ?1 AND s.{IS_PUBLISHED} = 1
                 ORDER BY l.{CREATED_AT} DESC, l.rowid DESC"
            ),
            params![user],
        )
    }

    // --------------------------------------------------
    // Library import
    // --------------------------------------------------

    /// Scans library roots and registers audio files the catalog has not seen yet.
    ///
    /// Files are identified by content, so a copy of an imported file is skipped.
    pub fn import_library(&mut self) -> Result<Vec<Track>, StorageError> {
        log::info!("Scanning the music on file system...");
        let fs = FsSnapshot::scan(&self.source)?;
        let time_secs = system_time_to_i64(fs.observed_at).map_err(StorageError::Internal)?;

        let mut seen = HashSet::new();
        let mut new_ids = Vec::new();

        let tx = self.db.transaction()?;
        for file in &fs.files {
            if !seen.insert(file.track_id.clone()) {
                continue;
            }

            let exists: bool = tx.query_row(
                &format!("SELECT EXISTS(SELECT 1 FROM {SONGS} WHERE {ID} = ?1)"),
                params![file.track_id],
                |row| row.get(0),
            )?;
            if exists {
                continue;
            }

            let draft = TrackDraft {
                title: file.title(),
                artist: self.source.default_artist.clone(),
                audio_url: file.path.to_string_lossy().to_string(),
                is_published: true,
                ..Default::default()
            };
            insert_track_row(&tx, &file.track_id, &draft, None, time_secs)?;
            new_ids.push(file.track_id.clone());
        }

        tx.execute(
            &format!("INSERT INTO {UPDATES} ({UPDATED_AT}) VALUES (?1)"),
            params![time_secs],
        )?;
        tx.commit()?;

        self.get_tracks(&new_ids)
    }

    /// time of the most recent import, if any
    pub fn last_updated(&self) -> Result<Option<SecondsSinceUnix>, StorageError> {
        Ok(self.db.query_row(
            &format!("SELECT MAX({UPDATED_AT}) FROM {UPDATES}"),
            [],
            |row| row.get(0),
        )?)
    }

    pub fn counts(&self) -> Result<CatalogCounts, StorageError> {
        let count = |sql: String| -> Result<usize, StorageError> {
            Ok(self.db.query_row(&sql, [], |row| row.get(0))?)
        };

        Ok(CatalogCounts {
            tracks: count(format!("SELECT COUNT(*) FROM {SONGS}"))?,
            published: count(format!(
                "SELECT COUNT(*) FROM {SONGS} WHERE {IS_PUBLISHED} = 1"
            ))?,
            albums: count(format!("SELECT COUNT(*) FROM {ALBUMS}"))?,
            likes: count(format!("SELECT COUNT(*) FROM {LIKES}"))?,
        })
    }

    // --------------------------------------------------
    // Helpers
    // --------------------------------------------------

    fn query_tracks<P: rusqlite::Params>(
        &self,
        sql: &str,
        params: P,
    ) -> Result<Vec<Track>, StorageError> {
        let mut stmt = self.db.prepare(sql)?;
        let tracks = stmt
            .query_map(params, track_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tracks)
    }

    fn track_exists(&self, id: &TrackId) -> Result<bool, StorageError> {
        Ok(self.db.query_row(
            &format!("SELECT EXISTS(SELECT 1 FROM {SONGS} WHERE {ID} = ?1)"),
            params![id],
            |row| row.get(0),
        )?)
    }

    fn find_album(&self, id: &AlbumId) -> Result<Option<Album>, StorageError> {
        Ok(self
            .db
            .query_row(
                &format!("SELECT {ALBUM_COLUMNS} FROM {ALBUMS} WHERE {ID} = ?1"),
                params![id],
                album_from_row,
            )
            .optional()?)
    }

    /// checks required fields and the album reference, returns the album name to store
    fn validate_draft(&self, draft: &TrackDraft) -> Result<Option<String>, StorageError> {
        if let Some(field) = draft.missing_field() {
            return Err(StorageError::InvalidDraft(format!("{field} must not be empty")));
        }

        let album_name = blank_to_none(&draft.album).map(str::to_string);
        match &draft.album_id {
            Some(album_id) => {
                let album = self.get_album(album_id)?;
                Ok(album_name.or(Some(album.title)))
            }
            None => Ok(album_name),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use rusqlite::Connection;
    use tempfile::tempdir;

    use crate::{
        config::LibrarySource,
        domain::{
            hash::TrackId,
            track::{AlbumDraft, TrackDraft},
        },
        storage::{
            error::StorageError,
            operations::{CatalogCounts, Storage, Visibility},
            schema,
        },
    };

    fn setup_storage() -> anyhow::Result<Storage> {
        let conn = Connection::open_in_memory()?;
        schema::init(&conn)?;
        Ok(Storage::from_existing_conn(conn, LibrarySource::default()))
    }

    fn draft(title: &str) -> TrackDraft {
        TrackDraft {
            title: title.to_string(),
            artist: "Atilla".to_string(),
            audio_url: format!("https://cdn.example/{}.mp3", title.replace(' ', "-")),
            is_published: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_add_and_get_track() -> anyhow::Result<()> {
        let mut storage = setup_storage()?;

        let added = storage.add_track(&TrackDraft {
            genre: Some("Rock".into()),
            lyrics: Some("  ".into()),
            duration_secs: Some(215),
            ..draft("Gece")
        })?;

        assert_eq!(added.id, TrackId::from_locator("https://cdn.example/Gece.mp3"));
        assert_eq!(added.play_count, 0);
        assert_eq!(added.lyrics, None);

        let fetched = storage.get_track(&added.id)?;
        assert_eq!(fetched, added);
        assert_eq!(fetched.genre.as_deref(), Some("Rock"));
        assert_eq!(fetched.duration_secs, Some(215));

        Ok(())
    }

    #[test]
    fn test_add_duplicate_track_is_rejected() -> anyhow::Result<()> {
        let mut storage = setup_storage()?;
        storage.add_track(&draft("Gece"))?;

        let err = storage.add_track(&draft("Gece")).unwrap_err();
        assert!(matches!(err, StorageError::DuplicateTrack(..)));

        Ok(())
    }

    #[test]
    fn test_add_track_validates_draft() -> anyhow::Result<()> {
        let mut storage = setup_storage()?;

        let err = storage
            .add_track(&TrackDraft {
                title: " ".into(),
                ..draft("x")
            })
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidDraft(..)));

        let err = storage
            .add_track(&TrackDraft {
                album_id: Some(crate::domain::hash::AlbumId::from_title("missing")),
                ..draft("y")
            })
            .unwrap_err();
        assert!(matches!(err, StorageError::AlbumNotFound(..)));

        Ok(())
    }

    #[test]
    fn test_update_and_delete_track() -> anyhow::Result<()> {
        let mut storage = setup_storage()?;
        let track = storage.add_track(&draft("Gece"))?;

        let updated = storage.update_track(
            &track.id,
            &TrackDraft {
                title: "Gece (Live)".into(),
                ..draft("Gece")
            },
        )?;
        assert_eq!(updated.id, track.id);
        assert_eq!(updated.title, "Gece (Live)");

        storage.delete_track(&track.id)?;
        assert!(matches!(
            storage.get_track(&track.id).unwrap_err(),
            StorageError::TrackNotFound(..)
        ));
        assert!(matches!(
            storage.delete_track(&track.id).unwrap_err(),
            StorageError::TrackNotFound(..)
        ));

        Ok(())
    }

    #[test]
    fn test_update_track_keeps_audio_locator() -> anyhow::Result<()> {
        let mut storage = setup_storage()?;
        let track = storage.add_track(&draft("A"))?;

        let err = storage
            .update_track(
                &track.id,
                &TrackDraft {
                    audio_url: "https://cdn.example/B.mp3".into(),
                    ..draft("A")
                },
            )
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidDraft(..)));
        assert_eq!(storage.get_track(&track.id)?.audio_url, track.audio_url);

        // the locator still belongs to the existing track
        assert!(matches!(
            storage.add_track(&draft("A")).unwrap_err(),
            StorageError::DuplicateTrack(..)
        ));

        let err = storage
            .update_track(&TrackId::from_bytes(b"missing"), &draft("A"))
            .unwrap_err();
        assert!(matches!(err, StorageError::TrackNotFound(..)));
        Ok(())
    }

    #[test]
    fn test_catalog_counts() -> anyhow::Result<()> {
        let mut storage = setup_storage()?;
        let a = storage.add_track(&draft("A"))?;
        let b = storage.add_track(&draft("B"))?;
        storage.toggle_published(&b.id)?;
        storage.add_album(&AlbumDraft {
            title: "Yollar".into(),
            ..Default::default()
        })?;
        storage.toggle_like("u1", &a.id)?;

        assert_eq!(
            storage.counts()?,
            CatalogCounts {
                tracks: 2,
                published: 1,
                albums: 1,
                likes: 1,
            }
        );
        Ok(())
    }

    #[test]
    fn test_toggle_published_hides_track_from_listing() -> anyhow::Result<()> {
        let mut storage = setup_storage()?;
        let a = storage.add_track(&draft("A"))?;
        let b = storage.add_track(&draft("B"))?;

        assert!(!storage.toggle_published(&a.id)?);

        let published = storage.list_tracks(Visibility::Published)?;
        assert_eq!(published.iter().map(|t| &t.id).collect::<Vec<_>>(), vec![&b.id]);

        let all = storage.list_tracks(Visibility::All)?;
        assert_eq!(all.len(), 2);
        // newest first
        assert_eq!(all[0].id, b.id);

        assert!(storage.toggle_published(&a.id)?);
        Ok(())
    }

    #[test]
    fn test_get_tracks_keeps_order_and_duplicates() -> anyhow::Result<()> {
        let mut storage = setup_storage()?;
        let a = storage.add_track(&draft("A"))?;
        let b = storage.add_track(&draft("B"))?;

        let tracks = storage.get_tracks(&[b.id.clone(), a.id.clone(), b.id.clone()])?;
        let titles: Vec<_> = tracks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["B", "A", "B"]);

        let err = storage
            .get_tracks(&[a.id.clone(), TrackId::from_bytes(b"nope")])
            .unwrap_err();
        assert!(matches!(err, StorageError::TrackNotFound(..)));
        Ok(())
    }

    #[test]
    fn test_related_tracks_excludes_itself() -> anyhow::Result<()> {
        let mut storage = setup_storage()?;
        let a = storage.add_track(&draft("A"))?;
        storage.add_track(&draft("B"))?;
        storage.add_track(&draft("C"))?;

        let related = storage.related_tracks(&a.id, 5)?;
        assert_eq!(related.len(), 2);
        assert!(related.iter().all(|t| t.id != a.id));

        assert_eq!(storage.related_tracks(&a.id, 1)?.len(), 1);
        Ok(())
    }

    #[test]
    fn test_search_matches_fields_case_insensitively() -> anyhow::Result<()> {
        let mut storage = setup_storage()?;
        storage.add_track(&TrackDraft {
            genre: Some("Anatolian Rock".into()),
            ..draft("Yolcu")
        })?;
        storage.add_track(&TrackDraft {
            lyrics: Some("bir yolcu gecer".into()),
            ..draft("Deniz")
        })?;
        let hidden = storage.add_track(&draft("Yolcu Demo"))?;
        storage.toggle_published(&hidden.id)?;

        let by_title: Vec<_> = storage
            .search("YOLCU")?
            .into_iter()
            .map(|t| t.title)
            .collect();
        assert_eq!(by_title, vec!["Deniz", "Yolcu"]);

        assert_eq!(storage.search("anatolian")?.len(), 1);
        assert_eq!(storage.search("atilla")?.len(), 2);
        assert!(storage.search("   ")?.is_empty());
        assert!(storage.search("nonexistent")?.is_empty());

        Ok(())
    }

    #[test]
    fn test_genres_are_distinct_and_sorted() -> anyhow::Result<()> {
        let mut storage = setup_storage()?;
        storage.add_track(&TrackDraft {
            genre: Some("Rock".into()),
            ..draft("A")
        })?;
        storage.add_track(&TrackDraft {
            genre: Some("Folk".into()),
            ..draft("B")
        })?;
        storage.add_track(&TrackDraft {
            genre: Some("Rock".into()),
            ..draft("C")
        })?;
        storage.add_track(&draft("D"))?;

        assert_eq!(storage.genres()?, vec!["Folk", "Rock"]);
        Ok(())
    }

    #[test]
    fn test_albums_group_tracks() -> anyhow::Result<()> {
        let mut storage = setup_storage()?;
        let album = storage.add_album(&AlbumDraft {
            title: "Yollar".into(),
            release_year: Some(2021),
            ..Default::default()
        })?;

        let in_album = storage.add_track(&TrackDraft {
            album_id: Some(album.id.clone()),
            ..draft("B side")
        })?;
        storage.add_track(&TrackDraft {
            album_id: Some(album.id.clone()),
            ..draft("A side")
        })?;
        let single = storage.add_track(&draft("Single"))?;

        assert_eq!(in_album.album.as_deref(), Some("Yollar"));

        let albums = storage.list_albums()?;
        assert_eq!(albums.len(), 1);
        assert_eq!(albums[0].song_count, 2);

        let (fetched, tracks) = storage.album_tracks(&album.id)?;
        assert_eq!(fetched, album);
        let titles: Vec<_> = tracks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["A side", "B side"]);

        let singles = storage.singles()?;
        assert_eq!(singles.len(), 1);
        assert_eq!(singles[0].id, single.id);

        Ok(())
    }

    #[test]
    fn test_duplicate_album_is_rejected() -> anyhow::Result<()> {
        let mut storage = setup_storage()?;
        storage.add_album(&AlbumDraft {
            title: "Yollar".into(),
            ..Default::default()
        })?;

        let err = storage
            .add_album(&AlbumDraft {
                title: " yollar ".into(),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, StorageError::DuplicateAlbum(..)));
        Ok(())
    }

    #[test]
    fn test_delete_album_turns_songs_into_singles() -> anyhow::Result<()> {
        let mut storage = setup_storage()?;
        let album = storage.add_album(&AlbumDraft {
            title: "Yollar".into(),
            ..Default::default()
        })?;
        let track = storage.add_track(&TrackDraft {
            album_id: Some(album.id.clone()),
            ..draft("A")
        })?;

        storage.delete_album(&album.id)?;

        let track = storage.get_track(&track.id)?;
        assert_eq!(track.album_id, None);
        assert_eq!(track.album, None);
        assert!(storage.list_albums()?.is_empty());
        assert!(matches!(
            storage.delete_album(&album.id).unwrap_err(),
            StorageError::AlbumNotFound(..)
        ));
        Ok(())
    }

    #[test]
    fn test_toggle_like_and_favorites() -> anyhow::Result<()> {
        let mut storage = setup_storage()?;
        let a = storage.add_track(&draft("A"))?;
        let b = storage.add_track(&draft("B"))?;

        assert!(storage.toggle_like("user-1", &a.id)?);
        assert!(storage.toggle_like("user-1", &b.id)?);
        assert!(storage.toggle_like("user-2", &a.id)?);

        assert_eq!(storage.liked_ids("user-1")?, vec![b.id.clone(), a.id.clone()]);

        assert!(!storage.toggle_like("user-1", &b.id)?);
        let favorites = storage.favorites("user-1")?;
        assert_eq!(favorites.len(), 1);
        assert_eq!(favorites[0].id, a.id);

        // unpublished tracks are not shown as favorites
        storage.toggle_published(&a.id)?;
        assert!(storage.favorites("user-1")?.is_empty());
        assert_eq!(storage.liked_ids("user-1")?.len(), 1);

        Ok(())
    }

    #[test]
    fn test_like_unknown_track_fails_and_delete_drops_likes() -> anyhow::Result<()> {
        let mut storage = setup_storage()?;
        let err = storage
            .toggle_like("user-1", &TrackId::from_bytes(b"nope"))
            .unwrap_err();
        assert!(matches!(err, StorageError::TrackNotFound(..)));

        let a = storage.add_track(&draft("A"))?;
        storage.toggle_like("user-1", &a.id)?;
        storage.delete_track(&a.id)?;
        assert!(storage.liked_ids("user-1")?.is_empty());
        Ok(())
    }

    #[test]
    fn test_play_count_operations() -> anyhow::Result<()> {
        let mut storage = setup_storage()?;
        let a = storage.add_track(&draft("A"))?;
        let b = storage.add_track(&draft("B"))?;

        assert_eq!(storage.increment_play_count(&a.id)?, 1);
        assert_eq!(storage.increment_play_count(&a.id)?, 2);
        assert_eq!(storage.read_play_count(&a.id)?, Some(2));

        storage.write_play_count(&b.id, 10)?;
        assert_eq!(storage.read_play_count(&b.id)?, Some(10));

        let top: Vec<_> = storage.most_played(10)?.into_iter().map(|t| t.id).collect();
        assert_eq!(top, vec![b.id.clone(), a.id.clone()]);

        let missing = TrackId::from_bytes(b"nope");
        assert!(matches!(
            storage.increment_play_count(&missing).unwrap_err(),
            StorageError::TrackNotFound(..)
        ));
        assert_eq!(storage.read_play_count(&missing)?, None);
        assert!(storage.write_play_count(&missing, 1).is_err());

        Ok(())
    }

    #[test]
    fn test_import_library_registers_new_files_once() -> anyhow::Result<()> {
        let dir = tempdir()?;
        fs::write(dir.path().join("Uzun_Yol.mp3"), b"first")?;
        fs::write(dir.path().join("copy.mp3"), b"first")?;
        fs::write(dir.path().join("notes.txt"), b"ignored")?;

        let conn = Connection::open_in_memory()?;
        schema::init(&conn)?;
        let mut storage = Storage::from_existing_conn(
            conn,
            LibrarySource {
                roots: vec![dir.path().to_path_buf()],
                default_artist: "Atilla".into(),
                ..Default::default()
            },
        );

        assert_eq!(storage.last_updated()?, None);

        let imported = storage.import_library()?;
        assert_eq!(imported.len(), 1);
        assert_eq!(imported[0].id, TrackId::from_bytes(b"first"));
        assert_eq!(imported[0].artist, "Atilla");
        assert!(storage.last_updated()?.is_some());

        fs::write(dir.path().join("second.flac"), b"second")?;
        let imported = storage.import_library()?;
        assert_eq!(imported.len(), 1);
        assert_eq!(imported[0].title, "second");

        assert_eq!(storage.counts()?.tracks, 2);
        Ok(())
    }
}
