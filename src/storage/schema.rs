use rusqlite::Connection;

pub mod tables {
    pub const SONGS: &str = "songs";
    pub const ALBUMS: &str = "albums";
    pub const LIKES: &str = "likes";
    pub const UPDATES: &str = "updates";

    pub const ALL_TABLES: &[&str] = &[SONGS, ALBUMS, LIKES, UPDATES];
}

pub mod columns {
    pub const ID: &str = "id";
    pub const TITLE: &str = "title";
    pub const ARTIST: &str = "artist";
    pub const ALBUM: &str = "album";
    pub const ALBUM_ID: &str = "album_id";
    pub const DURATION_SECS: &str = "duration_secs";
    pub const LYRICS: &str = "lyrics";
    pub const COVER_IMAGE: &str = "cover_image";
    pub const AUDIO_URL: &str = "audio_url";
    pub const GENRE: &str = "genre";
    pub const RELEASE_YEAR: &str = "release_year";
    pub const PLAY_COUNT: &str = "play_count";
    pub const IS_PUBLISHED: &str = "is_published";
    pub const DESCRIPTION: &str = "description";
    pub const USER_ID: &str = "user_id";
    pub const SONG_ID: &str = "song_id";
    pub const CREATED_AT: &str = "created_at";
    pub const UPDATED_AT: &str = "updated_at";
}

const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS albums (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    cover_image TEXT,
    release_year INTEGER,
    description TEXT,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS songs (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    artist TEXT NOT NULL,
    album TEXT,
    album_id TEXT REFERENCES albums(id) ON DELETE SET NULL,
    duration_secs INTEGER,
    lyrics TEXT,
    cover_image TEXT,
    audio_url TEXT NOT NULL,
    genre TEXT,
    release_year INTEGER,
    play_count INTEGER NOT NULL DEFAULT 0,
    is_published INTEGER NOT NULL DEFAULT 1,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS likes (
    user_id TEXT NOT NULL,
    song_id TEXT NOT NULL REFERENCES songs(id) ON DELETE CASCADE,
    created_at INTEGER NOT NULL,
    PRIMARY KEY (user_id, song_id)
);

CREATE TABLE IF NOT EXISTS updates (
    updated_at INTEGER NOT NULL
);
"#;

pub fn init(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA)
}
