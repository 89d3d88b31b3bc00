use std::{
    path::Path,
    time::{SystemTime, UNIX_EPOCH},
};

use anyhow::{Context, anyhow};
use chrono::{DateTime, Local};
use rusqlite::{
    Connection,
    types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef},
};

use crate::{
    config::Database,
    domain::hash::{AlbumId, TrackId},
    storage::{error::StorageError, schema},
};

pub type SecondsSinceUnix = i64;

/// first SQLite release with `UPDATE ... RETURNING`
const RETURNING_MIN_VERSION: i32 = 3_035_000;

fn open_in_memory() -> Result<rusqlite::Connection, rusqlite::Error> {
    Connection::open_in_memory()
}

fn open_from_file(path: &Path) -> Result<rusqlite::Connection, rusqlite::Error> {
    Connection::open(path)
}

pub fn open(config: &Database) -> Result<rusqlite::Connection, StorageError> {
    let db = if config.in_memory {
        open_in_memory()?
    } else {
        let path = config.path.as_deref().ok_or_else(|| {
            StorageError::Internal(anyhow!("database.path is required unless in_memory is set"))
        })?;
        open_from_file(path)?
    };
    schema::init(&db)?;
    Ok(db)
}

/// whether the linked SQLite can increment and return a counter in one statement
pub fn supports_returning() -> bool {
    rusqlite::version_number() >= RETURNING_MIN_VERSION
}

/// converts time to number of seconds since unix_epoch
pub fn system_time_to_i64(time: SystemTime) -> anyhow::Result<SecondsSinceUnix> {
    i64::try_from(
        time.duration_since(UNIX_EPOCH)
            .with_context(|| "failed to get unix timestamp")?
            .as_secs(),
    )
    .with_context(|| "failed to get timestamp in seconds")
}

pub fn now() -> Result<SecondsSinceUnix, StorageError> {
    system_time_to_i64(SystemTime::now()).map_err(StorageError::Internal)
}

/// converts number of seconds since unix epoch local time to local date time
pub fn i64_seconds_to_local_time(since_unix: i64) -> anyhow::Result<DateTime<Local>> {
    let datetime = DateTime::from_timestamp_secs(since_unix).ok_or(anyhow!(
        "failed to convert {since_unix} s timestamp to datetime"
    ))?;

    Ok(DateTime::from(datetime))
}

macro_rules! hex_column {
    ($name:ty) => {
        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.to_hex()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let hex = value.as_str()?;
                <$name>::from_hex(hex).map_err(|e| FromSqlError::Other(e.into()))
            }
        }
    };
}

hex_column!(TrackId);
hex_column!(AlbumId);
