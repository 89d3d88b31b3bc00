//! Module to scan library directories for audio files to import

use walkdir::WalkDir;

use std::{
    path::{Path, PathBuf},
    time::SystemTime,
};

use crate::{config, domain::hash::TrackId, storage::error::StorageError};

const MUSIC_EXTENSIONS: &[&str] = &["mp3", "flac", "wav", "m4a", "ogg", "aac"];

pub fn is_music_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| MUSIC_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

#[derive(Debug)]
pub struct FsSnapshot {
    pub observed_at: SystemTime,
    pub files: Vec<ObservedFile>,
}

impl FsSnapshot {
    pub fn scan(config: &config::LibrarySource) -> Result<Self, StorageError> {
        let observed_at = SystemTime::now();
        let files = scan_dirs(config.follow_symlinks, &config.roots, &config.ignored_dirs)?;
        Ok(Self { observed_at, files })
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Hash)]
pub struct ObservedFile {
    pub track_id: TrackId,
    pub path: PathBuf,
}

impl ObservedFile {
    pub fn new(id: TrackId, path: PathBuf) -> Self {
        Self { track_id: id, path }
    }

    /// Title shown for an imported file: its stem with separators turned into spaces
    pub fn title(&self) -> String {
        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let title = stem.replace('_', " ").trim().to_string();
        if title.is_empty() {
            self.track_id.to_hex()
        } else {
            title
        }
    }
}

/// Recursively scans all music files in the given directory. Retrieves their paths and track ids
pub fn scan_dir(
    follow_symlinks: bool,
    root: &Path,
    ignored_dirs: &[PathBuf],
) -> Result<Vec<ObservedFile>, StorageError> {
    let root_str = root.to_string_lossy();

    let paths = WalkDir::new(root)
        .follow_links(follow_symlinks)
        .into_iter()
        .filter_entry(|entry| {
            let entry_path = entry.path();
            !ignored_dirs
                .iter()
                .any(|ignored| entry_path.starts_with(ignored))
        })
        .filter_map(|e| match e {
            Ok(e) => Some(e),
            Err(err) => {
                log::warn!("error while scanning dir {root_str}, skipping an entry: {err}");
                None
            }
        })
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path().to_path_buf())
        .filter(|p| is_music_file(p))
        .collect::<Vec<PathBuf>>();

    paths
        .into_iter()
        .map(|path| {
            let id = TrackId::from_file(&path).map_err(StorageError::Internal)?;
            Ok(ObservedFile::new(id, path))
        })
        .collect()
}

/// Recursively scans all music files in given directories. Retrieves their paths and track ids
pub fn scan_dirs(
    follow_symlinks: bool,
    roots: &[PathBuf],
    ignored_dirs: &[PathBuf],
) -> Result<Vec<ObservedFile>, StorageError> {
    let scanned_dirs = roots
        .iter()
        .map(|root| scan_dir(follow_symlinks, root, ignored_dirs))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(scanned_dirs.into_iter().flatten().collect())
}

/// Best-effort check that a path points to a real, playable music file.
///
/// This does NOT decode audio, but rules out:
/// - missing paths
/// - directories / special files
/// - wrong extensions
/// - empty files
pub fn is_valid_music_path(path: &Path) -> bool {
    let meta = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(_) => return false,
    };

    meta.is_file() && is_music_file(path) && meta.len() > 0
}
