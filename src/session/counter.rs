//! Play count persistence for the playback session.
//!
//! Two strategies write a play: a single atomic increment, and a
//! read-then-write fallback. The fallback loses updates when two plays of
//! the same track interleave between its read and its write.

use std::{
    sync::{Arc, Mutex},
    thread::{self, JoinHandle},
};

use anyhow::anyhow;
use crossbeam_channel::{Sender, unbounded};

use crate::{
    domain::hash::TrackId,
    storage::{db, error::StorageError, operations::Storage},
};

/// What the play counter needs from the catalog
pub trait PlayCountStore: Send + Sync {
    /// whether `increment_play_count` can be used at all
    fn supports_atomic_increment(&self) -> bool;

    fn increment_play_count(&self, id: &TrackId) -> Result<u64, StorageError>;

    fn read_play_count(&self, id: &TrackId) -> Result<Option<u64>, StorageError>;

    fn write_play_count(&self, id: &TrackId, count: u64) -> Result<(), StorageError>;
}

fn poisoned<T>(e: std::sync::PoisonError<T>) -> StorageError {
    StorageError::Internal(anyhow!("storage lock poisoned: {e}"))
}

impl PlayCountStore for Mutex<Storage> {
    fn supports_atomic_increment(&self) -> bool {
        db::supports_returning()
    }

    fn increment_play_count(&self, id: &TrackId) -> Result<u64, StorageError> {
        self.lock().map_err(poisoned)?.increment_play_count(id)
    }

    fn read_play_count(&self, id: &TrackId) -> Result<Option<u64>, StorageError> {
        self.lock().map_err(poisoned)?.read_play_count(id)
    }

    fn write_play_count(&self, id: &TrackId, count: u64) -> Result<(), StorageError> {
        self.lock().map_err(poisoned)?.write_play_count(id, count)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncrementStrategy {
    Atomic,
    ReadThenWrite,
}

/// Records plays against a [`PlayCountStore`] with the strategy chosen at startup
pub struct PlayCounter {
    store: Arc<dyn PlayCountStore>,
    strategy: IncrementStrategy,
}

impl PlayCounter {
    /// Picks the atomic strategy when the store supports it and it is not disabled.
    pub fn probe(store: Arc<dyn PlayCountStore>, prefer_atomic: bool) -> Self {
        let strategy = if prefer_atomic && store.supports_atomic_increment() {
            IncrementStrategy::Atomic
        } else {
            IncrementStrategy::ReadThenWrite
        };
        Self { store, strategy }
    }

    pub fn strategy(&self) -> IncrementStrategy {
        self.strategy
    }

    /// Adds one play to the track.
    ///
    /// Returns the new count, or `None` when the track is not in the catalog.
    pub fn record(&self, id: &TrackId) -> Result<Option<u64>, StorageError> {
        if self.strategy == IncrementStrategy::Atomic {
            match self.store.increment_play_count(id) {
                Ok(count) => return Ok(Some(count)),
                Err(e) => log::debug!("atomic play count increment for {id} failed ({e}), falling back"),
            }
        }
        self.read_then_write(id)
    }

    fn read_then_write(&self, id: &TrackId) -> Result<Option<u64>, StorageError> {
        match self.store.read_play_count(id)? {
            Some(count) => {
                let count = count + 1;
                self.store.write_play_count(id, count)?;
                Ok(Some(count))
            }
            None => Ok(None),
        }
    }
}

/// Receives "a track started playing" notifications from the session.
///
/// Implementations must return immediately; persistence happens elsewhere.
pub trait PlayReporter: Send {
    fn track_started(&self, id: &TrackId);
}

/// Runs a [`PlayCounter`] on a worker thread fed through a channel.
///
/// Failures are logged and swallowed. Dropping the recorder lets the worker
/// drain what is already queued, then joins it.
pub struct BackgroundRecorder {
    tx: Option<Sender<TrackId>>,
    worker: Option<JoinHandle<()>>,
}

impl BackgroundRecorder {
    pub fn spawn(counter: PlayCounter) -> anyhow::Result<Self> {
        let (tx, rx) = unbounded::<TrackId>();

        let worker = thread::Builder::new()
            .name("play-counter".into())
            .spawn(move || {
                for id in rx {
                    match counter.record(&id) {
                        Ok(Some(count)) => log::debug!("track {id} played {count} times"),
                        Ok(None) => log::warn!("play count not updated: track {id} not in catalog"),
                        Err(e) => log::error!("play count for track {id} not updated: {e}"),
                    }
                }
            })?;

        Ok(Self {
            tx: Some(tx),
            worker: Some(worker),
        })
    }
}

impl PlayReporter for BackgroundRecorder {
    fn track_started(&self, id: &TrackId) {
        if let Some(tx) = &self.tx {
            if let Err(e) = tx.send(id.clone()) {
                log::error!("play count worker is gone, dropping play of {}", e.0);
            }
        }
    }
}

impl Drop for BackgroundRecorder {
    fn drop(&mut self) {
        // closing the channel ends the worker loop
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("play count worker panicked");
            }
        }
    }
}
