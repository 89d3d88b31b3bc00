//! Playback session shared by every surface of the application

use std::sync::{Arc, Mutex};

use crate::{
    config::Playback,
    session::{
        counter::{BackgroundRecorder, PlayCounter},
        playback::PlaybackSession,
    },
    storage::operations::Storage,
};

pub mod counter;
pub mod playback;

pub type SharedSession = Arc<Mutex<PlaybackSession>>;

/// Creates the application's single session, recording plays into `storage`.
pub fn start(storage: Arc<Mutex<Storage>>, config: &Playback) -> anyhow::Result<SharedSession> {
    let counter = PlayCounter::probe(storage, config.atomic_play_count);
    log::info!("play counts recorded with {:?} strategy", counter.strategy());

    let recorder = BackgroundRecorder::spawn(counter)?;
    Ok(Arc::new(Mutex::new(PlaybackSession::new(Box::new(recorder)))))
}
