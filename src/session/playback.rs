use std::time::Duration;

use serde::Serialize;

use crate::{
    domain::{hash::TrackId, track::Track},
    session::counter::PlayReporter,
};

/// Coarse playback state derived from the session fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    /// nothing selected
    Idle,
    /// a track is selected but paused
    Loaded,
    Playing,
}

/// Events reported by whatever renders the audio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    TrackEnded,
    Progress(Duration),
}

/// What the session did in response to an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    /// repeat is on, the same track starts over
    Restarted,
    /// moved on to the next queued track
    Advanced,
    /// end of queue, playback paused
    Stopped,
    /// position updated
    Moved,
    /// nothing to act on
    Ignored,
}

/// Serializable copy of everything a surface can read from the session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub state: PlaybackState,
    pub current_track: Option<Track>,
    pub queue: Vec<Track>,
    pub current_index: usize,
    pub is_playing: bool,
    pub repeat: bool,
    pub shuffle: bool,
    pub position_secs: f64,
    pub has_next: bool,
    pub has_previous: bool,
}

/// The one record of what is playing, in which queue, at what position.
///
/// `current_index` follows `current_track` only when the track was started
/// with a queue or found in the existing one. Starting a track that is not in
/// the existing queue leaves the index where it was.
pub struct PlaybackSession {
    current_track: Option<Track>,
    queue: Vec<Track>,
    current_index: usize,
    is_playing: bool,
    repeat: bool,
    shuffle: bool,
    position: Duration,
    reporter: Box<dyn PlayReporter>,
}

fn position_in(queue: &[Track], id: &TrackId) -> Option<usize> {
    queue.iter().position(|t| &t.id == id)
}

impl PlaybackSession {
    pub fn new(reporter: Box<dyn PlayReporter>) -> Self {
        Self {
            current_track: None,
            queue: Vec::new(),
            current_index: 0,
            is_playing: false,
            repeat: false,
            shuffle: false,
            position: Duration::ZERO,
            reporter,
        }
    }

    /// Starts playing `track`.
    ///
    /// With `queue`, the queue is replaced and the index points at `track`,
    /// or at 0 if `track` is not in it. Every call reports one play.
    pub fn play_track(&mut self, track: Track, queue: Option<Vec<Track>>) {
        match queue {
            Some(queue) => {
                self.current_index = position_in(&queue, &track.id).unwrap_or(0);
                self.queue = queue;
            }
            None if !self.queue.is_empty() => {
                if let Some(index) = position_in(&self.queue, &track.id) {
                    self.current_index = index;
                }
            }
            None => {}
        }

        self.reporter.track_started(&track.id);
        log::debug!("playing {} ({})", track.title, track.id);

        self.current_track = Some(track);
        self.is_playing = true;
        self.position = Duration::ZERO;
    }

    /// Moves to the next queued track. No-op on the last one.
    pub fn play_next(&mut self) {
        if self.has_next() {
            self.move_to(self.current_index + 1);
        }
    }

    /// Moves to the previous queued track. No-op on the first one.
    pub fn play_previous(&mut self) {
        if self.has_previous() {
            self.move_to(self.current_index - 1);
        }
    }

    fn move_to(&mut self, index: usize) {
        if let Some(track) = self.queue.get(index) {
            self.current_track = Some(track.clone());
            self.current_index = index;
            self.position = Duration::ZERO;
        }
    }

    pub fn toggle_play_pause(&mut self) {
        self.is_playing = !self.is_playing;
    }

    pub fn set_playing(&mut self, playing: bool) {
        self.is_playing = playing;
    }

    pub fn toggle_repeat(&mut self) {
        self.repeat = !self.repeat;
    }

    pub fn toggle_shuffle(&mut self) {
        self.shuffle = !self.shuffle;
    }

    /// Sets the playback position, clamped to the track's duration when known.
    pub fn seek(&mut self, position: Duration) {
        let Some(track) = &self.current_track else {
            return;
        };
        self.position = match track.duration() {
            Some(duration) => position.min(duration),
            None => position,
        };
    }

    pub fn handle(&mut self, event: SessionEvent) -> Transition {
        if self.current_track.is_none() {
            return Transition::Ignored;
        }

        match event {
            SessionEvent::TrackEnded if self.repeat => {
                self.position = Duration::ZERO;
                self.is_playing = true;
                Transition::Restarted
            }
            SessionEvent::TrackEnded if self.has_next() => {
                self.play_next();
                Transition::Advanced
            }
            SessionEvent::TrackEnded => {
                self.is_playing = false;
                Transition::Stopped
            }
            SessionEvent::Progress(position) => {
                self.seek(position);
                Transition::Moved
            }
        }
    }

    pub fn current_track(&self) -> Option<&Track> {
        self.current_track.as_ref()
    }

    pub fn queue(&self) -> &[Track] {
        &self.queue
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    pub fn repeat(&self) -> bool {
        self.repeat
    }

    pub fn shuffle(&self) -> bool {
        self.shuffle
    }

    pub fn position(&self) -> Duration {
        self.position
    }

    pub fn has_next(&self) -> bool {
        self.current_index + 1 < self.queue.len()
    }

    pub fn has_previous(&self) -> bool {
        self.current_index > 0
    }

    pub fn state(&self) -> PlaybackState {
        match (&self.current_track, self.is_playing) {
            (None, _) => PlaybackState::Idle,
            (Some(_), false) => PlaybackState::Loaded,
            (Some(_), true) => PlaybackState::Playing,
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state(),
            current_track: self.current_track().cloned(),
            queue: self.queue().to_vec(),
            current_index: self.current_index(),
            is_playing: self.is_playing(),
            repeat: self.repeat(),
            shuffle: self.shuffle(),
            position_secs: self.position().as_secs_f64(),
            has_next: self.has_next(),
            has_previous: self.has_previous(),
        }
    }
}
