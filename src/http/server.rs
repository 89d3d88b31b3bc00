use anyhow::anyhow;
use log::info;
use rouille::{Request, Response};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use crate::{
    config::{HttpConfig, PublicEndpoint},
    domain::{
        hash::{AlbumId, TrackId},
        track::{Album, AlbumDraft, AudioSource, Track, TrackDraft},
    },
    http::error::ApiError,
    public_endpoint::get_share_url,
    session::{
        SharedSession,
        playback::{PlaybackSession, SessionEvent, SessionSnapshot, Transition},
    },
    storage::{
        error::StorageError,
        fs::is_valid_music_path,
        operations::{Storage, Visibility},
    },
};

const RELATED_LIMIT: u32 = 5;
const DEFAULT_TOP_LIMIT: u32 = 10;

type ApiResult = Result<Response, ApiError>;

pub struct HttpServer {
    storage: Arc<Mutex<Storage>>,
    session: SharedSession,
    public: PublicEndpoint,
    pub config: HttpConfig,
}

impl HttpServer {
    pub fn new(
        storage: Arc<Mutex<Storage>>,
        session: SharedSession,
        config: HttpConfig,
        public: PublicEndpoint,
    ) -> Self {
        Self {
            storage,
            session,
            public,
            config,
        }
    }

    pub fn run(self) {
        let addr = format!("{}:{}", self.config.bind_addr, self.config.port);
        rouille::start_server(addr, move |request| self.handle_request(request));
    }

    fn handle_request(&self, request: &Request) -> Response {
        Self::log_request(request);

        let response = self.route(request).unwrap_or_else(ApiError::into_response);

        info!("Response: {} {}", request.method(), response.status_code);
        response
    }

    fn log_request(request: &Request) {
        info!("{} {}", request.method(), request.url());
    }

    fn route(&self, request: &Request) -> ApiResult {
        rouille::router!(request,
            // catalog
            (GET) (/songs) => {
                self.json(|s| s.list_tracks(Visibility::Published))
            },
            (GET) (/songs/{id: String}) => {
                self.handle_get_song(&id)
            },
            (GET) (/songs/{id: String}/related) => {
                let id = parse_track_id(&id)?;
                self.json(|s| s.related_tracks(&id, RELATED_LIMIT))
            },
            (GET) (/songs/{id: String}/stream) => {
                self.handle_stream(&id)
            },
            (GET) (/search) => {
                let query = request.get_param("q").unwrap_or_default();
                self.json(|s| s.search(&query))
            },
            (GET) (/genres) => {
                self.json(|s| s.genres())
            },
            (GET) (/albums) => {
                self.json(|s| s.list_albums())
            },
            (GET) (/albums/{id: String}) => {
                self.handle_get_album(&id)
            },
            (GET) (/singles) => {
                self.json(|s| s.singles())
            },
            (GET) (/top) => {
                let limit = parse_limit(request.get_param("limit"))?;
                self.json(|s| s.most_played(limit))
            },

            // likes
            (GET) (/users/{user: String}/likes) => {
                self.json(|s| s.favorites(&user))
            },
            (GET) (/users/{user: String}/liked-ids) => {
                self.json(|s| s.liked_ids(&user))
            },
            (POST) (/users/{user: String}/likes/{id: String}) => {
                self.handle_toggle_like(&user, &id)
            },

            // admin
            (GET) (/admin/songs) => {
                self.check_admin(request)?;
                self.json(|s| s.list_tracks(Visibility::All))
            },
            (POST) (/admin/songs) => {
                self.check_admin(request)?;
                let draft: TrackDraft = json_body(request)?;
                let track = self.storage()?.add_track(&draft)?;
                info!("added track {} ({})", track.title, track.id);
                Ok(Response::json(&track).with_status_code(201))
            },
            (PUT) (/admin/songs/{id: String}) => {
                self.check_admin(request)?;
                let id = parse_track_id(&id)?;
                let draft: TrackDraft = json_body(request)?;
                self.json(|s| s.update_track(&id, &draft))
            },
            (DELETE) (/admin/songs/{id: String}) => {
                self.check_admin(request)?;
                let id = parse_track_id(&id)?;
                self.storage()?.delete_track(&id)?;
                info!("deleted track {id}");
                Ok(Response::empty_204())
            },
            (POST) (/admin/songs/{id: String}/publish) => {
                self.check_admin(request)?;
                let id = parse_track_id(&id)?;
                let is_published = self.storage()?.toggle_published(&id)?;
                Ok(Response::json(&PublishResponse { track_id: id, is_published }))
            },
            (POST) (/admin/albums) => {
                self.check_admin(request)?;
                let draft: AlbumDraft = json_body(request)?;
                let album = self.storage()?.add_album(&draft)?;
                Ok(Response::json(&album).with_status_code(201))
            },
            (DELETE) (/admin/albums/{id: String}) => {
                self.check_admin(request)?;
                let id = parse_album_id(&id)?;
                self.storage()?.delete_album(&id)?;
                Ok(Response::empty_204())
            },

            // playback session
            (GET) (/session) => {
                self.with_session(|_| {})
            },
            (POST) (/session/play) => {
                self.handle_play(request)
            },
            (POST) (/session/next) => {
                self.with_session(PlaybackSession::play_next)
            },
            (POST) (/session/previous) => {
                self.with_session(PlaybackSession::play_previous)
            },
            (POST) (/session/toggle) => {
                self.with_session(PlaybackSession::toggle_play_pause)
            },
            (POST) (/session/pause) => {
                self.with_session(|s| s.set_playing(false))
            },
            (POST) (/session/resume) => {
                self.with_session(|s| s.set_playing(true))
            },
            (POST) (/session/repeat) => {
                self.with_session(PlaybackSession::toggle_repeat)
            },
            (POST) (/session/shuffle) => {
                self.with_session(PlaybackSession::toggle_shuffle)
            },
            (POST) (/session/seek) => {
                let position = position_body(request)?;
                self.with_session(|s| s.seek(position))
            },
            (POST) (/session/progress) => {
                let position = position_body(request)?;
                self.handle_event(SessionEvent::Progress(position))
            },
            (POST) (/session/ended) => {
                self.handle_event(SessionEvent::TrackEnded)
            },

            _ => Ok(Response::empty_404())
        )
    }

    fn storage(&self) -> Result<MutexGuard<'_, Storage>, ApiError> {
        self.storage.lock().map_err(|e| {
            ApiError::from(StorageError::Internal(anyhow!(
                "Could not access catalog storage under lock: {e}"
            )))
        })
    }

    fn session(&self) -> Result<MutexGuard<'_, PlaybackSession>, ApiError> {
        self.session.lock().map_err(|e| {
            ApiError::from(StorageError::Internal(anyhow!(
                "Could not access playback session under lock: {e}"
            )))
        })
    }

    /// runs a catalog query and serializes its result
    fn json<T, F>(&self, query: F) -> ApiResult
    where
        T: Serialize,
        F: FnOnce(&mut Storage) -> Result<T, StorageError>,
    {
        let mut storage = self.storage()?;
        let value = query(&mut storage)?;
        Ok(Response::json(&value))
    }

    /// applies a transport command and returns the resulting session
    fn with_session<F>(&self, command: F) -> ApiResult
    where
        F: FnOnce(&mut PlaybackSession),
    {
        let mut session = self.session()?;
        command(&mut session);
        Ok(Response::json(&session.snapshot()))
    }

    fn handle_event(&self, event: SessionEvent) -> ApiResult {
        let mut session = self.session()?;
        let transition = session.handle(event);
        Ok(Response::json(&EventResponse {
            transition,
            session: session.snapshot(),
        }))
    }

    fn check_admin(&self, request: &Request) -> Result<(), ApiError> {
        // without a configured token the admin surface is closed
        match &self.config.admin_token {
            Some(token) if request.header("X-Admin-Token") == Some(token.as_str()) => Ok(()),
            _ => Err(ApiError::Unauthorized),
        }
    }

    fn handle_get_song(&self, id: &str) -> ApiResult {
        let id = parse_track_id(id)?;
        let track = self.storage()?.get_track(&id)?;
        let share_url = get_share_url(&self.public, &track.id);
        Ok(Response::json(&SongResponse { track, share_url }))
    }

    fn handle_get_album(&self, id: &str) -> ApiResult {
        let id = parse_album_id(id)?;
        let (album, songs) = self.storage()?.album_tracks(&id)?;
        Ok(Response::json(&AlbumResponse { album, songs }))
    }

    fn handle_toggle_like(&self, user: &str, id: &str) -> ApiResult {
        let id = parse_track_id(id)?;
        let liked = self.storage()?.toggle_like(user, &id)?;
        Ok(Response::json(&LikeResponse { track_id: id, liked }))
    }

    /// Streams a local audio file, or redirects to the remote one.
    fn handle_stream(&self, id: &str) -> ApiResult {
        let id = parse_track_id(id)?;
        let track = self.storage()?.get_track(&id)?;

        let path = match track.audio_source() {
            AudioSource::Remote(url) => {
                log::debug!("STREAM {id} -> redirect to {url}");
                return Ok(Response::redirect_302(url));
            }
            AudioSource::Local(path) => path,
        };

        if !is_valid_music_path(&path) {
            return Err(StorageError::InvalidTrackFile { track: id }.into());
        }

        let mime = mime_for_track(&path);
        let file = std::fs::File::open(&path).map_err(StorageError::Fs)?;
        log::debug!(
            "STREAM {} -> 200 OK, path: {}, MIME type: {}",
            id,
            path.to_string_lossy(),
            mime
        );

        Ok(Response::from_file(mime, file)
            .with_additional_header("X-Track-Artist", track.artist)
            .with_additional_header("X-Track-Title", track.title))
    }

    fn handle_play(&self, request: &Request) -> ApiResult {
        let body: PlayRequest = json_body(request)?;

        // resolve tracks first, the session lock is never taken while holding storage
        let (track, queue) = {
            let storage = self.storage()?;
            let track = storage.get_track(&body.track_id)?;
            let queue = body
                .queue
                .as_deref()
                .map(|ids| storage.get_tracks(ids))
                .transpose()?;
            (track, queue)
        };

        self.with_session(|s| s.play_track(track, queue))
    }
}

fn parse_track_id(id: &str) -> Result<TrackId, ApiError> {
    TrackId::from_hex(id).map_err(|_| StorageError::InvalidTrackId.into())
}

fn parse_album_id(id: &str) -> Result<AlbumId, ApiError> {
    AlbumId::from_hex(id).map_err(|_| ApiError::BadRequest("invalid album id".into()))
}

fn parse_limit(param: Option<String>) -> Result<u32, ApiError> {
    match param {
        None => Ok(DEFAULT_TOP_LIMIT),
        Some(limit) => limit
            .parse()
            .map_err(|_| ApiError::BadRequest(format!("invalid limit '{limit}'"))),
    }
}

fn json_body<T: DeserializeOwned>(request: &Request) -> Result<T, ApiError> {
    rouille::input::json_input(request)
        .map_err(|e| ApiError::BadRequest(format!("invalid request body: {e}")))
}

fn position_body(request: &Request) -> Result<Duration, ApiError> {
    let body: PositionRequest = json_body(request)?;
    Duration::try_from_secs_f64(body.position_secs)
        .map_err(|_| ApiError::BadRequest(format!("invalid position {}", body.position_secs)))
}

fn mime_for_track(path: &std::path::Path) -> String {
    let ext = path
        .extension()
        .map(|ext| ext.to_string_lossy())
        .map(|s| s.to_lowercase());
    let default = || {
        mime_guess::from_path(path)
            .first_or_octet_stream()
            .to_string()
    };
    ext.and_then(|ext| mime_from_ext(ext.as_str()))
        .unwrap_or_else(default)
}

/// Map file extension (without dot) to proper MIME type for browser playback.
/// Returns None if the extension is not recognized.
pub fn mime_from_ext(ext: &str) -> Option<String> {
    match ext {
        "m4a" => Some("audio/x-m4a".to_string()), // Safari iOS compatible
        "aac" => Some("audio/aac".to_string()),
        "mp3" => Some("audio/mpeg".to_string()),
        "wav" => Some("audio/wav".to_string()),
        "ogg" => Some("audio/ogg".to_string()),
        "flac" => Some("audio/flac".to_string()),
        _ => None,
    }
}

#[derive(Serialize, Deserialize)]
struct SongResponse {
    #[serde(flatten)]
    track: Track,
    share_url: String,
}

#[derive(Serialize, Deserialize)]
struct AlbumResponse {
    album: Album,
    songs: Vec<Track>,
}

#[derive(Serialize, Deserialize)]
struct LikeResponse {
    track_id: TrackId,
    liked: bool,
}

#[derive(Serialize, Deserialize)]
struct PublishResponse {
    track_id: TrackId,
    is_published: bool,
}

#[derive(Serialize)]
struct EventResponse {
    transition: Transition,
    session: SessionSnapshot,
}

#[derive(Deserialize)]
struct PlayRequest {
    track_id: TrackId,
    #[serde(default)]
    queue: Option<Vec<TrackId>>,
}

#[derive(Deserialize)]
struct PositionRequest {
    position_secs: f64,
}

#[cfg(test)]
pub fn parse_json_response<T: serde::de::DeserializeOwned>(
    response: rouille::Response,
) -> anyhow::Result<T> {
    Ok(serde_json::from_reader(
        response.data.into_reader_and_size().0,
    )?)
}
