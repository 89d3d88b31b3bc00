use rouille::Response;

use crate::storage::error::StorageError;

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    Unauthorized,
    Internal(String),
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::TrackNotFound(_) | StorageError::AlbumNotFound(_) => {
                ApiError::NotFound(err.to_string())
            }

            StorageError::DuplicateTrack(_) | StorageError::DuplicateAlbum(_) => {
                ApiError::Conflict(err.to_string())
            }

            StorageError::InvalidDraft(_)
            | StorageError::InvalidTrackId
            | StorageError::InvalidTrackFile { .. } => ApiError::BadRequest(err.to_string()),

            StorageError::Database(_) | StorageError::Fs(_) | StorageError::Internal(_) => {
                log::error!("request failed: {err}");
                ApiError::Internal("internal server error".into())
            }
        }
    }
}

impl ApiError {
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::NotFound(_) => 404,
            ApiError::BadRequest(_) => 400,
            ApiError::Conflict(_) => 409,
            ApiError::Unauthorized => 401,
            ApiError::Internal(_) => 500,
        }
    }

    pub fn into_response(self) -> Response {
        let status = self.status_code();
        let msg = match self {
            ApiError::NotFound(msg)
            | ApiError::BadRequest(msg)
            | ApiError::Conflict(msg)
            | ApiError::Internal(msg) => msg,
            ApiError::Unauthorized => "admin token required".to_string(),
        };
        Response::text(msg).with_status_code(status)
    }
}
