use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use log::error;
use thiserror::Error;
use typerace_collab::{DatabaseError, ErrorKind, LobbyError, RaceError};

pub type ServerResult<T> = Result<T, ServerError>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("{resource} not found")]
    NotFound { resource: &'static str },
    #[error(transparent)]
    Lobby(#[from] LobbyError),
    #[error(transparent)]
    Race(#[from] RaceError),
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl ServerError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Lobby(e) => e.kind(),
            Self::Race(e) => e.kind(),
            Self::Database(e) => e.kind(),
        }
    }

    fn as_status_code(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::InvalidState | ErrorKind::CapacityExceeded => StatusCode::CONFLICT,
            ErrorKind::PermissionDenied => StatusCode::FORBIDDEN,
            ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
            ErrorKind::Unreachable => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.as_status_code();

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("Request failed: {}", self);
            return (status, "Unknown internal error").into_response();
        }

        (status, self.to_string()).into_response()
    }
}
