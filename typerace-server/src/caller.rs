use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, StatusCode},
    routing::post,
    Json,
};
use log::debug;
use typerace_collab::{generate_user_id, validate_user_id, UserId};

use crate::{serialized::Session, Router};

/// The session id of whoever made the request
pub struct Caller(pub UserId);

impl Caller {
    pub fn id(&self) -> &str {
        &self.0
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|x| x.to_str().ok())
            .ok_or((StatusCode::UNAUTHORIZED, "Missing authorization"))?;

        parse_bearer(header).map(Self)
    }
}

fn parse_bearer(header: &str) -> Result<UserId, (StatusCode, &'static str)> {
    let parts: Vec<_> = header.split_ascii_whitespace().collect();

    match parts.as_slice() {
        ["Bearer", user_id] => {
            validate_user_id(user_id).map_err(|e| {
                debug!("Rejected session id: {}", e);
                (StatusCode::BAD_REQUEST, "Session id is invalid")
            })?;

            Ok(user_id.to_string())
        }
        _ => Err((StatusCode::BAD_REQUEST, "Authorization must be Bearer")),
    }
}

#[utoipa::path(
    post,
    path = "/v1/sessions",
    tag = "sessions",
    responses(
        (status = 200, body = Session, description = "A new session id to use as bearer token")
    )
)]
async fn create_session() -> Json<Session> {
    Json(Session {
        user_id: generate_user_id(),
    })
}

pub fn router() -> Router {
    Router::new().route("/", post(create_session))
}
