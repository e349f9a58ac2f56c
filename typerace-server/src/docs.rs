use std::borrow::BorrowMut;

use axum::{response::IntoResponse, Json};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

use crate::{caller, lobbies, race, schemas, serialized, sse};

#[derive(OpenApi)]
#[openapi(
    paths(
        caller::create_session,
        lobbies::public_lobbies,
        lobbies::create_lobby,
        lobbies::quick_play,
        lobbies::join_by_code,
        lobbies::lobby,
        lobbies::join_public,
        lobbies::leave,
        lobbies::toggle_ready,
        lobbies::matchmaking_status,
        race::start_race,
        race::update_progress,
        race::finish_race,
        race::race_state,
        race::should_end_race,
        race::end_race,
        race::results,
        sse::event_stream,
    ),
    components(schemas(
        schemas::NewLobbySchema,
        schemas::JoinByCodeSchema,
        schemas::JoinSchema,
        schemas::QuickPlaySchema,
        schemas::ReadySchema,
        schemas::ProgressSchema,
        schemas::FinishSchema,
        serialized::Lobby,
        serialized::LobbyMember,
        serialized::RaceResult,
        serialized::Ranking,
        serialized::LobbyTicket,
        serialized::LobbyView,
        serialized::LobbySummary,
        serialized::MatchmakingStatus,
        serialized::RaceState,
        serialized::RaceResults,
        serialized::Session,
        serialized::ShouldEndRace,
        serialized::ProgressUpdate,
        sse::ServerEvent,
    )),
    modifiers(&Security),
    info(
        description = "typerace-server exposes endpoints to create, join, and race in typing lobbies"
    )
)]
pub struct ApiDoc;

struct Security;

impl Modify for Security {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.borrow_mut() {
            let scheme = HttpBuilder::new()
                .scheme(HttpAuthScheme::Bearer)
                .bearer_format("Bearer <session id>")
                .build();

            components.add_security_scheme("BearerAuth", SecurityScheme::Http(scheme))
        }
    }
}

pub async fn docs() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}
