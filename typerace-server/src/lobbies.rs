use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json,
};
use typerace_collab::{CreateLobby, PrimaryKey};

use crate::{
    caller::Caller,
    context::ServerContext,
    errors::{ServerError, ServerResult},
    schemas::{
        JoinByCodeSchema, JoinSchema, NewLobbySchema, QuickPlaySchema, ReadySchema, ValidatedJson,
    },
    serialized::{LobbySummary, LobbyTicket, LobbyView, MatchmakingStatus, ToSerialized},
    race, sse, Router,
};

#[utoipa::path(
    get,
    path = "/v1/lobbies",
    tag = "lobbies",
    responses(
        (
            status = 200,
            body = Vec<LobbySummary>,
            description = "The most recent public lobbies that are waiting for players"
        )
    )
)]
async fn public_lobbies(
    State(context): State<ServerContext>,
) -> ServerResult<Json<Vec<LobbySummary>>> {
    let lobbies = context.collab.lobbies.public_lobbies().await?;

    Ok(Json(lobbies.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/lobbies",
    tag = "lobbies",
    request_body = NewLobbySchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = LobbyTicket)
    )
)]
async fn create_lobby(
    caller: Caller,
    State(context): State<ServerContext>,
    ValidatedJson(body): ValidatedJson<NewLobbySchema>,
) -> ServerResult<Json<LobbyTicket>> {
    let ticket = context
        .collab
        .lobbies
        .create_lobby(
            caller.id(),
            CreateLobby {
                name: body.name,
                max_players: body.max_players,
                is_public: body.is_public,
                text_category: body.text_category,
                text: body.text,
                player_name: body.player_name,
            },
        )
        .await?;

    Ok(Json(ticket.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/lobbies/quick-play",
    tag = "lobbies",
    request_body = QuickPlaySchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = LobbyTicket, description = "The lobby the caller was matched into")
    )
)]
async fn quick_play(
    caller: Caller,
    State(context): State<ServerContext>,
    ValidatedJson(body): ValidatedJson<QuickPlaySchema>,
) -> ServerResult<Json<LobbyTicket>> {
    let ticket = context
        .collab
        .lobbies
        .quick_play(caller.id(), &body.player_name, &body.text_category)
        .await?;

    Ok(Json(ticket.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/lobbies/join",
    tag = "lobbies",
    request_body = JoinByCodeSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = LobbyTicket),
        (status = 404, description = "No lobby has this code"),
        (status = 409, description = "The race already started, or the lobby is full")
    )
)]
async fn join_by_code(
    caller: Caller,
    State(context): State<ServerContext>,
    ValidatedJson(body): ValidatedJson<JoinByCodeSchema>,
) -> ServerResult<Json<LobbyTicket>> {
    let ticket = context
        .collab
        .lobbies
        .join_by_code(caller.id(), &body.code, &body.display_name)
        .await?;

    Ok(Json(ticket.to_serialized()))
}

#[utoipa::path(
    get,
    path = "/v1/lobbies/{id}",
    tag = "lobbies",
    params(("id" = i32, Path, description = "Lobby id")),
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = LobbyView),
        (status = 404, description = "Lobby does not exist")
    )
)]
async fn lobby(
    caller: Caller,
    State(context): State<ServerContext>,
    Path(lobby_id): Path<PrimaryKey>,
) -> ServerResult<Json<LobbyView>> {
    let view = context
        .collab
        .lobbies
        .get_lobby(caller.id(), lobby_id)
        .await?
        .ok_or(ServerError::NotFound { resource: "lobby" })?;

    Ok(Json(view.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/lobbies/{id}/join",
    tag = "lobbies",
    params(("id" = i32, Path, description = "Lobby id")),
    request_body = JoinSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = LobbyTicket),
        (status = 403, description = "Lobby is private"),
        (status = 404, description = "Lobby does not exist"),
        (status = 409, description = "The race already started, or the lobby is full")
    )
)]
async fn join_public(
    caller: Caller,
    State(context): State<ServerContext>,
    Path(lobby_id): Path<PrimaryKey>,
    ValidatedJson(body): ValidatedJson<JoinSchema>,
) -> ServerResult<Json<LobbyTicket>> {
    let ticket = context
        .collab
        .lobbies
        .join_public(caller.id(), lobby_id, &body.display_name)
        .await?;

    Ok(Json(ticket.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/lobbies/{id}/leave",
    tag = "lobbies",
    params(("id" = i32, Path, description = "Lobby id")),
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 204, description = "The caller is no longer in the lobby")
    )
)]
async fn leave(
    caller: Caller,
    State(context): State<ServerContext>,
    Path(lobby_id): Path<PrimaryKey>,
) -> ServerResult<StatusCode> {
    context.collab.lobbies.leave(caller.id(), lobby_id).await?;

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/v1/lobbies/{id}/ready",
    tag = "lobbies",
    params(("id" = i32, Path, description = "Lobby id")),
    request_body = ReadySchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 204, description = "Readiness was updated")
    )
)]
async fn toggle_ready(
    caller: Caller,
    State(context): State<ServerContext>,
    Path(lobby_id): Path<PrimaryKey>,
    ValidatedJson(body): ValidatedJson<ReadySchema>,
) -> ServerResult<StatusCode> {
    context
        .collab
        .lobbies
        .toggle_ready(caller.id(), lobby_id, body.is_ready)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/v1/lobbies/{id}/matchmaking",
    tag = "lobbies",
    params(("id" = i32, Path, description = "Lobby id")),
    responses(
        (status = 200, body = MatchmakingStatus),
        (status = 404, description = "Lobby does not exist")
    )
)]
async fn matchmaking_status(
    State(context): State<ServerContext>,
    Path(lobby_id): Path<PrimaryKey>,
) -> ServerResult<Json<MatchmakingStatus>> {
    let status = context
        .collab
        .lobbies
        .matchmaking_status(lobby_id)
        .await?
        .ok_or(ServerError::NotFound { resource: "lobby" })?;

    Ok(Json(status.to_serialized()))
}

pub fn router() -> Router {
    Router::new()
        .route("/", get(public_lobbies).post(create_lobby))
        .route("/quick-play", post(quick_play))
        .route("/join", post(join_by_code))
        .route("/:id", get(lobby))
        .route("/:id/join", post(join_public))
        .route("/:id/leave", post(leave))
        .route("/:id/ready", post(toggle_ready))
        .route("/:id/matchmaking", get(matchmaking_status))
        .route("/:id/events", get(sse::event_stream))
        .merge(race::router())
}
