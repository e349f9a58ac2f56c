use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json,
};
use typerace_collab::{FinishedRace, PrimaryKey, Progress};

use crate::{
    caller::Caller,
    context::ServerContext,
    errors::{ServerError, ServerResult},
    schemas::{FinishSchema, ProgressSchema, ValidatedJson},
    serialized::{
        Lobby, ProgressUpdate, RaceResult, RaceResults, RaceState, ShouldEndRace, ToSerialized,
    },
    Router,
};

#[utoipa::path(
    post,
    path = "/v1/lobbies/{id}/race/start",
    tag = "race",
    params(("id" = i32, Path, description = "Lobby id")),
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Lobby),
        (status = 403, description = "Only the host can start the race"),
        (status = 404, description = "Lobby does not exist"),
        (status = 409, description = "Not enough players, or the race already started")
    )
)]
async fn start_race(
    caller: Caller,
    State(context): State<ServerContext>,
    Path(lobby_id): Path<PrimaryKey>,
) -> ServerResult<Json<Lobby>> {
    let lobby = context.collab.race.start_race(caller.id(), lobby_id).await?;

    Ok(Json(lobby.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/lobbies/{id}/race/progress",
    tag = "race",
    params(("id" = i32, Path, description = "Lobby id")),
    request_body = ProgressSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = ProgressUpdate)
    )
)]
async fn update_progress(
    caller: Caller,
    State(context): State<ServerContext>,
    Path(lobby_id): Path<PrimaryKey>,
    ValidatedJson(body): ValidatedJson<ProgressSchema>,
) -> ServerResult<Json<ProgressUpdate>> {
    let applied = context
        .collab
        .race
        .update_progress(
            caller.id(),
            lobby_id,
            Progress {
                progress: body.progress,
                wpm: body.wpm,
                accuracy: body.accuracy,
            },
        )
        .await?;

    Ok(Json(ProgressUpdate { applied }))
}

#[utoipa::path(
    post,
    path = "/v1/lobbies/{id}/race/finish",
    tag = "race",
    params(("id" = i32, Path, description = "Lobby id")),
    request_body = FinishSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = RaceResult),
        (status = 404, description = "Lobby does not exist or the caller isn't in it")
    )
)]
async fn finish_race(
    caller: Caller,
    State(context): State<ServerContext>,
    Path(lobby_id): Path<PrimaryKey>,
    ValidatedJson(body): ValidatedJson<FinishSchema>,
) -> ServerResult<Json<RaceResult>> {
    let result = context
        .collab
        .race
        .finish_race(
            caller.id(),
            lobby_id,
            FinishedRace {
                wpm: body.wpm,
                accuracy: body.accuracy,
                time_taken: body.time_taken,
                error_count: body.error_count,
                total_characters: body.total_characters,
                consistency: body.consistency,
            },
        )
        .await?;

    Ok(Json(result.to_serialized()))
}

#[utoipa::path(
    get,
    path = "/v1/lobbies/{id}/race",
    tag = "race",
    params(("id" = i32, Path, description = "Lobby id")),
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = RaceState),
        (status = 404, description = "Lobby does not exist")
    )
)]
async fn race_state(
    caller: Caller,
    State(context): State<ServerContext>,
    Path(lobby_id): Path<PrimaryKey>,
) -> ServerResult<Json<RaceState>> {
    let state = context
        .collab
        .results
        .get_race_state(caller.id(), lobby_id)
        .await?
        .ok_or(ServerError::NotFound { resource: "lobby" })?;

    Ok(Json(state.to_serialized()))
}

#[utoipa::path(
    get,
    path = "/v1/lobbies/{id}/race/should-end",
    tag = "race",
    params(("id" = i32, Path, description = "Lobby id")),
    responses(
        (status = 200, body = ShouldEndRace, description = "True once every player has finished")
    )
)]
async fn should_end_race(
    State(context): State<ServerContext>,
    Path(lobby_id): Path<PrimaryKey>,
) -> ServerResult<Json<ShouldEndRace>> {
    let should_end = context.collab.race.should_end_race(lobby_id).await?;

    Ok(Json(ShouldEndRace { should_end }))
}

#[utoipa::path(
    post,
    path = "/v1/lobbies/{id}/race/end",
    tag = "race",
    params(("id" = i32, Path, description = "Lobby id")),
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Lobby),
        (status = 404, description = "Lobby does not exist")
    )
)]
async fn end_race(
    _caller: Caller,
    State(context): State<ServerContext>,
    Path(lobby_id): Path<PrimaryKey>,
) -> ServerResult<Json<Lobby>> {
    let lobby = context.collab.race.end_race(lobby_id).await?;

    Ok(Json(lobby.to_serialized()))
}

#[utoipa::path(
    get,
    path = "/v1/lobbies/{id}/results",
    tag = "race",
    params(("id" = i32, Path, description = "Lobby id")),
    responses(
        (status = 200, body = RaceResults),
        (status = 404, description = "Lobby does not exist")
    )
)]
async fn results(
    State(context): State<ServerContext>,
    Path(lobby_id): Path<PrimaryKey>,
) -> ServerResult<Json<RaceResults>> {
    let results = context
        .collab
        .results
        .get_results(lobby_id)
        .await?
        .ok_or(ServerError::NotFound { resource: "lobby" })?;

    Ok(Json(results.to_serialized()))
}

pub fn router() -> Router {
    Router::new()
        .route("/:id/race", get(race_state))
        .route("/:id/race/start", post(start_race))
        .route("/:id/race/progress", post(update_progress))
        .route("/:id/race/finish", post(finish_race))
        .route("/:id/race/should-end", get(should_end_race))
        .route("/:id/race/end", post(end_race))
        .route("/:id/results", get(results))
}
