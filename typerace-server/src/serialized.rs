//! All schemas that are exposed from endpoints are defined here
//! along with the ToSerialized impls

use serde::Serialize;
use typerace_collab::{
    LobbyData, LobbySummary as CollabLobbySummary, LobbyTicket as CollabLobbyTicket,
    LobbyView as CollabLobbyView, MatchmakingStatus as CollabMatchmakingStatus, MemberData,
    RaceResultData, RaceResults as CollabRaceResults, RaceState as CollabRaceState, Standing,
};
use utoipa::ToSchema;

/// Timestamps are milliseconds since the unix epoch
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Lobby {
    id: i32,
    name: String,
    host_id: String,
    /// One of waiting, racing, finished
    status: String,
    text: String,
    text_category: String,
    max_players: u32,
    is_public: bool,
    join_code: String,
    countdown_started_at: Option<i64>,
    created_at: i64,
    /// Grows with every change, a lower version is an older state
    version: i64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LobbyMember {
    id: i32,
    user_id: String,
    name: String,
    is_ready: bool,
    /// One of waiting, ready, racing, finished
    status: String,
    progress: f64,
    wpm: f64,
    accuracy: f64,
    joined_at: i64,
    finished_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RaceResult {
    id: i32,
    lobby_id: i32,
    user_id: String,
    user_name: String,
    wpm: f64,
    accuracy: f64,
    time_taken: f64,
    error_count: u32,
    total_characters: u32,
    consistency: f64,
    text_category: String,
    finished_at: i64,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Ranking {
    rank: usize,
    user_id: String,
    user_name: String,
    wpm: f64,
    accuracy: f64,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LobbyTicket {
    lobby_id: i32,
    join_code: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LobbyView {
    lobby: Lobby,
    players: Vec<LobbyMember>,
    is_host: bool,
    current_user_id: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LobbySummary {
    #[serde(flatten)]
    lobby: Lobby,
    player_count: usize,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MatchmakingStatus {
    lobby: Lobby,
    player_count: usize,
    max_players: u32,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RaceState {
    lobby: Lobby,
    players: Vec<LobbyMember>,
    current_user_id: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RaceResults {
    lobby: Lobby,
    players: Vec<LobbyMember>,
    results: Vec<RaceResult>,
    /// Results ordered by wpm, highest first
    ranking: Vec<Ranking>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub user_id: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ShouldEndRace {
    pub should_end: bool,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    /// False if the update was ignored because the player isn't racing
    pub applied: bool,
}

/// Helper trait to convert any type into a serialized version
pub trait ToSerialized<T>
where
    T: Serialize,
{
    fn to_serialized(&self) -> T;
}

impl<I, O> ToSerialized<Vec<O>> for Vec<I>
where
    I: ToSerialized<O>,
    O: Serialize,
{
    fn to_serialized(&self) -> Vec<O> {
        self.iter().map(|x| x.to_serialized()).collect()
    }
}

impl ToSerialized<Lobby> for LobbyData {
    fn to_serialized(&self) -> Lobby {
        Lobby {
            id: self.id,
            name: self.name.clone(),
            host_id: self.host_id.clone(),
            status: self.status.as_str().to_string(),
            text: self.text.clone(),
            text_category: self.text_category.clone(),
            max_players: self.max_players,
            is_public: self.is_public,
            join_code: self.join_code.clone(),
            countdown_started_at: self.countdown_started_at.map(|t| t.timestamp_millis()),
            created_at: self.created_at.timestamp_millis(),
            version: self.version,
        }
    }
}

impl ToSerialized<LobbyMember> for MemberData {
    fn to_serialized(&self) -> LobbyMember {
        LobbyMember {
            id: self.id,
            user_id: self.user_id.clone(),
            name: self.name.clone(),
            is_ready: self.is_ready,
            status: self.status.as_str().to_string(),
            progress: self.progress,
            wpm: self.wpm,
            accuracy: self.accuracy,
            joined_at: self.joined_at.timestamp_millis(),
            finished_at: self.finished_at.map(|t| t.timestamp_millis()),
        }
    }
}

impl ToSerialized<RaceResult> for RaceResultData {
    fn to_serialized(&self) -> RaceResult {
        RaceResult {
            id: self.id,
            lobby_id: self.lobby_id,
            user_id: self.user_id.clone(),
            user_name: self.user_name.clone(),
            wpm: self.wpm,
            accuracy: self.accuracy,
            time_taken: self.time_taken,
            error_count: self.error_count,
            total_characters: self.total_characters,
            consistency: self.consistency,
            text_category: self.text_category.clone(),
            finished_at: self.finished_at.timestamp_millis(),
        }
    }
}

impl ToSerialized<Ranking> for Standing<'_> {
    fn to_serialized(&self) -> Ranking {
        Ranking {
            rank: self.rank,
            user_id: self.result.user_id.clone(),
            user_name: self.result.user_name.clone(),
            wpm: self.result.wpm,
            accuracy: self.result.accuracy,
        }
    }
}

impl ToSerialized<LobbyTicket> for CollabLobbyTicket {
    fn to_serialized(&self) -> LobbyTicket {
        LobbyTicket {
            lobby_id: self.lobby_id,
            join_code: self.join_code.clone(),
        }
    }
}

impl ToSerialized<LobbyView> for CollabLobbyView {
    fn to_serialized(&self) -> LobbyView {
        LobbyView {
            lobby: self.lobby.to_serialized(),
            players: self.members.to_serialized(),
            is_host: self.is_host,
            current_user_id: self.current_user_id.clone(),
        }
    }
}

impl ToSerialized<LobbySummary> for CollabLobbySummary {
    fn to_serialized(&self) -> LobbySummary {
        LobbySummary {
            lobby: self.lobby.to_serialized(),
            player_count: self.player_count,
        }
    }
}

impl ToSerialized<MatchmakingStatus> for CollabMatchmakingStatus {
    fn to_serialized(&self) -> MatchmakingStatus {
        MatchmakingStatus {
            lobby: self.lobby.to_serialized(),
            player_count: self.player_count,
            max_players: self.max_players,
        }
    }
}

impl ToSerialized<RaceState> for CollabRaceState {
    fn to_serialized(&self) -> RaceState {
        RaceState {
            lobby: self.lobby.to_serialized(),
            players: self.members.to_serialized(),
            current_user_id: self.current_user_id.clone(),
        }
    }
}

impl ToSerialized<RaceResults> for CollabRaceResults {
    fn to_serialized(&self) -> RaceResults {
        RaceResults {
            lobby: self.lobby.to_serialized(),
            players: self.members.to_serialized(),
            results: self.results.to_serialized(),
            ranking: self.ranking().to_serialized(),
        }
    }
}
