use async_trait::async_trait;
use thiserror::Error;

mod data;
pub use data::*;

mod memory;
pub use memory::*;

mod pg;
pub use pg::*;

pub mod rules;
pub use rules::JoinRejection;

pub type Result<T> = std::result::Result<T, DatabaseError>;
pub type BoxedDatabase = Box<dyn Database>;

#[derive(Debug, Error)]
pub enum DatabaseError {
    /// An unknown or internal error happened with the database
    #[error(transparent)]
    Internal(Box<dyn std::error::Error + Send + Sync>),
    /// A resource already exists
    #[error("{resource} with {field} of value {value} already exists")]
    Conflict {
        /// The resource in question
        resource: &'static str,
        /// The field that is conflicting
        field: &'static str,
        /// The conflicting value
        value: String,
    },
    /// A resource in the database doesn't exist
    #[error("{resource}:{identifier} doesn't exist")]
    NotFound {
        resource: &'static str,
        identifier: &'static str,
    },
}

impl DatabaseError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Helper trait to reduce boilerplate
pub trait IntoDatabaseError {
    fn not_found_or(self, resource: &'static str, identifier: &'static str) -> DatabaseError;
    fn any(self) -> DatabaseError;
}

/// Helper trait to reduce boilerplate
pub trait DatabaseResult<T> {
    /// Turns a NotFound error into None
    fn optional(self) -> Result<Option<T>>;
}

impl<T> DatabaseResult<T> for Result<T> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Represents a type that stores lobbies, their members, and race results.
///
/// Every method is a single atomic transaction against the store. Guards that
/// depend on the current membership are evaluated inside that transaction.
/// Any method that changes a lobby or its members also bumps the lobby's version.
#[async_trait]
pub trait Database: Send + Sync {
    async fn lobby_by_id(&self, lobby_id: PrimaryKey) -> Result<LobbyData>;
    async fn lobby_by_code(&self, join_code: &str) -> Result<LobbyData>;
    async fn list_lobbies(&self, filter: LobbyFilter) -> Result<Vec<LobbyData>>;
    /// Inserts the lobby and its host as the first member.
    /// Fails with a conflict if the join code is taken.
    async fn create_lobby(&self, new_lobby: NewLobby) -> Result<LobbyData>;
    async fn update_lobby_status(&self, lobby_id: PrimaryKey, status: LobbyStatus)
        -> Result<LobbyData>;

    /// Members of a lobby, ordered by when they joined
    async fn lobby_members(&self, lobby_id: PrimaryKey) -> Result<Vec<MemberData>>;
    /// A lobby and its members, read as of the same version
    async fn lobby_snapshot(&self, lobby_id: PrimaryKey) -> Result<(LobbyData, Vec<MemberData>)>;
    async fn member(&self, lobby_id: PrimaryKey, user_id: &str) -> Result<MemberData>;
    async fn create_member(&self, new_member: NewMember, guard: JoinGuard)
        -> Result<MemberInsert>;
    async fn delete_member(&self, lobby_id: PrimaryKey, user_id: &str) -> Result<MemberRemoval>;
    /// Returns false if the user isn't a member
    async fn update_member_ready(
        &self,
        lobby_id: PrimaryKey,
        user_id: &str,
        is_ready: bool,
    ) -> Result<bool>;
    /// Returns false if the member isn't currently racing
    async fn update_member_progress(&self, update: UpdatedProgress) -> Result<bool>;

    async fn start_race(
        &self,
        lobby_id: PrimaryKey,
        user_id: &str,
        min_players: usize,
    ) -> Result<RaceStart>;
    /// Marks the member finished and appends a result.
    /// Returns None if the user isn't a member.
    async fn finish_member(&self, new_result: NewRaceResult) -> Result<Option<RaceResultData>>;
    /// Results of a lobby in insertion order
    async fn race_results(&self, lobby_id: PrimaryKey) -> Result<Vec<RaceResultData>>;
}

#[derive(Debug, Clone)]
pub struct NewLobby {
    pub name: String,
    pub text: String,
    pub text_category: String,
    pub max_players: u32,
    pub is_public: bool,
    pub join_code: String,
    /// The creator of the lobby, who becomes host
    pub host_id: UserId,
    /// The display name of the host member
    pub host_name: String,
}

#[derive(Debug, Clone)]
pub struct NewMember {
    pub lobby_id: PrimaryKey,
    pub user_id: UserId,
    pub name: String,
}

/// Extra admission rules for a join
#[derive(Debug, Clone, Copy, Default)]
pub struct JoinGuard {
    /// Reject lobbies that aren't public
    pub require_public: bool,
}

#[derive(Debug, Clone)]
pub struct UpdatedProgress {
    pub lobby_id: PrimaryKey,
    pub user_id: UserId,
    pub progress: f64,
    pub wpm: f64,
    pub accuracy: f64,
}

#[derive(Debug, Clone)]
pub struct NewRaceResult {
    pub lobby_id: PrimaryKey,
    pub user_id: UserId,
    pub wpm: f64,
    pub accuracy: f64,
    pub time_taken: f64,
    pub error_count: u32,
    pub total_characters: u32,
    pub consistency: f64,
}

/// Narrows down a lobby listing. Results are always newest first.
#[derive(Debug, Clone, Copy)]
pub struct LobbyFilter {
    pub status: Option<LobbyStatus>,
    pub is_public: Option<bool>,
    pub limit: usize,
}

/// The outcome of inserting a member
#[derive(Debug, Clone, PartialEq)]
pub enum MemberInsert {
    Inserted(MemberData),
    /// The user was already a member, nothing was inserted
    Existing(MemberData),
    Rejected(JoinRejection),
}

/// The outcome of removing a member
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemberRemoval {
    /// The removed member, if the user was one
    pub removed: Option<MemberData>,
    /// True if the lobby had no members left and was deleted
    pub lobby_deleted: bool,
    /// The member promoted to host, if the host left
    pub new_host: Option<MemberData>,
}

/// The outcome of starting a race
#[derive(Debug, Clone, PartialEq)]
pub enum RaceStart {
    Started(LobbyData),
    NotHost,
    AlreadyStarted(LobbyStatus),
    NotEnoughPlayers { present: usize },
}
