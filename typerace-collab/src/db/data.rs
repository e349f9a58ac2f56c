use chrono::{DateTime, Utc};

/// The type used for primary keys in the database.
pub type PrimaryKey = i32;

/// The opaque session identifier of a player.
pub type UserId = String;

/// Lobby-wide race status. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LobbyStatus {
    Waiting,
    Racing,
    Finished,
}

/// Per-member state, tracking readiness and race progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlayerStatus {
    Waiting,
    Ready,
    Racing,
    Finished,
}

impl LobbyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Racing => "racing",
            Self::Finished => "finished",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "waiting" => Some(Self::Waiting),
            "racing" => Some(Self::Racing),
            "finished" => Some(Self::Finished),
            _ => None,
        }
    }

    /// Returns true if moving to `next` does not regress the status
    pub fn can_advance_to(&self, next: LobbyStatus) -> bool {
        next >= *self
    }
}

impl PlayerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Ready => "ready",
            Self::Racing => "racing",
            Self::Finished => "finished",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "waiting" => Some(Self::Waiting),
            "ready" => Some(Self::Ready),
            "racing" => Some(Self::Racing),
            "finished" => Some(Self::Finished),
            _ => None,
        }
    }

    /// The status derived from a ready toggle
    pub fn from_ready(is_ready: bool) -> Self {
        if is_ready {
            Self::Ready
        } else {
            Self::Waiting
        }
    }
}

/// A typing race lobby
#[derive(Debug, Clone, PartialEq)]
pub struct LobbyData {
    pub id: PrimaryKey,
    pub name: String,
    /// The session id of the current host
    pub host_id: UserId,
    pub status: LobbyStatus,
    /// The passage everyone races against
    pub text: String,
    /// Informational only
    pub text_category: String,
    pub max_players: u32,
    /// Public lobbies are listed and eligible for quick play
    pub is_public: bool,
    /// Short code used to join directly, unique among stored lobbies
    pub join_code: String,
    /// Set when the race starts, so viewers can render a synchronized countdown
    pub countdown_started_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    /// Bumped by every change to the lobby or its members.
    /// Snapshots carrying a lower version describe an older state.
    pub version: i64,
}

/// A player's membership in a lobby
#[derive(Debug, Clone, PartialEq)]
pub struct MemberData {
    pub id: PrimaryKey,
    pub lobby_id: PrimaryKey,
    pub user_id: UserId,
    /// Display name, not unique
    pub name: String,
    pub is_ready: bool,
    pub status: PlayerStatus,
    /// Percentage of the text completed, 0 to 100
    pub progress: f64,
    pub wpm: f64,
    pub accuracy: f64,
    pub joined_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// The outcome of one player finishing a race.
/// Note: these are never mutated and outlive the lobby they belong to.
#[derive(Debug, Clone, PartialEq)]
pub struct RaceResultData {
    pub id: PrimaryKey,
    pub lobby_id: PrimaryKey,
    pub user_id: UserId,
    pub user_name: String,
    pub wpm: f64,
    pub accuracy: f64,
    /// Seconds it took to finish
    pub time_taken: f64,
    pub error_count: u32,
    pub total_characters: u32,
    pub consistency: f64,
    /// Captured from the lobby at the time of finishing
    pub text_category: String,
    pub finished_at: DateTime<Utc>,
}

impl MemberData {
    pub fn is_finished(&self) -> bool {
        self.status == PlayerStatus::Finished
    }
}
