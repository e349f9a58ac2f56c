use crossbeam::channel::{Receiver, Sender};

use crate::{LobbyData, MemberData, PrimaryKey};

pub type EventSender = Sender<CollabEvent>;
pub type EventReceiver = Receiver<CollabEvent>;

/// A lobby and its members, read after a mutation was applied
#[derive(Debug, Clone, PartialEq)]
pub struct LobbySnapshot {
    pub lobby: LobbyData,
    /// Ordered by join time
    pub members: Vec<MemberData>,
}

/// What caused a lobby to change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateReason {
    Created,
    PlayerJoined,
    PlayerLeft,
    /// The host left and another member took over
    HostTransferred,
    ReadyChanged,
    RaceStarted,
    Progress,
    PlayerFinished,
    RaceEnded,
}

/// Events emitted by the collab system after every state change
#[derive(Debug, Clone)]
pub enum CollabEvent {
    /// A lobby changed, carrying the state after the change
    LobbyUpdated {
        lobby_id: PrimaryKey,
        reason: UpdateReason,
        snapshot: LobbySnapshot,
    },
    /// The last member left and the lobby no longer exists
    LobbyDeleted { lobby_id: PrimaryKey },
}

impl CollabEvent {
    pub fn lobby_id(&self) -> PrimaryKey {
        match self {
            Self::LobbyUpdated { lobby_id, .. } => *lobby_id,
            Self::LobbyDeleted { lobby_id } => *lobby_id,
        }
    }
}

impl UpdateReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::PlayerJoined => "player-joined",
            Self::PlayerLeft => "player-left",
            Self::HostTransferred => "host-transferred",
            Self::ReadyChanged => "ready-changed",
            Self::RaceStarted => "race-started",
            Self::Progress => "progress",
            Self::PlayerFinished => "player-finished",
            Self::RaceEnded => "race-ended",
        }
    }
}
