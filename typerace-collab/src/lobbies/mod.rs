mod matchmaking;

pub use matchmaking::*;

use log::{debug, info};
use thiserror::Error;

use crate::{
    codes::{create_with_unique_code, is_valid_code, normalize_code},
    texts::generate_text,
    CollabContext, CollabEvent, DatabaseError, DatabaseResult, ErrorKind, JoinGuard,
    JoinRejection, LobbyData, LobbySnapshot, MemberData, MemberInsert, MemberRemoval, NewLobby,
    NewMember, PrimaryKey, UpdateReason,
};

/// Handles the lifecycle of lobbies and their memberships
pub struct LobbyManager {
    context: CollabContext,
}

#[derive(Debug, Error)]
pub enum LobbyError {
    #[error("Lobby not found")]
    LobbyNotFound,
    #[error("Invalid join code")]
    InvalidCode,
    #[error("Race already started")]
    RaceAlreadyStarted,
    #[error("Lobby is private")]
    LobbyPrivate,
    #[error("Lobby is full")]
    LobbyFull,
    #[error("Lobby capacity is out of range")]
    InvalidCapacity,
    /// Something else went wrong with the database
    #[error(transparent)]
    Db(#[from] DatabaseError),
}

/// The largest capacity a store can hold
pub const MAX_LOBBY_CAPACITY: u32 = i32::MAX as u32;

/// Everything needed to create a lobby
#[derive(Debug, Clone)]
pub struct CreateLobby {
    pub name: String,
    pub max_players: u32,
    pub is_public: bool,
    pub text_category: String,
    /// Generated from the category if not supplied
    pub text: Option<String>,
    /// The host's display name, the lobby name is used if not supplied
    pub player_name: Option<String>,
}

/// Identifies a lobby a player ended up in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LobbyTicket {
    pub lobby_id: PrimaryKey,
    pub join_code: String,
}

/// A lobby as seen by one of its viewers
#[derive(Debug, Clone)]
pub struct LobbyView {
    pub lobby: LobbyData,
    pub members: Vec<MemberData>,
    pub is_host: bool,
    pub current_user_id: String,
}

impl LobbyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::LobbyNotFound | Self::InvalidCode => ErrorKind::NotFound,
            Self::RaceAlreadyStarted => ErrorKind::InvalidState,
            Self::LobbyPrivate => ErrorKind::PermissionDenied,
            Self::LobbyFull => ErrorKind::CapacityExceeded,
            Self::InvalidCapacity => ErrorKind::InvalidInput,
            Self::Db(e) => e.kind(),
        }
    }
}

impl From<JoinRejection> for LobbyError {
    fn from(value: JoinRejection) -> Self {
        match value {
            JoinRejection::NotWaiting => Self::RaceAlreadyStarted,
            JoinRejection::Private => Self::LobbyPrivate,
            JoinRejection::Full => Self::LobbyFull,
        }
    }
}

impl From<&LobbyData> for LobbyTicket {
    fn from(lobby: &LobbyData) -> Self {
        Self {
            lobby_id: lobby.id,
            join_code: lobby.join_code.clone(),
        }
    }
}

impl LobbyManager {
    pub fn new(context: &CollabContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Creates a new lobby with the caller as its host
    pub async fn create_lobby(
        &self,
        caller: &str,
        new_lobby: CreateLobby,
    ) -> Result<LobbyTicket, LobbyError> {
        if !(1..=MAX_LOBBY_CAPACITY).contains(&new_lobby.max_players) {
            return Err(LobbyError::InvalidCapacity);
        }

        let text = match new_lobby.text {
            Some(text) if !text.trim().is_empty() => text,
            _ => generate_text(&new_lobby.text_category),
        };

        let host_name = new_lobby
            .player_name
            .unwrap_or_else(|| new_lobby.name.clone());

        let lobby = create_with_unique_code(
            self.context.database.as_ref(),
            self.context.config.join_code_length,
            NewLobby {
                name: new_lobby.name,
                text,
                text_category: new_lobby.text_category,
                max_players: new_lobby.max_players,
                is_public: new_lobby.is_public,
                join_code: String::new(),
                host_id: caller.to_string(),
                host_name,
            },
        )
        .await?;

        info!(
            "Lobby {} ({}) created by {} with code {}",
            lobby.name, lobby.id, caller, lobby.join_code
        );

        self.context.publish(lobby.id, UpdateReason::Created).await;
        Ok((&lobby).into())
    }

    /// Joins a lobby using its join code. Codes are case-insensitive.
    pub async fn join_by_code(
        &self,
        caller: &str,
        code: &str,
        display_name: &str,
    ) -> Result<LobbyTicket, LobbyError> {
        let code = normalize_code(code);

        if !is_valid_code(&code, self.context.config.join_code_length) {
            return Err(LobbyError::InvalidCode);
        }

        let lobby = self
            .context
            .database
            .lobby_by_code(&code)
            .await
            .optional()?
            .ok_or(LobbyError::InvalidCode)?;

        self.join(&lobby, caller, display_name, JoinGuard::default())
            .await
            .map_err(|e| match e {
                LobbyError::Db(e) if e.is_not_found() => LobbyError::InvalidCode,
                e => e,
            })
    }

    /// Joins a public lobby by id
    pub async fn join_public(
        &self,
        caller: &str,
        lobby_id: PrimaryKey,
        display_name: &str,
    ) -> Result<LobbyTicket, LobbyError> {
        let lobby = self.lobby(lobby_id).await?;

        self.join(
            &lobby,
            caller,
            display_name,
            JoinGuard {
                require_public: true,
            },
        )
        .await
    }

    /// Inserts the caller as a ready member, or does nothing if they already are one
    async fn join(
        &self,
        lobby: &LobbyData,
        caller: &str,
        display_name: &str,
        guard: JoinGuard,
    ) -> Result<LobbyTicket, LobbyError> {
        let new_member = NewMember {
            lobby_id: lobby.id,
            user_id: caller.to_string(),
            name: display_name.to_string(),
        };

        match self.context.database.create_member(new_member, guard).await {
            Ok(MemberInsert::Inserted(member)) => {
                info!("{} ({}) joined lobby {}", member.name, caller, lobby.id);
                self.context
                    .publish(lobby.id, UpdateReason::PlayerJoined)
                    .await;
            }
            Ok(MemberInsert::Existing(_)) => {
                debug!("{} is already in lobby {}", caller, lobby.id);
            }
            Ok(MemberInsert::Rejected(rejection)) => return Err(rejection.into()),
            Err(e) if e.is_not_found() => return Err(LobbyError::LobbyNotFound),
            Err(e) => return Err(e.into()),
        }

        Ok(lobby.into())
    }

    /// Removes the caller from a lobby.
    /// Deletes the lobby if it empties, or hands the host role to the earliest joiner.
    pub async fn leave(
        &self,
        caller: &str,
        lobby_id: PrimaryKey,
    ) -> Result<MemberRemoval, LobbyError> {
        let removal = match self.context.database.delete_member(lobby_id, caller).await {
            Ok(removal) => removal,
            Err(e) if e.is_not_found() => return Ok(MemberRemoval::default()),
            Err(e) => return Err(e.into()),
        };

        if removal.lobby_deleted {
            info!("Lobby {} is empty and was deleted", lobby_id);
            self.context.emit(CollabEvent::LobbyDeleted { lobby_id });

            return Ok(removal);
        }

        if removal.removed.is_none() {
            return Ok(removal);
        }

        info!("{} left lobby {}", caller, lobby_id);

        let reason = match &removal.new_host {
            Some(new_host) => {
                info!(
                    "{} ({}) is now host of lobby {}",
                    new_host.name, new_host.user_id, lobby_id
                );
                UpdateReason::HostTransferred
            }
            None => UpdateReason::PlayerLeft,
        };

        self.context.publish(lobby_id, reason).await;
        Ok(removal)
    }

    /// Sets whether the caller is ready. Does nothing if they aren't a member.
    pub async fn toggle_ready(
        &self,
        caller: &str,
        lobby_id: PrimaryKey,
        is_ready: bool,
    ) -> Result<(), LobbyError> {
        let updated = self
            .context
            .database
            .update_member_ready(lobby_id, caller, is_ready)
            .await?;

        if updated {
            self.context
                .publish(lobby_id, UpdateReason::ReadyChanged)
                .await;
        }

        Ok(())
    }

    /// Gets a lobby and its members as seen by the caller
    pub async fn get_lobby(
        &self,
        caller: &str,
        lobby_id: PrimaryKey,
    ) -> Result<Option<LobbyView>, LobbyError> {
        let view = self
            .context
            .snapshot(lobby_id)
            .await?
            .map(|LobbySnapshot { lobby, members }| LobbyView {
                is_host: lobby.host_id == caller,
                current_user_id: caller.to_string(),
                lobby,
                members,
            });

        Ok(view)
    }

    async fn lobby(&self, lobby_id: PrimaryKey) -> Result<LobbyData, LobbyError> {
        self.context
            .database
            .lobby_by_id(lobby_id)
            .await
            .optional()?
            .ok_or(LobbyError::LobbyNotFound)
    }
}
