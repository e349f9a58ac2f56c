use log::{debug, info};
use thiserror::Error;

use crate::{
    db::rules, CollabContext, DatabaseError, DatabaseResult, ErrorKind, LobbyData, LobbyStatus,
    NewRaceResult, PrimaryKey, RaceResultData, RaceStart, UpdateReason, UpdatedProgress,
};

/// Drives races from start to finish
pub struct RaceManager {
    context: CollabContext,
}

#[derive(Debug, Error)]
pub enum RaceError {
    #[error("Lobby not found")]
    LobbyNotFound,
    #[error("Only the host can start the race")]
    PermissionDenied,
    #[error("Race has already started")]
    AlreadyStarted(LobbyStatus),
    #[error("At least {required} players are needed to start, but there are {present}")]
    InsufficientPlayers { present: usize, required: usize },
    #[error("You are not in this lobby")]
    NotMember,
    /// Something else went wrong with the database
    #[error(transparent)]
    Db(DatabaseError),
}

/// Live metrics reported while racing
#[derive(Debug, Clone, Copy)]
pub struct Progress {
    /// Percentage of the text typed, clamped to 0..=100
    pub progress: f64,
    pub wpm: f64,
    pub accuracy: f64,
}

/// Final metrics reported when a player finishes
#[derive(Debug, Clone, Copy)]
pub struct FinishedRace {
    pub wpm: f64,
    pub accuracy: f64,
    /// In seconds
    pub time_taken: f64,
    pub error_count: u32,
    pub total_characters: u32,
    pub consistency: f64,
}

impl RaceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::LobbyNotFound | Self::NotMember => ErrorKind::NotFound,
            Self::PermissionDenied => ErrorKind::PermissionDenied,
            Self::AlreadyStarted(_) | Self::InsufficientPlayers { .. } => ErrorKind::InvalidState,
            Self::Db(e) => e.kind(),
        }
    }
}

impl From<DatabaseError> for RaceError {
    fn from(value: DatabaseError) -> Self {
        match value {
            e if e.is_not_found() => Self::LobbyNotFound,
            e => Self::Db(e),
        }
    }
}

impl RaceManager {
    pub fn new(context: &CollabContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Starts the race. Only the host may do this, and only once.
    pub async fn start_race(
        &self,
        caller: &str,
        lobby_id: PrimaryKey,
    ) -> Result<LobbyData, RaceError> {
        let required = self.context.config.min_players_to_start;

        let outcome = self
            .context
            .database
            .start_race(lobby_id, caller, required)
            .await?;

        let lobby = match outcome {
            RaceStart::Started(lobby) => lobby,
            RaceStart::NotHost => return Err(RaceError::PermissionDenied),
            RaceStart::AlreadyStarted(status) => return Err(RaceError::AlreadyStarted(status)),
            RaceStart::NotEnoughPlayers { present } => {
                return Err(RaceError::InsufficientPlayers { present, required })
            }
        };

        info!("Race started in lobby {}", lobby_id);

        self.context
            .publish(lobby_id, UpdateReason::RaceStarted)
            .await;

        Ok(lobby)
    }

    /// Stores the caller's live metrics.
    /// Returns false and publishes nothing if the caller isn't racing.
    pub async fn update_progress(
        &self,
        caller: &str,
        lobby_id: PrimaryKey,
        progress: Progress,
    ) -> Result<bool, RaceError> {
        let applied = self
            .context
            .database
            .update_member_progress(UpdatedProgress {
                lobby_id,
                user_id: caller.to_string(),
                progress: progress.progress,
                wpm: progress.wpm,
                accuracy: progress.accuracy,
            })
            .await?;

        if !applied {
            debug!("Ignored progress from {} in lobby {}", caller, lobby_id);
            return Ok(false);
        }

        self.context.publish(lobby_id, UpdateReason::Progress).await;
        Ok(true)
    }

    /// Marks the caller finished and records their result.
    ///
    /// Every call appends a result, so this should be called once per player per race.
    pub async fn finish_race(
        &self,
        caller: &str,
        lobby_id: PrimaryKey,
        finished: FinishedRace,
    ) -> Result<RaceResultData, RaceError> {
        let result = self
            .context
            .database
            .finish_member(NewRaceResult {
                lobby_id,
                user_id: caller.to_string(),
                wpm: finished.wpm,
                accuracy: finished.accuracy,
                time_taken: finished.time_taken,
                error_count: finished.error_count,
                total_characters: finished.total_characters,
                consistency: finished.consistency,
            })
            .await?
            .ok_or(RaceError::NotMember)?;

        info!(
            "{} finished the race in lobby {} at {:.1} wpm",
            result.user_name, lobby_id, result.wpm
        );

        self.context
            .publish(lobby_id, UpdateReason::PlayerFinished)
            .await;

        Ok(result)
    }

    /// True if the lobby is racing and every member has finished
    pub async fn should_end_race(&self, lobby_id: PrimaryKey) -> Result<bool, RaceError> {
        let Some(lobby) = self
            .context
            .database
            .lobby_by_id(lobby_id)
            .await
            .optional()
            .map_err(RaceError::Db)?
        else {
            return Ok(false);
        };

        if lobby.status != LobbyStatus::Racing {
            return Ok(false);
        }

        let members = self.context.database.lobby_members(lobby_id).await?;
        Ok(rules::race_complete(&lobby, &members))
    }

    /// Moves the lobby to finished. Has no effect on members.
    pub async fn end_race(&self, lobby_id: PrimaryKey) -> Result<LobbyData, RaceError> {
        let lobby = self
            .context
            .database
            .update_lobby_status(lobby_id, LobbyStatus::Finished)
            .await?;

        info!("Race ended in lobby {}", lobby_id);

        self.context.publish(lobby_id, UpdateReason::RaceEnded).await;
        Ok(lobby)
    }
}
