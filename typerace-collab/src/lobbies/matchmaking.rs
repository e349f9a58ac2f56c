use log::{debug, info};

use super::{CreateLobby, LobbyError, LobbyManager, LobbyTicket};
use crate::{
    JoinGuard, LobbyData, LobbyFilter, LobbyStatus, MemberInsert, NewMember, PrimaryKey,
    UpdateReason,
};

/// A listed lobby with its live member count
#[derive(Debug, Clone)]
pub struct LobbySummary {
    pub lobby: LobbyData,
    pub player_count: usize,
}

#[derive(Debug, Clone)]
pub struct MatchmakingStatus {
    pub lobby: LobbyData,
    pub player_count: usize,
    pub max_players: u32,
}

impl LobbyManager {
    /// Joins the most recent public lobby with room for the caller, or creates one
    pub async fn quick_play(
        &self,
        caller: &str,
        player_name: &str,
        text_category: &str,
    ) -> Result<LobbyTicket, LobbyError> {
        let config = &self.context.config;
        let database = &self.context.database;

        let candidates = database
            .list_lobbies(LobbyFilter {
                status: Some(LobbyStatus::Waiting),
                is_public: Some(true),
                limit: config.quick_play_lookback,
            })
            .await?;

        for lobby in candidates {
            let members = database.lobby_members(lobby.id).await?;

            let has_room = members.len() < lobby.max_players as usize;
            let is_member = members.iter().any(|m| m.user_id == caller);

            if !has_room || is_member {
                continue;
            }

            let new_member = NewMember {
                lobby_id: lobby.id,
                user_id: caller.to_string(),
                name: player_name.to_string(),
            };

            let guard = JoinGuard {
                require_public: true,
            };

            // The listing may be stale, so a rejection just moves on to the next candidate
            match database.create_member(new_member, guard).await {
                Ok(MemberInsert::Inserted(_)) => {
                    info!("{} was matched into lobby {}", caller, lobby.id);
                    self.context
                        .publish(lobby.id, UpdateReason::PlayerJoined)
                        .await;

                    return Ok((&lobby).into());
                }
                Ok(MemberInsert::Existing(_)) => return Ok((&lobby).into()),
                Ok(MemberInsert::Rejected(rejection)) => {
                    debug!("Quick play skipped lobby {}: {}", lobby.id, rejection);
                }
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e.into()),
            }
        }

        info!("No open lobby for {}, creating one", caller);

        self.create_lobby(
            caller,
            CreateLobby {
                name: format!("{}'s Race", player_name),
                max_players: config.quick_play_max_players,
                is_public: true,
                text_category: text_category.to_string(),
                text: None,
                player_name: Some(player_name.to_string()),
            },
        )
        .await
    }

    /// The most recent public lobbies that are still waiting for players
    pub async fn public_lobbies(&self) -> Result<Vec<LobbySummary>, LobbyError> {
        let lobbies = self
            .context
            .database
            .list_lobbies(LobbyFilter {
                status: Some(LobbyStatus::Waiting),
                is_public: Some(true),
                limit: self.context.config.public_listing_limit,
            })
            .await?;

        let mut summaries = Vec::with_capacity(lobbies.len());

        for lobby in lobbies {
            let player_count = self.context.database.lobby_members(lobby.id).await?.len();

            // Emptied between the two reads
            if player_count == 0 {
                continue;
            }

            summaries.push(LobbySummary {
                lobby,
                player_count,
            });
        }

        Ok(summaries)
    }

    /// Returns how full a lobby is, or None if it doesn't exist
    pub async fn matchmaking_status(
        &self,
        lobby_id: PrimaryKey,
    ) -> Result<Option<MatchmakingStatus>, LobbyError> {
        let status = self
            .context
            .snapshot(lobby_id)
            .await?
            .map(|snapshot| MatchmakingStatus {
                player_count: snapshot.members.len(),
                max_players: snapshot.lobby.max_players,
                lobby: snapshot.lobby,
            });

        Ok(status)
    }
}
