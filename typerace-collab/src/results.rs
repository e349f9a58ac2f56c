use std::cmp::Ordering;

use crate::{CollabContext, DatabaseError, LobbyData, MemberData, PrimaryKey, RaceResultData};

/// Read-only views over races and their outcomes
pub struct ResultsAggregator {
    context: CollabContext,
}

/// A lobby with every result recorded for it
#[derive(Debug, Clone)]
pub struct RaceResults {
    pub lobby: LobbyData,
    pub members: Vec<MemberData>,
    /// In the order they were recorded
    pub results: Vec<RaceResultData>,
}

/// The live state of a race as seen by one participant
#[derive(Debug, Clone)]
pub struct RaceState {
    pub lobby: LobbyData,
    /// Ordered by join time
    pub members: Vec<MemberData>,
    pub current_user_id: String,
}

/// A result's position in a ranking
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Standing<'a> {
    /// Starts at 1
    pub rank: usize,
    pub result: &'a RaceResultData,
}

impl RaceResults {
    /// Ranks results by wpm, highest first.
    /// Equal wpm keeps the order the results were recorded in.
    pub fn ranking(&self) -> Vec<Standing<'_>> {
        let mut ordered: Vec<_> = self.results.iter().collect();

        // Stable, so ties stay in insertion order
        ordered.sort_by(|a, b| b.wpm.partial_cmp(&a.wpm).unwrap_or(Ordering::Equal));

        ordered
            .into_iter()
            .enumerate()
            .map(|(i, result)| Standing { rank: i + 1, result })
            .collect()
    }
}

impl ResultsAggregator {
    pub fn new(context: &CollabContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Gets a lobby with its members and recorded results, or None if the lobby is gone
    pub async fn get_results(
        &self,
        lobby_id: PrimaryKey,
    ) -> Result<Option<RaceResults>, DatabaseError> {
        let Some(snapshot) = self.context.snapshot(lobby_id).await? else {
            return Ok(None);
        };

        let results = self.context.database.race_results(lobby_id).await?;

        Ok(Some(RaceResults {
            lobby: snapshot.lobby,
            members: snapshot.members,
            results,
        }))
    }

    /// Gets the state of a race for the caller, or None if the lobby is gone
    pub async fn get_race_state(
        &self,
        caller: &str,
        lobby_id: PrimaryKey,
    ) -> Result<Option<RaceState>, DatabaseError> {
        let state = self
            .context
            .snapshot(lobby_id)
            .await?
            .map(|snapshot| RaceState {
                lobby: snapshot.lobby,
                members: snapshot.members,
                current_user_id: caller.to_string(),
            });

        Ok(state)
    }
}
