//! Short, human-enterable join codes.
//!
//! Picking a free code is optimistic: the store's unique index on join codes
//! is what actually guarantees uniqueness, so inserts that lose a race are retried
//! with a fresh code.

use lazy_static::lazy_static;
use log::warn;
use regex::Regex;

use crate::{util::random_string_from, Database, DatabaseResult, LobbyData, NewLobby, Result};

pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

lazy_static! {
    static ref CODE_REGEX: Regex = Regex::new(r"^[A-Z0-9]+$").unwrap();
}

/// Generates a random code of `length` characters
pub fn generate_code(length: usize) -> String {
    random_string_from(CODE_ALPHABET, length)
}

/// Normalizes user input into the stored form of a code
pub fn normalize_code(input: &str) -> String {
    input.trim().to_uppercase()
}

/// Returns true if the (normalized) code could have been generated with `length`
pub fn is_valid_code(code: &str, length: usize) -> bool {
    code.len() == length && CODE_REGEX.is_match(code)
}

/// Finds a code that no stored lobby currently uses.
/// The answer may be stale by the time it is used.
pub async fn allocate_code(database: &dyn Database, length: usize) -> Result<String> {
    loop {
        let code = generate_code(length);

        if database.lobby_by_code(&code).await.optional()?.is_none() {
            return Ok(code);
        }
    }
}

/// Inserts a lobby under a freshly allocated code, retrying until the store accepts one
pub async fn create_with_unique_code(
    database: &dyn Database,
    length: usize,
    mut new_lobby: NewLobby,
) -> Result<LobbyData> {
    loop {
        new_lobby.join_code = allocate_code(database, length).await?;

        match database.create_lobby(new_lobby.clone()).await {
            Err(e) if e.is_conflict() => {
                warn!("Join code {} was taken concurrently, retrying", new_lobby.join_code);
            }
            result => return result,
        }
    }
}

#[cfg(test)]
mod test {
    use async_trait::async_trait;
    use crossbeam::atomic::AtomicCell;

    use super::*;
    use crate::{
        DatabaseError, JoinGuard, LobbyFilter, LobbyStatus, MemberData, MemberInsert,
        MemberRemoval, MemoryDatabase, NewMember, NewRaceResult, PrimaryKey, RaceResultData,
        RaceStart, UpdatedProgress,
    };

    /// Claims every code is free, so only the insert can detect a collision.
    /// The first insert always loses, as if another lobby took the code in between.
    #[derive(Default)]
    struct RacingDatabase {
        inner: MemoryDatabase,
        inserts: AtomicCell<usize>,
    }

    #[async_trait]
    impl Database for RacingDatabase {
        async fn lobby_by_id(&self, lobby_id: PrimaryKey) -> Result<LobbyData> {
            self.inner.lobby_by_id(lobby_id).await
        }

        async fn lobby_by_code(&self, _join_code: &str) -> Result<LobbyData> {
            Err(DatabaseError::NotFound {
                resource: "lobby",
                identifier: "join_code",
            })
        }

        async fn list_lobbies(&self, filter: LobbyFilter) -> Result<Vec<LobbyData>> {
            self.inner.list_lobbies(filter).await
        }

        async fn create_lobby(&self, new_lobby: NewLobby) -> Result<LobbyData> {
            if self.inserts.fetch_add(1) == 0 {
                return Err(DatabaseError::Conflict {
                    resource: "lobby",
                    field: "join_code",
                    value: new_lobby.join_code,
                });
            }

            self.inner.create_lobby(new_lobby).await
        }

        async fn update_lobby_status(
            &self,
            lobby_id: PrimaryKey,
            status: LobbyStatus,
        ) -> Result<LobbyData> {
            self.inner.update_lobby_status(lobby_id, status).await
        }

        async fn lobby_members(&self, lobby_id: PrimaryKey) -> Result<Vec<MemberData>> {
            self.inner.lobby_members(lobby_id).await
        }

        async fn lobby_snapshot(
            &self,
            lobby_id: PrimaryKey,
        ) -> Result<(LobbyData, Vec<MemberData>)> {
            self.inner.lobby_snapshot(lobby_id).await
        }

        async fn member(&self, lobby_id: PrimaryKey, user_id: &str) -> Result<MemberData> {
            self.inner.member(lobby_id, user_id).await
        }

        async fn create_member(
            &self,
            new_member: NewMember,
            guard: JoinGuard,
        ) -> Result<MemberInsert> {
            self.inner.create_member(new_member, guard).await
        }

        async fn delete_member(
            &self,
            lobby_id: PrimaryKey,
            user_id: &str,
        ) -> Result<MemberRemoval> {
            self.inner.delete_member(lobby_id, user_id).await
        }

        async fn update_member_ready(
            &self,
            lobby_id: PrimaryKey,
            user_id: &str,
            is_ready: bool,
        ) -> Result<bool> {
            self.inner.update_member_ready(lobby_id, user_id, is_ready).await
        }

        async fn update_member_progress(&self, update: UpdatedProgress) -> Result<bool> {
            self.inner.update_member_progress(update).await
        }

        async fn start_race(
            &self,
            lobby_id: PrimaryKey,
            user_id: &str,
            min_players: usize,
        ) -> Result<RaceStart> {
            self.inner.start_race(lobby_id, user_id, min_players).await
        }

        async fn finish_member(
            &self,
            new_result: NewRaceResult,
        ) -> Result<Option<RaceResultData>> {
            self.inner.finish_member(new_result).await
        }

        async fn race_results(&self, lobby_id: PrimaryKey) -> Result<Vec<RaceResultData>> {
            self.inner.race_results(lobby_id).await
        }
    }

    fn new_lobby(join_code: &str) -> NewLobby {
        NewLobby {
            name: "race".to_string(),
            text: "hello world".to_string(),
            text_category: "quotes".to_string(),
            max_players: 4,
            is_public: true,
            join_code: join_code.to_string(),
            host_id: format!("host-{join_code}"),
            host_name: "host".to_string(),
        }
    }

    #[tokio::test]
    async fn conflicting_inserts_retry_with_a_new_code() {
        let database = RacingDatabase::default();

        // Every one-character code but Z is taken
        for &c in CODE_ALPHABET.iter().filter(|&&c| c != b'Z') {
            let code = (c as char).to_string();
            database.inner.create_lobby(new_lobby(&code)).await.unwrap();
        }

        let lobby = create_with_unique_code(&database, 1, new_lobby(""))
            .await
            .unwrap();

        assert_eq!(lobby.join_code, "Z");
        assert!(database.inserts.load() >= 2);
        assert_eq!(
            database.inner.lobby_by_code("Z").await.unwrap().id,
            lobby.id
        );
    }

    #[test]
    fn generated_codes_use_the_alphabet() {
        for _ in 0..100 {
            let code = generate_code(4);
            assert!(is_valid_code(&code, 4), "{code}");
        }
    }

    #[test]
    fn codes_are_normalized() {
        assert_eq!(normalize_code(" x1y2 "), "X1Y2");
        assert!(is_valid_code(&normalize_code("ab12"), 4));
        assert!(!is_valid_code("AB-2", 4));
        assert!(!is_valid_code("ABC", 4));
    }
}
