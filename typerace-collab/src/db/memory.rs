use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use super::rules::{self, Admission};
use crate::{
    Database, DatabaseError, JoinGuard, LobbyData, LobbyFilter, LobbyStatus, MemberData,
    MemberInsert, MemberRemoval, NewLobby, NewMember, NewRaceResult, PlayerStatus, PrimaryKey,
    RaceResultData, RaceStart, Result, UpdatedProgress,
};

/// An in-memory database implementation.
///
/// All tables live behind a single lock, so every method observes and
/// mutates one consistent snapshot.
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    tables: Mutex<Tables>,
}

#[derive(Debug, Default)]
struct Tables {
    last_id: PrimaryKey,
    lobbies: BTreeMap<PrimaryKey, LobbyData>,
    /// Unique index over join codes
    codes: HashMap<String, PrimaryKey>,
    /// Members by lobby, in insertion order
    members: HashMap<PrimaryKey, Vec<MemberData>>,
    results: Vec<RaceResultData>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Tables {
    fn next_id(&mut self) -> PrimaryKey {
        self.last_id += 1;
        self.last_id
    }

    fn lobby(&self, lobby_id: PrimaryKey) -> Result<&LobbyData> {
        self.lobbies.get(&lobby_id).ok_or(DatabaseError::NotFound {
            resource: "lobby",
            identifier: "id",
        })
    }

    fn lobby_mut(&mut self, lobby_id: PrimaryKey) -> Result<&mut LobbyData> {
        self.lobbies.get_mut(&lobby_id).ok_or(DatabaseError::NotFound {
            resource: "lobby",
            identifier: "id",
        })
    }

    fn members(&self, lobby_id: PrimaryKey) -> &[MemberData] {
        self.members
            .get(&lobby_id)
            .map(|m| m.as_slice())
            .unwrap_or_default()
    }

    /// Members ordered by when they joined
    fn sorted_members(&self, lobby_id: PrimaryKey) -> Vec<MemberData> {
        let mut members = self.members(lobby_id).to_vec();

        members.sort_by_key(|m| (m.joined_at, m.id));
        members
    }

    /// Marks a lobby as changed
    fn touch(&mut self, lobby_id: PrimaryKey) {
        if let Some(lobby) = self.lobbies.get_mut(&lobby_id) {
            lobby.version += 1;
        }
    }

    fn member_mut(&mut self, lobby_id: PrimaryKey, user_id: &str) -> Option<&mut MemberData> {
        self.members
            .get_mut(&lobby_id)?
            .iter_mut()
            .find(|m| m.user_id == user_id)
    }

    fn new_member(&mut self, lobby_id: PrimaryKey, user_id: String, name: String) -> MemberData {
        MemberData {
            id: self.next_id(),
            lobby_id,
            user_id,
            name,
            is_ready: true,
            status: PlayerStatus::Ready,
            progress: 0.,
            wpm: 0.,
            accuracy: 0.,
            joined_at: Utc::now(),
            finished_at: None,
        }
    }

    fn remove_lobby(&mut self, lobby_id: PrimaryKey) {
        if let Some(lobby) = self.lobbies.remove(&lobby_id) {
            self.codes.remove(&lobby.join_code);
        }

        self.members.remove(&lobby_id);
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn lobby_by_id(&self, lobby_id: PrimaryKey) -> Result<LobbyData> {
        self.tables.lock().lobby(lobby_id).cloned()
    }

    async fn lobby_by_code(&self, join_code: &str) -> Result<LobbyData> {
        let tables = self.tables.lock();

        tables
            .codes
            .get(join_code)
            .and_then(|id| tables.lobbies.get(id))
            .cloned()
            .ok_or(DatabaseError::NotFound {
                resource: "lobby",
                identifier: "join_code",
            })
    }

    async fn list_lobbies(&self, filter: LobbyFilter) -> Result<Vec<LobbyData>> {
        let tables = self.tables.lock();

        // Ids are assigned in creation order, so iterating backwards is newest first
        let lobbies = tables
            .lobbies
            .values()
            .rev()
            .filter(|l| filter.status.map_or(true, |s| l.status == s))
            .filter(|l| filter.is_public.map_or(true, |p| l.is_public == p))
            .take(filter.limit)
            .cloned()
            .collect();

        Ok(lobbies)
    }

    async fn create_lobby(&self, new_lobby: NewLobby) -> Result<LobbyData> {
        let mut tables = self.tables.lock();

        if tables.codes.contains_key(&new_lobby.join_code) {
            return Err(DatabaseError::Conflict {
                resource: "lobby",
                field: "join_code",
                value: new_lobby.join_code,
            });
        }

        let lobby = LobbyData {
            id: tables.next_id(),
            name: new_lobby.name,
            host_id: new_lobby.host_id.clone(),
            status: LobbyStatus::Waiting,
            text: new_lobby.text,
            text_category: new_lobby.text_category,
            max_players: new_lobby.max_players,
            is_public: new_lobby.is_public,
            join_code: new_lobby.join_code,
            countdown_started_at: None,
            created_at: Utc::now(),
            version: 1,
        };

        let host = tables.new_member(lobby.id, new_lobby.host_id, new_lobby.host_name);

        tables.codes.insert(lobby.join_code.clone(), lobby.id);
        tables.members.insert(lobby.id, vec![host]);
        tables.lobbies.insert(lobby.id, lobby.clone());

        Ok(lobby)
    }

    async fn update_lobby_status(
        &self,
        lobby_id: PrimaryKey,
        status: LobbyStatus,
    ) -> Result<LobbyData> {
        let mut tables = self.tables.lock();
        let lobby = tables.lobby_mut(lobby_id)?;

        if lobby.status != status && lobby.status.can_advance_to(status) {
            lobby.status = status;
            lobby.version += 1;
        }

        Ok(lobby.clone())
    }

    async fn lobby_members(&self, lobby_id: PrimaryKey) -> Result<Vec<MemberData>> {
        Ok(self.tables.lock().sorted_members(lobby_id))
    }

    async fn lobby_snapshot(&self, lobby_id: PrimaryKey) -> Result<(LobbyData, Vec<MemberData>)> {
        let tables = self.tables.lock();
        let lobby = tables.lobby(lobby_id)?.clone();

        Ok((lobby, tables.sorted_members(lobby_id)))
    }

    async fn member(&self, lobby_id: PrimaryKey, user_id: &str) -> Result<MemberData> {
        self.tables
            .lock()
            .members(lobby_id)
            .iter()
            .find(|m| m.user_id == user_id)
            .cloned()
            .ok_or(DatabaseError::NotFound {
                resource: "lobby member",
                identifier: "lobby_id:user_id",
            })
    }

    async fn create_member(
        &self,
        new_member: NewMember,
        guard: JoinGuard,
    ) -> Result<MemberInsert> {
        let mut tables = self.tables.lock();
        let lobby = tables.lobby(new_member.lobby_id)?;
        let members = tables.members(new_member.lobby_id);

        match rules::admit(lobby, members, &new_member.user_id, guard) {
            Err(rejection) => Ok(MemberInsert::Rejected(rejection)),
            Ok(Admission::AlreadyMember(existing)) => Ok(MemberInsert::Existing(existing.clone())),
            Ok(Admission::Admit) => {
                let member =
                    tables.new_member(new_member.lobby_id, new_member.user_id, new_member.name);

                tables
                    .members
                    .entry(new_member.lobby_id)
                    .or_default()
                    .push(member.clone());

                tables.touch(new_member.lobby_id);
                Ok(MemberInsert::Inserted(member))
            }
        }
    }

    async fn delete_member(&self, lobby_id: PrimaryKey, user_id: &str) -> Result<MemberRemoval> {
        let mut tables = self.tables.lock();
        let host_id = tables.lobby(lobby_id)?.host_id.clone();

        let mut removal = MemberRemoval::default();

        if let Some(members) = tables.members.get_mut(&lobby_id) {
            if let Some(index) = members.iter().position(|m| m.user_id == user_id) {
                removal.removed = Some(members.remove(index));
            }
        }

        let remaining = tables.members(lobby_id).to_vec();

        if remaining.is_empty() {
            tables.remove_lobby(lobby_id);
            removal.lobby_deleted = true;

            return Ok(removal);
        }

        if removal.removed.is_some() {
            tables.touch(lobby_id);
        }

        if host_id == user_id {
            let next_id = rules::next_host(&remaining).map(|m| m.user_id.clone());

            if let Some(next_id) = next_id {
                tables.lobby_mut(lobby_id)?.host_id = next_id.clone();

                if let Some(member) = tables.member_mut(lobby_id, &next_id) {
                    rules::promote(member);
                    removal.new_host = Some(member.clone());
                }
            }
        }

        Ok(removal)
    }

    async fn update_member_ready(
        &self,
        lobby_id: PrimaryKey,
        user_id: &str,
        is_ready: bool,
    ) -> Result<bool> {
        let mut tables = self.tables.lock();

        let Some(member) = tables.member_mut(lobby_id, user_id) else {
            return Ok(false);
        };

        member.is_ready = is_ready;
        member.status = PlayerStatus::from_ready(is_ready);

        tables.touch(lobby_id);
        Ok(true)
    }

    async fn update_member_progress(&self, update: UpdatedProgress) -> Result<bool> {
        let mut tables = self.tables.lock();

        match tables.member_mut(update.lobby_id, &update.user_id) {
            Some(member) if member.status == PlayerStatus::Racing => {
                member.progress = rules::clamp_progress(update.progress);
                member.wpm = update.wpm;
                member.accuracy = update.accuracy;
            }
            _ => return Ok(false),
        }

        tables.touch(update.lobby_id);
        Ok(true)
    }

    async fn start_race(
        &self,
        lobby_id: PrimaryKey,
        user_id: &str,
        min_players: usize,
    ) -> Result<RaceStart> {
        let mut tables = self.tables.lock();
        let lobby = tables.lobby(lobby_id)?;
        let members = tables.members(lobby_id);

        if let Some(refusal) = rules::refuse_start(lobby, members, user_id, min_players) {
            return Ok(refusal);
        }

        if let Some(members) = tables.members.get_mut(&lobby_id) {
            members.iter_mut().for_each(rules::enter_race);
        }

        let lobby = tables.lobby_mut(lobby_id)?;
        lobby.status = LobbyStatus::Racing;
        lobby.countdown_started_at = Some(Utc::now());
        lobby.version += 1;

        Ok(RaceStart::Started(lobby.clone()))
    }

    async fn finish_member(&self, new_result: NewRaceResult) -> Result<Option<RaceResultData>> {
        let mut tables = self.tables.lock();
        let text_category = tables.lobby(new_result.lobby_id)?.text_category.clone();
        let now = Utc::now();

        let user_name = match tables.member_mut(new_result.lobby_id, &new_result.user_id) {
            Some(member) => {
                rules::finish(member, new_result.wpm, new_result.accuracy, now);
                member.name.clone()
            }
            None => return Ok(None),
        };

        tables.touch(new_result.lobby_id);

        let result = RaceResultData {
            id: tables.next_id(),
            lobby_id: new_result.lobby_id,
            user_id: new_result.user_id,
            user_name,
            wpm: new_result.wpm,
            accuracy: new_result.accuracy,
            time_taken: new_result.time_taken,
            error_count: new_result.error_count,
            total_characters: new_result.total_characters,
            consistency: new_result.consistency,
            text_category,
            finished_at: now,
        };

        tables.results.push(result.clone());
        Ok(Some(result))
    }

    async fn race_results(&self, lobby_id: PrimaryKey) -> Result<Vec<RaceResultData>> {
        let results = self
            .tables
            .lock()
            .results
            .iter()
            .filter(|r| r.lobby_id == lobby_id)
            .cloned()
            .collect();

        Ok(results)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn new_lobby(code: &str, host: &str) -> NewLobby {
        NewLobby {
            name: format!("{host}'s lobby"),
            text: "hello world".to_string(),
            text_category: "quotes".to_string(),
            max_players: 2,
            is_public: true,
            join_code: code.to_string(),
            host_id: host.to_string(),
            host_name: host.to_string(),
        }
    }

    fn new_member(lobby_id: PrimaryKey, user: &str) -> NewMember {
        NewMember {
            lobby_id,
            user_id: user.to_string(),
            name: user.to_string(),
        }
    }

    #[tokio::test]
    async fn join_codes_are_unique() {
        let db = MemoryDatabase::new();

        db.create_lobby(new_lobby("ABCD", "alice")).await.unwrap();
        let second = db.create_lobby(new_lobby("ABCD", "bob")).await;

        assert!(matches!(second, Err(DatabaseError::Conflict { .. })));
        assert_eq!(db.list_lobbies(all()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn rejected_join_inserts_nothing() {
        let db = MemoryDatabase::new();
        let lobby = db.create_lobby(new_lobby("ABCD", "alice")).await.unwrap();

        db.create_member(new_member(lobby.id, "bob"), JoinGuard::default())
            .await
            .unwrap();

        let outcome = db
            .create_member(new_member(lobby.id, "carol"), JoinGuard::default())
            .await
            .unwrap();

        assert_eq!(outcome, MemberInsert::Rejected(rules::JoinRejection::Full));
        assert_eq!(db.lobby_members(lobby.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn deleting_last_member_frees_the_code() {
        let db = MemoryDatabase::new();
        let lobby = db.create_lobby(new_lobby("ABCD", "alice")).await.unwrap();

        let removal = db.delete_member(lobby.id, "alice").await.unwrap();
        assert!(removal.lobby_deleted);
        assert!(db.lobby_by_id(lobby.id).await.unwrap_err().is_not_found());

        db.create_lobby(new_lobby("ABCD", "bob")).await.unwrap();
    }

    #[tokio::test]
    async fn results_outlive_their_lobby() {
        let db = MemoryDatabase::new();
        let lobby = db.create_lobby(new_lobby("ABCD", "alice")).await.unwrap();

        db.finish_member(NewRaceResult {
            lobby_id: lobby.id,
            user_id: "alice".to_string(),
            wpm: 70.,
            accuracy: 97.,
            time_taken: 31.5,
            error_count: 2,
            total_characters: 180,
            consistency: 88.,
        })
        .await
        .unwrap();

        db.delete_member(lobby.id, "alice").await.unwrap();

        let results = db.race_results(lobby.id).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].text_category, "quotes");
        assert_eq!(results[0].user_name, "alice");
    }

    fn progress(lobby_id: PrimaryKey, user: &str) -> UpdatedProgress {
        UpdatedProgress {
            lobby_id,
            user_id: user.to_string(),
            progress: 40.,
            wpm: 55.,
            accuracy: 96.,
        }
    }

    #[tokio::test]
    async fn every_change_bumps_the_version() {
        let db = MemoryDatabase::new();
        let lobby = db.create_lobby(new_lobby("ABCD", "alice")).await.unwrap();
        assert_eq!(lobby.version, 1);

        db.create_member(new_member(lobby.id, "bob"), JoinGuard::default())
            .await
            .unwrap();
        db.update_member_ready(lobby.id, "bob", false).await.unwrap();

        // Not racing yet, so nothing changes
        assert!(!db.update_member_progress(progress(lobby.id, "bob")).await.unwrap());

        let (snapshot, members) = db.lobby_snapshot(lobby.id).await.unwrap();
        assert_eq!(snapshot.version, 3);
        assert_eq!(members.len(), 2);

        db.start_race(lobby.id, "alice", 2).await.unwrap();
        assert!(db.update_member_progress(progress(lobby.id, "bob")).await.unwrap());
        assert_eq!(db.lobby_by_id(lobby.id).await.unwrap().version, 5);

        // Already racing, so the status doesn't change
        let lobby = db
            .update_lobby_status(lobby.id, LobbyStatus::Racing)
            .await
            .unwrap();
        assert_eq!(lobby.version, 5);
    }

    #[tokio::test]
    async fn host_leaving_mid_race_keeps_successor_racing() {
        let db = MemoryDatabase::new();
        let lobby = db.create_lobby(new_lobby("ABCD", "alice")).await.unwrap();

        db.create_member(new_member(lobby.id, "bob"), JoinGuard::default())
            .await
            .unwrap();
        db.start_race(lobby.id, "alice", 2).await.unwrap();

        let removal = db.delete_member(lobby.id, "alice").await.unwrap();
        let new_host = removal.new_host.unwrap();

        assert_eq!(new_host.user_id, "bob");
        assert!(new_host.is_ready);
        assert_eq!(new_host.status, PlayerStatus::Racing);

        let bob = db.member(lobby.id, "bob").await.unwrap();
        assert_eq!(bob.status, PlayerStatus::Racing);
        assert_eq!(db.lobby_by_id(lobby.id).await.unwrap().host_id, "bob");
    }

    fn all() -> LobbyFilter {
        LobbyFilter {
            status: None,
            is_public: None,
            limit: usize::MAX,
        }
    }
}
