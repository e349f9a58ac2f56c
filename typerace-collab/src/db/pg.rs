use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    postgres::PgPoolOptions, query, query_as, Error as SqlxError, FromRow, PgPool, Postgres,
    Transaction,
};

use super::rules::{self, Admission};
use crate::{
    Database, DatabaseError, IntoDatabaseError, JoinGuard, LobbyData, LobbyFilter, LobbyStatus,
    MemberData, MemberInsert, MemberRemoval, NewLobby, NewMember, NewRaceResult, PlayerStatus,
    PrimaryKey, RaceResultData, RaceStart, Result, UpdatedProgress,
};

type Tx<'a> = Transaction<'a, Postgres>;

/// A postgres database implementation for typerace.
///
/// Membership changes lock the lobby row first, which serializes them per lobby.
pub struct PgDatabase {
    pool: PgPool,
}

#[derive(Debug, FromRow)]
struct LobbyRow {
    id: i32,
    name: String,
    host_id: String,
    status: String,
    text: String,
    text_category: String,
    max_players: i32,
    is_public: bool,
    join_code: String,
    countdown_started_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    version: i64,
}

#[derive(Debug, FromRow)]
struct MemberRow {
    id: i32,
    lobby_id: i32,
    user_id: String,
    name: String,
    is_ready: bool,
    status: String,
    progress: f64,
    wpm: f64,
    accuracy: f64,
    joined_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, FromRow)]
struct RaceResultRow {
    id: i32,
    lobby_id: i32,
    user_id: String,
    user_name: String,
    wpm: f64,
    accuracy: f64,
    time_taken: f64,
    error_count: i32,
    total_characters: i32,
    consistency: f64,
    text_category: String,
    finished_at: DateTime<Utc>,
}

impl PgDatabase {
    pub async fn new(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .map_err(|e| e.any())?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| DatabaseError::Internal(Box::new(e)))?;

        Ok(Self { pool })
    }

    async fn begin(&self) -> Result<Tx<'static>> {
        self.pool.begin().await.map_err(|e| e.any())
    }

    /// Fetches a lobby and locks its row until the transaction ends
    async fn lock_lobby(tx: &mut Tx<'_>, lobby_id: PrimaryKey) -> Result<LobbyData> {
        query_as::<_, LobbyRow>("SELECT * FROM lobbies WHERE id = $1 FOR UPDATE")
            .bind(lobby_id)
            .fetch_one(&mut **tx)
            .await
            .map_err(|e| e.not_found_or("lobby", "id"))?
            .try_into()
    }

    async fn members_in(tx: &mut Tx<'_>, lobby_id: PrimaryKey) -> Result<Vec<MemberData>> {
        query_as::<_, MemberRow>(
            "SELECT * FROM lobby_members WHERE lobby_id = $1 ORDER BY joined_at, id",
        )
        .bind(lobby_id)
        .fetch_all(&mut **tx)
        .await
        .map_err(|e| e.any())?
        .into_iter()
        .map(TryInto::try_into)
        .collect()
    }

    /// Marks a lobby as changed
    async fn touch(tx: &mut Tx<'_>, lobby_id: PrimaryKey) -> Result<()> {
        query("UPDATE lobbies SET version = version + 1 WHERE id = $1")
            .bind(lobby_id)
            .execute(&mut **tx)
            .await
            .map_err(|e| e.any())?;

        Ok(())
    }

    async fn insert_member(
        tx: &mut Tx<'_>,
        lobby_id: PrimaryKey,
        user_id: &str,
        name: &str,
    ) -> Result<MemberData> {
        query_as::<_, MemberRow>(
            "
            INSERT INTO lobby_members (lobby_id, user_id, name, is_ready, status)
            VALUES ($1, $2, $3, true, 'ready')
            RETURNING *",
        )
        .bind(lobby_id)
        .bind(user_id)
        .bind(name)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| e.any())?
        .try_into()
    }
}

#[async_trait]
impl Database for PgDatabase {
    async fn lobby_by_id(&self, lobby_id: PrimaryKey) -> Result<LobbyData> {
        query_as::<_, LobbyRow>("SELECT * FROM lobbies WHERE id = $1")
            .bind(lobby_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("lobby", "id"))?
            .try_into()
    }

    async fn lobby_by_code(&self, join_code: &str) -> Result<LobbyData> {
        query_as::<_, LobbyRow>("SELECT * FROM lobbies WHERE join_code = $1")
            .bind(join_code)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("lobby", "join_code"))?
            .try_into()
    }

    async fn list_lobbies(&self, filter: LobbyFilter) -> Result<Vec<LobbyData>> {
        let limit = i64::try_from(filter.limit).unwrap_or(i64::MAX);

        query_as::<_, LobbyRow>(
            "
            SELECT * FROM lobbies
            WHERE ($1::TEXT IS NULL OR status = $1)
                AND ($2::BOOLEAN IS NULL OR is_public = $2)
            ORDER BY created_at DESC, id DESC
            LIMIT $3",
        )
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.is_public)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())?
        .into_iter()
        .map(TryInto::try_into)
        .collect()
    }

    async fn create_lobby(&self, new_lobby: NewLobby) -> Result<LobbyData> {
        let mut tx = self.begin().await?;

        // The unique index on join_code turns this into an insert-if-absent
        let row = query_as::<_, LobbyRow>(
            "
            INSERT INTO lobbies
                (name, host_id, status, text, text_category, max_players, is_public, join_code)
            VALUES ($1, $2, 'waiting', $3, $4, $5, $6, $7)
            ON CONFLICT (join_code) DO NOTHING
            RETURNING *",
        )
        .bind(&new_lobby.name)
        .bind(&new_lobby.host_id)
        .bind(&new_lobby.text)
        .bind(&new_lobby.text_category)
        .bind(new_lobby.max_players as i32)
        .bind(new_lobby.is_public)
        .bind(&new_lobby.join_code)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| e.any())?
        .ok_or_else(|| DatabaseError::Conflict {
            resource: "lobby",
            field: "join_code",
            value: new_lobby.join_code.clone(),
        })?;

        let lobby: LobbyData = row.try_into()?;

        Self::insert_member(&mut tx, lobby.id, &new_lobby.host_id, &new_lobby.host_name).await?;
        tx.commit().await.map_err(|e| e.any())?;

        Ok(lobby)
    }

    async fn update_lobby_status(
        &self,
        lobby_id: PrimaryKey,
        status: LobbyStatus,
    ) -> Result<LobbyData> {
        let mut tx = self.begin().await?;
        let lobby = Self::lock_lobby(&mut tx, lobby_id).await?;

        if lobby.status == status || !lobby.status.can_advance_to(status) {
            return Ok(lobby);
        }

        let lobby = query_as::<_, LobbyRow>(
            "UPDATE lobbies SET status = $2, version = version + 1 WHERE id = $1 RETURNING *",
        )
        .bind(lobby_id)
        .bind(status.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| e.any())?
        .try_into()?;

        tx.commit().await.map_err(|e| e.any())?;
        Ok(lobby)
    }

    async fn lobby_members(&self, lobby_id: PrimaryKey) -> Result<Vec<MemberData>> {
        query_as::<_, MemberRow>(
            "SELECT * FROM lobby_members WHERE lobby_id = $1 ORDER BY joined_at, id",
        )
        .bind(lobby_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())?
        .into_iter()
        .map(TryInto::try_into)
        .collect()
    }

    async fn lobby_snapshot(&self, lobby_id: PrimaryKey) -> Result<(LobbyData, Vec<MemberData>)> {
        let mut tx = self.begin().await?;

        // Both reads see the same committed state
        query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(|e| e.any())?;

        let lobby: LobbyData = query_as::<_, LobbyRow>("SELECT * FROM lobbies WHERE id = $1")
            .bind(lobby_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| e.not_found_or("lobby", "id"))?
            .try_into()?;

        let members = Self::members_in(&mut tx, lobby_id).await?;
        tx.commit().await.map_err(|e| e.any())?;

        Ok((lobby, members))
    }

    async fn member(&self, lobby_id: PrimaryKey, user_id: &str) -> Result<MemberData> {
        query_as::<_, MemberRow>(
            "SELECT * FROM lobby_members WHERE lobby_id = $1 AND user_id = $2",
        )
        .bind(lobby_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.not_found_or("lobby member", "lobby_id:user_id"))?
        .try_into()
    }

    async fn create_member(
        &self,
        new_member: NewMember,
        guard: JoinGuard,
    ) -> Result<MemberInsert> {
        let mut tx = self.begin().await?;
        let lobby = Self::lock_lobby(&mut tx, new_member.lobby_id).await?;
        let members = Self::members_in(&mut tx, new_member.lobby_id).await?;

        match rules::admit(&lobby, &members, &new_member.user_id, guard) {
            Err(rejection) => return Ok(MemberInsert::Rejected(rejection)),
            Ok(Admission::AlreadyMember(existing)) => {
                return Ok(MemberInsert::Existing(existing.clone()))
            }
            Ok(Admission::Admit) => {}
        }

        let member = Self::insert_member(
            &mut tx,
            new_member.lobby_id,
            &new_member.user_id,
            &new_member.name,
        )
        .await?;

        Self::touch(&mut tx, new_member.lobby_id).await?;
        tx.commit().await.map_err(|e| e.any())?;
        Ok(MemberInsert::Inserted(member))
    }

    async fn delete_member(&self, lobby_id: PrimaryKey, user_id: &str) -> Result<MemberRemoval> {
        let mut tx = self.begin().await?;
        let lobby = Self::lock_lobby(&mut tx, lobby_id).await?;

        let removed: Option<MemberData> = query_as::<_, MemberRow>(
            "DELETE FROM lobby_members WHERE lobby_id = $1 AND user_id = $2 RETURNING *",
        )
        .bind(lobby_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| e.any())?
        .map(TryInto::try_into)
        .transpose()?;

        let remaining = Self::members_in(&mut tx, lobby_id).await?;
        let mut removal = MemberRemoval {
            removed,
            ..Default::default()
        };

        if remaining.is_empty() {
            query("DELETE FROM lobbies WHERE id = $1")
                .bind(lobby_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| e.any())?;

            removal.lobby_deleted = true;
        } else if removal.removed.is_some() {
            Self::touch(&mut tx, lobby_id).await?;
        }

        if !removal.lobby_deleted && lobby.host_id == user_id {
            if let Some(mut next_host) = rules::next_host(&remaining).cloned() {
                rules::promote(&mut next_host);

                query("UPDATE lobbies SET host_id = $2 WHERE id = $1")
                    .bind(lobby_id)
                    .bind(&next_host.user_id)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| e.any())?;

                query("UPDATE lobby_members SET is_ready = $2, status = $3 WHERE id = $1")
                    .bind(next_host.id)
                    .bind(next_host.is_ready)
                    .bind(next_host.status.as_str())
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| e.any())?;

                removal.new_host = Some(next_host);
            }
        }

        tx.commit().await.map_err(|e| e.any())?;
        Ok(removal)
    }

    async fn update_member_ready(
        &self,
        lobby_id: PrimaryKey,
        user_id: &str,
        is_ready: bool,
    ) -> Result<bool> {
        let result = query(
            "
            WITH updated AS (
                UPDATE lobby_members SET is_ready = $3, status = $4
                WHERE lobby_id = $1 AND user_id = $2
                RETURNING lobby_id
            )
            UPDATE lobbies SET version = version + 1
            WHERE id IN (SELECT lobby_id FROM updated)",
        )
        .bind(lobby_id)
        .bind(user_id)
        .bind(is_ready)
        .bind(PlayerStatus::from_ready(is_ready).as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| e.any())?;

        Ok(result.rows_affected() > 0)
    }

    async fn update_member_progress(&self, update: UpdatedProgress) -> Result<bool> {
        let result = query(
            "
            WITH updated AS (
                UPDATE lobby_members SET progress = $3, wpm = $4, accuracy = $5
                WHERE lobby_id = $1 AND user_id = $2 AND status = 'racing'
                RETURNING lobby_id
            )
            UPDATE lobbies SET version = version + 1
            WHERE id IN (SELECT lobby_id FROM updated)",
        )
        .bind(update.lobby_id)
        .bind(&update.user_id)
        .bind(rules::clamp_progress(update.progress))
        .bind(update.wpm)
        .bind(update.accuracy)
        .execute(&self.pool)
        .await
        .map_err(|e| e.any())?;

        Ok(result.rows_affected() > 0)
    }

    async fn start_race(
        &self,
        lobby_id: PrimaryKey,
        user_id: &str,
        min_players: usize,
    ) -> Result<RaceStart> {
        let mut tx = self.begin().await?;
        let lobby = Self::lock_lobby(&mut tx, lobby_id).await?;
        let members = Self::members_in(&mut tx, lobby_id).await?;

        if let Some(refusal) = rules::refuse_start(&lobby, &members, user_id, min_players) {
            return Ok(refusal);
        }

        let lobby: LobbyData = query_as::<_, LobbyRow>(
            "
            UPDATE lobbies SET
                status = 'racing',
                countdown_started_at = clock_timestamp(),
                version = version + 1
            WHERE id = $1
            RETURNING *",
        )
        .bind(lobby_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| e.any())?
        .try_into()?;

        query(
            "
            UPDATE lobby_members SET status = 'racing', progress = 0, wpm = 0, accuracy = 0
            WHERE lobby_id = $1",
        )
        .bind(lobby_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| e.any())?;

        tx.commit().await.map_err(|e| e.any())?;
        Ok(RaceStart::Started(lobby))
    }

    async fn finish_member(&self, new_result: NewRaceResult) -> Result<Option<RaceResultData>> {
        let mut tx = self.begin().await?;
        let lobby = Self::lock_lobby(&mut tx, new_result.lobby_id).await?;

        let member = query_as::<_, MemberRow>(
            "
            UPDATE lobby_members SET
                status = 'finished',
                progress = 100,
                wpm = $3,
                accuracy = $4,
                finished_at = clock_timestamp()
            WHERE lobby_id = $1 AND user_id = $2
            RETURNING *",
        )
        .bind(new_result.lobby_id)
        .bind(&new_result.user_id)
        .bind(new_result.wpm)
        .bind(new_result.accuracy)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| e.any())?;

        let Some(member) = member else {
            return Ok(None);
        };

        Self::touch(&mut tx, new_result.lobby_id).await?;

        let result = query_as::<_, RaceResultRow>(
            "
            INSERT INTO race_results (
                lobby_id, user_id, user_name, wpm, accuracy, time_taken,
                error_count, total_characters, consistency, text_category
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *",
        )
        .bind(new_result.lobby_id)
        .bind(&new_result.user_id)
        .bind(&member.name)
        .bind(new_result.wpm)
        .bind(new_result.accuracy)
        .bind(new_result.time_taken)
        .bind(new_result.error_count as i32)
        .bind(new_result.total_characters as i32)
        .bind(new_result.consistency)
        .bind(&lobby.text_category)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| e.any())?;

        tx.commit().await.map_err(|e| e.any())?;
        Ok(Some(result.into()))
    }

    async fn race_results(&self, lobby_id: PrimaryKey) -> Result<Vec<RaceResultData>> {
        let results = query_as::<_, RaceResultRow>(
            "SELECT * FROM race_results WHERE lobby_id = $1 ORDER BY id",
        )
        .bind(lobby_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())?
        .into_iter()
        .map(Into::into)
        .collect();

        Ok(results)
    }
}

fn invalid_column(column: &str, value: &str) -> DatabaseError {
    DatabaseError::Internal(format!("Invalid value {value:?} in column {column}").into())
}

impl TryFrom<LobbyRow> for LobbyData {
    type Error = DatabaseError;

    fn try_from(row: LobbyRow) -> Result<Self> {
        let status =
            LobbyStatus::parse(&row.status).ok_or_else(|| invalid_column("status", &row.status))?;

        Ok(Self {
            id: row.id,
            name: row.name,
            host_id: row.host_id,
            status,
            text: row.text,
            text_category: row.text_category,
            max_players: row.max_players.max(0) as u32,
            is_public: row.is_public,
            join_code: row.join_code,
            countdown_started_at: row.countdown_started_at,
            created_at: row.created_at,
            version: row.version,
        })
    }
}

impl TryFrom<MemberRow> for MemberData {
    type Error = DatabaseError;

    fn try_from(row: MemberRow) -> Result<Self> {
        let status =
            PlayerStatus::parse(&row.status).ok_or_else(|| invalid_column("status", &row.status))?;

        Ok(Self {
            id: row.id,
            lobby_id: row.lobby_id,
            user_id: row.user_id,
            name: row.name,
            is_ready: row.is_ready,
            status,
            progress: row.progress,
            wpm: row.wpm,
            accuracy: row.accuracy,
            joined_at: row.joined_at,
            finished_at: row.finished_at,
        })
    }
}

impl From<RaceResultRow> for RaceResultData {
    fn from(row: RaceResultRow) -> Self {
        Self {
            id: row.id,
            lobby_id: row.lobby_id,
            user_id: row.user_id,
            user_name: row.user_name,
            wpm: row.wpm,
            accuracy: row.accuracy,
            time_taken: row.time_taken,
            error_count: row.error_count.max(0) as u32,
            total_characters: row.total_characters.max(0) as u32,
            consistency: row.consistency,
            text_category: row.text_category,
            finished_at: row.finished_at,
        }
    }
}

impl IntoDatabaseError for SqlxError {
    fn any(self) -> DatabaseError {
        DatabaseError::Internal(Box::new(self))
    }

    fn not_found_or(self, resource: &'static str, identifier: &'static str) -> DatabaseError {
        match self {
            SqlxError::RowNotFound => DatabaseError::NotFound {
                resource,
                identifier,
            },
            e => Self::any(e),
        }
    }
}
