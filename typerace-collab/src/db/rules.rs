//! Admission and transition rules shared by every [Database](super::Database) implementation.
//!
//! Backends load a consistent snapshot of a lobby inside their transaction,
//! ask these functions what to do, and apply the answer before committing.

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::{JoinGuard, LobbyData, LobbyStatus, MemberData, PlayerStatus, RaceStart};

/// Why a member could not be inserted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum JoinRejection {
    #[error("Race already started")]
    NotWaiting,
    #[error("Lobby is private")]
    Private,
    #[error("Lobby is full")]
    Full,
}

/// A successful admission check
#[derive(Debug, PartialEq)]
pub enum Admission<'a> {
    /// Insert a new member
    Admit,
    /// The user is already a member, so joining again is a no-op
    AlreadyMember(&'a MemberData),
}

/// Decides whether `user_id` may join `lobby`, given its current members.
pub fn admit<'a>(
    lobby: &LobbyData,
    members: &'a [MemberData],
    user_id: &str,
    guard: JoinGuard,
) -> Result<Admission<'a>, JoinRejection> {
    if lobby.status != LobbyStatus::Waiting {
        return Err(JoinRejection::NotWaiting);
    }

    if guard.require_public && !lobby.is_public {
        return Err(JoinRejection::Private);
    }

    if let Some(existing) = members.iter().find(|m| m.user_id == user_id) {
        return Ok(Admission::AlreadyMember(existing));
    }

    if members.len() >= lobby.max_players as usize {
        return Err(JoinRejection::Full);
    }

    Ok(Admission::Admit)
}

/// Returns the reason a race cannot start, or None if it can
pub fn refuse_start(
    lobby: &LobbyData,
    members: &[MemberData],
    user_id: &str,
    min_players: usize,
) -> Option<RaceStart> {
    if lobby.host_id != user_id {
        return Some(RaceStart::NotHost);
    }

    if lobby.status != LobbyStatus::Waiting {
        return Some(RaceStart::AlreadyStarted(lobby.status));
    }

    if members.len() < min_players {
        return Some(RaceStart::NotEnoughPlayers {
            present: members.len(),
        });
    }

    None
}

/// The member that takes over when the host leaves: whoever joined first.
/// Ties on the join timestamp fall back to insertion order.
pub fn next_host(members: &[MemberData]) -> Option<&MemberData> {
    members.iter().min_by_key(|m| (m.joined_at, m.id))
}

/// Applies host promotion to a member.
/// The new host is always ready, but a racing or finished status is kept
/// instead of being reset to ready, so promotion mid-race never pulls a
/// member out of the race.
pub fn promote(member: &mut MemberData) {
    member.is_ready = true;

    if matches!(member.status, PlayerStatus::Waiting | PlayerStatus::Ready) {
        member.status = PlayerStatus::Ready;
    }
}

/// Resets a member's live metrics as the race starts
pub fn enter_race(member: &mut MemberData) {
    member.status = PlayerStatus::Racing;
    member.progress = 0.;
    member.wpm = 0.;
    member.accuracy = 0.;
}

/// Marks a member finished with their final metrics
pub fn finish(member: &mut MemberData, wpm: f64, accuracy: f64, now: DateTime<Utc>) {
    member.status = PlayerStatus::Finished;
    member.progress = 100.;
    member.wpm = wpm;
    member.accuracy = accuracy;
    member.finished_at = Some(now);
}

/// Clamps reported progress into 0..=100
pub fn clamp_progress(progress: f64) -> f64 {
    if progress.is_nan() {
        return 0.;
    }

    progress.clamp(0., 100.)
}

/// True if the lobby is racing and every member has finished
pub fn race_complete(lobby: &LobbyData, members: &[MemberData]) -> bool {
    lobby.status == LobbyStatus::Racing && members.iter().all(MemberData::is_finished)
}

#[cfg(test)]
pub(crate) mod test {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::{LobbyData, LobbyStatus, MemberData, PlayerStatus};

    pub fn lobby(max_players: u32) -> LobbyData {
        LobbyData {
            id: 1,
            name: "test".to_string(),
            host_id: "host".to_string(),
            status: LobbyStatus::Waiting,
            text: "the quick brown fox".to_string(),
            text_category: "quotes".to_string(),
            max_players,
            is_public: true,
            join_code: "AB12".to_string(),
            countdown_started_at: None,
            created_at: Utc::now(),
            version: 1,
        }
    }

    pub fn member(id: i32, user_id: &str) -> MemberData {
        MemberData {
            id,
            lobby_id: 1,
            user_id: user_id.to_string(),
            name: user_id.to_string(),
            is_ready: true,
            status: PlayerStatus::Ready,
            progress: 0.,
            wpm: 0.,
            accuracy: 0.,
            joined_at: Utc::now() + Duration::seconds(id as i64),
            finished_at: None,
        }
    }

    #[test]
    fn admission_checks_state_before_membership() {
        let mut lobby = lobby(2);
        let members = vec![member(1, "host")];

        lobby.status = LobbyStatus::Racing;
        assert_eq!(
            admit(&lobby, &members, "host", JoinGuard::default()),
            Err(JoinRejection::NotWaiting)
        );

        lobby.status = LobbyStatus::Waiting;
        lobby.is_public = false;
        assert_eq!(
            admit(&lobby, &members, "host", JoinGuard { require_public: true }),
            Err(JoinRejection::Private)
        );
        assert_eq!(
            admit(&lobby, &members, "host", JoinGuard::default()),
            Ok(Admission::AlreadyMember(&members[0]))
        );
    }

    #[test]
    fn admission_respects_capacity() {
        let lobby = lobby(2);
        let mut members = vec![member(1, "host")];

        assert_eq!(
            admit(&lobby, &members, "bob", JoinGuard::default()),
            Ok(Admission::Admit)
        );

        members.push(member(2, "bob"));
        assert_eq!(
            admit(&lobby, &members, "carol", JoinGuard::default()),
            Err(JoinRejection::Full)
        );
        // A full lobby still lets existing members re-join
        assert!(matches!(
            admit(&lobby, &members, "bob", JoinGuard::default()),
            Ok(Admission::AlreadyMember(_))
        ));
    }

    #[test]
    fn start_refusals() {
        let lobby = lobby(4);
        let members = vec![member(1, "host")];

        assert_eq!(
            refuse_start(&lobby, &members, "bob", 2),
            Some(RaceStart::NotHost)
        );
        assert_eq!(
            refuse_start(&lobby, &members, "host", 2),
            Some(RaceStart::NotEnoughPlayers { present: 1 })
        );

        let members = vec![member(1, "host"), member(2, "bob")];
        assert_eq!(refuse_start(&lobby, &members, "host", 2), None);
    }

    #[test]
    fn next_host_is_earliest_joiner() {
        let mut early = member(5, "early");
        early.joined_at = Utc::now() - Duration::minutes(5);

        let members = vec![member(2, "a"), early.clone(), member(3, "b")];
        assert_eq!(next_host(&members), Some(&early));
        assert_eq!(next_host(&[]), None);
    }

    #[test]
    fn promotion_keeps_race_status() {
        let mut waiting = member(1, "a");
        waiting.is_ready = false;
        waiting.status = PlayerStatus::Waiting;
        promote(&mut waiting);
        assert!(waiting.is_ready);
        assert_eq!(waiting.status, PlayerStatus::Ready);

        let mut racing = member(2, "b");
        racing.status = PlayerStatus::Racing;
        promote(&mut racing);
        assert_eq!(racing.status, PlayerStatus::Racing);
    }

    #[test]
    fn progress_is_clamped() {
        assert_eq!(clamp_progress(-4.), 0.);
        assert_eq!(clamp_progress(42.5), 42.5);
        assert_eq!(clamp_progress(250.), 100.);
        assert_eq!(clamp_progress(f64::NAN), 0.);
    }

    #[test]
    fn race_completion_requires_racing_lobby() {
        let mut lobby = lobby(4);
        let mut members = vec![member(1, "host"), member(2, "bob")];

        for m in members.iter_mut() {
            m.status = PlayerStatus::Finished;
        }

        assert!(!race_complete(&lobby, &members));

        lobby.status = LobbyStatus::Racing;
        assert!(race_complete(&lobby, &members));

        members[1].status = PlayerStatus::Racing;
        assert!(!race_complete(&lobby, &members));
    }
}
