use typerace_collab::{
    Collab, CollabEvent, Config, CreateLobby, ErrorKind, FinishedRace, LobbyError, LobbyStatus,
    MemoryDatabase, PlayerStatus, Progress, RaceError, UpdateReason, MAX_LOBBY_CAPACITY,
};

fn collab() -> Collab {
    Collab::new(MemoryDatabase::new(), Config::default())
}

fn public_lobby(max_players: u32) -> CreateLobby {
    CreateLobby {
        name: "Friday race".to_string(),
        max_players,
        is_public: true,
        text_category: "quotes".to_string(),
        text: Some("the quick brown fox jumps over the lazy dog".to_string()),
        player_name: Some("Alice".to_string()),
    }
}

fn finished(wpm: f64) -> FinishedRace {
    FinishedRace {
        wpm,
        accuracy: 97.5,
        time_taken: 12.4,
        error_count: 1,
        total_characters: 43,
        consistency: 88.,
    }
}

#[tokio::test]
async fn full_race_ranks_by_wpm() {
    let collab = collab();

    let ticket = collab
        .lobbies
        .create_lobby("a", public_lobby(4))
        .await
        .unwrap();

    let joined = collab
        .lobbies
        .join_by_code("b", &ticket.join_code.to_lowercase(), "Bob")
        .await
        .unwrap();
    assert_eq!(joined, ticket);

    let lobby = collab.race.start_race("a", ticket.lobby_id).await.unwrap();
    assert_eq!(lobby.status, LobbyStatus::Racing);
    assert!(lobby.countdown_started_at.is_some());

    collab
        .race
        .finish_race("a", ticket.lobby_id, finished(80.))
        .await
        .unwrap();
    assert!(!collab.race.should_end_race(ticket.lobby_id).await.unwrap());

    collab
        .race
        .finish_race("b", ticket.lobby_id, finished(95.))
        .await
        .unwrap();
    assert!(collab.race.should_end_race(ticket.lobby_id).await.unwrap());

    let ended = collab.race.end_race(ticket.lobby_id).await.unwrap();
    assert_eq!(ended.status, LobbyStatus::Finished);
    assert!(!collab.race.should_end_race(ticket.lobby_id).await.unwrap());

    let results = collab
        .results
        .get_results(ticket.lobby_id)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(results.results.len(), 2);
    assert_eq!(results.results[0].text_category, "quotes");

    let ranking = results.ranking();
    assert_eq!(ranking[0].result.user_id, "b");
    assert_eq!(ranking[0].result.user_name, "Bob");
    assert_eq!(ranking[1].result.user_id, "a");
}

#[tokio::test]
async fn quick_play_shares_a_lobby() {
    let collab = collab();

    let first = collab.lobbies.quick_play("a", "Alice", "random").await.unwrap();
    let second = collab.lobbies.quick_play("b", "Bob", "random").await.unwrap();

    assert_eq!(first, second);

    let view = collab
        .lobbies
        .get_lobby("b", first.lobby_id)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(view.lobby.name, "Alice's Race");
    assert_eq!(view.lobby.max_players, 8);
    assert!(view.lobby.is_public);
    assert_eq!(view.lobby.text.split(' ').count(), 40);
    assert_eq!(view.members.len(), 2);
    assert!(!view.is_host);
    assert_eq!(view.current_user_id, "b");
}

#[tokio::test]
async fn quick_play_skips_lobbies_the_caller_is_in() {
    let collab = collab();

    let first = collab.lobbies.quick_play("a", "Alice", "quotes").await.unwrap();
    let again = collab.lobbies.quick_play("a", "Alice", "quotes").await.unwrap();

    assert_ne!(first.lobby_id, again.lobby_id);
}

#[tokio::test]
async fn joining_twice_is_idempotent() {
    let collab = collab();
    let ticket = collab
        .lobbies
        .create_lobby("a", public_lobby(4))
        .await
        .unwrap();

    collab
        .lobbies
        .join_public("b", ticket.lobby_id, "Bob")
        .await
        .unwrap();
    collab
        .lobbies
        .join_by_code("b", &ticket.join_code, "Bob")
        .await
        .unwrap();

    let status = collab
        .lobbies
        .matchmaking_status(ticket.lobby_id)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(status.player_count, 2);
    assert_eq!(status.max_players, 4);
}

#[tokio::test]
async fn join_failures_are_typed() {
    let collab = collab();

    let err = collab
        .lobbies
        .join_by_code("b", "ZZZZ", "Bob")
        .await
        .unwrap_err();
    assert!(matches!(err, LobbyError::InvalidCode));
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = collab.lobbies.join_public("b", 999, "Bob").await.unwrap_err();
    assert!(matches!(err, LobbyError::LobbyNotFound));

    let mut private = public_lobby(2);
    private.is_public = false;
    let private = collab.lobbies.create_lobby("a", private).await.unwrap();

    let err = collab
        .lobbies
        .join_public("b", private.lobby_id, "Bob")
        .await
        .unwrap_err();
    assert!(matches!(err, LobbyError::LobbyPrivate));

    // Private lobbies are still reachable by code
    collab
        .lobbies
        .join_by_code("b", &private.join_code, "Bob")
        .await
        .unwrap();

    let err = collab
        .lobbies
        .join_by_code("c", &private.join_code, "Carol")
        .await
        .unwrap_err();
    assert!(matches!(err, LobbyError::LobbyFull));
    assert_eq!(err.kind(), ErrorKind::CapacityExceeded);

    collab.race.start_race("a", private.lobby_id).await.unwrap();

    let err = collab
        .lobbies
        .join_by_code("b", &private.join_code, "Bob")
        .await
        .unwrap_err();
    assert!(matches!(err, LobbyError::RaceAlreadyStarted));
    assert_eq!(err.kind(), ErrorKind::InvalidState);
}

#[tokio::test]
async fn capacity_out_of_range_is_rejected() {
    let collab = collab();

    for capacity in [0, MAX_LOBBY_CAPACITY + 1, u32::MAX] {
        let err = collab
            .lobbies
            .create_lobby("a", public_lobby(capacity))
            .await
            .unwrap_err();

        assert!(matches!(err, LobbyError::InvalidCapacity));
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    collab
        .lobbies
        .create_lobby("a", public_lobby(MAX_LOBBY_CAPACITY))
        .await
        .unwrap();
}

#[tokio::test]
async fn last_leave_deletes_the_lobby() {
    let collab = collab();
    let events = collab.take_events().unwrap();

    let ticket = collab
        .lobbies
        .create_lobby("a", public_lobby(4))
        .await
        .unwrap();

    let removal = collab.lobbies.leave("a", ticket.lobby_id).await.unwrap();
    assert!(removal.lobby_deleted);

    assert!(collab
        .lobbies
        .get_lobby("a", ticket.lobby_id)
        .await
        .unwrap()
        .is_none());
    assert!(collab
        .results
        .get_results(ticket.lobby_id)
        .await
        .unwrap()
        .is_none());

    // Leaving a lobby that no longer exists is a no-op
    let removal = collab.lobbies.leave("a", ticket.lobby_id).await.unwrap();
    assert!(removal.removed.is_none());

    let emitted: Vec<_> = events.try_iter().collect();
    assert!(matches!(
        emitted.last(),
        Some(CollabEvent::LobbyDeleted { lobby_id }) if *lobby_id == ticket.lobby_id
    ));
}

#[tokio::test]
async fn host_leaving_promotes_earliest_joiner() {
    let collab = collab();
    let ticket = collab
        .lobbies
        .create_lobby("a", public_lobby(4))
        .await
        .unwrap();

    collab
        .lobbies
        .join_public("b", ticket.lobby_id, "Bob")
        .await
        .unwrap();
    collab
        .lobbies
        .join_public("c", ticket.lobby_id, "Carol")
        .await
        .unwrap();
    collab
        .lobbies
        .toggle_ready("b", ticket.lobby_id, false)
        .await
        .unwrap();

    let removal = collab.lobbies.leave("a", ticket.lobby_id).await.unwrap();
    let new_host = removal.new_host.unwrap();
    assert_eq!(new_host.user_id, "b");

    let view = collab
        .lobbies
        .get_lobby("b", ticket.lobby_id)
        .await
        .unwrap()
        .unwrap();

    assert!(view.is_host);
    assert_eq!(view.lobby.host_id, "b");

    let bob = view.members.iter().find(|m| m.user_id == "b").unwrap();
    assert!(bob.is_ready);
    assert_eq!(bob.status, PlayerStatus::Ready);
}

#[tokio::test]
async fn only_the_host_starts_with_enough_players() {
    let collab = collab();
    let ticket = collab
        .lobbies
        .create_lobby("a", public_lobby(4))
        .await
        .unwrap();

    let err = collab
        .race
        .start_race("a", ticket.lobby_id)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RaceError::InsufficientPlayers {
            present: 1,
            required: 2
        }
    ));

    collab
        .lobbies
        .join_public("b", ticket.lobby_id, "Bob")
        .await
        .unwrap();

    let err = collab
        .race
        .start_race("b", ticket.lobby_id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);

    let view = collab
        .lobbies
        .get_lobby("a", ticket.lobby_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(view.lobby.status, LobbyStatus::Waiting);

    collab.race.start_race("a", ticket.lobby_id).await.unwrap();

    let state = collab
        .results
        .get_race_state("a", ticket.lobby_id)
        .await
        .unwrap()
        .unwrap();

    assert!(state
        .members
        .iter()
        .all(|m| m.status == PlayerStatus::Racing && m.progress == 0.));

    let err = collab
        .race
        .start_race("a", ticket.lobby_id)
        .await
        .unwrap_err();
    assert!(matches!(err, RaceError::AlreadyStarted(LobbyStatus::Racing)));

    let err = collab.race.start_race("a", 999).await.unwrap_err();
    assert!(matches!(err, RaceError::LobbyNotFound));
}

#[tokio::test]
async fn progress_is_ignored_outside_a_race() {
    let collab = collab();
    let events = collab.take_events().unwrap();

    let ticket = collab
        .lobbies
        .create_lobby("a", public_lobby(4))
        .await
        .unwrap();
    collab
        .lobbies
        .join_public("b", ticket.lobby_id, "Bob")
        .await
        .unwrap();

    let report = Progress {
        progress: 150.,
        wpm: 60.,
        accuracy: 90.,
    };

    let applied = collab
        .race
        .update_progress("a", ticket.lobby_id, report)
        .await
        .unwrap();
    assert!(!applied);

    // Drain everything emitted so far
    events.try_iter().for_each(drop);

    collab.race.start_race("a", ticket.lobby_id).await.unwrap();
    events.try_iter().for_each(drop);

    assert!(collab
        .race
        .update_progress("a", ticket.lobby_id, report)
        .await
        .unwrap());

    match events.try_recv().unwrap() {
        CollabEvent::LobbyUpdated {
            reason, snapshot, ..
        } => {
            assert_eq!(reason, UpdateReason::Progress);

            let alice = snapshot.members.iter().find(|m| m.user_id == "a").unwrap();
            assert_eq!(alice.progress, 100.);
            assert_eq!(alice.wpm, 60.);
        }
        other => panic!("unexpected event {:?}", other),
    }

    collab
        .race
        .finish_race("a", ticket.lobby_id, finished(61.))
        .await
        .unwrap();
    events.try_iter().for_each(drop);

    let late = collab
        .race
        .update_progress(
            "a",
            ticket.lobby_id,
            Progress {
                progress: 10.,
                wpm: 1.,
                accuracy: 1.,
            },
        )
        .await
        .unwrap();

    assert!(!late);
    assert!(events.try_recv().is_err());

    let state = collab
        .results
        .get_race_state("a", ticket.lobby_id)
        .await
        .unwrap()
        .unwrap();
    let alice = state.members.iter().find(|m| m.user_id == "a").unwrap();
    assert_eq!(alice.progress, 100.);
    assert_eq!(alice.wpm, 61.);
    assert!(alice.finished_at.is_some());
}

#[tokio::test]
async fn public_listing_counts_players() {
    let collab = collab();

    let open = collab
        .lobbies
        .create_lobby("a", public_lobby(4))
        .await
        .unwrap();
    collab
        .lobbies
        .join_public("b", open.lobby_id, "Bob")
        .await
        .unwrap();

    let mut private = public_lobby(4);
    private.is_public = false;
    collab.lobbies.create_lobby("c", private).await.unwrap();

    let newest = collab
        .lobbies
        .create_lobby("d", public_lobby(4))
        .await
        .unwrap();

    let listing = collab.lobbies.public_lobbies().await.unwrap();

    assert_eq!(listing.len(), 2);
    assert_eq!(listing[0].lobby.id, newest.lobby_id);
    assert_eq!(listing[0].player_count, 1);
    assert_eq!(listing[1].lobby.id, open.lobby_id);
    assert_eq!(listing[1].player_count, 2);
}

#[tokio::test]
async fn finishing_requires_membership() {
    let collab = collab();
    let ticket = collab
        .lobbies
        .create_lobby("a", public_lobby(4))
        .await
        .unwrap();

    let err = collab
        .race
        .finish_race("stranger", ticket.lobby_id, finished(50.))
        .await
        .unwrap_err();

    assert!(matches!(err, RaceError::NotMember));
}
