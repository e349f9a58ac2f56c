use axum::{
    extract::{Path, State},
    response::{
        sse::{Event, KeepAlive},
        Sse,
    },
};
use crossbeam::atomic::AtomicCell;
use dashmap::DashMap;
use futures_util::Stream;
use log::{debug, info};
use parking_lot::Mutex;
use serde::Serialize;
use std::{
    collections::VecDeque,
    pin::Pin,
    sync::{Arc, Weak},
    task::{Context, Poll, Waker},
};
use tokio::task::spawn_blocking;
use typerace_collab::{CollabEvent, EventReceiver, LobbySnapshot, PrimaryKey};
use utoipa::ToSchema;

use crate::{
    context::ServerContext,
    errors::{ServerError, ServerResult},
    serialized::{Lobby, LobbyMember, ToSerialized},
};

static CONNECTION_COUNTER: AtomicCell<u64> = AtomicCell::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ConnectionId(u64);

/// Lobby states carry a version, and a stream never delivers a state
/// older than one it already delivered.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "kebab-case", tag = "type")]
pub enum ServerEvent {
    /// The state of the lobby when the stream was opened
    #[serde(rename_all = "camelCase")]
    LobbySnapshot {
        lobby_id: i32,
        version: i64,
        lobby: Lobby,
        players: Vec<LobbyMember>,
    },
    /// The lobby changed
    #[serde(rename_all = "camelCase")]
    LobbyUpdate {
        lobby_id: i32,
        version: i64,
        /// What caused the change, e.g. player-joined or race-started
        reason: String,
        lobby: Lobby,
        players: Vec<LobbyMember>,
    },
    /// The last player left and the lobby is gone
    #[serde(rename_all = "camelCase")]
    LobbyDeleted { lobby_id: i32 },
}

impl ServerEvent {
    fn name(&self) -> &'static str {
        match self {
            Self::LobbySnapshot { .. } => "lobby-snapshot",
            Self::LobbyUpdate { .. } => "lobby-update",
            Self::LobbyDeleted { .. } => "lobby-deleted",
        }
    }

    /// The version of the lobby state this event describes
    fn version(&self) -> Option<i64> {
        match self {
            Self::LobbySnapshot { version, .. } | Self::LobbyUpdate { version, .. } => {
                Some(*version)
            }
            Self::LobbyDeleted { .. } => None,
        }
    }

    fn snapshot(snapshot: &LobbySnapshot) -> Self {
        Self::LobbySnapshot {
            lobby_id: snapshot.lobby.id,
            version: snapshot.lobby.version,
            lobby: snapshot.lobby.to_serialized(),
            players: snapshot.members.to_serialized(),
        }
    }
}

impl From<CollabEvent> for ServerEvent {
    fn from(value: CollabEvent) -> Self {
        match value {
            CollabEvent::LobbyUpdated {
                lobby_id,
                reason,
                snapshot,
            } => Self::LobbyUpdate {
                lobby_id,
                version: snapshot.lobby.version,
                reason: reason.as_str().to_string(),
                lobby: snapshot.lobby.to_serialized(),
                players: snapshot.members.to_serialized(),
            },
            CollabEvent::LobbyDeleted { lobby_id } => Self::LobbyDeleted { lobby_id },
        }
    }
}

/// Manages server sent event connections, grouped by the lobby they watch
pub struct ServerSentEvents {
    me: Weak<Self>,
    connections: DashMap<PrimaryKey, Vec<Connection>>,
}

struct Connection {
    id: ConnectionId,
    mailbox: Arc<Mailbox>,
}

pub struct ConnectionHandle {
    id: ConnectionId,
    lobby_id: PrimaryKey,
    /// A reference to [Connection]'s mailbox
    mailbox: Arc<Mailbox>,
    /// Required to remove connection when dropped
    manager: Weak<ServerSentEvents>,
}

/// Events waiting to be streamed, shared between a [Connection] and its handle
#[derive(Default)]
struct Mailbox {
    pending: Mutex<Pending>,
    waker: Mutex<Option<Waker>>,
}

#[derive(Default)]
struct Pending {
    messages: VecDeque<ServerEvent>,
    /// The newest lobby version queued so far
    version: Option<i64>,
}

impl ServerSentEvents {
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            connections: Default::default(),
        })
    }

    /// Sends an event to everyone watching a lobby
    pub fn broadcast(&self, lobby_id: PrimaryKey, event: ServerEvent) {
        if let Some(connections) = self.connections.get(&lobby_id) {
            for connection in connections.iter() {
                connection.send(event.clone())
            }
        }
    }

    /// Number of open streams for a lobby
    pub fn subscribers(&self, lobby_id: PrimaryKey) -> usize {
        self.connections.get(&lobby_id).map_or(0, |c| c.len())
    }

    /// Subscribes to a lobby. Every event broadcast after this returns reaches the handle.
    fn connect(&self, lobby_id: PrimaryKey) -> ConnectionHandle {
        let connection = Connection::new();
        let handle = connection.handle(lobby_id, self.me.clone());

        self.connections
            .entry(lobby_id)
            .or_default()
            .push(connection);

        handle
    }

    fn disconnect(&self, lobby_id: PrimaryKey, id: ConnectionId) {
        if let Some(mut connections) = self.connections.get_mut(&lobby_id) {
            connections.retain(|c| c.id != id);
        }

        self.connections
            .remove_if(&lobby_id, |_, connections| connections.is_empty());
    }
}

impl Connection {
    fn new() -> Self {
        Self {
            id: ConnectionId(CONNECTION_COUNTER.fetch_add(1)),
            mailbox: Default::default(),
        }
    }

    fn send(&self, message: ServerEvent) {
        self.mailbox.send(message)
    }

    fn handle(&self, lobby_id: PrimaryKey, manager: Weak<ServerSentEvents>) -> ConnectionHandle {
        ConnectionHandle {
            id: self.id,
            lobby_id,
            mailbox: self.mailbox.clone(),
            manager,
        }
    }
}

impl Mailbox {
    fn send(&self, message: ServerEvent) {
        if !self.pending.lock().push(message) {
            return;
        }

        if let Some(waker) = self.waker.lock().take() {
            waker.wake()
        }
    }
}

impl Pending {
    /// Queues a message unless it describes a lobby state that is not newer
    /// than one already queued. Returns true if it was queued.
    fn push(&mut self, message: ServerEvent) -> bool {
        let version = match message.version() {
            Some(version) => version,
            // Nothing can follow a deletion
            None => i64::MAX,
        };

        if self.version.is_some_and(|newest| version <= newest) {
            return false;
        }

        self.version = Some(version);
        self.messages.push_back(message);

        true
    }
}

impl ConnectionHandle {
    /// Queues an event on this stream only
    fn send(&self, message: ServerEvent) {
        self.mailbox.send(message)
    }
}

impl Stream for ConnectionHandle {
    type Item = Result<Event, axum::Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let next_message = self.mailbox.pending.lock().messages.pop_front();

        if let Some(message) = next_message {
            let event = Event::default().event(message.name()).json_data(&message);
            return Poll::Ready(Some(event));
        }

        // Store the waker before checking again, so a send in between isn't missed
        *self.mailbox.waker.lock() = Some(cx.waker().clone());

        let next_message = self.mailbox.pending.lock().messages.pop_front();

        match next_message {
            Some(message) => {
                let event = Event::default().event(message.name()).json_data(&message);
                Poll::Ready(Some(event))
            }
            None => Poll::Pending,
        }
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        if let Some(manager) = self.manager.upgrade() {
            manager.disconnect(self.lobby_id, self.id)
        }
    }
}

/// Forwards collab events to lobby subscribers until the collab system goes away
pub async fn forward_events(receiver: EventReceiver, sse: Arc<ServerSentEvents>) {
    while let Ok(Ok(event)) = {
        let receiver = receiver.clone();
        spawn_blocking(move || receiver.recv()).await
    } {
        let lobby_id = event.lobby_id();

        debug!("Forwarding event for lobby {}", lobby_id);
        sse.broadcast(lobby_id, event.into());
    }

    info!("Collab event channel closed, no longer forwarding events");
}

#[utoipa::path(
    get,
    path = "/v1/lobbies/{id}/events",
    tag = "lobbies",
    params(("id" = i32, Path, description = "Lobby id")),
    responses(
        (
            status = 200,
            content_type = "text/event-stream",
            description = "The current lobby state, followed by every change to it",
            body = ServerEvent
        ),
        (status = 404, description = "Lobby does not exist")
    )
)]
pub(crate) async fn event_stream(
    State(context): State<ServerContext>,
    Path(lobby_id): Path<PrimaryKey>,
) -> ServerResult<Sse<ConnectionHandle>> {
    let handle = subscribe(&context, lobby_id).await?;

    Ok(Sse::new(handle).keep_alive(KeepAlive::default()))
}

/// Subscribes first and reads the snapshot second, so no change can fall in between.
/// Updates already queued that are as new as the snapshot make it redundant.
async fn subscribe(
    context: &ServerContext,
    lobby_id: PrimaryKey,
) -> ServerResult<ConnectionHandle> {
    let handle = context.sse.connect(lobby_id);

    let snapshot = context
        .collab
        .context()
        .snapshot(lobby_id)
        .await?
        .ok_or(ServerError::NotFound { resource: "lobby" })?;

    handle.send(ServerEvent::snapshot(&snapshot));
    Ok(handle)
}
