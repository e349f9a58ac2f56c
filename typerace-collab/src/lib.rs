mod codes;
mod config;
mod db;
mod errors;
mod events;
mod identity;
mod lobbies;
mod race;
mod results;
mod texts;
mod util;

use std::sync::Arc;

use crossbeam::channel::unbounded;
use log::{debug, warn};
use parking_lot::Mutex;

pub use codes::*;
pub use config::*;
pub use db::*;
pub use errors::*;
pub use events::*;
pub use identity::*;
pub use lobbies::*;
pub use race::*;
pub use results::*;
pub use texts::*;

/// The typerace collab system, coordinating lobbies, races, and their results.
pub struct Collab {
    context: CollabContext,
    /// Handed out once, see [Collab::take_events]
    events: Mutex<Option<EventReceiver>>,

    pub lobbies: LobbyManager,
    pub race: RaceManager,
    pub results: ResultsAggregator,
}

/// A type passed to various components of the collab system, to access state and emit events.
#[derive(Clone)]
pub struct CollabContext {
    pub database: Arc<dyn Database>,
    pub config: Arc<Config>,

    event_sender: EventSender,
}

impl Collab {
    pub fn new<Db>(database: Db, config: Config) -> Self
    where
        Db: Database + 'static,
    {
        let (event_sender, events) = unbounded();

        let context = CollabContext {
            database: Arc::new(database),
            config: Arc::new(config),
            event_sender,
        };

        Self {
            lobbies: LobbyManager::new(&context),
            race: RaceManager::new(&context),
            results: ResultsAggregator::new(&context),
            context,
            events: Mutex::new(Some(events)),
        }
    }

    /// Takes the receiving end of every [CollabEvent] emitted by this system.
    ///
    /// Returns None after the first call. Events queue up until the receiver
    /// is taken, and are dropped once it goes away.
    pub fn take_events(&self) -> Option<EventReceiver> {
        self.events.lock().take()
    }

    pub fn context(&self) -> &CollabContext {
        &self.context
    }
}

impl CollabContext {
    pub fn emit(&self, event: CollabEvent) {
        if self.event_sender.send(event).is_err() {
            debug!("Dropped collab event, nobody is listening");
        }
    }

    /// Reads a lobby together with its members.
    /// Returns None if the lobby doesn't exist.
    pub async fn snapshot(&self, lobby_id: PrimaryKey) -> Result<Option<LobbySnapshot>> {
        let Some((lobby, members)) = self.database.lobby_snapshot(lobby_id).await.optional()?
        else {
            return Ok(None);
        };

        // Lobbies are deleted along with their last member
        if members.is_empty() {
            return Ok(None);
        }

        Ok(Some(LobbySnapshot { lobby, members }))
    }

    /// Emits the current state of a lobby to subscribers.
    ///
    /// Concurrent publishes for the same lobby may be emitted out of order,
    /// consumers compare [LobbyData::version] to discard stale snapshots.
    pub async fn publish(&self, lobby_id: PrimaryKey, reason: UpdateReason) {
        match self.snapshot(lobby_id).await {
            Ok(Some(snapshot)) => self.emit(CollabEvent::LobbyUpdated {
                lobby_id,
                reason,
                snapshot,
            }),
            Ok(None) => self.emit(CollabEvent::LobbyDeleted { lobby_id }),
            Err(e) => warn!("Failed to publish update for lobby {}: {}", lobby_id, e),
        }
    }
}
