//! Application state shared across routes

use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::Config;
use crate::game::{MatchScheduler, SchedulerHandle};
use crate::lobby::{LobbyOutcome, LobbyRegistry};
use crate::ws::hub::ConnectionHub;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub hub: Arc<ConnectionHub>,
    pub lobby: Arc<Mutex<LobbyRegistry>>,
    pub scheduler: SchedulerHandle,
}

impl AppState {
    /// Build the shared state. The returned scheduler must be spawned by the caller.
    pub fn new(config: Config) -> (Self, MatchScheduler) {
        let config = Arc::new(config);

        let hub = Arc::new(ConnectionHub::new());
        let lobby = Arc::new(Mutex::new(LobbyRegistry::new(config.rules)));

        let (scheduler, handle) = MatchScheduler::new(hub.clone(), lobby.clone(), config.tick_rate);

        let state = Self {
            config,
            hub,
            lobby,
            scheduler: handle,
        };

        (state, scheduler)
    }

    /// Carry out the side effects of a lobby operation.
    ///
    /// Messages go out before the promoted match is handed over, so clients
    /// see `startGame` ahead of the first tick's `gameState`.
    pub fn apply(&self, outcome: LobbyOutcome) {
        self.hub.deliver_all(outcome.messages);

        if let Some(game) = outcome.promoted {
            self.scheduler.start(game);
        }
        if let Some(game_id) = outcome.teardown {
            self.scheduler.remove(game_id);
        }
    }
}
