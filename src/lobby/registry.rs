//! Lobby registry - pre-match records, ready-room handshake and promotion
//!
//! Every operation returns the messages it wants delivered instead of
//! sending them, so the registry can sit behind a single lock and be tested
//! without sockets.

use std::collections::BTreeMap;

use tracing::info;
use uuid::Uuid;

use crate::game::{Game, GameRules};
use crate::ws::hub::Envelope;
use crate::ws::protocol::{GameId, GameRef, LobbyGame, PlayerId, ReadyMap, ServerMsg};

/// Players per game
const GAME_SIZE: usize = 2;

/// Rejected lobby requests. These are logged and dropped, the client gets
/// no error frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LobbyError {
    #[error("game {0} does not exist")]
    UnknownGame(GameId),

    #[error("game {0} is full")]
    GameFull(GameId),

    #[error("player {0} is already in a game")]
    AlreadyInGame(PlayerId),

    #[error("player {0} did not create game {1}")]
    NotCreator(PlayerId, GameId),

    #[error("player {0} is not in game {1}")]
    NotMember(PlayerId, GameId),

    #[error("game {0} has already started")]
    AlreadyStarted(GameId),

    #[error("game {0} is waiting for a second player")]
    WaitingForOpponent(GameId),
}

/// Side effects of a lobby operation
#[derive(Debug, Default)]
pub struct LobbyOutcome {
    /// Messages to deliver, in order
    pub messages: Vec<Envelope>,
    /// Match created by the ready-up handshake, to hand to the scheduler
    pub promoted: Option<Game>,
    /// Running match that must stop
    pub teardown: Option<GameId>,
}

impl LobbyOutcome {
    fn with(messages: Vec<Envelope>) -> Self {
        Self {
            messages,
            ..Self::default()
        }
    }
}

/// All lobby records, open and promoted
pub struct LobbyRegistry {
    games: BTreeMap<GameId, LobbyGame>,
    rules: GameRules,
}

/// Look up a record that has not been promoted yet
fn open_game(
    games: &mut BTreeMap<GameId, LobbyGame>,
    game_id: GameId,
) -> Result<&mut LobbyGame, LobbyError> {
    let game = games
        .get_mut(&game_id)
        .ok_or(LobbyError::UnknownGame(game_id))?;
    if game.started {
        return Err(LobbyError::AlreadyStarted(game_id));
    }
    Ok(game)
}

impl LobbyRegistry {
    pub fn new(rules: GameRules) -> Self {
        Self {
            games: BTreeMap::new(),
            rules,
        }
    }

    pub fn len(&self) -> usize {
        self.games.len()
    }

    /// Record the player currently belongs to, open or promoted
    pub fn game_of(&self, player_id: &PlayerId) -> Option<GameId> {
        self.games
            .values()
            .find(|g| g.players.contains(player_id))
            .map(|g| g.id)
    }

    /// Open a new game owned by `creator` and put them in the ready room
    pub fn create_game(&mut self, creator: PlayerId) -> Result<LobbyOutcome, LobbyError> {
        if self.game_of(&creator).is_some() {
            return Err(LobbyError::AlreadyInGame(creator));
        }

        let game = LobbyGame {
            id: Uuid::new_v4(),
            creator,
            players: vec![creator],
            started: false,
            ready: ReadyMap::new(),
        };
        self.games.insert(game.id, game.clone());

        info!(game_id = %game.id, creator = %creator, "Lobby game created");

        Ok(LobbyOutcome::with(vec![
            Envelope::everyone(ServerMsg::GameCreated(game.clone())),
            Envelope::player(creator, ServerMsg::EnterReadyRoom(game)),
        ]))
    }

    /// Snapshot of every record for the requesting client
    pub fn current_games(&self, requester: PlayerId) -> LobbyOutcome {
        LobbyOutcome::with(vec![Envelope::player(
            requester,
            ServerMsg::CurrentGames(self.games.clone()),
        )])
    }

    /// Delete an open game; only its creator may do this
    pub fn remove_game(&mut self, req: GameRef) -> Result<LobbyOutcome, LobbyError> {
        let game = open_game(&mut self.games, req.game_id)?;
        if game.creator != req.player_id {
            return Err(LobbyError::NotCreator(req.player_id, req.game_id));
        }

        let others: Vec<PlayerId> = game
            .players
            .iter()
            .copied()
            .filter(|p| *p != req.player_id)
            .collect();
        self.games.remove(&req.game_id);

        info!(game_id = %req.game_id, "Lobby game removed by creator");

        let mut messages = Vec::new();
        if !others.is_empty() {
            messages.push(Envelope::players(others, ServerMsg::ReadyRoomAborted));
        }
        messages.push(Envelope::everyone(ServerMsg::GameRemoved(req.game_id)));
        Ok(LobbyOutcome::with(messages))
    }

    /// Take the second seat; a full game moves both players to the ready room
    pub fn join_game(&mut self, req: GameRef) -> Result<LobbyOutcome, LobbyError> {
        if self.game_of(&req.player_id).is_some() {
            return Err(LobbyError::AlreadyInGame(req.player_id));
        }

        let game = self
            .games
            .get_mut(&req.game_id)
            .ok_or(LobbyError::UnknownGame(req.game_id))?;
        if game.started || game.players.len() >= GAME_SIZE {
            return Err(LobbyError::GameFull(req.game_id));
        }

        game.players.push(req.player_id);
        let mut messages = vec![Envelope::everyone(ServerMsg::GameJoined(game.clone()))];

        if game.players.len() == GAME_SIZE {
            game.ready = game.players.iter().map(|p| (*p, false)).collect();
            messages.push(Envelope::players(
                game.players.clone(),
                ServerMsg::EnterReadyRoom(game.clone()),
            ));
            info!(game_id = %game.id, "Ready room full");
        }

        Ok(LobbyOutcome::with(messages))
    }

    pub fn player_ready(&mut self, req: GameRef) -> Result<LobbyOutcome, LobbyError> {
        self.set_ready(req, true)
    }

    pub fn player_unready(&mut self, req: GameRef) -> Result<LobbyOutcome, LobbyError> {
        self.set_ready(req, false)
    }

    fn set_ready(&mut self, req: GameRef, ready: bool) -> Result<LobbyOutcome, LobbyError> {
        let rules = self.rules;
        let game = open_game(&mut self.games, req.game_id)?;
        if !game.players.contains(&req.player_id) {
            return Err(LobbyError::NotMember(req.player_id, req.game_id));
        }
        if game.players.len() < GAME_SIZE {
            return Err(LobbyError::WaitingForOpponent(req.game_id));
        }

        game.ready.insert(req.player_id, ready);
        let mut outcome = LobbyOutcome::with(vec![Envelope::players(
            game.players.clone(),
            ServerMsg::ReadyStateUpdated(game.ready.clone()),
        )]);

        if ready && game.ready.values().all(|r| *r) {
            let mut sim = Game::new(game.id, rules, rand::random());
            for player_id in &game.players {
                sim.add_player(*player_id)
                    .map_err(|_| LobbyError::GameFull(game.id))?;
            }
            game.started = true;

            info!(game_id = %game.id, "Both players ready, match starting");

            let players = game.players.clone();
            outcome.messages.extend([
                Envelope::players(players.clone(), ServerMsg::StartGame(game.clone())),
                Envelope::players(players.clone(), sim.map_selected()),
                Envelope::players(players, ServerMsg::GameState(sim.snapshot())),
            ]);
            outcome.promoted = Some(sim);
        }

        Ok(outcome)
    }

    /// Leave the ready room before the match starts
    pub fn leave_ready_room(&mut self, req: GameRef) -> Result<LobbyOutcome, LobbyError> {
        let game = open_game(&mut self.games, req.game_id)?;
        if !game.players.contains(&req.player_id) {
            return Err(LobbyError::NotMember(req.player_id, req.game_id));
        }
        Ok(self.leave(req.game_id, req.player_id))
    }

    /// Drop `player_id` from an open record. The creator leaving (or the last
    /// player) removes the record; otherwise it is joinable again.
    fn leave(&mut self, game_id: GameId, player_id: PlayerId) -> LobbyOutcome {
        let Some(game) = self.games.get_mut(&game_id) else {
            return LobbyOutcome::default();
        };

        game.players.retain(|p| *p != player_id);
        game.ready.clear();

        let mut messages = Vec::new();
        if !game.players.is_empty() {
            messages.push(Envelope::players(
                game.players.clone(),
                ServerMsg::ReadyRoomAborted,
            ));
        }

        if game.players.is_empty() || game.creator == player_id {
            self.games.remove(&game_id);
            info!(game_id = %game_id, player_id = %player_id, "Lobby game closed");
            messages.push(Envelope::everyone(ServerMsg::GameRemoved(game_id)));
        } else {
            info!(game_id = %game_id, player_id = %player_id, "Player left ready room");
            messages.push(Envelope::everyone(ServerMsg::GameJoined(game.clone())));
        }

        LobbyOutcome::with(messages)
    }

    /// Tear down whatever the disconnected player was part of
    pub fn disconnect(&mut self, player_id: PlayerId) -> LobbyOutcome {
        let Some(game_id) = self.game_of(&player_id) else {
            return LobbyOutcome::default();
        };

        let Some(game) = self.games.get(&game_id) else {
            return LobbyOutcome::default();
        };
        if !game.started {
            return self.leave(game_id, player_id);
        }

        let remaining: Vec<PlayerId> = game
            .players
            .iter()
            .copied()
            .filter(|p| *p != player_id)
            .collect();
        self.games.remove(&game_id);

        info!(game_id = %game_id, player_id = %player_id, "Player disconnected mid-match");

        let mut messages = Vec::new();
        if !remaining.is_empty() {
            messages.push(Envelope::players(
                remaining,
                ServerMsg::PlayerDisconnected(player_id),
            ));
        }
        messages.push(Envelope::everyone(ServerMsg::GameRemoved(game_id)));

        LobbyOutcome {
            messages,
            promoted: None,
            teardown: Some(game_id),
        }
    }

    /// Forget a record whose match was dropped by the scheduler
    pub fn discard(&mut self, game_id: GameId) -> LobbyOutcome {
        match self.games.remove(&game_id) {
            Some(_) => LobbyOutcome::with(vec![Envelope::everyone(ServerMsg::GameRemoved(
                game_id,
            ))]),
            None => LobbyOutcome::default(),
        }
    }
}

#[cfg(test)]
impl LobbyRegistry {
    pub fn get(&self, game_id: &GameId) -> Option<&LobbyGame> {
        self.games.get(game_id)
    }

    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }
}
