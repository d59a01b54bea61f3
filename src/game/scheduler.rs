//! Fixed-rate tick loop driving every live match

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::lobby::LobbyRegistry;
use crate::util::time::tick_duration;
use crate::ws::hub::{ConnectionHub, Envelope};
use crate::ws::protocol::{GameId, ServerMsg};

use super::{Game, MatchInput};

/// Client-driven commands queued between two ticks
pub const INPUT_BUFFER: usize = 1024;

/// Commands accepted by the scheduler, applied at the start of the next tick
#[derive(Debug)]
pub enum SchedulerCmd {
    /// Take ownership of a freshly promoted match
    Start(Box<Game>),
    Input { game_id: GameId, input: MatchInput },
    /// Re-send map and state to the match
    Resync(GameId),
    /// Drop a match (player left)
    Remove(GameId),
}

/// Live counters, readable from any thread
#[derive(Debug, Default)]
pub struct SchedulerStats {
    matches: AtomicUsize,
    players: AtomicUsize,
}

/// Cloneable handle for feeding the scheduler.
///
/// Lobby commands (start, remove) are never dropped. Client inputs and
/// resyncs go through a bounded queue and are dropped when it is full.
#[derive(Clone)]
pub struct SchedulerHandle {
    control: mpsc::UnboundedSender<SchedulerCmd>,
    inputs: mpsc::Sender<SchedulerCmd>,
    stats: Arc<SchedulerStats>,
}

impl SchedulerHandle {
    fn send_control(&self, cmd: SchedulerCmd) {
        if self.control.send(cmd).is_err() {
            error!("Match scheduler is not running");
        }
    }

    /// Queue a client command. Returns false if it was dropped.
    fn send_input(&self, cmd: SchedulerCmd) -> bool {
        match self.inputs.try_send(cmd) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Scheduler input queue full, dropping client input");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                error!("Match scheduler is not running");
                false
            }
        }
    }

    pub fn start(&self, game: Game) {
        self.send_control(SchedulerCmd::Start(Box::new(game)));
    }

    pub fn input(&self, game_id: GameId, input: MatchInput) -> bool {
        self.send_input(SchedulerCmd::Input { game_id, input })
    }

    pub fn resync(&self, game_id: GameId) -> bool {
        self.send_input(SchedulerCmd::Resync(game_id))
    }

    pub fn remove(&self, game_id: GameId) {
        self.send_control(SchedulerCmd::Remove(game_id));
    }

    pub fn active_matches(&self) -> usize {
        self.stats.matches.load(Ordering::Relaxed)
    }

    pub fn active_players(&self) -> usize {
        self.stats.players.load(Ordering::Relaxed)
    }
}

/// Owns every running match; nothing else touches simulation state
pub struct MatchScheduler {
    control_rx: mpsc::UnboundedReceiver<SchedulerCmd>,
    input_rx: mpsc::Receiver<SchedulerCmd>,
    matches: HashMap<GameId, Game>,
    hub: Arc<ConnectionHub>,
    lobby: Arc<Mutex<LobbyRegistry>>,
    tick_rate: u32,
    stats: Arc<SchedulerStats>,
}

impl MatchScheduler {
    pub fn new(
        hub: Arc<ConnectionHub>,
        lobby: Arc<Mutex<LobbyRegistry>>,
        tick_rate: u32,
    ) -> (Self, SchedulerHandle) {
        let (control, control_rx) = mpsc::unbounded_channel();
        let (inputs, input_rx) = mpsc::channel(INPUT_BUFFER);
        let stats = Arc::new(SchedulerStats::default());

        let handle = SchedulerHandle {
            control,
            inputs,
            stats: stats.clone(),
        };

        let scheduler = Self {
            control_rx,
            input_rx,
            matches: HashMap::new(),
            hub,
            lobby,
            tick_rate,
            stats,
        };

        (scheduler, handle)
    }

    /// Run the authoritative tick loop until every handle is dropped
    pub async fn run(mut self) {
        info!(tick_rate = self.tick_rate, "Match scheduler started");

        let mut ticker = interval(tick_duration(self.tick_rate));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            if !self.tick(Instant::now()) {
                break;
            }
        }

        info!("Match scheduler stopped");
    }

    /// One scheduler tick: apply queued commands, step every match and
    /// broadcast its snapshot. Returns false once the command channel is
    /// closed and no match is left.
    pub fn tick(&mut self, now: Instant) -> bool {
        let open = self.drain_commands();

        let mut failed = Vec::new();
        for (game_id, game) in self.matches.iter_mut() {
            let stepped = panic::catch_unwind(AssertUnwindSafe(|| {
                game.update(now);
                let mut outbox = game.take_outbox();
                outbox.push(Envelope::players(
                    game.player_ids(),
                    ServerMsg::GameState(game.snapshot()),
                ));
                outbox
            }));

            match stepped {
                Ok(outbox) => self.hub.deliver_all(outbox),
                Err(_) => {
                    error!(game_id = %game_id, "Match update panicked, dropping match");
                    failed.push(*game_id);
                }
            }
        }

        for game_id in failed {
            self.discard(game_id);
        }

        self.refresh_stats();
        open || !self.matches.is_empty()
    }

    /// Apply every pending command, lobby commands first so a match exists
    /// before its inputs arrive. Returns false if all handles are gone.
    fn drain_commands(&mut self) -> bool {
        let open = loop {
            match self.control_rx.try_recv() {
                Ok(cmd) => self.handle_command(cmd),
                Err(mpsc::error::TryRecvError::Empty) => break true,
                Err(mpsc::error::TryRecvError::Disconnected) => break false,
            }
        };

        while let Ok(cmd) = self.input_rx.try_recv() {
            self.handle_command(cmd);
        }

        open
    }

    fn handle_command(&mut self, cmd: SchedulerCmd) {
        match cmd {
            SchedulerCmd::Start(game) => {
                let game_id = game.id();
                info!(game_id = %game_id, round = game.round(), "Match scheduled");
                self.matches.insert(game_id, *game);
            }
            SchedulerCmd::Input { game_id, input } => {
                let Some(game) = self.matches.get_mut(&game_id) else {
                    debug!(game_id = %game_id, "Input for unknown match ignored");
                    return;
                };

                match panic::catch_unwind(AssertUnwindSafe(|| game.apply(input))) {
                    Ok(Ok(())) => {
                        let outbox = game.take_outbox();
                        self.hub.deliver_all(outbox);
                    }
                    Ok(Err(e)) => {
                        debug!(game_id = %game_id, error = %e, "Match input rejected");
                    }
                    Err(_) => {
                        error!(game_id = %game_id, "Match input panicked, dropping match");
                        self.discard(game_id);
                    }
                }
            }
            SchedulerCmd::Resync(game_id) => {
                let Some(game) = self.matches.get_mut(&game_id) else {
                    debug!(game_id = %game_id, "Resync for unknown match ignored");
                    return;
                };

                let players = game.player_ids();
                let map_selected = game.map_selected();
                let state = ServerMsg::GameState(game.snapshot());
                self.hub.deliver_all([
                    Envelope::players(players.clone(), map_selected),
                    Envelope::players(players, state),
                ]);
            }
            SchedulerCmd::Remove(game_id) => {
                if self.matches.remove(&game_id).is_some() {
                    info!(game_id = %game_id, "Match removed from scheduler");
                }
            }
        }
    }

    /// Drop a broken match and tear down its lobby record
    fn discard(&mut self, game_id: GameId) {
        self.matches.remove(&game_id);
        let outcome = self.lobby.lock().discard(game_id);
        self.hub.deliver_all(outcome.messages);
    }

    fn refresh_stats(&self) {
        self.stats.matches.store(self.matches.len(), Ordering::Relaxed);
        let players = self.matches.values().map(|g| g.players().len()).sum();
        self.stats.players.store(players, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::collision::Point;
    use crate::game::GameRules;
    use crate::ws::protocol::GameRef;
    use uuid::Uuid;

    struct Fixture {
        scheduler: MatchScheduler,
        handle: SchedulerHandle,
        hub: Arc<ConnectionHub>,
        lobby: Arc<Mutex<LobbyRegistry>>,
    }

    fn fixture() -> Fixture {
        let hub = Arc::new(ConnectionHub::new());
        let lobby = Arc::new(Mutex::new(LobbyRegistry::new(GameRules::default())));
        let (scheduler, handle) = MatchScheduler::new(hub.clone(), lobby.clone(), 120);
        Fixture {
            scheduler,
            handle,
            hub,
            lobby,
        }
    }

    /// Run the ready-up handshake so the match has a lobby record
    fn promoted_game(lobby: &Mutex<LobbyRegistry>, a: Uuid, b: Uuid) -> Game {
        let mut lobby = lobby.lock();
        lobby.create_game(a).unwrap();
        let game_id = lobby.game_of(&a).unwrap();
        lobby.join_game(GameRef { game_id, player_id: b }).unwrap();
        lobby.player_ready(GameRef { game_id, player_id: a }).unwrap();
        lobby
            .player_ready(GameRef { game_id, player_id: b })
            .unwrap()
            .promoted
            .unwrap()
    }

    fn drain(rx: &mut mpsc::Receiver<ServerMsg>) -> Vec<ServerMsg> {
        let mut msgs = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            msgs.push(msg);
        }
        msgs
    }

    fn started_game(a: Uuid, b: Uuid) -> Game {
        let mut game = Game::new(Uuid::new_v4(), GameRules::default(), 3);
        game.add_player(a).unwrap();
        game.add_player(b).unwrap();
        game
    }

    #[tokio::test]
    async fn broadcasts_state_every_tick() {
        let mut f = fixture();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut rx_a = f.hub.register(a);
        let mut rx_b = f.hub.register(b);

        f.handle.start(started_game(a, b));
        assert!(f.scheduler.tick(Instant::now()));
        assert!(f.scheduler.tick(Instant::now()));

        for rx in [&mut rx_a, &mut rx_b] {
            for _ in 0..2 {
                assert!(matches!(rx.recv().await, Some(ServerMsg::GameState(_))));
            }
        }
        assert_eq!(f.handle.active_matches(), 1);
        assert_eq!(f.handle.active_players(), 2);
    }

    #[tokio::test]
    async fn inputs_apply_at_next_tick() {
        let mut f = fixture();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut rx_a = f.hub.register(a);
        let game = started_game(a, b);
        let game_id = game.id();
        let start = game.player(&a).unwrap().position;
        f.handle.start(game);
        f.scheduler.tick(Instant::now());
        let _ = rx_a.recv().await;

        f.handle.input(
            game_id,
            MatchInput::Move {
                player_id: a,
                movement: Point::new(0.0, 1.0),
            },
        );
        f.scheduler.tick(Instant::now());

        match rx_a.recv().await {
            Some(ServerMsg::GameState(state)) => {
                let me = state.players.iter().find(|p| p.id == a).unwrap();
                assert_eq!(me.y, start.y + 5.0);
            }
            other => panic!("expected gameState, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn resync_sends_map_then_state() {
        let mut f = fixture();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut rx_a = f.hub.register(a);
        let game = started_game(a, b);
        let game_id = game.id();
        f.handle.start(game);
        f.handle.resync(game_id);
        f.scheduler.tick(Instant::now());

        assert!(matches!(rx_a.recv().await, Some(ServerMsg::MapSelected(_))));
        assert!(matches!(rx_a.recv().await, Some(ServerMsg::GameState(_))));
    }

    #[test]
    fn removed_match_stops_ticking() {
        let mut f = fixture();
        let game = started_game(Uuid::new_v4(), Uuid::new_v4());
        let game_id = game.id();
        f.handle.start(game);
        f.scheduler.tick(Instant::now());
        f.handle.remove(game_id);
        f.scheduler.tick(Instant::now());
        assert_eq!(f.handle.active_matches(), 0);
    }

    #[test]
    fn panicking_match_is_dropped_alone() {
        let mut f = fixture();
        let (a, b, c, d) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let mut rx_c = f.hub.register(c);
        let mut rx_a = f.hub.register(a);

        let mut broken = promoted_game(&f.lobby, a, b);
        let broken_id = broken.id();
        broken.break_map_index();
        f.handle.start(broken);
        f.handle.start(started_game(c, d));

        assert!(f.scheduler.tick(Instant::now()));

        assert_eq!(f.handle.active_matches(), 1);
        assert_eq!(f.handle.active_players(), 2);
        assert!(f.lobby.lock().get(&broken_id).is_none());

        let healthy = drain(&mut rx_c);
        assert!(healthy.iter().any(|m| matches!(m, ServerMsg::GameState(_))));
        assert!(healthy.contains(&ServerMsg::GameRemoved(broken_id)));

        let dropped = drain(&mut rx_a);
        assert!(!dropped.iter().any(|m| matches!(m, ServerMsg::GameState(_))));
        assert!(dropped.contains(&ServerMsg::GameRemoved(broken_id)));

        // The healthy match keeps ticking
        assert!(f.scheduler.tick(Instant::now()));
        assert!(matches!(drain(&mut rx_c).as_slice(), [ServerMsg::GameState(_)]));
    }

    #[test]
    fn panicking_input_drops_its_match() {
        let mut f = fixture();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let mut rx_a = f.hub.register(a);

        let mut broken = promoted_game(&f.lobby, a, b);
        let broken_id = broken.id();
        broken.break_map_index();
        f.handle.start(broken);
        f.handle.input(
            broken_id,
            MatchInput::Move {
                player_id: a,
                movement: Point::new(1.0, 0.0),
            },
        );

        f.scheduler.tick(Instant::now());

        assert_eq!(f.handle.active_matches(), 0);
        assert!(f.lobby.lock().is_empty());
        assert!(drain(&mut rx_a).contains(&ServerMsg::GameRemoved(broken_id)));
    }

    #[test]
    fn input_queue_is_bounded() {
        let mut f = fixture();
        let a = Uuid::new_v4();
        let game = started_game(a, Uuid::new_v4());
        let game_id = game.id();
        f.handle.start(game);

        let nudge = || MatchInput::Move {
            player_id: a,
            movement: Point::new(0.0, 0.0),
        };
        for _ in 0..INPUT_BUFFER {
            assert!(f.handle.input(game_id, nudge()));
        }
        assert!(!f.handle.input(game_id, nudge()));
        assert!(!f.handle.resync(game_id));

        // Lobby commands still get through while inputs are full
        f.handle.remove(game_id);
        f.scheduler.tick(Instant::now());
        assert_eq!(f.handle.active_matches(), 0);
        assert!(f.handle.input(game_id, nudge()));
    }

    #[test]
    fn stops_once_handles_are_gone() {
        let Fixture {
            mut scheduler,
            handle,
            ..
        } = fixture();
        drop(handle);
        assert!(!scheduler.tick(Instant::now()));
    }
}
