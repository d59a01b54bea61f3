//! Match state and round lifecycle

use std::collections::HashMap;
use std::time::Instant;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};
use uuid::Uuid;

use crate::ws::hub::Envelope;
use crate::ws::protocol::{
    GameId, GameSnapshot, MapSelected, MatchEnded, PlayerHit, PlayerId, RoundEnded, ScoreEntry,
    ServerMsg,
};

use super::collision::{distance, resolve_obstacle_collision, Point};
use super::maps::{self, GameMap};
use super::projectile::{Advance, Projectile};
use super::snapshot::SnapshotBuilder;
use super::{
    GameRules, MatchInput, ARENA_HEIGHT, ARENA_WIDTH, PLAYER_HEIGHT, PLAYER_SPEED, PLAYER_WIDTH,
};

/// Fixed role of a player for the whole match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    First,
    Second,
}

impl Slot {
    pub fn index(self) -> usize {
        match self {
            Slot::First => 0,
            Slot::Second => 1,
        }
    }
}

/// Player state in a match (authoritative)
#[derive(Debug, Clone)]
pub struct PlayerState {
    pub id: PlayerId,
    pub position: Point,
    pub lives: u32,
    /// Rounds won in the current match
    pub score: u32,
    pub slot: Slot,
}

/// Match errors; callers log them and move on
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MatchError {
    #[error("player {0} is not in this match")]
    UnknownPlayer(PlayerId),

    #[error("match already has two players")]
    Full,

    #[error("projectile path is empty")]
    EmptyPath,
}

/// The authoritative duel between two players
pub struct Game {
    id: GameId,
    rules: GameRules,
    /// Ordered by slot
    players: Vec<PlayerState>,
    projectiles: Vec<Projectile>,
    /// Bursts since the last snapshot
    explosions: Vec<Point>,
    /// Player -> end of their invincibility window
    invincible: HashMap<PlayerId, Instant>,
    /// Map order for this match, shuffled once
    rotation: Vec<GameMap>,
    map_index: usize,
    /// 1-based
    round: u32,
    outbox: Vec<Envelope>,
}

impl std::fmt::Debug for Game {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Game")
            .field("id", &self.id)
            .field("round", &self.round)
            .field("map", &self.current_map().id)
            .field("players", &self.players.len())
            .finish()
    }
}

impl Game {
    /// Create a match whose map rotation is shuffled from `seed`
    pub fn new(id: GameId, rules: GameRules, seed: u64) -> Self {
        let mut rotation = maps::catalog();
        rotation.shuffle(&mut ChaCha8Rng::seed_from_u64(seed));
        if rotation.is_empty() {
            rotation.push(GameMap::legacy());
        }

        info!(
            game_id = %id,
            rounds = rules.rounds_per_match,
            maps = rotation.len(),
            first_map = rotation[0].id,
            "Match created"
        );

        Self {
            id,
            rules,
            players: Vec::with_capacity(2),
            projectiles: Vec::new(),
            explosions: Vec::new(),
            invincible: HashMap::new(),
            rotation,
            map_index: 0,
            round: 1,
            outbox: Vec::new(),
        }
    }

    pub fn id(&self) -> GameId {
        self.id
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn current_map(&self) -> &GameMap {
        &self.rotation[self.map_index]
    }

    pub fn players(&self) -> &[PlayerState] {
        &self.players
    }

    pub fn player(&self, id: &PlayerId) -> Option<&PlayerState> {
        self.players.iter().find(|p| &p.id == id)
    }

    pub fn player_ids(&self) -> Vec<PlayerId> {
        self.players.iter().map(|p| p.id).collect()
    }

    /// Messages produced since the last call
    pub fn take_outbox(&mut self) -> Vec<Envelope> {
        std::mem::take(&mut self.outbox)
    }

    fn emit_to_match(&mut self, msg: ServerMsg) {
        let ids = self.player_ids();
        self.outbox.push(Envelope::players(ids, msg));
    }

    fn emit_to_player(&mut self, player_id: PlayerId, msg: ServerMsg) {
        self.outbox.push(Envelope::player(player_id, msg));
    }

    fn spawn_point(&self, slot: Slot) -> Point {
        self.current_map().spawn_point(slot.index())
    }

    /// Add a player; the first to join takes the first slot
    pub fn add_player(&mut self, id: PlayerId) -> Result<Slot, MatchError> {
        let slot = match self.players.len() {
            0 => Slot::First,
            1 => Slot::Second,
            _ => return Err(MatchError::Full),
        };

        self.players.push(PlayerState {
            id,
            position: self.spawn_point(slot),
            lives: self.rules.max_lives,
            score: 0,
            slot,
        });
        Ok(slot)
    }

    /// Apply one movement intent, clamped to the arena and pushed out of
    /// barriers and nets. Other players do not block movement.
    pub fn move_player(&mut self, id: &PlayerId, intent: Point) -> Result<(), MatchError> {
        let idx = self
            .players
            .iter()
            .position(|p| &p.id == id)
            .ok_or(MatchError::UnknownPlayer(*id))?;

        let current = self.players[idx].position;
        let desired = Point::new(
            (current.x + intent.x * PLAYER_SPEED)
                .clamp(PLAYER_WIDTH / 2.0, ARENA_WIDTH - PLAYER_WIDTH / 2.0),
            (current.y + intent.y * PLAYER_SPEED)
                .clamp(PLAYER_HEIGHT / 2.0, ARENA_HEIGHT - PLAYER_HEIGHT / 2.0),
        );

        let resolved = resolve_obstacle_collision(
            current,
            desired,
            self.current_map().player_blockers(),
            PLAYER_WIDTH,
            PLAYER_HEIGHT,
        );
        self.players[idx].position = resolved;
        Ok(())
    }

    /// Launch a projectile along a client path. The path is cut at the first
    /// segment that touches a barrier; nets do not cut it.
    pub fn add_projectile(
        &mut self,
        shooter_id: &PlayerId,
        path: &[Point],
    ) -> Result<Uuid, MatchError> {
        let shooter = self
            .player(shooter_id)
            .ok_or(MatchError::UnknownPlayer(*shooter_id))?;
        let is_second_player = shooter.slot == Slot::Second;

        let projectile = Projectile::new(
            *shooter_id,
            is_second_player,
            path,
            self.current_map().projectile_blockers(),
        )
        .ok_or(MatchError::EmptyPath)?;

        if projectile.terminates_early() {
            debug!(
                game_id = %self.id,
                projectile_id = %projectile.id,
                kept = projectile.path().len(),
                submitted = path.len(),
                "Projectile path cut by barrier"
            );
        }

        let id = projectile.id;
        let view = projectile.view();
        self.projectiles.push(projectile);
        self.emit_to_match(ServerMsg::NewProjectile(view));
        Ok(id)
    }

    /// Apply a client-reported projectile vs projectile collision as given
    pub fn resolve_projectile_collision(&mut self, first: Uuid, second: Uuid, at: Point) {
        self.projectiles.retain(|p| p.id != first && p.id != second);
        self.explosions.push(at);
    }

    /// Apply a queued client request
    pub fn apply(&mut self, input: MatchInput) -> Result<(), MatchError> {
        match input {
            MatchInput::Move {
                player_id,
                movement,
            } => self.move_player(&player_id, movement),
            MatchInput::Shoot { player_id, path } => {
                self.add_projectile(&player_id, &path).map(|_| ())
            }
            MatchInput::ProjectileCollision {
                projectile1_id,
                projectile2_id,
                at,
            } => {
                self.resolve_projectile_collision(projectile1_id, projectile2_id, at);
                Ok(())
            }
        }
    }

    /// Advance the simulation by one tick
    pub fn update(&mut self, now: Instant) {
        self.advance_projectiles();
        self.check_hits(now);
        self.expire_invincibility(now);
    }

    fn advance_projectiles(&mut self) {
        let explosions = &mut self.explosions;
        self.projectiles.retain_mut(|p| match p.advance() {
            Advance::Moved => true,
            Advance::Burst(at) => {
                explosions.push(at);
                false
            }
        });
    }

    fn check_hits(&mut self, now: Instant) {
        let hit_radius = PLAYER_WIDTH / 2.0;

        for idx in 0..self.players.len() {
            let player_id = self.players[idx].id;
            if self.invincible.contains_key(&player_id) {
                continue;
            }

            let position = self.players[idx].position;
            let Some(hit) = self.projectiles.iter().position(|p| {
                p.shooter_id != player_id && distance(position, p.position()) < hit_radius
            }) else {
                continue;
            };

            let projectile = self.projectiles.remove(hit);
            self.explosions.push(projectile.position());

            let player = &mut self.players[idx];
            player.lives = player.lives.saturating_sub(1);
            let lives = player.lives;

            self.invincible
                .insert(player_id, now + self.rules.invincibility);
            self.emit_to_player(player_id, ServerMsg::PlayerHit(PlayerHit { player_id }));

            debug!(game_id = %self.id, player_id = %player_id, lives, "Player hit");

            if lives == 0 {
                self.end_round(&player_id);
                return;
            }
        }
    }

    fn expire_invincibility(&mut self, now: Instant) {
        let mut expired: Vec<PlayerId> = self
            .invincible
            .iter()
            .filter(|(_, until)| now >= **until)
            .map(|(id, _)| *id)
            .collect();
        expired.sort_unstable();

        for player_id in expired {
            self.invincible.remove(&player_id);
            self.emit_to_player(player_id, ServerMsg::InvincibilityEnded(Some(player_id)));
        }
    }

    /// Finish the round lost by `loser`: score the survivor, then either move
    /// to the next map or close the match and start a fresh one.
    pub fn end_round(&mut self, loser: &PlayerId) {
        for player in self.players.iter_mut().filter(|p| &p.id != loser) {
            player.score += 1;
        }

        if self.round < self.rules.rounds_per_match {
            self.round += 1;
            self.map_index = (self.map_index + 1) % self.rotation.len();
            self.reset_for_next_round(false);

            info!(
                game_id = %self.id,
                next_round = self.round,
                next_map = self.current_map().id,
                "Round ended"
            );

            let map = self.current_map().clone();
            self.emit_to_match(ServerMsg::RoundEnded(RoundEnded {
                round: self.round - 1,
                next_round: self.round,
                map,
            }));
            let selected = self.map_selected();
            self.emit_to_match(selected);
        } else {
            let scores: Vec<ScoreEntry> = self
                .players
                .iter()
                .map(|p| ScoreEntry {
                    id: p.id,
                    score: p.score,
                })
                .collect();
            let winner_id = self.winner();

            info!(
                game_id = %self.id,
                winner = ?winner_id,
                "Match ended, starting a new one"
            );

            self.emit_to_match(ServerMsg::MatchEnded(MatchEnded {
                total_rounds: self.rules.rounds_per_match,
                winner_id,
                scores,
            }));

            self.round = 1;
            self.map_index = 0;
            self.reset_for_next_round(true);
            let selected = self.map_selected();
            self.emit_to_match(selected);
        }

        self.emit_to_match(ServerMsg::PointScored);
    }

    /// Highest score; ties go to the earlier slot
    fn winner(&self) -> Option<PlayerId> {
        self.players
            .iter()
            .fold(None::<&PlayerState>, |best, p| match best {
                Some(b) if b.score >= p.score => Some(b),
                _ => Some(p),
            })
            .map(|p| p.id)
    }

    fn reset_for_next_round(&mut self, reset_scores: bool) {
        let max_lives = self.rules.max_lives;
        let spawns = [self.spawn_point(Slot::First), self.spawn_point(Slot::Second)];

        for player in &mut self.players {
            player.lives = max_lives;
            if reset_scores {
                player.score = 0;
            }
            player.position = spawns[player.slot.index()];
        }
        self.projectiles.clear();
        self.invincible.clear();
    }

    /// Current state for broadcast. Drains the explosion queue, so a second
    /// call in the same tick reports no explosions.
    pub fn snapshot(&mut self) -> GameSnapshot {
        let explosions = std::mem::take(&mut self.explosions);
        SnapshotBuilder {
            players: &self.players,
            invincible: &self.invincible,
            projectiles: &self.projectiles,
            round: self.round,
            map: self.current_map(),
        }
        .build(explosions)
    }

    /// `mapSelected` for the current round and map
    pub fn map_selected(&self) -> ServerMsg {
        ServerMsg::MapSelected(MapSelected {
            round: self.round,
            map: self.current_map().clone(),
        })
    }
}

#[cfg(test)]
impl Game {
    pub fn rotation(&self) -> &[GameMap] {
        &self.rotation
    }

    pub fn projectiles(&self) -> &[Projectile] {
        &self.projectiles
    }

    pub fn is_invincible(&self, id: &PlayerId) -> bool {
        self.invincible.contains_key(id)
    }

    /// Point the match at a map slot that does not exist
    pub fn break_map_index(&mut self) {
        self.map_index = self.rotation.len();
    }
}
