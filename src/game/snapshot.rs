//! Snapshot building for network transmission

use std::collections::HashMap;
use std::time::Instant;

use crate::ws::protocol::{GameSnapshot, PlayerId, PlayerView};

use super::collision::Point;
use super::maps::GameMap;
use super::projectile::Projectile;
use super::{PlayerState, Slot};

/// Borrowed view of a match, turned into a wire snapshot
pub struct SnapshotBuilder<'a> {
    pub players: &'a [PlayerState],
    pub invincible: &'a HashMap<PlayerId, Instant>,
    pub projectiles: &'a [Projectile],
    pub round: u32,
    pub map: &'a GameMap,
}

impl SnapshotBuilder<'_> {
    pub fn build(&self, explosions: Vec<Point>) -> GameSnapshot {
        let players = self
            .players
            .iter()
            .map(|p| PlayerView {
                id: p.id,
                x: p.position.x,
                y: p.position.y,
                lives: p.lives,
                score: p.score,
                is_second_player: p.slot == Slot::Second,
                is_invincible: self.invincible.contains_key(&p.id),
            })
            .collect();

        GameSnapshot {
            players,
            projectiles: self.projectiles.iter().map(Projectile::view).collect(),
            explosions,
            round: self.round,
            map: self.map.clone(),
        }
    }
}
