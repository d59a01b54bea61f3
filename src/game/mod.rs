//! Match simulation modules

pub mod collision;
pub mod maps;
pub mod r#match;
pub mod projectile;
pub mod scheduler;
pub mod snapshot;

pub use r#match::{Game, PlayerState, Slot};
pub use scheduler::{MatchScheduler, SchedulerHandle};

use std::time::Duration;

use uuid::Uuid;

use crate::ws::protocol::PlayerId;
use collision::Point;

/// Arena width in pixels
pub const ARENA_WIDTH: f32 = 1280.0;
/// Arena height in pixels
pub const ARENA_HEIGHT: f32 = 720.0;
/// Distance moved per movement intent at full deflection
pub const PLAYER_SPEED: f32 = 5.0;
pub const PLAYER_WIDTH: f32 = 80.0;
pub const PLAYER_HEIGHT: f32 = 80.0;

/// Gameplay tuning shared by every match
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GameRules {
    /// Rounds in a match before the winner is announced
    pub rounds_per_match: u32,
    /// Lives per player per round
    pub max_lives: u32,
    /// Grace period after being hit
    pub invincibility: Duration,
}

impl Default for GameRules {
    fn default() -> Self {
        Self {
            rounds_per_match: 5,
            max_lives: 1,
            invincibility: Duration::from_millis(2000),
        }
    }
}

/// In-match request from a client, applied at the next tick boundary
#[derive(Debug, Clone)]
pub enum MatchInput {
    Move {
        player_id: PlayerId,
        movement: Point,
    },
    Shoot {
        player_id: PlayerId,
        path: Vec<Point>,
    },
    ProjectileCollision {
        projectile1_id: Uuid,
        projectile2_id: Uuid,
        at: Point,
    },
}
