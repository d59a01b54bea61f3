//! Static map catalog
//!
//! Barriers stop both players and projectiles. Nets stop players only, ink
//! flies straight through them.

use serde::Serialize;

use super::collision::{Obstacle, Point};
use super::{ARENA_HEIGHT, ARENA_WIDTH};

/// Arena layout
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameMap {
    pub id: &'static str,
    pub name: &'static str,
    pub barriers: Vec<Obstacle>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub nets: Vec<Obstacle>,
    /// Spawn point per slot as a fraction of the arena size
    pub player_spawn_scale: [[f32; 2]; 2],
}

impl GameMap {
    /// Spawn point for a slot scaled to the arena
    pub fn spawn_point(&self, slot: usize) -> Point {
        let [sx, sy] = self.player_spawn_scale[slot.min(1)];
        Point::new(sx * ARENA_WIDTH, sy * ARENA_HEIGHT)
    }

    /// Everything that stops a player
    pub fn player_blockers(&self) -> impl Iterator<Item = &Obstacle> {
        self.barriers.iter().chain(self.nets.iter())
    }

    /// Everything that stops a projectile
    pub fn projectile_blockers(&self) -> &[Obstacle] {
        &self.barriers
    }

    /// Fallback single center barrier
    pub fn legacy() -> Self {
        Self {
            id: "legacy",
            name: "Legacy",
            barriers: vec![Obstacle::new(ARENA_WIDTH / 2.0, ARENA_HEIGHT / 2.0, 100.0, 300.0)],
            nets: Vec::new(),
            player_spawn_scale: [[0.25, 0.5], [0.75, 0.5]],
        }
    }
}

/// Every map available for rotation
pub fn catalog() -> Vec<GameMap> {
    let w = ARENA_WIDTH;
    let h = ARENA_HEIGHT;

    vec![
        GameMap {
            id: "map-1",
            name: "Map 1",
            barriers: vec![Obstacle::new(w / 2.0, h / 2.0, 100.0, 300.0)],
            nets: Vec::new(),
            player_spawn_scale: [[0.25, 0.5], [0.75, 0.5]],
        },
        GameMap {
            id: "map-2",
            name: "Map 2",
            barriers: vec![
                Obstacle::new(w * 0.35, h * 0.5, 80.0, 260.0),
                Obstacle::new(w * 0.65, h * 0.5, 80.0, 260.0),
            ],
            nets: Vec::new(),
            player_spawn_scale: [[0.15, 0.5], [0.85, 0.5]],
        },
        GameMap {
            id: "map-3",
            name: "Map 3",
            barriers: vec![Obstacle::new(w / 2.0, h / 2.0, 400.0, 80.0)],
            nets: Vec::new(),
            player_spawn_scale: [[0.5, 0.25], [0.5, 0.75]],
        },
        GameMap {
            id: "map-4",
            name: "Map 4",
            barriers: vec![
                Obstacle::new(w * 0.25, h * 0.25, 90.0, 90.0),
                Obstacle::new(w * 0.75, h * 0.25, 90.0, 90.0),
                Obstacle::new(w * 0.25, h * 0.75, 90.0, 90.0),
                Obstacle::new(w * 0.75, h * 0.75, 90.0, 90.0),
            ],
            nets: Vec::new(),
            player_spawn_scale: [[0.25, 0.5], [0.75, 0.5]],
        },
        GameMap {
            id: "map-5",
            name: "Map 5",
            barriers: vec![
                Obstacle::new(w / 2.0, h * 0.15, 60.0, 120.0),
                Obstacle::new(w / 2.0, h * 0.85, 60.0, 120.0),
            ],
            // Full-height split: players stay on their side, shots cross
            nets: vec![Obstacle::new(w / 2.0, h / 2.0, 20.0, h)],
            player_spawn_scale: [[0.25, 0.5], [0.75, 0.5]],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::collision::Bounds;
    use crate::game::{PLAYER_HEIGHT, PLAYER_WIDTH};

    #[test]
    fn catalog_ids_are_unique() {
        let maps = catalog();
        let mut ids: Vec<_> = maps.iter().map(|m| m.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), maps.len());
    }

    #[test]
    fn spawn_points_scale_to_arena() {
        let map = &catalog()[0];
        assert_eq!(map.spawn_point(0), Point::new(320.0, 360.0));
        assert_eq!(map.spawn_point(1), Point::new(960.0, 360.0));
    }

    #[test]
    fn spawns_are_clear_of_player_blockers() {
        for map in catalog() {
            for slot in 0..2 {
                let body = Bounds::around(map.spawn_point(slot), PLAYER_WIDTH, PLAYER_HEIGHT);
                assert!(
                    map.player_blockers().all(|o| !body.overlaps(&o.bounds())),
                    "{} slot {} spawns inside an obstacle",
                    map.id,
                    slot
                );
            }
        }
    }

    #[test]
    fn nets_only_block_players() {
        let map = catalog().into_iter().find(|m| !m.nets.is_empty()).unwrap();
        let net = map.nets[0];
        assert!(map.player_blockers().any(|o| *o == net));
        assert!(map.projectile_blockers().iter().all(|o| *o != net));
    }
}
