//! Ink projectiles that replay a client-drawn path

use uuid::Uuid;

use crate::ws::protocol::{PlayerId, ProjectileView};

use super::collision::{segment_hits_any, Obstacle, Point};

/// What a projectile did on its tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Advance {
    /// Moved to the next waypoint
    Moved,
    /// Reached the end of its path and burst at this position
    Burst(Point),
}

/// Active projectile in the game
#[derive(Debug, Clone)]
pub struct Projectile {
    pub id: Uuid,
    pub shooter_id: PlayerId,
    pub is_second_player: bool,
    path: Vec<Point>,
    index: usize,
    /// Path was cut short by a barrier
    terminates_early: bool,
}

impl Projectile {
    /// Build a projectile from a client path, cutting it at the first segment
    /// that touches a barrier. Returns `None` for an empty path.
    pub fn new(
        shooter_id: PlayerId,
        is_second_player: bool,
        path: &[Point],
        barriers: &[Obstacle],
    ) -> Option<Self> {
        if path.is_empty() {
            return None;
        }

        let mut kept = Vec::with_capacity(path.len());
        let mut terminates_early = false;

        for (i, &point) in path.iter().enumerate() {
            kept.push(point);
            if i > 0 && segment_hits_any(path[i - 1], point, barriers) {
                terminates_early = true;
                break;
            }
        }

        Some(Self {
            id: Uuid::new_v4(),
            shooter_id,
            is_second_player,
            path: kept,
            index: 0,
            terminates_early,
        })
    }

    pub fn position(&self) -> Point {
        self.path[self.index]
    }

    pub fn path(&self) -> &[Point] {
        &self.path
    }

    pub fn terminates_early(&self) -> bool {
        self.terminates_early
    }

    fn last_index(&self) -> usize {
        self.path.len() - 1
    }

    /// Step one waypoint along the path.
    ///
    /// A projectile cut by a barrier bursts the moment it lands on its last
    /// waypoint; a full-length one lingers there for one tick first.
    pub fn advance(&mut self) -> Advance {
        if self.index < self.last_index() {
            self.index += 1;
            if self.terminates_early && self.index == self.last_index() {
                return Advance::Burst(self.position());
            }
            Advance::Moved
        } else {
            Advance::Burst(self.position())
        }
    }

    pub fn view(&self) -> ProjectileView {
        let pos = self.position();
        ProjectileView {
            id: self.id,
            x: pos.x,
            y: pos.y,
            shooter_id: self.shooter_id,
            is_second_player: self.is_second_player,
        }
    }
}

#[cfg(test)]
impl Projectile {
    pub fn index(&self) -> usize {
        self.index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::maps::catalog;

    const CENTER: Obstacle = Obstacle::new(640.0, 360.0, 100.0, 300.0);

    fn straight(from: f32, to: f32, step: f32, y: f32) -> Vec<Point> {
        let mut path = Vec::new();
        let mut x = from;
        while x <= to {
            path.push(Point::new(x, y));
            x += step;
        }
        path
    }

    #[test]
    fn empty_path_is_rejected() {
        assert!(Projectile::new(Uuid::new_v4(), false, &[], &[CENTER]).is_none());
    }

    #[test]
    fn clear_path_is_kept_whole() {
        let path = straight(100.0, 200.0, 10.0, 100.0);
        let p = Projectile::new(Uuid::new_v4(), false, &path, &[CENTER]).unwrap();
        assert_eq!(p.path().len(), path.len());
        assert!(!p.terminates_early());
        assert_eq!(p.position(), path[0]);
    }

    #[test]
    fn path_is_cut_at_first_barrier_segment() {
        let path = straight(500.0, 800.0, 50.0, 360.0);
        let p = Projectile::new(Uuid::new_v4(), false, &path, &[CENTER]).unwrap();
        // 550 -> 600 is the first segment reaching the barrier at x = 590
        assert_eq!(p.path().last(), Some(&Point::new(600.0, 360.0)));
        assert_eq!(p.path().len(), 3);
        assert!(p.terminates_early());
    }

    #[test]
    fn map_blockers_cut_at_barriers_but_not_nets() {
        let map = catalog().into_iter().find(|m| m.id == "map-5").unwrap();

        let through_net = straight(500.0, 800.0, 50.0, 360.0);
        let p = Projectile::new(Uuid::new_v4(), false, &through_net, map.projectile_blockers())
            .unwrap();
        assert_eq!(p.path().len(), through_net.len());
        assert!(!p.terminates_early());

        let into_barrier = straight(500.0, 800.0, 50.0, 100.0);
        let p = Projectile::new(Uuid::new_v4(), true, &into_barrier, map.projectile_blockers())
            .unwrap();
        assert!(p.terminates_early());
        assert!(p.path().len() < into_barrier.len());
        assert!(p.is_second_player);
    }

    #[test]
    fn cut_projectile_bursts_on_reaching_cut() {
        let path = vec![Point::new(560.0, 360.0), Point::new(600.0, 360.0)];
        let mut p = Projectile::new(Uuid::new_v4(), false, &path, &[CENTER]).unwrap();
        assert_eq!(p.advance(), Advance::Burst(Point::new(600.0, 360.0)));
    }

    #[test]
    fn full_projectile_lingers_one_tick_at_end() {
        let path = vec![Point::new(100.0, 100.0), Point::new(105.0, 100.0)];
        let mut p = Projectile::new(Uuid::new_v4(), false, &path, &[CENTER]).unwrap();
        assert_eq!(p.advance(), Advance::Moved);
        assert_eq!(p.index(), 1);
        assert_eq!(p.advance(), Advance::Burst(Point::new(105.0, 100.0)));
    }
}
