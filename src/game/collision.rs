//! Arena geometry: obstacle resolution and projectile path clipping
//!
//! Everything in here is pure. Positions are arena pixels with the origin in
//! the top-left corner and `y` growing downwards.

use serde::{Deserialize, Serialize};

/// A point in arena coordinates (also the wire shape `{x, y}`)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Static axis-aligned rectangle, positioned by its center
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Obstacle {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Edges of an axis-aligned box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub left: f32,
    pub right: f32,
    pub top: f32,
    pub bottom: f32,
}

impl Bounds {
    /// Box of `width` x `height` centered on `center`
    pub fn around(center: Point, width: f32, height: f32) -> Self {
        Self {
            left: center.x - width / 2.0,
            right: center.x + width / 2.0,
            top: center.y - height / 2.0,
            bottom: center.y + height / 2.0,
        }
    }

    /// Strict overlap; boxes that only touch along an edge do not overlap
    pub fn overlaps(&self, other: &Bounds) -> bool {
        !(self.right <= other.left
            || self.left >= other.right
            || self.bottom <= other.top
            || self.top >= other.bottom)
    }
}

impl Obstacle {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn bounds(&self) -> Bounds {
        Bounds::around(Point::new(self.x, self.y), self.width, self.height)
    }
}

/// Push an entity moving from `current` to `desired` out of every obstacle.
///
/// Obstacles are visited in order. On overlap the entity is pushed out along
/// the axis with the smaller penetration (both axes on a tie). If the push
/// does not clear that obstacle the position reverts to `current`, and the
/// next obstacle is tested against whatever position came out of this one.
/// The result depends on obstacle order, which is fine for the handful of
/// obstacles a map carries but is not a general solver.
pub fn resolve_obstacle_collision<'a>(
    current: Point,
    desired: Point,
    obstacles: impl IntoIterator<Item = &'a Obstacle>,
    entity_width: f32,
    entity_height: f32,
) -> Point {
    let mut adjusted = desired;

    for obstacle in obstacles {
        let b = obstacle.bounds();
        let entity = Bounds::around(adjusted, entity_width, entity_height);

        if !entity.overlaps(&b) {
            continue;
        }

        let mut overlap_x = 0.0;
        let penetration_right = entity.right - b.left;
        let penetration_left = b.right - entity.left;
        if penetration_right > 0.0 && penetration_left > 0.0 {
            overlap_x = if penetration_right < penetration_left {
                -penetration_right
            } else {
                penetration_left
            };
        }

        let mut overlap_y = 0.0;
        let penetration_bottom = entity.bottom - b.top;
        let penetration_top = b.bottom - entity.top;
        if penetration_bottom > 0.0 && penetration_top > 0.0 {
            overlap_y = if penetration_bottom < penetration_top {
                -penetration_bottom
            } else {
                penetration_top
            };
        }

        if overlap_x == 0.0 && overlap_y == 0.0 {
            adjusted = current;
            continue;
        }

        let abs_x = f32::abs(overlap_x);
        let abs_y = f32::abs(overlap_y);
        if abs_x < abs_y {
            adjusted.x += overlap_x;
        } else if abs_y < abs_x {
            adjusted.y += overlap_y;
        } else {
            adjusted.x += overlap_x;
            adjusted.y += overlap_y;
        }

        if Bounds::around(adjusted, entity_width, entity_height).overlaps(&b) {
            adjusted = current;
        }
    }

    adjusted
}

const OUT_LEFT: u8 = 1;
const OUT_RIGHT: u8 = 2;
const OUT_TOP: u8 = 4;
const OUT_BOTTOM: u8 = 8;

/// Cohen-Sutherland region code of a point relative to a box
fn outcode(p: Point, b: &Bounds) -> u8 {
    let mut code = 0;
    if p.x < b.left {
        code |= OUT_LEFT;
    } else if p.x > b.right {
        code |= OUT_RIGHT;
    }
    if p.y < b.top {
        code |= OUT_TOP;
    } else if p.y > b.bottom {
        code |= OUT_BOTTOM;
    }
    code
}

/// Parametric intersection of segments p1-p2 and p3-p4 (endpoints inclusive).
/// Parallel segments never intersect.
fn segments_intersect(p1: Point, p2: Point, p3: Point, p4: Point) -> bool {
    let denominator = (p1.x - p2.x) * (p3.y - p4.y) - (p1.y - p2.y) * (p3.x - p4.x);
    if denominator == 0.0 {
        return false;
    }
    let t = ((p1.x - p3.x) * (p3.y - p4.y) - (p1.y - p3.y) * (p3.x - p4.x)) / denominator;
    let u = -((p1.x - p2.x) * (p1.y - p3.y) - (p1.y - p2.y) * (p1.x - p3.x)) / denominator;
    (0.0..=1.0).contains(&t) && (0.0..=1.0).contains(&u)
}

/// Whether segment p1-p2 touches the rectangle
pub fn segment_intersects_rectangle(p1: Point, p2: Point, rect: &Obstacle) -> bool {
    let b = rect.bounds();
    let code1 = outcode(p1, &b);
    let code2 = outcode(p2, &b);

    if code1 & code2 != 0 {
        return false;
    }
    if code1 == 0 && code2 == 0 {
        return true;
    }

    let top_left = Point::new(b.left, b.top);
    let top_right = Point::new(b.right, b.top);
    let bottom_right = Point::new(b.right, b.bottom);
    let bottom_left = Point::new(b.left, b.bottom);

    segments_intersect(p1, p2, top_left, top_right)
        || segments_intersect(p1, p2, top_right, bottom_right)
        || segments_intersect(p1, p2, bottom_right, bottom_left)
        || segments_intersect(p1, p2, bottom_left, top_left)
}

/// Whether segment p1-p2 touches any of the rectangles
pub fn segment_hits_any<'a>(
    p1: Point,
    p2: Point,
    rects: impl IntoIterator<Item = &'a Obstacle>,
) -> bool {
    rects
        .into_iter()
        .any(|rect| segment_intersects_rectangle(p1, p2, rect))
}

/// Euclidean distance
pub fn distance(a: Point, b: Point) -> f32 {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    (dx * dx + dy * dy).sqrt()
}
