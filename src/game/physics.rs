//! World geometry: bounds, zone tests, static obstacles and collision-aware movement

use crate::ws::protocol::Vec2;

/// Rectangular playable area `[0, width] x [0, height]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldBounds {
    pub width: f32,
    pub height: f32,
}

impl WorldBounds {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn contains(&self, p: Vec2) -> bool {
        p.is_finite() && p.x >= 0.0 && p.y >= 0.0 && p.x <= self.width && p.y <= self.height
    }

    pub fn center(&self) -> Vec2 {
        Vec2::new(self.width / 2.0, self.height / 2.0)
    }

    /// Clamp a body of half-extent `radius` inside the bounds
    pub fn clamp(&self, p: Vec2, radius: f32) -> Vec2 {
        Vec2::new(
            p.x.clamp(radius, (self.width - radius).max(radius)),
            p.y.clamp(radius, (self.height - radius).max(radius)),
        )
    }
}

/// Static axis-aligned obstacle hitbox
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Obstacle {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Obstacle {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// Overlap test against a square body centered at `p` with half-extent `radius`
    pub fn overlaps(&self, p: Vec2, radius: f32) -> bool {
        p.x + radius > self.x
            && p.x - radius < self.x + self.width
            && p.y + radius > self.y
            && p.y - radius < self.y + self.height
    }
}

/// Default obstacle layout for a world of the given size
pub fn default_obstacles(bounds: &WorldBounds) -> Vec<Obstacle> {
    let w = bounds.width;
    let h = bounds.height;
    vec![
        Obstacle::new(w * 0.25 - 60.0, h * 0.25 - 40.0, 120.0, 80.0),
        Obstacle::new(w * 0.75 - 60.0, h * 0.25 - 40.0, 120.0, 80.0),
        Obstacle::new(w * 0.25 - 40.0, h * 0.75 - 60.0, 80.0, 120.0),
        Obstacle::new(w * 0.75 - 40.0, h * 0.75 - 60.0, 80.0, 120.0),
        Obstacle::new(w * 0.5 - 30.0, h * 0.5 - 150.0, 60.0, 60.0),
    ]
}

/// Physics helpers (stateless)
pub struct PhysicsSystem;

impl PhysicsSystem {
    /// Check if a point is inside the zone
    pub fn is_in_zone(x: f32, y: f32, zone_center_x: f32, zone_center_y: f32, zone_radius: f32) -> bool {
        let dx = x - zone_center_x;
        let dy = y - zone_center_y;
        let dist_sq = dx * dx + dy * dy;
        dist_sq <= zone_radius * zone_radius
    }

    /// Move a body by `delta`, resolving X and Y independently against obstacles,
    /// then clamp to world bounds. Blocked axes stop at the obstacle edge while
    /// the open axis keeps its full movement.
    pub fn move_with_collisions(
        from: Vec2,
        delta: Vec2,
        radius: f32,
        obstacles: &[Obstacle],
        bounds: &WorldBounds,
    ) -> Vec2 {
        let mut x = from.x + delta.x;
        if delta.x != 0.0 {
            for obstacle in obstacles {
                if obstacle.overlaps(Vec2::new(x, from.y), radius) {
                    x = if delta.x > 0.0 {
                        obstacle.x - radius
                    } else {
                        obstacle.x + obstacle.width + radius
                    };
                }
            }
        }

        let mut y = from.y + delta.y;
        if delta.y != 0.0 {
            for obstacle in obstacles {
                if obstacle.overlaps(Vec2::new(x, y), radius) {
                    y = if delta.y > 0.0 {
                        obstacle.y - radius
                    } else {
                        obstacle.y + obstacle.height + radius
                    };
                }
            }
        }

        bounds.clamp(Vec2::new(x, y), radius)
    }

    /// Smallest signed difference `to - from` wrapped into `(-PI, PI]`
    pub fn angle_difference(from: f32, to: f32) -> f32 {
        use std::f32::consts::{PI, TAU};
        let diff = (to - from).rem_euclid(TAU);
        if diff > PI {
            diff - TAU
        } else {
            diff
        }
    }
}
