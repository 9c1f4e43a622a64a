//! Anti-teleport validation of client-claimed movement

use std::collections::HashMap;

use crate::ws::protocol::{PlayerId, Vec2};

use super::physics::WorldBounds;

/// Why a position update was dropped
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PositionRejection {
    /// NaN/infinite coordinates or velocity
    NotFinite,
    OutOfBounds,
    /// Displacement from the last accepted position exceeded the limit
    Teleport { distance: f32 },
}

/// Remembers the last accepted position per player and vets new claims
#[derive(Debug)]
pub struct PositionValidator {
    bounds: WorldBounds,
    max_displacement: f32,
    last_known: HashMap<PlayerId, Vec2>,
}

impl PositionValidator {
    pub fn new(bounds: WorldBounds, max_displacement: f32) -> Self {
        Self {
            bounds,
            max_displacement,
            last_known: HashMap::new(),
        }
    }

    /// Accept or reject a claimed position. The first sample for a player is
    /// the bootstrap and is always accepted (if finite); later samples must be
    /// in bounds and within `max_displacement` of the last accepted one.
    /// The memo only moves on acceptance.
    pub fn propose(
        &mut self,
        player_id: PlayerId,
        position: Vec2,
        velocity: Vec2,
    ) -> Result<(), PositionRejection> {
        if !position.is_finite() || !velocity.is_finite() {
            return Err(PositionRejection::NotFinite);
        }

        if let Some(last) = self.last_known.get(&player_id) {
            if !self.bounds.contains(position) {
                return Err(PositionRejection::OutOfBounds);
            }
            let distance = last.distance(position);
            if distance > self.max_displacement {
                return Err(PositionRejection::Teleport { distance });
            }
        }

        self.last_known.insert(player_id, position);
        Ok(())
    }

    /// Host-driven relocation (spawns); replaces the memo without checks
    pub fn reset(&mut self, player_id: PlayerId, position: Vec2) {
        self.last_known.insert(player_id, position);
    }

    pub fn forget(&mut self, player_id: &PlayerId) {
        self.last_known.remove(player_id);
    }

    pub fn last_known(&self, player_id: &PlayerId) -> Option<Vec2> {
        self.last_known.get(player_id).copied()
    }
}
