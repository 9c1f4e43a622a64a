//! Bot players. A bot only ever produces the same client messages a human
//! would send; the host routes them through the normal dispatch path.

use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::config::Tuning;
use crate::ws::protocol::{ClientMsg, LootId, LootKind, PlayerId, Vec2};

use super::catalog::{Catalog, UNARMED};
use super::physics::PhysicsSystem;
use super::state::{MatchState, PlayerRecord};

/// Longest simulated step, so a stalled tick can't turn into a teleport
const MAX_STEP_MS: u64 = 100;

/// Fraction of weapon range the bot closes to before it stops advancing
const ENGAGE_FRACTION: f32 = 0.6;

/// Chance per in-range decision to try the weapon's special
const SPECIAL_CHANCE: f64 = 0.1;

/// What the bot is currently doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotMode {
    Wander,
    /// Committed to one loot item until it disappears
    SeekLoot { loot_id: LootId },
    SeekTarget { target_id: PlayerId },
}

/// Host-local bot memory, never serialized
#[derive(Debug, Clone)]
pub struct BotAgentState {
    pub mode: BotMode,
    pub wander_angle: f32,
    pub wander_timer_ms: u64,
    pub last_pickup_at: Option<u64>,
}

impl Default for BotAgentState {
    fn default() -> Self {
        Self {
            mode: BotMode::Wander,
            wander_angle: 0.0,
            wander_timer_ms: 0,
            last_pickup_at: None,
        }
    }
}

#[derive(Debug)]
pub struct BotAgent {
    pub player_id: PlayerId,
    pub state: BotAgentState,
    catalog: Arc<Catalog>,
    rng: ChaCha8Rng,
    speed: f32,
    body_radius: f32,
    pickup_radius: f32,
    pickup_interval_ms: u64,
    wander_interval_ms: u64,
}

impl BotAgent {
    pub fn new(player_id: PlayerId, catalog: Arc<Catalog>, tuning: &Tuning, seed: u64) -> Self {
        Self {
            player_id,
            state: BotAgentState::default(),
            catalog,
            rng: ChaCha8Rng::seed_from_u64(seed),
            speed: tuning.bot_speed,
            body_radius: tuning.hitbox_radius,
            pickup_radius: tuning.pickup_radius,
            pickup_interval_ms: tuning.bot_pickup_interval_ms,
            wander_interval_ms: tuning.bot_wander_interval_ms,
        }
    }

    /// Re-evaluate the mode from a read-only view of the match and return the
    /// messages this bot would send this tick.
    pub fn decide(&mut self, world: &MatchState, dt_ms: u64, now: u64) -> Vec<ClientMsg> {
        let mut intents = Vec::new();
        if !world.accepts_mutation() {
            return intents;
        }
        let Some(me) = world.player(&self.player_id) else {
            return intents;
        };
        if !me.is_alive() || !me.is_connected || me.is_stunned(now) {
            return intents;
        }

        self.state.mode = self.choose_mode(world, me);
        let dt_ms = dt_ms.min(MAX_STEP_MS);

        let heading = match self.state.mode {
            BotMode::SeekLoot { loot_id } => self.seek_loot(world, me, loot_id, now, &mut intents),
            BotMode::SeekTarget { target_id } => self.seek_target(world, me, target_id, &mut intents),
            BotMode::Wander => Some(self.wander(world, me, dt_ms)),
        };

        if let Some(direction) = heading {
            intents.insert(0, self.step(world, me, direction, dt_ms));
        }

        intents
    }

    fn choose_mode(&self, world: &MatchState, me: &PlayerRecord) -> BotMode {
        if me.equipped_weapon == UNARMED {
            // Sticky: keep the committed item while it still exists
            if let BotMode::SeekLoot { loot_id } = self.state.mode {
                if world.find_loot(&loot_id).is_some() {
                    return self.state.mode;
                }
            }

            let nearest_loot = world
                .loot
                .iter()
                .filter(|l| l.kind == LootKind::Weapon)
                .min_by(|a, b| {
                    me.position
                        .distance(a.position())
                        .total_cmp(&me.position.distance(b.position()))
                });
            if let Some(loot) = nearest_loot {
                return BotMode::SeekLoot { loot_id: loot.id };
            }
        }

        let nearest_target = world
            .players
            .values()
            .filter(|p| p.player_id != me.player_id && p.is_connected && p.is_alive())
            .min_by(|a, b| {
                me.position
                    .distance(a.position)
                    .total_cmp(&me.position.distance(b.position))
            });
        match nearest_target {
            Some(target) => BotMode::SeekTarget {
                target_id: target.player_id,
            },
            None => BotMode::Wander,
        }
    }

    fn seek_loot(
        &mut self,
        world: &MatchState,
        me: &PlayerRecord,
        loot_id: LootId,
        now: u64,
        intents: &mut Vec<ClientMsg>,
    ) -> Option<Vec2> {
        let loot = world.find_loot(&loot_id)?;
        let distance = me.position.distance(loot.position());

        if distance <= self.pickup_radius {
            let ready = self
                .state
                .last_pickup_at
                .map_or(true, |last| now.saturating_sub(last) >= self.pickup_interval_ms);
            if ready {
                self.state.last_pickup_at = Some(now);
                intents.push(ClientMsg::PickupRequest { loot_id });
            }
            if distance <= self.pickup_radius * 0.5 {
                return None;
            }
        }

        direction(me.position, loot.position())
    }

    fn seek_target(
        &mut self,
        world: &MatchState,
        me: &PlayerRecord,
        target_id: PlayerId,
        intents: &mut Vec<ClientMsg>,
    ) -> Option<Vec2> {
        let target = world.player(&target_id)?;
        let weapon = self.catalog.weapon(&me.equipped_weapon);
        let distance = me.position.distance(target.position);

        if distance <= weapon.range + self.body_radius {
            let is_special = weapon.special.is_some() && self.rng.gen_bool(SPECIAL_CHANCE);
            intents.push(ClientMsg::AttackRequest {
                weapon_id: weapon.id.clone(),
                aim_x: target.position.x,
                aim_y: target.position.y,
                is_special,
            });
        }

        if distance <= weapon.range * ENGAGE_FRACTION {
            return None;
        }
        direction(me.position, target.position)
    }

    fn wander(&mut self, world: &MatchState, me: &PlayerRecord, dt_ms: u64) -> Vec2 {
        // Head back inside before anything else
        if world.is_outside_zone(me.position) {
            if let Some(inward) = direction(me.position, world.zone.center()) {
                return inward;
            }
        }

        self.state.wander_timer_ms += dt_ms;
        if self.state.wander_timer_ms >= self.wander_interval_ms {
            self.state.wander_timer_ms = 0;
            self.state.wander_angle = self.rng.gen_range(0.0..std::f32::consts::TAU);
        }
        Vec2::new(self.state.wander_angle.cos(), self.state.wander_angle.sin())
    }

    fn step(&self, world: &MatchState, me: &PlayerRecord, direction: Vec2, dt_ms: u64) -> ClientMsg {
        let velocity = Vec2::new(direction.x * self.speed, direction.y * self.speed);
        let dt = dt_ms as f32 / 1000.0;
        let position = PhysicsSystem::move_with_collisions(
            me.position,
            Vec2::new(velocity.x * dt, velocity.y * dt),
            self.body_radius,
            &world.obstacles,
            &world.bounds,
        );
        ClientMsg::PositionUpdate {
            position,
            rotation: direction.y.atan2(direction.x),
            velocity,
        }
    }
}

/// Unit vector from `from` toward `to`, `None` when they coincide
fn direction(from: Vec2, to: Vec2) -> Option<Vec2> {
    let distance = from.distance(to);
    if distance <= f32::EPSILON {
        return None;
    }
    Some(Vec2::new((to.x - from.x) / distance, (to.y - from.y) / distance))
}
