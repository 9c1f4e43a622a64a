//! Authoritative match state owned by the host runtime

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

use crate::config::Tuning;
use crate::ws::protocol::{
    LootId, LootItem, PlayerDelta, PlayerId, PlayerInfo, PlayerStat, Vec2, ZoneState,
};

use super::catalog::UNARMED;
use super::physics::{default_obstacles, Obstacle, PhysicsSystem, WorldBounds};

/// Health every player spawns with
pub const MAX_HEALTH: f32 = 100.0;

/// Match phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPhase {
    /// Waiting for the host to start
    Lobby,
    /// Match in progress
    Running,
    /// Win condition met; combat and zone are frozen until the victory delay passes
    Ending { since: u64 },
    /// Game over broadcast
    Ended,
}

/// Player record in a match (authoritative)
#[derive(Debug, Clone)]
pub struct PlayerRecord {
    pub player_id: PlayerId,
    pub display_name: String,
    pub is_host: bool,
    pub is_bot: bool,

    // Position and movement (owned by the client, validated by the host)
    pub position: Vec2,
    pub rotation: f32,
    pub velocity: Vec2,

    // Host-owned fields
    /// `None` until the player has spawned; counts as full health
    pub health: Option<f32>,
    pub equipped_weapon: String,
    pub equipped_armor: Option<String>,
    pub kills: u32,
    pub stun_until: u64,

    pub is_connected: bool,
}

impl PlayerRecord {
    pub fn new(player_id: PlayerId, display_name: String, is_host: bool, is_bot: bool) -> Self {
        Self {
            player_id,
            display_name,
            is_host,
            is_bot,
            position: Vec2::ZERO,
            rotation: 0.0,
            velocity: Vec2::ZERO,
            health: None,
            equipped_weapon: UNARMED.to_string(),
            equipped_armor: None,
            kills: 0,
            stun_until: 0,
            is_connected: true,
        }
    }

    /// Health with not-yet-spawned players treated as full
    pub fn current_health(&self) -> f32 {
        self.health.unwrap_or(MAX_HEALTH)
    }

    pub fn is_alive(&self) -> bool {
        self.current_health() > 0.0
    }

    pub fn is_stunned(&self, now: u64) -> bool {
        self.stun_until > now
    }

    pub fn info(&self) -> PlayerInfo {
        PlayerInfo {
            player_id: self.player_id,
            display_name: self.display_name.clone(),
            is_host: self.is_host,
            is_bot: self.is_bot,
            position: self.position,
            health: self.health,
            equipped_weapon: self.equipped_weapon.clone(),
            equipped_armor: self.equipped_armor.clone(),
        }
    }
}

/// Last attack timestamps for one attacker
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CooldownState {
    pub last_attack_at: Option<u64>,
    pub last_special_at: Option<u64>,
}

/// Cooldowns keyed by player id, kept apart from the broadcastable player records
#[derive(Debug, Default)]
pub struct CooldownTable {
    entries: HashMap<PlayerId, CooldownState>,
}

impl CooldownTable {
    pub fn get(&self, player_id: &PlayerId) -> CooldownState {
        self.entries.get(player_id).copied().unwrap_or_default()
    }

    pub fn stamp(&mut self, player_id: PlayerId, is_special: bool, now: u64) {
        let entry = self.entries.entry(player_id).or_default();
        if is_special {
            entry.last_special_at = Some(now);
        } else {
            entry.last_attack_at = Some(now);
        }
    }

    pub fn remove(&mut self, player_id: &PlayerId) {
        self.entries.remove(player_id);
    }
}

/// Zone configuration for battle royale shrinking
#[derive(Debug, Clone)]
pub struct ZoneConfig {
    /// Initial zone radius
    pub initial_radius: f32,
    /// Time before first shrink (seconds)
    pub initial_delay: f32,
    /// Base damage per second outside the zone, scaled by `phase + 1`
    pub base_damage_per_second: f32,
    /// Shrink phases configuration
    pub phases: Vec<ZonePhase>,
}

#[derive(Debug, Clone)]
pub struct ZonePhase {
    /// Target radius for this phase
    pub target_radius: f32,
    /// Time to shrink to target (seconds)
    pub shrink_duration: f32,
    /// Delay before next phase starts
    pub delay_after: f32,
}

impl ZoneConfig {
    pub fn for_world(bounds: &WorldBounds, base_damage_per_second: f32) -> Self {
        let initial_radius = bounds.width.min(bounds.height) * 0.7;
        Self {
            initial_radius,
            initial_delay: 60.0,
            base_damage_per_second,
            phases: vec![
                ZonePhase {
                    target_radius: initial_radius * 0.7,
                    shrink_duration: 30.0,
                    delay_after: 45.0,
                },
                ZonePhase {
                    target_radius: initial_radius * 0.45,
                    shrink_duration: 25.0,
                    delay_after: 30.0,
                },
                ZonePhase {
                    target_radius: initial_radius * 0.2,
                    shrink_duration: 20.0,
                    delay_after: 20.0,
                },
                ZonePhase {
                    target_radius: initial_radius * 0.05,
                    shrink_duration: 15.0,
                    delay_after: 0.0,
                },
            ],
        }
    }

    /// Full-size zone centered on the world
    pub fn initial_state(&self, bounds: &WorldBounds) -> ZoneState {
        let center = bounds.center();
        ZoneState {
            center_x: center.x,
            center_y: center.y,
            radius: self.initial_radius,
            phase: 0,
            damage_per_second: self.damage_for_phase(0),
        }
    }

    /// Damage per second outside the zone during `phase`
    pub fn damage_for_phase(&self, phase: u32) -> f32 {
        self.base_damage_per_second * (phase as f32 + 1.0)
    }
}

/// Zone a fresh session starts with
pub fn initial_zone(tuning: &Tuning) -> ZoneState {
    let bounds = WorldBounds::new(tuning.world_width, tuning.world_height);
    ZoneConfig::for_world(&bounds, tuning.zone_base_dps).initial_state(&bounds)
}

/// Match state (owned by the host runtime task)
pub struct MatchState {
    pub session_id: Uuid,
    pub host_id: PlayerId,
    pub max_players: usize,
    pub phase: MatchPhase,
    pub started_at: Option<u64>,

    pub players: BTreeMap<PlayerId, PlayerRecord>,
    pub loot: Vec<LootItem>,
    pub cooldowns: CooldownTable,

    pub bounds: WorldBounds,
    pub obstacles: Vec<Obstacle>,
    pub zone: ZoneState,
    pub zone_config: ZoneConfig,

    pub rng: ChaCha8Rng,
}

impl MatchState {
    pub fn new(session_id: Uuid, host_id: PlayerId, max_players: usize, seed: u64, tuning: &Tuning) -> Self {
        let bounds = WorldBounds::new(tuning.world_width, tuning.world_height);
        let zone_config = ZoneConfig::for_world(&bounds, tuning.zone_base_dps);
        let zone = zone_config.initial_state(&bounds);

        Self {
            session_id,
            host_id,
            max_players,
            phase: MatchPhase::Lobby,
            started_at: None,
            players: BTreeMap::new(),
            loot: Vec::new(),
            cooldowns: CooldownTable::default(),
            obstacles: default_obstacles(&bounds),
            bounds,
            zone,
            zone_config,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Combat and zone damage only mutate state while running
    pub fn accepts_mutation(&self) -> bool {
        self.phase == MatchPhase::Running
    }

    pub fn is_running(&self) -> bool {
        matches!(self.phase, MatchPhase::Running | MatchPhase::Ending { .. })
    }

    pub fn player(&self, player_id: &PlayerId) -> Option<&PlayerRecord> {
        self.players.get(player_id)
    }

    /// Players that still count toward the win condition
    pub fn alive_count(&self) -> usize {
        self.players
            .values()
            .filter(|p| p.is_connected && p.is_alive())
            .count()
    }

    pub fn sole_survivor(&self) -> Option<PlayerId> {
        let mut alive = self
            .players
            .values()
            .filter(|p| p.is_connected && p.is_alive());
        match (alive.next(), alive.next()) {
            (Some(p), None) => Some(p.player_id),
            _ => None,
        }
    }

    pub fn find_loot(&self, loot_id: &LootId) -> Option<&LootItem> {
        self.loot.iter().find(|l| &l.id == loot_id)
    }

    /// Random point inside the zone, clear of obstacles, for spawns and loot
    pub fn random_open_position(&mut self, clearance: f32) -> Vec2 {
        let center = self.zone.center();
        let max_distance = (self.zone.radius * 0.8).max(1.0);
        for _ in 0..32 {
            let angle = self.rng.gen_range(0.0..std::f32::consts::TAU);
            let distance = self.rng.gen_range(0.0..max_distance);
            let candidate = self.bounds.clamp(
                Vec2::new(
                    center.x + angle.cos() * distance,
                    center.y + angle.sin() * distance,
                ),
                clearance,
            );
            if !self.obstacles.iter().any(|o| o.overlaps(candidate, clearance)) {
                return candidate;
            }
        }
        center
    }

    pub fn is_outside_zone(&self, p: Vec2) -> bool {
        !PhysicsSystem::is_in_zone(
            p.x,
            p.y,
            self.zone.center_x,
            self.zone.center_y,
            self.zone.radius,
        )
    }

    pub fn game_over_stats(&self) -> Vec<PlayerStat> {
        self.players
            .values()
            .map(|p| PlayerStat {
                player_id: p.player_id,
                name: p.display_name.clone(),
                kills: p.kills,
                is_bot: p.is_bot,
            })
            .collect()
    }
}

/// Accumulates per-player field changes into one `player_updates` batch
#[derive(Debug, Default)]
pub struct DeltaBatch {
    deltas: BTreeMap<PlayerId, PlayerDelta>,
}

impl DeltaBatch {
    pub fn entry(&mut self, player_id: PlayerId) -> &mut PlayerDelta {
        self.deltas
            .entry(player_id)
            .or_insert_with(|| PlayerDelta::new(player_id))
    }

    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }

    pub fn into_updates(self) -> Vec<PlayerDelta> {
        self.deltas.into_values().collect()
    }
}
