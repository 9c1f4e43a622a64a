//! Combat resolution - cooldowns, hit arcs, damage formula, deaths and the win condition

use std::f32::consts::TAU;
use std::sync::Arc;

use tracing::info;

use crate::config::Tuning;
use crate::ws::protocol::{PlayerId, ServerMsg, Vec2};

use super::catalog::{ArmorConfig, Catalog, SpecialAbility, SpecialKind, WeaponConfig};
use super::physics::PhysicsSystem;
use super::state::{DeltaBatch, MatchPhase, MatchState};

/// Angular width of a single-target thrust
pub const THRUST_ARC: f32 = std::f32::consts::FRAC_PI_4;
/// Angular width of a multi-target swing
pub const SWING_ARC: f32 = 2.0 * std::f32::consts::FRAC_PI_3;
/// Full circle (spin specials)
pub const SPIN_ARC: f32 = TAU;

/// Why an attack was dropped
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AttackRejection {
    MatchNotRunning,
    UnknownAttacker,
    AttackerDead,
    Stunned { until: u64 },
    InvalidAim,
    /// Special requested with a weapon that has none
    NoSpecialAbility,
    OnCooldown { remaining_ms: u64 },
}

/// Everything an accepted attack changed
#[derive(Debug, Default)]
pub struct AttackOutcome {
    /// Messages to broadcast, in order
    pub messages: Vec<ServerMsg>,
    pub victims: Vec<PlayerId>,
    pub killed: Vec<PlayerId>,
    /// Whether this attack latched the match into its ending phase
    pub match_ending: bool,
}

/// Damage after armor: `base * special * resistance * weakness`
pub fn compute_damage(
    weapon: &WeaponConfig,
    special: Option<&SpecialAbility>,
    armor: Option<&ArmorConfig>,
) -> f32 {
    let multiplier = special.map(|s| s.damage_multiplier).unwrap_or(1.0);
    let resistance = armor.map(|a| a.resistance(weapon.damage_type)).unwrap_or(1.0);
    let weakness = armor.map(|a| a.weakness(weapon.damage_type)).unwrap_or(1.0);
    weapon.damage * multiplier * resistance * weakness
}

/// Apply damage to health, returns (new_health, is_dead)
pub fn apply_damage(current_health: f32, damage: f32) -> (f32, bool) {
    let new_health = (current_health - damage).max(0.0);
    (new_health, new_health <= 0.0)
}

/// Arc width for a weapon swing
pub fn hit_arc(weapon: &WeaponConfig, special: Option<&SpecialAbility>) -> f32 {
    match special.map(|s| s.kind) {
        Some(SpecialKind::Spin) => SPIN_ARC,
        _ if weapon.multi_target => SWING_ARC,
        _ => THRUST_ARC,
    }
}

/// Weapon reach including lunge-type bonuses
pub fn effective_range(weapon: &WeaponConfig, special: Option<&SpecialAbility>) -> f32 {
    match special.map(|s| s.kind) {
        Some(SpecialKind::Lunge { range_bonus }) => weapon.range + range_bonus,
        _ => weapon.range,
    }
}

/// Host-only combat resolver
#[derive(Debug, Clone)]
pub struct CombatResolver {
    catalog: Arc<Catalog>,
    special_cooldown_ms: u64,
    jitter_tolerance_ms: u64,
    hitbox_radius: f32,
    victory_delay_ms: u64,
}

impl CombatResolver {
    pub fn new(catalog: Arc<Catalog>, tuning: &Tuning) -> Self {
        Self {
            catalog,
            special_cooldown_ms: tuning.special_cooldown_ms,
            jitter_tolerance_ms: tuning.cooldown_jitter_ms,
            hitbox_radius: tuning.hitbox_radius,
            victory_delay_ms: tuning.victory_delay_ms,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Validate and resolve one attack request.
    pub fn handle_attack(
        &self,
        state: &mut MatchState,
        attacker_id: PlayerId,
        aim: Vec2,
        is_special: bool,
        now: u64,
    ) -> Result<AttackOutcome, AttackRejection> {
        if !state.accepts_mutation() {
            return Err(AttackRejection::MatchNotRunning);
        }
        if !aim.is_finite() {
            return Err(AttackRejection::InvalidAim);
        }

        let attacker = state
            .players
            .get(&attacker_id)
            .ok_or(AttackRejection::UnknownAttacker)?;
        if !attacker.is_alive() {
            return Err(AttackRejection::AttackerDead);
        }
        if attacker.is_stunned(now) {
            return Err(AttackRejection::Stunned {
                until: attacker.stun_until,
            });
        }
        let origin = attacker.position;

        let weapon = self.catalog.weapon(&attacker.equipped_weapon);
        let special = if is_special {
            Some(weapon.special.as_ref().ok_or(AttackRejection::NoSpecialAbility)?)
        } else {
            None
        };

        // Cooldown check, tolerant of network jitter
        let cooldown_ms = if is_special {
            self.special_cooldown_ms
        } else {
            weapon.attack_cooldown_ms()
        };
        let cooldowns = state.cooldowns.get(&attacker_id);
        let last = if is_special {
            cooldowns.last_special_at
        } else {
            cooldowns.last_attack_at
        };
        if let Some(last) = last {
            let elapsed = now.saturating_sub(last);
            let required = cooldown_ms.saturating_sub(self.jitter_tolerance_ms);
            if elapsed < required {
                return Err(AttackRejection::OnCooldown {
                    remaining_ms: required - elapsed,
                });
            }
        }
        state.cooldowns.stamp(attacker_id, is_special, now);

        let aim_angle = (aim.y - origin.y).atan2(aim.x - origin.x);
        let arc = hit_arc(weapon, special);
        let reach = effective_range(weapon, special) + self.hitbox_radius;

        let victims: Vec<PlayerId> = state
            .players
            .values()
            .filter(|p| p.player_id != attacker_id && p.is_connected && p.is_alive())
            .filter(|p| {
                let distance = origin.distance(p.position);
                if distance > reach {
                    return false;
                }
                if arc >= SPIN_ARC || distance <= f32::EPSILON {
                    return true;
                }
                let angle = (p.position.y - origin.y).atan2(p.position.x - origin.x);
                PhysicsSystem::angle_difference(aim_angle, angle).abs() <= arc / 2.0
            })
            .map(|p| p.player_id)
            .collect();

        let mut outcome = AttackOutcome::default();
        let mut batch = DeltaBatch::default();

        for victim_id in &victims {
            let Some(victim) = state.players.get_mut(victim_id) else {
                continue;
            };
            let armor = victim
                .equipped_armor
                .as_deref()
                .and_then(|id| self.catalog.armor(id));
            let damage = compute_damage(weapon, special, armor);
            let (new_health, killed) = apply_damage(victim.current_health(), damage);
            victim.health = Some(new_health);

            let delta = batch.entry(*victim_id);
            delta.health = Some(new_health);

            if let Some(SpecialAbility {
                kind: SpecialKind::Stun { duration_ms },
                ..
            }) = special
            {
                victim.stun_until = now + duration_ms;
                delta.stun_until = Some(victim.stun_until);
            }

            if killed {
                outcome.killed.push(*victim_id);
            }
        }

        if !outcome.killed.is_empty() {
            if let Some(attacker) = state.players.get_mut(&attacker_id) {
                attacker.kills += outcome.killed.len() as u32;
                batch.entry(attacker_id).kills = Some(attacker.kills);
            }
        }

        if !batch.is_empty() {
            outcome.messages.push(ServerMsg::PlayerUpdates {
                updates: batch.into_updates(),
            });
        }

        for victim_id in &outcome.killed {
            info!(
                session_id = %state.session_id,
                killer_id = %attacker_id,
                victim_id = %victim_id,
                "Player killed"
            );
            outcome.messages.push(ServerMsg::PlayerDeath {
                victim_id: *victim_id,
                killer_id: Some(attacker_id),
            });
        }

        if !outcome.killed.is_empty() {
            outcome.match_ending = self.evaluate_win_condition(state, now);
        }

        outcome.victims = victims;
        Ok(outcome)
    }

    /// Latch the match into its ending phase once at most one player is alive.
    /// Returns true when the latch was set by this call.
    pub fn evaluate_win_condition(&self, state: &mut MatchState, now: u64) -> bool {
        if state.phase != MatchPhase::Running {
            return false;
        }

        let alive = state.alive_count();
        if alive <= 1 {
            state.phase = MatchPhase::Ending { since: now };
            info!(
                session_id = %state.session_id,
                alive,
                "Win condition met, match ending"
            );
            return true;
        }
        false
    }

    /// After the victory delay, end the match and build the game-over message
    pub fn finish_if_due(&self, state: &mut MatchState, now: u64) -> Option<ServerMsg> {
        let MatchPhase::Ending { since } = state.phase else {
            return None;
        };
        if now < since + self.victory_delay_ms {
            return None;
        }

        state.phase = MatchPhase::Ended;
        let winner_id = state.sole_survivor();
        info!(
            session_id = %state.session_id,
            winner_id = ?winner_id,
            "Match over"
        );
        Some(ServerMsg::GameOver {
            winner_id,
            stats: state.game_over_stats(),
        })
    }
}
