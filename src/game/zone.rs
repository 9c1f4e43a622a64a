//! Conflict zone: shrink phases and damage outside the safe area

use rand::Rng;

use crate::ws::protocol::{PlayerId, ServerMsg};

use super::combat::apply_damage;
use super::state::{DeltaBatch, MatchState};

/// Drives zone shrinking and periodic out-of-zone damage.
///
/// Damage is applied every `tick_ms`, but always for the full accumulated
/// time since the last application, so irregular host ticks never drift.
#[derive(Debug)]
pub struct ZoneController {
    tick_ms: u64,
    accumulated_ms: u64,
    last_update: Option<u64>,

    /// Seconds until the next shrink starts or the current shrink completes
    zone_timer: f32,
    current_phase: usize,
    is_shrinking: bool,
    shrink_from_radius: f32,
    shrink_from_center: (f32, f32),
    target_center: (f32, f32),
}

/// Result of one zone update
#[derive(Debug, Default)]
pub struct ZoneOutcome {
    pub messages: Vec<ServerMsg>,
    pub killed: Vec<PlayerId>,
}

impl ZoneController {
    pub fn new(tick_ms: u64) -> Self {
        Self {
            tick_ms: tick_ms.max(1),
            accumulated_ms: 0,
            last_update: None,
            zone_timer: 0.0,
            current_phase: 0,
            is_shrinking: false,
            shrink_from_radius: 0.0,
            shrink_from_center: (0.0, 0.0),
            target_center: (0.0, 0.0),
        }
    }

    /// Arm the zone when the match starts
    pub fn start(&mut self, state: &MatchState, now: u64) {
        self.last_update = Some(now);
        self.accumulated_ms = 0;
        self.zone_timer = state.zone_config.initial_delay;
        self.current_phase = 0;
        self.is_shrinking = false;
        self.target_center = (state.zone.center_x, state.zone.center_y);
    }

    /// Advance shrinking and apply damage. Does nothing unless the match is running.
    pub fn update(&mut self, state: &mut MatchState, now: u64) -> ZoneOutcome {
        let mut outcome = ZoneOutcome::default();
        if !state.accepts_mutation() {
            self.last_update = Some(now);
            return outcome;
        }

        let elapsed_ms = self
            .last_update
            .map(|last| now.saturating_sub(last))
            .unwrap_or(0);
        self.last_update = Some(now);

        if let Some(msg) = self.advance_shrink(state, elapsed_ms as f32 / 1000.0) {
            outcome.messages.push(msg);
        }

        self.accumulated_ms += elapsed_ms;
        if self.accumulated_ms >= self.tick_ms {
            let seconds = self.accumulated_ms as f32 / 1000.0;
            self.accumulated_ms = 0;
            self.apply_damage(state, seconds, &mut outcome);
        }

        outcome
    }

    fn advance_shrink(&mut self, state: &mut MatchState, dt: f32) -> Option<ServerMsg> {
        let mut announcement = None;
        self.zone_timer -= dt;

        if self.zone_timer <= 0.0 {
            if self.is_shrinking {
                // Finished shrinking, wait for next phase
                let phase = &state.zone_config.phases[self.current_phase];
                state.zone.radius = phase.target_radius;
                state.zone.center_x = self.target_center.0;
                state.zone.center_y = self.target_center.1;
                self.zone_timer = phase.delay_after;
                self.is_shrinking = false;
                self.current_phase += 1;
            } else if self.current_phase < state.zone_config.phases.len() {
                let phase = state.zone_config.phases[self.current_phase].clone();

                // Randomize new zone center (within current zone)
                let angle = state.rng.gen_range(0.0..std::f32::consts::TAU);
                let max_offset = (state.zone.radius - phase.target_radius).max(0.0) * 0.5;
                let offset = if max_offset > 0.0 {
                    state.rng.gen_range(0.0..max_offset)
                } else {
                    0.0
                };

                self.shrink_from_radius = state.zone.radius;
                self.shrink_from_center = (state.zone.center_x, state.zone.center_y);
                self.target_center = (
                    state.zone.center_x + angle.cos() * offset,
                    state.zone.center_y + angle.sin() * offset,
                );
                self.zone_timer = phase.shrink_duration;
                self.is_shrinking = true;

                state.zone.phase = self.current_phase as u32 + 1;
                state.zone.damage_per_second = state.zone_config.damage_for_phase(state.zone.phase);
                announcement = Some(ServerMsg::ZoneUpdate {
                    zone: state.zone.clone(),
                });
            }
        }

        if self.is_shrinking {
            let phase = &state.zone_config.phases[self.current_phase];
            let progress = if phase.shrink_duration > 0.0 {
                1.0 - (self.zone_timer / phase.shrink_duration).clamp(0.0, 1.0)
            } else {
                1.0
            };
            state.zone.radius =
                self.shrink_from_radius + (phase.target_radius - self.shrink_from_radius) * progress;
            state.zone.center_x = self.shrink_from_center.0
                + (self.target_center.0 - self.shrink_from_center.0) * progress;
            state.zone.center_y = self.shrink_from_center.1
                + (self.target_center.1 - self.shrink_from_center.1) * progress;
        }

        announcement
    }

    fn apply_damage(&self, state: &mut MatchState, seconds: f32, outcome: &mut ZoneOutcome) {
        let damage = state.zone.damage_per_second * seconds;
        if damage <= 0.0 {
            return;
        }

        let outside: Vec<PlayerId> = state
            .players
            .values()
            .filter(|p| p.is_connected && p.is_alive() && state.is_outside_zone(p.position))
            .map(|p| p.player_id)
            .collect();

        let mut batch = DeltaBatch::default();
        for player_id in outside {
            if let Some(player) = state.players.get_mut(&player_id) {
                let (new_health, killed) = apply_damage(player.current_health(), damage);
                player.health = Some(new_health);
                batch.entry(player_id).health = Some(new_health);
                if killed {
                    outcome.killed.push(player_id);
                }
            }
        }

        if !batch.is_empty() {
            outcome.messages.push(ServerMsg::PlayerUpdates {
                updates: batch.into_updates(),
            });
        }
        for victim_id in &outcome.killed {
            outcome.messages.push(ServerMsg::PlayerDeath {
                victim_id: *victim_id,
                killer_id: None,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Tuning;
    use crate::game::state::{MatchPhase, PlayerRecord};
    use crate::ws::protocol::Vec2;
    use uuid::Uuid;

    fn running_state() -> MatchState {
        let mut state = MatchState::new(Uuid::new_v4(), Uuid::new_v4(), 8, 3, &Tuning::default());
        state.phase = MatchPhase::Running;
        state
    }

    fn add(state: &mut MatchState, position: Vec2) -> PlayerId {
        let id = Uuid::new_v4();
        let mut rec = PlayerRecord::new(id, "p".into(), false, false);
        rec.position = position;
        rec.health = Some(100.0);
        state.players.insert(id, rec);
        id
    }

    #[test]
    fn damage_uses_accumulated_time() {
        let mut state = running_state();
        let outside = add(&mut state, Vec2::new(1.0, 1.0));
        let center = state.zone.center();
        let inside = add(&mut state, center);
        let mut zone = ZoneController::new(500);
        zone.start(&state, 0);

        // 300 ms: below tick interval, nothing applied
        zone.update(&mut state, 300);
        assert_eq!(state.players[&outside].current_health(), 100.0);

        // 700 ms total accumulated: 5 dps * 0.7 s
        let outcome = zone.update(&mut state, 700);
        assert!((state.players[&outside].current_health() - 96.5).abs() < 1e-4);
        assert_eq!(state.players[&inside].current_health(), 100.0);
        assert_eq!(outcome.messages.len(), 1);
    }

    #[test]
    fn zone_kills_emit_deaths_without_killer() {
        let mut state = running_state();
        let outside = add(&mut state, Vec2::new(1.0, 1.0));
        state.players.get_mut(&outside).unwrap().health = Some(1.0);
        let mut zone = ZoneController::new(500);
        zone.start(&state, 0);

        let outcome = zone.update(&mut state, 1_000);
        assert_eq!(outcome.killed, vec![outside]);
        assert!(outcome.messages.iter().any(|m| matches!(
            m,
            ServerMsg::PlayerDeath { victim_id, killer_id: None } if *victim_id == outside
        )));
    }

    #[test]
    fn frozen_while_ending() {
        let mut state = running_state();
        let outside = add(&mut state, Vec2::new(1.0, 1.0));
        let mut zone = ZoneController::new(500);
        zone.start(&state, 0);
        state.phase = MatchPhase::Ending { since: 0 };

        zone.update(&mut state, 10_000);
        assert_eq!(state.players[&outside].current_health(), 100.0);
    }

    #[test]
    fn shrink_starts_after_initial_delay() {
        let mut state = running_state();
        let initial = state.zone.radius;
        let mut zone = ZoneController::new(500);
        zone.start(&state, 0);

        let outcome = zone.update(&mut state, 60_000);
        assert!(outcome
            .messages
            .iter()
            .any(|m| matches!(m, ServerMsg::ZoneUpdate { zone } if zone.phase == 1)));
        assert_eq!(state.zone.damage_per_second, 10.0);

        zone.update(&mut state, 75_000);
        assert!(state.zone.radius < initial);
    }
}
