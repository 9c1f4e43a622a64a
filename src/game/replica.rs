//! Client-side projection of a session, rebuilt purely from host broadcasts

use std::collections::BTreeMap;

use crate::config::Tuning;
use crate::ws::protocol::{
    JoinResult, LootId, LootItem, PlayerDelta, PlayerId, PlayerInfo, PlayerStat, ServerMsg, Vec2,
    ZoneState,
};

use super::interpolation::{Interpolator, PositionSample, RenderState};

/// What a client knows about one player
#[derive(Debug, Clone)]
pub struct ReplicaPlayer {
    pub info: PlayerInfo,
    pub kills: u32,
    pub stun_until: u64,
    pub is_connected: bool,
}

impl ReplicaPlayer {
    fn from_info(info: PlayerInfo) -> Self {
        Self {
            info,
            kills: 0,
            stun_until: 0,
            is_connected: true,
        }
    }

    /// Host-owned fields always take the host's value
    fn apply_delta(&mut self, delta: &PlayerDelta) {
        if let Some(health) = delta.health {
            self.info.health = Some(health);
        }
        if let Some(kills) = delta.kills {
            self.kills = kills;
        }
        if let Some(stun_until) = delta.stun_until {
            self.stun_until = stun_until;
        }
        if let Some(weapon) = &delta.equipped_weapon {
            self.info.equipped_weapon = weapon.clone();
        }
        if let Some(armor) = &delta.equipped_armor {
            self.info.equipped_armor = Some(armor.clone());
        }
    }
}

/// Final result as announced by the host
#[derive(Debug, Clone, PartialEq)]
pub struct FinalResult {
    pub winner_id: Option<PlayerId>,
    pub stats: Vec<PlayerStat>,
}

/// Read-only rendering projection. It never produces state of its own: the
/// only inputs are host messages and the local player's own movement.
#[derive(Debug)]
pub struct ReplicaView {
    local_player: Option<PlayerId>,
    players: BTreeMap<PlayerId, ReplicaPlayer>,
    loot: BTreeMap<LootId, LootItem>,
    zone: Option<ZoneState>,
    interpolator: Interpolator,
    result: Option<FinalResult>,
}

impl ReplicaView {
    pub fn new(tuning: &Tuning) -> Self {
        Self {
            local_player: None,
            players: BTreeMap::new(),
            loot: BTreeMap::new(),
            zone: None,
            interpolator: Interpolator::from_tuning(tuning),
            result: None,
        }
    }

    pub fn local_player(&self) -> Option<PlayerId> {
        self.local_player
    }

    pub fn player(&self, player_id: &PlayerId) -> Option<&ReplicaPlayer> {
        self.players.get(player_id)
    }

    pub fn loot(&self) -> impl Iterator<Item = &LootItem> {
        self.loot.values()
    }

    pub fn zone(&self) -> Option<&ZoneState> {
        self.zone.as_ref()
    }

    pub fn result(&self) -> Option<&FinalResult> {
        self.result.as_ref()
    }

    /// Smoothed position of a remote player for the renderer
    pub fn render_state(&self, player_id: &PlayerId, render_time: u64) -> Option<RenderState> {
        self.interpolator.query_state(player_id, render_time)
    }

    pub fn apply(&mut self, msg: &ServerMsg) {
        match msg {
            ServerMsg::Welcome { player_id, .. } => {
                self.local_player = Some(*player_id);
            }
            ServerMsg::JoinAck {
                result: JoinResult::Accepted { player_id, .. },
                ..
            } if self.local_player.is_none() => {
                self.local_player = Some(*player_id);
            }
            ServerMsg::JoinAck { .. } => {}
            ServerMsg::PlayerJoined { player } => {
                self.players
                    .entry(player.player_id)
                    .and_modify(|p| {
                        p.info = player.clone();
                        p.is_connected = true;
                    })
                    .or_insert_with(|| ReplicaPlayer::from_info(player.clone()));
            }
            ServerMsg::PlayerLeft { player_id, .. } => {
                if let Some(player) = self.players.get_mut(player_id) {
                    player.is_connected = false;
                }
                self.interpolator.remove_player(player_id);
            }
            ServerMsg::MatchStarted { players, zone } => {
                self.zone = Some(zone.clone());
                self.result = None;
                self.interpolator.clear();
                for info in players {
                    let entry = self
                        .players
                        .entry(info.player_id)
                        .or_insert_with(|| ReplicaPlayer::from_info(info.clone()));
                    entry.info = info.clone();
                }
            }
            ServerMsg::PositionBroadcast { updates, .. } => {
                for update in updates {
                    // Own movement is client-owned; the host does not echo it back
                    if Some(update.player_id) == self.local_player {
                        continue;
                    }
                    self.interpolator.record_sample(
                        update.player_id,
                        PositionSample {
                            x: update.position.x,
                            y: update.position.y,
                            rotation: update.rotation,
                            vx: update.velocity.x,
                            vy: update.velocity.y,
                            timestamp: update.timestamp,
                        },
                    );
                    if let Some(player) = self.players.get_mut(&update.player_id) {
                        player.info.position = update.position;
                    }
                }
            }
            ServerMsg::PlayerUpdates { updates } => {
                for delta in updates {
                    if let Some(player) = self.players.get_mut(&delta.player_id) {
                        player.apply_delta(delta);
                    }
                }
            }
            ServerMsg::PlayerDeath { victim_id, .. } => {
                if let Some(player) = self.players.get_mut(victim_id) {
                    player.info.health = Some(0.0);
                }
            }
            ServerMsg::GameOver { winner_id, stats } => {
                self.result = Some(FinalResult {
                    winner_id: *winner_id,
                    stats: stats.clone(),
                });
            }
            ServerMsg::LootSpawned { item } => {
                self.loot.insert(item.id, item.clone());
            }
            ServerMsg::LootPickedUp { loot_id, .. } => {
                self.loot.remove(loot_id);
            }
            ServerMsg::LootSync { items } => {
                self.loot = items.iter().map(|i| (i.id, i.clone())).collect();
            }
            ServerMsg::ZoneUpdate { zone } => {
                self.zone = Some(zone.clone());
            }
            ServerMsg::Error { .. } | ServerMsg::Pong { .. } => {}
        }
    }

    /// Record the local player's own movement (the only client-owned field)
    pub fn apply_local_movement(&mut self, position: Vec2) {
        let Some(local) = self.local_player else {
            return;
        };
        if let Some(player) = self.players.get_mut(&local) {
            player.info.position = position;
        }
    }
}
