//! Host-side loot: spawning, proximity-checked pickups and equipment conservation

use std::sync::Arc;

use rand::Rng;
use tracing::info;
use uuid::Builder;

use crate::ws::protocol::{LootId, LootItem, LootKind, PlayerId, ServerMsg};

use super::catalog::{Catalog, UNARMED};
use super::state::{DeltaBatch, MatchState};

/// Why a pickup was dropped
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PickupRejection {
    MatchNotRunning,
    UnknownPlayer,
    PlayerDead,
    /// Already picked up by someone else, or never existed
    LootGone,
    TooFar { distance: f32 },
}

#[derive(Debug, Clone)]
pub struct LootAuthority {
    catalog: Arc<Catalog>,
    pickup_radius: f32,
}

impl LootAuthority {
    pub fn new(catalog: Arc<Catalog>, pickup_radius: f32) -> Self {
        Self {
            catalog,
            pickup_radius,
        }
    }

    pub fn pickup_radius(&self) -> f32 {
        self.pickup_radius
    }

    /// Place a new item in the world and build its announcement
    pub fn spawn(
        &self,
        state: &mut MatchState,
        kind: LootKind,
        item_id: &str,
        x: f32,
        y: f32,
    ) -> ServerMsg {
        let item = place(state, kind, item_id, x, y);
        ServerMsg::LootSpawned { item }
    }

    /// Quietly scatter `count` random catalog items inside the zone, roughly
    /// three weapons for every armor piece. Clients learn them from the next
    /// [`LootAuthority::sync`]. Returns how many were placed.
    pub fn scatter(&self, state: &mut MatchState, count: usize) -> usize {
        let weapons = self.catalog.loot_weapon_ids();
        let armors = self.catalog.loot_armor_ids();
        let mut placed = 0;

        for _ in 0..count {
            let pick_armor = !armors.is_empty() && (weapons.is_empty() || state.rng.gen_bool(0.25));
            let (kind, pool) = if pick_armor {
                (LootKind::Armor, &armors)
            } else {
                (LootKind::Weapon, &weapons)
            };
            if pool.is_empty() {
                break;
            }
            let item_id = pool[state.rng.gen_range(0..pool.len())].to_string();
            let position = state.random_open_position(15.0);
            place(state, kind, &item_id, position.x, position.y);
            placed += 1;
        }

        placed
    }

    /// Validate and apply a pickup. On success the player's slot is swapped,
    /// the item is removed, and the displaced equipment (if any) is dropped at
    /// the player's position.
    pub fn handle_pickup(
        &self,
        state: &mut MatchState,
        player_id: PlayerId,
        loot_id: LootId,
    ) -> Result<Vec<ServerMsg>, PickupRejection> {
        if !state.is_running() {
            return Err(PickupRejection::MatchNotRunning);
        }

        let player = state
            .players
            .get(&player_id)
            .ok_or(PickupRejection::UnknownPlayer)?;
        if !player.is_alive() {
            return Err(PickupRejection::PlayerDead);
        }
        let position = player.position;

        let index = state
            .loot
            .iter()
            .position(|l| l.id == loot_id)
            .ok_or(PickupRejection::LootGone)?;
        let distance = position.distance(state.loot[index].position());
        if distance > self.pickup_radius {
            return Err(PickupRejection::TooFar { distance });
        }

        let item = state.loot.remove(index);
        let mut batch = DeltaBatch::default();
        let mut dropped = None;

        if let Some(player) = state.players.get_mut(&player_id) {
            match item.kind {
                LootKind::Weapon => {
                    let previous =
                        std::mem::replace(&mut player.equipped_weapon, item.item_id.clone());
                    batch.entry(player_id).equipped_weapon = Some(item.item_id.clone());
                    if previous != UNARMED {
                        dropped = Some((LootKind::Weapon, previous));
                    }
                }
                LootKind::Armor => {
                    let previous = player.equipped_armor.replace(item.item_id.clone());
                    batch.entry(player_id).equipped_armor = Some(item.item_id.clone());
                    dropped = previous.map(|armor| (LootKind::Armor, armor));
                }
            }
        }

        info!(
            session_id = %state.session_id,
            player_id = %player_id,
            item_id = %item.item_id,
            "Loot picked up"
        );

        let mut messages = vec![
            ServerMsg::PlayerUpdates {
                updates: batch.into_updates(),
            },
            ServerMsg::LootPickedUp { loot_id, player_id },
        ];
        if let Some((kind, item_id)) = dropped {
            messages.push(self.spawn(state, kind, &item_id, position.x, position.y));
        }

        Ok(messages)
    }

    /// Full loot list for late joiners
    pub fn sync(&self, state: &MatchState) -> ServerMsg {
        ServerMsg::LootSync {
            items: state.loot.clone(),
        }
    }
}

fn place(state: &mut MatchState, kind: LootKind, item_id: &str, x: f32, y: f32) -> LootItem {
    let item = LootItem {
        id: next_loot_id(state),
        kind,
        item_id: item_id.to_string(),
        x,
        y,
    };
    state.loot.push(item.clone());
    item
}

/// Loot ids come from the match RNG so a seeded match is reproducible
fn next_loot_id(state: &mut MatchState) -> LootId {
    Builder::from_random_bytes(state.rng.gen()).into_uuid()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Tuning;
    use crate::game::state::{MatchPhase, PlayerRecord};
    use crate::ws::protocol::Vec2;
    use uuid::Uuid;

    fn setup() -> (MatchState, LootAuthority, PlayerId) {
        let mut state = MatchState::new(Uuid::new_v4(), Uuid::new_v4(), 8, 11, &Tuning::default());
        state.phase = MatchPhase::Running;
        let id = Uuid::new_v4();
        let mut rec = PlayerRecord::new(id, "looter".into(), false, false);
        rec.position = Vec2::new(400.0, 400.0);
        rec.health = Some(100.0);
        state.players.insert(id, rec);
        (state, LootAuthority::new(Arc::new(Catalog::default()), 60.0), id)
    }

    #[test]
    fn unarmed_pickup_drops_nothing() {
        let (mut state, loot, id) = setup();
        loot.spawn(&mut state, LootKind::Weapon, "sword", 420.0, 400.0);
        let loot_id = state.loot[0].id;

        let messages = loot.handle_pickup(&mut state, id, loot_id).unwrap();
        assert!(state.loot.is_empty());
        assert_eq!(state.players[&id].equipped_weapon, "sword");
        assert_eq!(messages.len(), 2);
    }

    #[test]
    fn swapping_weapons_conserves_equipment() {
        let (mut state, loot, id) = setup();
        state.players.get_mut(&id).unwrap().equipped_weapon = "axe".to_string();
        loot.spawn(&mut state, LootKind::Weapon, "spear", 430.0, 400.0);
        let picked = state.loot[0].id;

        let messages = loot.handle_pickup(&mut state, id, picked).unwrap();

        assert_eq!(state.loot.len(), 1);
        let dropped = &state.loot[0];
        assert_ne!(dropped.id, picked);
        assert_eq!(dropped.item_id, "axe");
        assert_eq!(dropped.position(), Vec2::new(400.0, 400.0));
        assert_eq!(state.players[&id].equipped_weapon, "spear");
        assert!(matches!(messages.last(), Some(ServerMsg::LootSpawned { .. })));
    }

    #[test]
    fn armor_swap_drops_previous_armor() {
        let (mut state, loot, id) = setup();
        state.players.get_mut(&id).unwrap().equipped_armor = Some("leather".to_string());
        loot.spawn(&mut state, LootKind::Armor, "plate", 400.0, 410.0);
        let picked = state.loot[0].id;

        loot.handle_pickup(&mut state, id, picked).unwrap();
        assert_eq!(state.players[&id].equipped_armor.as_deref(), Some("plate"));
        assert_eq!(state.loot.len(), 1);
        assert_eq!(state.loot[0].kind, LootKind::Armor);
        assert_eq!(state.loot[0].item_id, "leather");
    }

    #[test]
    fn distant_loot_is_rejected() {
        let (mut state, loot, id) = setup();
        loot.spawn(&mut state, LootKind::Weapon, "hammer", 600.0, 400.0);
        let loot_id = state.loot[0].id;

        let result = loot.handle_pickup(&mut state, id, loot_id);
        assert!(matches!(result, Err(PickupRejection::TooFar { .. })));
        assert_eq!(state.loot.len(), 1);
        assert_eq!(state.players[&id].equipped_weapon, UNARMED);
    }

    #[test]
    fn second_pickup_of_same_item_fails() {
        let (mut state, loot, id) = setup();
        loot.spawn(&mut state, LootKind::Weapon, "sword", 400.0, 400.0);
        let loot_id = state.loot[0].id;

        loot.handle_pickup(&mut state, id, loot_id).unwrap();
        assert!(matches!(
            loot.handle_pickup(&mut state, id, loot_id),
            Err(PickupRejection::LootGone)
        ));
    }

    #[test]
    fn dead_players_cannot_loot() {
        let (mut state, loot, id) = setup();
        state.players.get_mut(&id).unwrap().health = Some(0.0);
        loot.spawn(&mut state, LootKind::Weapon, "sword", 400.0, 400.0);
        let loot_id = state.loot[0].id;
        assert!(matches!(
            loot.handle_pickup(&mut state, id, loot_id),
            Err(PickupRejection::PlayerDead)
        ));
    }

    #[test]
    fn random_spawns_use_catalog_items() {
        let (mut state, loot, _) = setup();
        assert_eq!(loot.scatter(&mut state, 10), 10);
        assert_eq!(state.loot.len(), 10);
        let catalog = Catalog::default();
        for item in &state.loot {
            match item.kind {
                LootKind::Weapon => assert!(catalog.has_weapon(&item.item_id)),
                LootKind::Armor => assert!(catalog.armor(&item.item_id).is_some()),
            }
        }
    }
}
