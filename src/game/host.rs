//! Session host runtime: the single owner of a session's match state

use dashmap::{DashMap, DashSet};
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::Tuning;
use crate::relay::{Envelope, Relay};
use crate::session::{Session, SessionHandle, SessionStatus};
use crate::store::SessionStore;
use crate::util::time::{HostClock, POSITION_BROADCAST_INTERVAL_MS, TICK_DURATION_MICROS};
use crate::ws::protocol::{
    ClientMsg, JoinRejection, JoinResult, LootId, PlayerId, PositionEntry, ServerMsg, Vec2,
};

use super::bot::BotAgent;
use super::broadcast::{BroadcastTimer, PositionBatch};
use super::catalog::Catalog;
use super::combat::CombatResolver;
use super::interpolation::{Interpolator, PositionSample};
use super::loot::LootAuthority;
use super::state::{MatchPhase, MatchState, PlayerRecord, MAX_HEALTH};
use super::validator::PositionValidator;
use super::zone::ZoneController;

/// Runs one session. Every mutation of the match happens inside
/// [`HostRuntime::handle_message`] or [`HostRuntime::tick`], both called from
/// the runtime's own task, so match state is never shared.
pub struct HostRuntime {
    state: MatchState,
    validator: PositionValidator,
    interpolator: Interpolator,
    combat: CombatResolver,
    loot: LootAuthority,
    zone: ZoneController,
    bots: Vec<BotAgent>,

    batch: Arc<Mutex<PositionBatch>>,
    timer: BroadcastTimer,

    inbound_rx: mpsc::Receiver<Envelope>,
    relay: Relay,
    session: Arc<RwLock<Session>>,
    members: Arc<DashSet<PlayerId>>,
    player_count: Arc<AtomicUsize>,
    store: SessionStore,

    clock: HostClock,
    catalog: Arc<Catalog>,
    tuning: Tuning,
    last_tick: Option<u64>,
}

impl HostRuntime {
    /// Build a host for `session` and the handle the registry keeps
    pub fn new(
        session: Session,
        tuning: Tuning,
        catalog: Arc<Catalog>,
        store: SessionStore,
        seed: u64,
    ) -> (Self, SessionHandle) {
        let clock = HostClock::start();
        let (relay, inbound_rx) = Relay::new(
            session.id,
            Duration::from_millis(tuning.join_ack_timeout_ms),
        );

        let state = MatchState::new(
            session.id,
            session.host_id,
            session.max_players,
            seed,
            &tuning,
        );
        let batch = Arc::new(Mutex::new(PositionBatch::new(session.host_id)));
        let timer = BroadcastTimer::new(
            batch.clone(),
            relay.clone(),
            clock,
            Duration::from_millis(POSITION_BROADCAST_INTERVAL_MS),
        );

        let session_id = session.id;
        let session = Arc::new(RwLock::new(Session {
            zone: state.zone.clone(),
            ..session
        }));
        let members = Arc::new(DashSet::new());
        let player_count = Arc::new(AtomicUsize::new(0));

        let handle = SessionHandle {
            id: session_id,
            session: session.clone(),
            relay: relay.clone(),
            members: members.clone(),
            player_count: player_count.clone(),
            tokens: Arc::new(DashMap::new()),
        };

        let runtime = Self {
            validator: PositionValidator::new(state.bounds, tuning.max_displacement),
            interpolator: Interpolator::from_tuning(&tuning),
            combat: CombatResolver::new(catalog.clone(), &tuning),
            loot: LootAuthority::new(catalog.clone(), tuning.pickup_radius),
            zone: ZoneController::new(tuning.zone_tick_ms),
            bots: Vec::new(),
            state,
            batch,
            timer,
            inbound_rx,
            relay,
            session,
            members,
            player_count,
            store,
            clock,
            catalog,
            tuning,
            last_tick: None,
        };

        (runtime, handle)
    }

    pub fn state(&self) -> &MatchState {
        &self.state
    }

    pub fn interpolator(&self) -> &Interpolator {
        &self.interpolator
    }

    pub fn relay(&self) -> &Relay {
        &self.relay
    }

    pub fn bot_ids(&self) -> Vec<PlayerId> {
        self.bots.iter().map(|b| b.player_id).collect()
    }

    /// Add a bot player while the session is still in the lobby
    pub fn add_bot(&mut self, display_name: String) -> Option<PlayerId> {
        if self.state.phase != MatchPhase::Lobby || self.state.players.len() >= self.state.max_players {
            return None;
        }

        let bot_id = PlayerId::new_v4();
        let record = PlayerRecord::new(bot_id, display_name, false, true);
        self.store.persist_player(self.state.session_id, &record);
        let info = record.info();
        self.state.players.insert(bot_id, record);

        let seed = self.state.rng.gen();
        self.bots
            .push(BotAgent::new(bot_id, self.catalog.clone(), &self.tuning, seed));
        self.members.insert(bot_id);
        self.refresh_player_count();
        self.relay.broadcast(ServerMsg::PlayerJoined { player: info });

        info!(session_id = %self.state.session_id, bot_id = %bot_id, "Bot added");
        Some(bot_id)
    }

    /// Run the host loop until the match ends or the session expires
    pub async fn run(mut self) {
        info!(session_id = %self.state.session_id, "Session host started");

        let mut tick_interval = interval(Duration::from_micros(TICK_DURATION_MICROS));
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.timer.start();

        loop {
            tick_interval.tick().await;
            let now = self.clock.now_ms();

            // Drain inbound queue
            loop {
                match self.inbound_rx.try_recv() {
                    Ok(envelope) => self.handle_message(envelope.sender, envelope.msg, now),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        warn!(session_id = %self.state.session_id, "Relay closed");
                        self.timer.stop();
                        return;
                    }
                }
            }

            self.tick(now);

            if self.state.phase == MatchPhase::Ended {
                break;
            }

            let expired = self.session.read().is_expired(chrono::Utc::now());
            if expired {
                info!(session_id = %self.state.session_id, "Session expired");
                self.relay.broadcast(ServerMsg::Error {
                    code: "session_expired".to_string(),
                    message: "Session expired".to_string(),
                });
                self.set_status(SessionStatus::Ended);
                break;
            }
        }

        self.timer.stop();
        info!(session_id = %self.state.session_id, "Session host stopped");
    }

    /// The single dispatch path for every client message, human or bot
    pub fn handle_message(&mut self, sender: PlayerId, msg: ClientMsg, now: u64) {
        match msg {
            ClientMsg::JoinRequest {
                request_id,
                display_name,
                player_id,
            } => self.handle_join(sender, request_id, display_name, player_id),
            ClientMsg::StartMatch => self.handle_start(sender, now),
            ClientMsg::PositionUpdate {
                position,
                rotation,
                velocity,
            } => self.handle_position(sender, position, rotation, velocity, now),
            ClientMsg::AttackRequest {
                aim_x,
                aim_y,
                is_special,
                ..
            } => self.handle_attack(sender, Vec2::new(aim_x, aim_y), is_special, now),
            ClientMsg::PickupRequest { loot_id } => self.handle_pickup(sender, loot_id),
            ClientMsg::LootSyncRequest => {
                self.relay.send_to(sender, self.loot.sync(&self.state));
            }
            ClientMsg::Ping { t } => {
                self.relay.send_to(sender, ServerMsg::Pong { t });
            }
            ClientMsg::Leave => self.handle_leave(sender, now),
        }
    }

    /// One host step: bots decide, the zone advances, the victory delay resolves
    pub fn tick(&mut self, now: u64) {
        let dt_ms = self
            .last_tick
            .map(|last| now.saturating_sub(last))
            .unwrap_or(0);
        self.last_tick = Some(now);

        if self.state.accepts_mutation() {
            for i in 0..self.bots.len() {
                let bot_id = self.bots[i].player_id;
                let intents = self.bots[i].decide(&self.state, dt_ms, now);
                for intent in intents {
                    self.handle_message(bot_id, intent, now);
                }
            }
        }

        let outcome = self.zone.update(&mut self.state, now);
        let zone_changed = outcome
            .messages
            .iter()
            .any(|m| matches!(m, ServerMsg::ZoneUpdate { .. }));
        for msg in outcome.messages {
            self.relay.broadcast(msg);
        }
        if zone_changed {
            self.session.write().zone = self.state.zone.clone();
        }
        if !outcome.killed.is_empty() {
            for victim_id in &outcome.killed {
                info!(session_id = %self.state.session_id, victim_id = %victim_id, "Player died in zone");
            }
            self.combat.evaluate_win_condition(&mut self.state, now);
        }

        if let Some(game_over) = self.combat.finish_if_due(&mut self.state, now) {
            self.relay.broadcast(game_over);
            for record in self.state.players.values() {
                self.store.persist_player(self.state.session_id, record);
            }
            self.set_status(SessionStatus::Ended);
            self.timer.stop();
        }
    }

    fn handle_join(
        &mut self,
        sender: PlayerId,
        request_id: uuid::Uuid,
        display_name: String,
        player_id: Option<PlayerId>,
    ) {
        let session_id = self.state.session_id;

        // A join may only ever speak for its own sender
        if matches!(player_id, Some(claimed) if claimed != sender) {
            warn!(session_id = %session_id, player_id = %sender, "Join for another player refused");
            let result = JoinResult::Rejected {
                reason: JoinRejection::NotJoinable,
            };
            self.relay.acknowledge_join(request_id, result.clone());
            self.relay.send_to(sender, ServerMsg::JoinAck { request_id, result });
            return;
        }
        let player_id = sender;

        let result = if let Some(record) = self.state.players.get_mut(&player_id) {
            // Reconnect keeps the record, including host-owned fields
            record.is_connected = true;
            JoinResult::Accepted {
                player_id,
                is_host: record.is_host,
            }
        } else if self.state.phase != MatchPhase::Lobby {
            JoinResult::Rejected {
                reason: JoinRejection::NotJoinable,
            }
        } else if self.state.players.len() >= self.state.max_players {
            JoinResult::Rejected {
                reason: JoinRejection::Full,
            }
        } else {
            let is_host = player_id == self.state.host_id;
            let record = PlayerRecord::new(player_id, clean_display_name(&display_name, player_id), is_host, false);
            self.state.players.insert(player_id, record);
            JoinResult::Accepted { player_id, is_host }
        };

        self.relay.acknowledge_join(request_id, result.clone());
        self.relay.broadcast(ServerMsg::JoinAck {
            request_id,
            result: result.clone(),
        });

        if let JoinResult::Rejected { reason } = result {
            debug!(session_id = %session_id, player_id = %player_id, ?reason, "Join rejected");
            return;
        }

        self.members.insert(player_id);
        self.refresh_player_count();

        if let Some(record) = self.state.players.get(&player_id) {
            self.store.persist_player(session_id, record);
            self.relay.broadcast(ServerMsg::PlayerJoined {
                player: record.info(),
            });
            info!(
                session_id = %session_id,
                player_id = %player_id,
                player_count = self.state.players.len(),
                "Player joined session"
            );
        }

        // Late joiners and reconnects need the world as it is now
        if self.state.is_running() {
            self.relay.send_to(
                player_id,
                ServerMsg::MatchStarted {
                    players: self.player_infos(),
                    zone: self.state.zone.clone(),
                },
            );
        }
        self.relay.send_to(player_id, self.loot.sync(&self.state));
    }

    fn handle_start(&mut self, sender: PlayerId, now: u64) {
        if sender != self.state.host_id {
            debug!(session_id = %self.state.session_id, player_id = %sender, "Start ignored, not host");
            return;
        }
        if self.state.phase != MatchPhase::Lobby {
            debug!(session_id = %self.state.session_id, "Start ignored, already started");
            return;
        }

        self.state.phase = MatchPhase::Running;
        self.state.started_at = Some(now);

        let ids: Vec<PlayerId> = self.state.players.keys().copied().collect();
        for id in ids {
            let spawn = self.state.random_open_position(self.tuning.hitbox_radius);
            if let Some(record) = self.state.players.get_mut(&id) {
                record.position = spawn;
                record.velocity = Vec2::ZERO;
                record.health = Some(MAX_HEALTH);
            }
            self.validator.reset(id, spawn);
            self.interpolator.record_sample(
                id,
                PositionSample {
                    x: spawn.x,
                    y: spawn.y,
                    rotation: 0.0,
                    vx: 0.0,
                    vy: 0.0,
                    timestamp: now,
                },
            );
        }

        let scattered = self.loot.scatter(&mut self.state, self.tuning.initial_loot_count);
        debug!(session_id = %self.state.session_id, scattered, "Initial loot placed");
        self.zone.start(&self.state, now);
        self.set_status(SessionStatus::Active);

        self.relay.broadcast(ServerMsg::MatchStarted {
            players: self.player_infos(),
            zone: self.state.zone.clone(),
        });
        self.relay.broadcast(self.loot.sync(&self.state));

        info!(
            session_id = %self.state.session_id,
            players = self.state.players.len(),
            "Match started"
        );
    }

    fn handle_position(
        &mut self,
        sender: PlayerId,
        position: Vec2,
        rotation: f32,
        velocity: Vec2,
        now: u64,
    ) {
        let Some(record) = self.state.players.get(&sender) else {
            debug!(player_id = %sender, "Position from unknown player");
            return;
        };
        if self.state.phase == MatchPhase::Ended || !record.is_alive() || !record.is_connected {
            return;
        }
        if !rotation.is_finite() {
            debug!(player_id = %sender, "Position update rejected: rotation not finite");
            return;
        }

        if let Err(reason) = self.validator.propose(sender, position, velocity) {
            debug!(player_id = %sender, ?reason, "Position update rejected");
            return;
        }

        if let Some(record) = self.state.players.get_mut(&sender) {
            record.position = position;
            record.rotation = rotation;
            record.velocity = velocity;
        }

        self.interpolator.record_sample(
            sender,
            PositionSample {
                x: position.x,
                y: position.y,
                rotation,
                vx: velocity.x,
                vy: velocity.y,
                timestamp: now,
            },
        );
        self.batch.lock().push(PositionEntry {
            player_id: sender,
            position,
            rotation,
            velocity,
            timestamp: now,
        });
    }

    fn handle_attack(&mut self, sender: PlayerId, aim: Vec2, is_special: bool, now: u64) {
        match self
            .combat
            .handle_attack(&mut self.state, sender, aim, is_special, now)
        {
            Ok(outcome) => {
                for msg in outcome.messages {
                    self.relay.broadcast(msg);
                }
            }
            Err(reason) => {
                debug!(player_id = %sender, ?reason, "Attack rejected");
            }
        }
    }

    fn handle_pickup(&mut self, sender: PlayerId, loot_id: LootId) {
        match self.loot.handle_pickup(&mut self.state, sender, loot_id) {
            Ok(messages) => {
                for msg in messages {
                    self.relay.broadcast(msg);
                }
            }
            Err(reason) => {
                debug!(player_id = %sender, loot_id = %loot_id, ?reason, "Pickup rejected");
            }
        }
    }

    fn handle_leave(&mut self, sender: PlayerId, now: u64) {
        let Some(record) = self.state.players.get_mut(&sender) else {
            return;
        };
        if !record.is_connected {
            return;
        }
        record.is_connected = false;
        self.store.persist_player(self.state.session_id, record);

        self.batch.lock().forget(&sender);
        self.interpolator.remove_player(&sender);
        self.refresh_player_count();

        self.relay.broadcast(ServerMsg::PlayerLeft {
            player_id: sender,
            reason: "left".to_string(),
        });
        info!(session_id = %self.state.session_id, player_id = %sender, "Player left session");

        self.combat.evaluate_win_condition(&mut self.state, now);
    }

    fn player_infos(&self) -> Vec<crate::ws::protocol::PlayerInfo> {
        self.state.players.values().map(PlayerRecord::info).collect()
    }

    fn refresh_player_count(&self) {
        let connected = self
            .state
            .players
            .values()
            .filter(|p| p.is_connected)
            .count();
        self.player_count.store(connected, Ordering::Relaxed);
    }

    fn set_status(&self, status: SessionStatus) {
        let mut session = self.session.write();
        session.status = status;
        session.zone = self.state.zone.clone();
        self.store.mark_status(session.id, status);
    }
}

fn clean_display_name(name: &str, player_id: PlayerId) -> String {
    let trimmed: String = name.trim().chars().take(24).collect();
    if trimmed.is_empty() {
        format!("Player_{}", &player_id.simple().to_string()[..8])
    } else {
        trimmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::Outbound;
    use crate::game::state::initial_zone;
    use tokio::sync::broadcast;
    use uuid::Uuid;

    struct Harness {
        host: HostRuntime,
        handle: SessionHandle,
        rx: broadcast::Receiver<Outbound>,
        host_id: PlayerId,
    }

    impl Harness {
        fn new(max_players: usize) -> Self {
            let tuning = Tuning::default();
            let host_id = Uuid::new_v4();
            let session = Session::new(
                host_id,
                max_players,
                initial_zone(&tuning),
                chrono::Duration::hours(2),
            );
            let (host, handle) = HostRuntime::new(
                session,
                tuning,
                Arc::new(Catalog::default()),
                SessionStore::disabled(),
                42,
            );
            let rx = handle.relay.subscribe();
            let mut harness = Self {
                host,
                handle,
                rx,
                host_id,
            };
            harness.join(host_id, "host");
            harness
        }

        fn join(&mut self, id: PlayerId, name: &str) -> JoinResult {
            let request_id = Uuid::new_v4();
            self.host.handle_message(
                id,
                ClientMsg::JoinRequest {
                    request_id,
                    display_name: name.to_string(),
                    player_id: None,
                },
                0,
            );
            self.drain()
                .into_iter()
                .find_map(|o| match o.msg {
                    ServerMsg::JoinAck { request_id: r, result } if r == request_id => Some(result),
                    _ => None,
                })
                .expect("join ack")
        }

        fn drain(&mut self) -> Vec<Outbound> {
            let mut out = Vec::new();
            while let Ok(msg) = self.rx.try_recv() {
                out.push(msg);
            }
            out
        }

        fn place(&mut self, id: PlayerId, x: f32, y: f32) {
            let p = Vec2::new(x, y);
            self.host.state.players.get_mut(&id).unwrap().position = p;
            self.host.validator.reset(id, p);
        }
    }

    #[test]
    fn creator_joins_as_host() {
        let harness = Harness::new(4);
        let record = harness.host.state().player(&harness.host_id).unwrap();
        assert!(record.is_host);
        assert_eq!(harness.handle.player_count(), 1);
        assert!(harness.handle.is_member(&harness.host_id));
    }

    #[test]
    fn full_session_rejects_new_players() {
        let mut harness = Harness::new(2);
        assert!(matches!(
            harness.join(Uuid::new_v4(), "two"),
            JoinResult::Accepted { is_host: false, .. }
        ));
        assert_eq!(
            harness.join(Uuid::new_v4(), "three"),
            JoinResult::Rejected {
                reason: JoinRejection::Full
            }
        );
    }

    #[test]
    fn only_reconnects_are_admitted_once_running() {
        let mut harness = Harness::new(4);
        let guest = Uuid::new_v4();
        harness.join(guest, "guest");
        harness.host.handle_message(harness.host_id, ClientMsg::StartMatch, 1_000);
        harness.host.handle_message(guest, ClientMsg::Leave, 1_100);

        assert_eq!(
            harness.join(Uuid::new_v4(), "late"),
            JoinResult::Rejected {
                reason: JoinRejection::NotJoinable
            }
        );

        let request_id = Uuid::new_v4();
        harness.host.handle_message(
            guest,
            ClientMsg::JoinRequest {
                request_id,
                display_name: "guest".to_string(),
                player_id: Some(guest),
            },
            1_200,
        );
        assert!(harness.host.state().player(&guest).unwrap().is_connected);
        let replay = harness.drain();
        assert!(replay.iter().any(|o| o.recipient == Some(guest)
            && matches!(o.msg, ServerMsg::MatchStarted { .. })));
    }

    #[test]
    fn only_the_host_starts_the_match() {
        let mut harness = Harness::new(4);
        let guest = Uuid::new_v4();
        harness.join(guest, "guest");

        harness.host.handle_message(guest, ClientMsg::StartMatch, 1_000);
        assert_eq!(harness.host.state().phase, MatchPhase::Lobby);

        harness.host.handle_message(harness.host_id, ClientMsg::StartMatch, 1_000);
        assert_eq!(harness.host.state().phase, MatchPhase::Running);
        assert_eq!(harness.handle.status(), SessionStatus::Active);

        let state = harness.host.state();
        assert_eq!(state.loot.len(), Tuning::default().initial_loot_count);
        assert!(state
            .players
            .values()
            .all(|p| p.health == Some(MAX_HEALTH) && !state.is_outside_zone(p.position)));
        let sent = harness.drain();
        assert!(sent
            .iter()
            .any(|o| matches!(o.msg, ServerMsg::MatchStarted { .. })));
        assert!(sent.iter().any(|o| matches!(o.msg, ServerMsg::LootSync { .. })));
        // Initial loot arrives in the sync alone
        assert!(!sent.iter().any(|o| matches!(o.msg, ServerMsg::LootSpawned { .. })));
    }

    #[test]
    fn accepted_positions_feed_interpolator_and_batch() {
        let mut harness = Harness::new(4);
        let guest = Uuid::new_v4();
        harness.join(guest, "guest");
        harness.host.handle_message(harness.host_id, ClientMsg::StartMatch, 1_000);
        let spawn = harness.host.state().player(&guest).unwrap().position;

        let step = Vec2::new(spawn.x + 10.0, spawn.y);
        harness.host.handle_message(
            guest,
            ClientMsg::PositionUpdate {
                position: step,
                rotation: 0.5,
                velocity: Vec2::new(100.0, 0.0),
            },
            1_050,
        );
        // Teleport is silently dropped
        harness.host.handle_message(
            guest,
            ClientMsg::PositionUpdate {
                position: Vec2::new(spawn.x + 900.0, spawn.y),
                rotation: 0.5,
                velocity: Vec2::ZERO,
            },
            1_060,
        );

        assert_eq!(harness.host.state().player(&guest).unwrap().position, step);
        assert_eq!(
            harness.host.interpolator().buffer(&guest).map(|b| b.len()),
            Some(2)
        );
        let Some(ServerMsg::PositionBroadcast { updates, .. }) = harness.host.batch.lock().drain(1_100)
        else {
            panic!("expected queued movement");
        };
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].position, step);
    }

    #[test]
    fn pings_are_answered_privately() {
        let mut harness = Harness::new(4);
        harness.drain();
        harness.host.handle_message(harness.host_id, ClientMsg::Ping { t: 77 }, 0);
        let sent = harness.drain();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipient, Some(harness.host_id));
        assert!(matches!(sent[0].msg, ServerMsg::Pong { t: 77 }));
    }

    #[test]
    fn leaving_can_end_the_match() {
        let mut harness = Harness::new(4);
        let guest = Uuid::new_v4();
        harness.join(guest, "guest");
        harness.host.handle_message(harness.host_id, ClientMsg::StartMatch, 1_000);

        harness.host.handle_message(guest, ClientMsg::Leave, 2_000);
        assert_eq!(harness.host.state().phase, MatchPhase::Ending { since: 2_000 });
        assert_eq!(harness.handle.player_count(), 1);

        harness.host.tick(4_999);
        assert_eq!(harness.handle.status(), SessionStatus::Active);
        harness.host.tick(5_000);
        assert_eq!(harness.handle.status(), SessionStatus::Ended);
        let sent = harness.drain();
        assert!(sent.iter().any(|o| matches!(
            &o.msg,
            ServerMsg::GameOver { winner_id: Some(w), .. } if *w == harness.host_id
        )));
    }

    #[test]
    fn bots_play_through_the_same_dispatch() {
        let mut harness = Harness::new(4);
        let bot = harness.host.add_bot("bot".to_string()).unwrap();
        harness.host.handle_message(harness.host_id, ClientMsg::StartMatch, 1_000);

        // Unarmed bot with nothing to loot goes straight for the host
        harness.host.state.loot.clear();
        harness.place(harness.host_id, 1000.0, 1000.0);
        harness.place(bot, 1030.0, 1000.0);

        harness.host.tick(1_000);
        let after_first = harness.host.state().player(&harness.host_id).unwrap().current_health();
        assert!(after_first < MAX_HEALTH);

        // Unarmed cooldown is 500 ms; the bot keeps swinging but the host refuses
        harness.place(bot, 1030.0, 1000.0);
        harness.host.tick(1_033);
        let after_second = harness.host.state().player(&harness.host_id).unwrap().current_health();
        assert_eq!(after_first, after_second);
    }

    #[test]
    fn members_cannot_join_on_behalf_of_others() {
        let mut harness = Harness::new(4);
        let guest = Uuid::new_v4();
        harness.join(guest, "guest");

        let forge = |harness: &mut Harness, claimed: PlayerId, now: u64| {
            harness.host.handle_message(
                guest,
                ClientMsg::JoinRequest {
                    request_id: Uuid::new_v4(),
                    display_name: "ghost".to_string(),
                    player_id: Some(claimed),
                },
                now,
            );
        };

        forge(&mut harness, Uuid::new_v4(), 0);
        forge(&mut harness, Uuid::new_v4(), 0);
        assert_eq!(harness.host.state().players.len(), 2);
        assert_eq!(harness.handle.player_count(), 2);

        harness.host.handle_message(harness.host_id, ClientMsg::StartMatch, 1_000);
        harness.host.handle_message(harness.host_id, ClientMsg::Leave, 1_100);
        let host_id = harness.host_id;
        forge(&mut harness, host_id, 1_200);

        let host = harness.host.state().player(&host_id).unwrap();
        assert!(!host.is_connected);
        assert_eq!(harness.host.state().players.len(), 2);
        let sent = harness.drain();
        assert!(sent.iter().any(|o| o.recipient == Some(guest)
            && matches!(
                o.msg,
                ServerMsg::JoinAck {
                    result: JoinResult::Rejected { .. },
                    ..
                }
            )));
    }

    #[test]
    fn zone_killing_everyone_ends_without_a_winner() {
        let mut harness = Harness::new(4);
        let guest = Uuid::new_v4();
        harness.join(guest, "guest");
        harness.host.handle_message(harness.host_id, ClientMsg::StartMatch, 1_000);
        harness.host.tick(1_000);

        let center = harness.host.state().zone.center();
        harness.host.state.zone.radius = 10.0;
        harness.place(harness.host_id, center.x + 200.0, center.y);
        harness.place(guest, center.x - 200.0, center.y);
        for record in harness.host.state.players.values_mut() {
            record.health = Some(1.0);
        }

        // One zone tick drops both at once
        harness.host.tick(1_600);
        assert_eq!(harness.host.state().alive_count(), 0);
        assert_eq!(harness.host.state().phase, MatchPhase::Ending { since: 1_600 });

        harness.host.tick(4_600);
        assert_eq!(harness.handle.status(), SessionStatus::Ended);
        let sent = harness.drain();
        assert!(sent
            .iter()
            .any(|o| matches!(o.msg, ServerMsg::GameOver { winner_id: None, .. })));
    }
}
