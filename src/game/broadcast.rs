//! Periodic `position_broadcast` batching

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::relay::Relay;
use crate::util::time::HostClock;
use crate::ws::protocol::{PlayerId, PositionEntry, ServerMsg};

/// Accepted movement waiting for the next broadcast
#[derive(Debug)]
pub struct PositionBatch {
    host_id: PlayerId,
    /// Every accepted update from non-host players since the last drain
    pending: Vec<PositionEntry>,
    /// Only the newest host sample is folded in
    host_latest: Option<PositionEntry>,
}

impl PositionBatch {
    pub fn new(host_id: PlayerId) -> Self {
        Self {
            host_id,
            pending: Vec::new(),
            host_latest: None,
        }
    }

    pub fn push(&mut self, entry: PositionEntry) {
        if entry.player_id == self.host_id {
            self.host_latest = Some(entry);
        } else {
            self.pending.push(entry);
        }
    }

    /// Drop queued samples for a player who left
    pub fn forget(&mut self, player_id: &PlayerId) {
        self.pending.retain(|e| &e.player_id != player_id);
        if self.host_latest.is_some_and(|e| &e.player_id == player_id) {
            self.host_latest = None;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty() && self.host_latest.is_none()
    }

    /// Take everything queued as one broadcast, or `None` if nothing moved
    pub fn drain(&mut self, sent_at: u64) -> Option<ServerMsg> {
        if self.is_empty() {
            return None;
        }
        let mut updates = std::mem::take(&mut self.pending);
        updates.extend(self.host_latest.take());
        Some(ServerMsg::PositionBroadcast { sent_at, updates })
    }
}

/// Background task flushing a [`PositionBatch`] at a fixed interval.
/// Starting an already running timer is a no-op.
pub struct BroadcastTimer {
    batch: Arc<Mutex<PositionBatch>>,
    relay: Relay,
    clock: HostClock,
    period: Duration,
    handle: Option<JoinHandle<()>>,
}

impl BroadcastTimer {
    pub fn new(
        batch: Arc<Mutex<PositionBatch>>,
        relay: Relay,
        clock: HostClock,
        period: Duration,
    ) -> Self {
        Self {
            batch,
            relay,
            clock,
            period,
            handle: None,
        }
    }

    /// Returns false if the timer was already running
    pub fn start(&mut self) -> bool {
        if self.is_running() {
            return false;
        }

        let batch = self.batch.clone();
        let relay = self.relay.clone();
        let clock = self.clock;
        let period = self.period;

        self.handle = Some(tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let message = batch.lock().drain(clock.now_ms());
                if let Some(message) = message {
                    relay.broadcast(message);
                }
            }
        }));
        true
    }

    /// Returns false if the timer was not running
    pub fn stop(&mut self) -> bool {
        match self.handle.take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for BroadcastTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::protocol::Vec2;
    use uuid::Uuid;

    fn entry(player_id: PlayerId, x: f32, timestamp: u64) -> PositionEntry {
        PositionEntry {
            player_id,
            position: Vec2::new(x, 0.0),
            rotation: 0.0,
            velocity: Vec2::ZERO,
            timestamp,
        }
    }

    #[test]
    fn host_movement_is_folded_in_once() {
        let host = Uuid::new_v4();
        let other = Uuid::new_v4();
        let mut batch = PositionBatch::new(host);

        batch.push(entry(other, 1.0, 10));
        batch.push(entry(other, 2.0, 20));
        batch.push(entry(host, 5.0, 15));
        batch.push(entry(host, 6.0, 25));

        let Some(ServerMsg::PositionBroadcast { updates, .. }) = batch.drain(30) else {
            panic!("expected a broadcast");
        };
        assert_eq!(updates.len(), 3);
        assert_eq!(updates.last().map(|e| e.position.x), Some(6.0));
        assert!(batch.drain(40).is_none());
    }

    #[test]
    fn forgotten_players_are_not_broadcast() {
        let other = Uuid::new_v4();
        let mut batch = PositionBatch::new(Uuid::new_v4());
        batch.push(entry(other, 1.0, 10));
        batch.forget(&other);
        assert!(batch.drain(20).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn timer_start_is_idempotent() {
        let host = Uuid::new_v4();
        let (relay, _inbound) = Relay::new(Uuid::new_v4(), Duration::from_secs(5));
        let batch = Arc::new(Mutex::new(PositionBatch::new(host)));
        let mut timer = BroadcastTimer::new(
            batch.clone(),
            relay.clone(),
            HostClock::start(),
            Duration::from_millis(50),
        );

        assert!(timer.start());
        assert!(!timer.start());
        assert!(timer.is_running());

        let mut rx = relay.subscribe();
        batch.lock().push(entry(Uuid::new_v4(), 1.0, 1));
        tokio::time::sleep(Duration::from_millis(60)).await;
        let outbound = rx.try_recv().unwrap();
        assert!(matches!(outbound.msg, ServerMsg::PositionBroadcast { .. }));
        assert!(rx.try_recv().is_err());

        assert!(timer.stop());
        assert!(!timer.stop());
        assert!(!timer.is_running());

        batch.lock().push(entry(Uuid::new_v4(), 2.0, 2));
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(rx.try_recv().is_err());
    }
}
