//! Time utilities for the host simulation

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Get current Unix timestamp in milliseconds
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Server start time for uptime tracking
static SERVER_START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize server start time (call once at startup)
pub fn init_server_time() {
    SERVER_START.get_or_init(Instant::now);
}

/// Get server uptime in seconds
pub fn uptime_secs() -> u64 {
    SERVER_START
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// Tick rate configuration
pub const SIMULATION_TPS: u32 = 30; // 30 host ticks per second
pub const TICK_DURATION_MICROS: u64 = 1_000_000 / SIMULATION_TPS as u64;

/// Interval between batched `position_broadcast` messages
pub const POSITION_BROADCAST_INTERVAL_MS: u64 = 50;

/// Millisecond clock for a host runtime: anchored to wall time when created,
/// advanced by tokio's clock (so paused test clocks drive it too)
#[derive(Debug, Clone, Copy)]
pub struct HostClock {
    anchor_ms: u64,
    started: tokio::time::Instant,
}

impl HostClock {
    pub fn start() -> Self {
        Self {
            anchor_ms: unix_millis(),
            started: tokio::time::Instant::now(),
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.anchor_ms + self.started.elapsed().as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn host_clock_follows_tokio_time() {
        let clock = HostClock::start();
        let before = clock.now_ms();
        tokio::time::advance(Duration::from_millis(1_500)).await;
        assert_eq!(clock.now_ms() - before, 1_500);
    }
}
