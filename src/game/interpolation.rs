//! Snapshot interpolation: per-player ring buffers of timestamped samples,
//! queried at render time.
//!
//! Rendering runs a fixed `delay` behind the newest data so there are
//! normally two samples bracketing the render instant. Samples are kept
//! sorted by their embedded timestamp, so transport reordering does not
//! matter. Once render time passes the newest sample, position is
//! extrapolated with the last velocity up to `max_extrapolation_ms`, then held.

use std::collections::{HashMap, VecDeque};

use crate::config::Tuning;
use crate::ws::protocol::{PlayerId, Vec2};

use super::physics::PhysicsSystem;

/// One received position sample. Never mutated after insertion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionSample {
    pub x: f32,
    pub y: f32,
    pub rotation: f32,
    pub vx: f32,
    pub vy: f32,
    /// Milliseconds on the host clock
    pub timestamp: u64,
}

/// Result of a render-time query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderState {
    pub x: f32,
    pub y: f32,
    pub rotation: f32,
    pub vx: f32,
    pub vy: f32,
}

impl RenderState {
    pub fn position(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }
}

impl From<PositionSample> for RenderState {
    fn from(s: PositionSample) -> Self {
        Self {
            x: s.x,
            y: s.y,
            rotation: s.rotation,
            vx: s.vx,
            vy: s.vy,
        }
    }
}

/// Fixed-capacity, timestamp-ordered sample history for one player
#[derive(Debug, Clone)]
pub struct SnapshotBuffer {
    samples: VecDeque<PositionSample>,
    capacity: usize,
}

impl SnapshotBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Insert keeping timestamp order (ties go after existing samples),
    /// then evict the oldest sample if over capacity. In-order arrival is O(1).
    pub fn push(&mut self, sample: PositionSample) {
        let at = self
            .samples
            .partition_point(|s| s.timestamp <= sample.timestamp);
        self.samples.insert(at, sample);
        if self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn newest(&self) -> Option<&PositionSample> {
        self.samples.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PositionSample> {
        self.samples.iter()
    }

    /// State at `target` (already delay-adjusted)
    pub fn sample_at(&self, target: u64, max_extrapolation_ms: u64) -> Option<RenderState> {
        let newest = *self.samples.back()?;
        if self.samples.len() == 1 {
            return Some(newest.into());
        }

        let oldest = self.samples[0];
        if target <= oldest.timestamp {
            return Some(oldest.into());
        }

        if target >= newest.timestamp {
            let ahead_ms = (target - newest.timestamp).min(max_extrapolation_ms);
            let dt = ahead_ms as f32 / 1000.0;
            return Some(RenderState {
                x: newest.x + newest.vx * dt,
                y: newest.y + newest.vy * dt,
                ..RenderState::from(newest)
            });
        }

        // First sample strictly after target; its predecessor is at or before it
        let upper = self.samples.partition_point(|s| s.timestamp <= target);
        let a = self.samples[upper - 1];
        let b = self.samples[upper];
        let span = (b.timestamp - a.timestamp) as f32;
        let t = if span > 0.0 {
            ((target - a.timestamp) as f32 / span).clamp(0.0, 1.0)
        } else {
            1.0
        };

        Some(RenderState {
            x: lerp(a.x, b.x, t),
            y: lerp(a.y, b.y, t),
            rotation: a.rotation + PhysicsSystem::angle_difference(a.rotation, b.rotation) * t,
            vx: lerp(a.vx, b.vx, t),
            vy: lerp(a.vy, b.vy, t),
        })
    }
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Interpolation buffers for every remote player
#[derive(Debug, Clone)]
pub struct Interpolator {
    buffers: HashMap<PlayerId, SnapshotBuffer>,
    capacity: usize,
    delay_ms: u64,
    max_extrapolation_ms: u64,
}

impl Interpolator {
    pub fn new(capacity: usize, delay_ms: u64, max_extrapolation_ms: u64) -> Self {
        Self {
            buffers: HashMap::new(),
            capacity,
            delay_ms,
            max_extrapolation_ms,
        }
    }

    pub fn from_tuning(tuning: &Tuning) -> Self {
        Self::new(
            tuning.interpolation_capacity,
            tuning.interpolation_delay_ms,
            tuning.max_extrapolation_ms,
        )
    }

    pub fn record_sample(&mut self, player_id: PlayerId, sample: PositionSample) {
        let capacity = self.capacity;
        self.buffers
            .entry(player_id)
            .or_insert_with(|| SnapshotBuffer::new(capacity))
            .push(sample);
    }

    /// Smoothed state for `render_time` (ms, host clock)
    pub fn query_state(&self, player_id: &PlayerId, render_time: u64) -> Option<RenderState> {
        let target = render_time.saturating_sub(self.delay_ms);
        self.buffers
            .get(player_id)?
            .sample_at(target, self.max_extrapolation_ms)
    }

    pub fn buffer(&self, player_id: &PlayerId) -> Option<&SnapshotBuffer> {
        self.buffers.get(player_id)
    }

    pub fn remove_player(&mut self, player_id: &PlayerId) {
        self.buffers.remove(player_id);
    }

    pub fn clear(&mut self) {
        self.buffers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn sample(x: f32, y: f32, timestamp: u64) -> PositionSample {
        PositionSample {
            x,
            y,
            rotation: 0.0,
            vx: 0.0,
            vy: 0.0,
            timestamp,
        }
    }

    #[test]
    fn single_sample_is_returned_unmodified() {
        let mut interp = Interpolator::new(8, 100, 250);
        let id = Uuid::new_v4();
        let s = PositionSample {
            vx: 50.0,
            ..sample(10.0, 20.0, 1_000)
        };
        interp.record_sample(id, s);
        assert_eq!(interp.query_state(&id, 9_999), Some(s.into()));
    }

    #[test]
    fn unknown_player_has_no_state() {
        let interp = Interpolator::new(8, 100, 250);
        assert_eq!(interp.query_state(&Uuid::new_v4(), 1_000), None);
    }

    #[test]
    fn interpolates_between_bracketing_samples() {
        let mut interp = Interpolator::new(8, 100, 250);
        let id = Uuid::new_v4();
        interp.record_sample(id, sample(0.0, 0.0, 1_000));
        interp.record_sample(id, sample(100.0, 50.0, 1_100));

        // render 1_150 - delay 100 = 1_050, halfway
        let state = interp.query_state(&id, 1_150).unwrap();
        assert!((state.x - 50.0).abs() < 1e-4);
        assert!((state.y - 25.0).abs() < 1e-4);
    }

    #[test]
    fn never_overshoots_within_span() {
        let mut buffer = SnapshotBuffer::new(16);
        let points = [(0.0, 0.0), (30.0, -10.0), (25.0, 40.0), (90.0, 35.0), (60.0, 0.0)];
        for (i, (x, y)) in points.iter().enumerate() {
            buffer.push(sample(*x, *y, 1_000 + i as u64 * 50));
        }

        for target in 1_000..=1_200 {
            let state = buffer.sample_at(target, 250).unwrap();
            let upper = buffer.samples.partition_point(|s| s.timestamp <= target);
            let (a, b) = if upper >= buffer.len() {
                let last = buffer.samples[buffer.len() - 1];
                (last, last)
            } else {
                (buffer.samples[upper - 1], buffer.samples[upper])
            };
            assert!(state.x >= a.x.min(b.x) - 1e-4 && state.x <= a.x.max(b.x) + 1e-4);
            assert!(state.y >= a.y.min(b.y) - 1e-4 && state.y <= a.y.max(b.y) + 1e-4);
        }
    }

    #[test]
    fn out_of_order_arrival_is_sorted() {
        let mut buffer = SnapshotBuffer::new(8);
        buffer.push(sample(2.0, 0.0, 300));
        buffer.push(sample(0.0, 0.0, 100));
        buffer.push(sample(1.0, 0.0, 200));
        let stamps: Vec<u64> = buffer.iter().map(|s| s.timestamp).collect();
        assert_eq!(stamps, vec![100, 200, 300]);
    }

    #[test]
    fn overflow_evicts_oldest() {
        let mut buffer = SnapshotBuffer::new(3);
        for t in 0..5u64 {
            buffer.push(sample(t as f32, 0.0, t * 10));
        }
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.iter().next().unwrap().timestamp, 20);
    }

    #[test]
    fn extrapolates_then_holds() {
        let mut interp = Interpolator::new(8, 100, 250);
        let id = Uuid::new_v4();
        interp.record_sample(id, sample(0.0, 0.0, 1_000));
        interp.record_sample(
            id,
            PositionSample {
                vx: 100.0,
                ..sample(10.0, 0.0, 1_100)
            },
        );

        // 100 ms past newest sample: 10 + 100 * 0.1
        let state = interp.query_state(&id, 1_300).unwrap();
        assert!((state.x - 20.0).abs() < 1e-4);

        // Far past newest sample: capped at 250 ms of extrapolation
        let held = interp.query_state(&id, 5_000).unwrap();
        assert!((held.x - 35.0).abs() < 1e-4);
    }

    #[test]
    fn before_oldest_sample_holds_oldest() {
        let mut interp = Interpolator::new(8, 100, 250);
        let id = Uuid::new_v4();
        interp.record_sample(id, sample(5.0, 5.0, 1_000));
        interp.record_sample(id, sample(9.0, 9.0, 1_050));
        let state = interp.query_state(&id, 500).unwrap();
        assert_eq!(state.position(), Vec2::new(5.0, 5.0));
    }

    #[test]
    fn rotation_takes_shortest_arc() {
        use std::f32::consts::PI;
        let mut buffer = SnapshotBuffer::new(4);
        buffer.push(PositionSample {
            rotation: PI - 0.1,
            ..sample(0.0, 0.0, 0)
        });
        buffer.push(PositionSample {
            rotation: -PI + 0.1,
            ..sample(0.0, 0.0, 100)
        });
        let state = buffer.sample_at(50, 0).unwrap();
        assert!((state.rotation - PI).abs() < 1e-4);
    }
}
