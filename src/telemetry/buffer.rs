//! # Telemetry Buffer
//!
//! Insertion-ordered window of decoded samples.
//!
//! The buffer has a single writer (the notification task). Readers never
//! borrow it; they take a [`TelemetrySnapshot`] copy.

use chrono::NaiveDateTime;
use std::collections::VecDeque;

use super::sample::{Axis, DecodeMode, TelemetrySample};

/// Default window for the accelerometer dashboard
pub const DEFAULT_CAPACITY: usize = 50;

/// How many samples the buffer keeps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferPolicy {
    /// Keep the newest `N` samples, evicting the oldest first
    Bounded(usize),
    /// Keep every sample
    Unbounded,
}

impl Default for BufferPolicy {
    fn default() -> Self {
        BufferPolicy::Bounded(DEFAULT_CAPACITY)
    }
}

/// Fixed-capacity (or unbounded) FIFO of telemetry samples
#[derive(Debug, Clone)]
pub struct TelemetryBuffer {
    samples: VecDeque<TelemetrySample>,
    policy: BufferPolicy,
    mode: DecodeMode,
}

impl TelemetryBuffer {
    /// Create an empty buffer for samples of the given layout
    pub fn new(policy: BufferPolicy, mode: DecodeMode) -> Self {
        let samples = match policy {
            BufferPolicy::Bounded(capacity) => VecDeque::with_capacity(capacity),
            BufferPolicy::Unbounded => VecDeque::new(),
        };

        Self {
            samples,
            policy,
            mode,
        }
    }

    /// Append a sample, evicting from the front when over capacity
    pub fn push(&mut self, sample: TelemetrySample) {
        self.samples.push_back(sample);

        if let BufferPolicy::Bounded(capacity) = self.policy {
            while self.samples.len() > capacity {
                self.samples.pop_front();
            }
        }
    }

    /// Copy of the current contents, oldest first
    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            mode: self.mode,
            samples: self.samples.iter().cloned().collect(),
        }
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Most recent sample
    pub fn latest(&self) -> Option<&TelemetrySample> {
        self.samples.back()
    }

    pub fn policy(&self) -> BufferPolicy {
        self.policy
    }

    pub fn mode(&self) -> DecodeMode {
        self.mode
    }
}

/// Immutable copy of a buffer taken at one instant
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetrySnapshot {
    pub mode: DecodeMode,
    pub samples: Vec<TelemetrySample>,
}

impl TelemetrySnapshot {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn latest(&self) -> Option<&TelemetrySample> {
        self.samples.last()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TelemetrySample> {
        self.samples.iter()
    }

    /// Time series for one acceleration axis, for charting
    ///
    /// Generic samples are skipped.
    pub fn axis_series(&self, axis: Axis) -> Vec<(NaiveDateTime, f64)> {
        self.samples
            .iter()
            .filter_map(|s| s.imu().map(|imu| (s.timestamp, imu.axis(axis))))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::sample::{ImuReading, Reading};
    use chrono::{Duration, NaiveDate};

    fn sample(i: usize) -> TelemetrySample {
        let base = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        TelemetrySample::new(
            base + Duration::milliseconds(i as i64),
            Reading::Imu(ImuReading {
                ax: i as f64,
                ay: 0.0,
                az: 0.0,
                battery: 100.0,
            }),
        )
    }

    fn ax_values(snapshot: &TelemetrySnapshot) -> Vec<f64> {
        snapshot.iter().map(|s| s.imu().unwrap().ax).collect()
    }

    #[test]
    fn test_default_policy_is_bounded_50() {
        assert_eq!(BufferPolicy::default(), BufferPolicy::Bounded(50));
    }

    #[test]
    fn test_bounded_evicts_oldest() {
        let mut buffer = TelemetryBuffer::new(BufferPolicy::Bounded(50), DecodeMode::FixedQuad);
        for i in 0..51 {
            buffer.push(sample(i));
        }

        assert_eq!(buffer.len(), 50);
        let snapshot = buffer.snapshot();
        let expected: Vec<f64> = (1..51).map(|i| i as f64).collect();
        assert_eq!(ax_values(&snapshot), expected);
    }

    #[test]
    fn test_bounded_under_capacity_keeps_all() {
        let mut buffer = TelemetryBuffer::new(BufferPolicy::Bounded(5), DecodeMode::FixedQuad);
        for i in 0..3 {
            buffer.push(sample(i));
        }
        assert_eq!(ax_values(&buffer.snapshot()), vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_unbounded_keeps_everything_in_order() {
        let mut buffer = TelemetryBuffer::new(BufferPolicy::Unbounded, DecodeMode::FixedQuad);
        for i in 0..10_000 {
            buffer.push(sample(i));
        }

        assert_eq!(buffer.len(), 10_000);
        let snapshot = buffer.snapshot();
        assert!(snapshot
            .samples
            .windows(2)
            .all(|pair| pair[0].timestamp < pair[1].timestamp));
        assert_eq!(snapshot.latest().unwrap().imu().unwrap().ax, 9_999.0);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let mut buffer = TelemetryBuffer::new(BufferPolicy::Bounded(3), DecodeMode::FixedQuad);
        buffer.push(sample(0));
        let snapshot = buffer.snapshot();

        buffer.push(sample(1));
        buffer.clear();

        assert_eq!(snapshot.len(), 1);
        assert!(buffer.is_empty());
        assert!(buffer.latest().is_none());
    }

    #[test]
    fn test_axis_series() {
        let mut buffer = TelemetryBuffer::new(BufferPolicy::Unbounded, DecodeMode::FixedQuad);
        buffer.push(sample(2));
        buffer.push(sample(4));

        let series = buffer.snapshot().axis_series(Axis::X);
        assert_eq!(series.iter().map(|(_, v)| *v).collect::<Vec<_>>(), vec![2.0, 4.0]);
        assert!(buffer.snapshot().axis_series(Axis::Y).iter().all(|(_, v)| *v == 0.0));
    }

    #[test]
    fn test_snapshot_carries_mode() {
        let buffer = TelemetryBuffer::new(BufferPolicy::Unbounded, DecodeMode::Generic);
        assert_eq!(buffer.snapshot().mode, DecodeMode::Generic);
        assert_eq!(buffer.policy(), BufferPolicy::Unbounded);
        assert_eq!(buffer.mode(), DecodeMode::Generic);
    }
}
