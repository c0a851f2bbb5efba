// corridor_core/src/types.rs

use nalgebra::{DMatrix, DVector};
use std::collections::BTreeMap;

// --- Core Type Aliases ---
pub type State = DVector<f64>;
pub type Covariance = DMatrix<f64>;
pub type Control = DVector<f64>;

/// Position of a segment in the corridor. Index 0 is the most upstream segment.
pub type SegmentIndex = usize;

/// A closed time window `[start, end]`, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeWindow {
    pub start: f64,
    pub end: f64,
}

impl TimeWindow {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, time: f64) -> bool {
        time >= self.start && time <= self.end
    }
}

/// Average probe speed (m/s) per segment over one window.
///
/// Segments without probe coverage are simply absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SegmentSpeeds(BTreeMap<SegmentIndex, f64>);

impl SegmentSpeeds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, segment: SegmentIndex, speed: f64) -> Option<f64> {
        self.0.insert(segment, speed)
    }

    pub fn get(&self, segment: SegmentIndex) -> Option<f64> {
        self.0.get(&segment).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SegmentIndex, f64)> + '_ {
        self.0.iter().map(|(&seg, &speed)| (seg, speed))
    }

    /// Drops every speed that is not a finite value in `[0, max_speed]`.
    /// An implausible speed counts as "no observation". Returns how many were dropped.
    pub fn retain_plausible(&mut self, max_speed: f64) -> usize {
        let before = self.0.len();
        self.0
            .retain(|_, speed| speed.is_finite() && *speed >= 0.0 && *speed <= max_speed);
        before - self.0.len()
    }

    /// Reindexes onto `n_segments` slots; missing segments become `NaN`.
    /// Entries beyond `n_segments` are ignored.
    pub fn to_dense(&self, n_segments: usize) -> Vec<f64> {
        let mut dense = vec![f64::NAN; n_segments];
        for (seg, speed) in self.iter() {
            if let Some(slot) = dense.get_mut(seg) {
                *slot = if speed.is_finite() { speed } else { f64::NAN };
            }
        }
        dense
    }
}

impl FromIterator<(SegmentIndex, f64)> for SegmentSpeeds {
    fn from_iter<I: IntoIterator<Item = (SegmentIndex, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// One point of an initial density measurement series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DensityObservation {
    pub segment: SegmentIndex,
    /// Vehicles per meter.
    pub density: f64,
}
