// corridor_core/src/speed_cache.rs

//! Per-segment memory of the last observed probe speed, and the rules for
//! filling segments that have no probe coverage in the current window.

use crate::error::{EstimatorError, Result};
use crate::types::{SegmentIndex, SegmentSpeeds};

/// Last valid speed per segment, together with how many steps ago it was seen.
///
/// Entries never expire; callers decide staleness through `max_age`.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeedCache {
    speeds: Vec<f64>,
    ages: Vec<u32>,
}

impl SpeedCache {
    pub fn new(n_segments: usize) -> Self {
        Self {
            speeds: vec![f64::NAN; n_segments],
            ages: vec![0; n_segments],
        }
    }

    pub fn len(&self) -> usize {
        self.speeds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.speeds.is_empty()
    }

    /// `true` where a speed has been seen and is at most `max_age` steps old.
    pub fn get_valid(&self, max_age: u32) -> Vec<bool> {
        self.speeds
            .iter()
            .zip(&self.ages)
            .map(|(speed, &age)| !speed.is_nan() && age <= max_age)
            .collect()
    }

    /// Stored speeds; `NaN` where nothing was ever observed.
    pub fn values(&self) -> &[f64] {
        &self.speeds
    }

    pub fn age(&self, segment: SegmentIndex) -> Option<u32> {
        self.ages.get(segment).copied()
    }

    /// Records one step of observations. Observed segments are overwritten and
    /// their age reset; every other segment ages by one.
    pub fn update(&mut self, new_speeds: &SegmentSpeeds) {
        for (segment, (speed, age)) in self.speeds.iter_mut().zip(&mut self.ages).enumerate() {
            match new_speeds.get(segment).filter(|v| v.is_finite()) {
                Some(observed) => {
                    *speed = observed;
                    *age = 0;
                }
                None => *age = age.saturating_add(1),
            }
        }
    }
}

/// Where the speed used for a segment in one step came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpeedSource {
    Observed,
    Cached,
    /// The static per-segment calibration table.
    Default,
}

/// The speeds actually used for one prediction step, with their provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeedResolution {
    pub speeds: Vec<f64>,
    pub sources: Vec<SpeedSource>,
}

impl SpeedResolution {
    /// `true` for segments that ran open-loop on the default table.
    pub fn used_default(&self) -> Vec<bool> {
        self.sources
            .iter()
            .map(|s| *s == SpeedSource::Default)
            .collect()
    }

    pub fn count(&self, source: SpeedSource) -> usize {
        self.sources.iter().filter(|s| **s == source).count()
    }
}

/// Fills every segment with a speed: the current observation if there is one,
/// else a cached speed no older than `max_age`, else the segment's default.
///
/// `observed` holds `NaN` for segments without a current observation.
pub fn resolve_speeds(
    observed: &[f64],
    cache: &SpeedCache,
    max_age: u32,
    defaults: &[f64],
) -> Result<SpeedResolution> {
    if cache.len() != observed.len() {
        return Err(EstimatorError::DimensionMismatch {
            what: "speed cache",
            expected: observed.len(),
            actual: cache.len(),
        });
    }

    let valid = cache.get_valid(max_age);
    let mut speeds = Vec::with_capacity(observed.len());
    let mut sources = Vec::with_capacity(observed.len());
    for (segment, &speed) in observed.iter().enumerate() {
        let (speed, source) = if speed.is_finite() {
            (speed, SpeedSource::Observed)
        } else if valid[segment] {
            (cache.values()[segment], SpeedSource::Cached)
        } else {
            match defaults.get(segment).copied().filter(|v| v.is_finite()) {
                Some(default) => (default, SpeedSource::Default),
                None => return Err(EstimatorError::InsufficientData { segment }),
            }
        };
        speeds.push(speed);
        sources.push(source);
    }
    Ok(SpeedResolution { speeds, sources })
}
