// corridor_sim/src/simulation/sources/detectors.rs

use corridor_core::estimation::DetectorSource;
use corridor_core::types::DensityObservation;
use nalgebra::DVector;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorReading {
    pub time: f64,
    pub value: f64,
}

/// A time-ordered series of readings from one detector, sampled by linear
/// interpolation.
#[derive(Debug, Clone, Default)]
pub struct DetectorSeries {
    name: String,
    readings: Vec<DetectorReading>,
}

impl DetectorSeries {
    pub fn new(name: impl Into<String>, mut readings: Vec<DetectorReading>) -> Self {
        readings.sort_by(|a, b| a.time.total_cmp(&b.time));
        Self {
            name: name.into(),
            readings,
        }
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// Inserts a reading, keeping the series ordered.
    pub fn push(&mut self, reading: DetectorReading) {
        let at = self.readings.partition_point(|r| r.time <= reading.time);
        self.readings.insert(at, reading);
    }

    /// The value at `time`, interpolated between the surrounding readings.
    /// Outside the covered span the nearest end is used.
    pub fn value_at(&self, time: f64) -> Option<f64> {
        let first = self.readings.first()?;
        let last = self.readings.last()?;
        // Number of readings at or before `time`.
        let idx = self.readings.partition_point(|r| r.time <= time);

        if idx == 0 {
            warn!(detector = %self.name, time, first = first.time, "Time precedes detector data; using first reading.");
            return Some(first.value);
        }
        if idx == self.readings.len() {
            if last.time != time {
                warn!(detector = %self.name, time, last = last.time, "Time follows detector data; using last reading.");
            }
            return Some(last.value);
        }

        let before = self.readings[idx - 1];
        let after = self.readings[idx];
        let span = after.time - before.time;
        let alpha = (time - before.time) / span;
        Some(before.value + alpha * (after.value - before.value))
    }
}

/// All detector data of a corridor: the upstream flow series plus one series
/// per measurement channel, in channel order.
#[derive(Debug, Clone, Default)]
pub struct DetectorBank {
    upstream: DetectorSeries,
    channels: Vec<DetectorSeries>,
    initial: Option<Vec<DensityObservation>>,
}

impl DetectorBank {
    pub fn new(upstream: DetectorSeries, channels: Vec<DetectorSeries>) -> Self {
        Self {
            upstream,
            channels,
            initial: None,
        }
    }

    pub fn with_initial_densities(mut self, initial: Vec<DensityObservation>) -> Self {
        self.initial = Some(initial);
        self
    }

    pub fn channels(&self) -> &[DetectorSeries] {
        &self.channels
    }
}

impl DetectorSource for DetectorBank {
    fn upstream_flow(&self, time: f64) -> Option<f64> {
        self.upstream.value_at(time)
    }

    fn measurement(&self, time: f64) -> Option<DVector<f64>> {
        if self.channels.is_empty() {
            return None;
        }
        let values: Option<Vec<f64>> = self.channels.iter().map(|c| c.value_at(time)).collect();
        values.map(DVector::from_vec)
    }

    fn initial_densities(&self, _time: f64) -> Option<Vec<DensityObservation>> {
        self.initial.clone()
    }
}
