// corridor_sim/src/simulation/sources/probes.rs

use std::collections::BTreeMap;

use corridor_core::estimation::ProbeSource;
use corridor_core::road::RoadTopology;
use corridor_core::types::{SegmentIndex, SegmentSpeeds, TimeWindow};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// One projected GPS position report of a probe vehicle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpsFix {
    pub vehicle_id: u64,
    pub time: f64,
    pub position: Point2<f64>,
}

/// A speed attributed to a segment, derived from two consecutive fixes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeRecord {
    /// Time of the later fix.
    pub time: f64,
    pub segment: SegmentIndex,
    /// Speed along the segment direction, m/s.
    pub speed: f64,
}

/// Thresholds for pairing fixes and assigning them to a segment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ProbeAssignment {
    /// Longest gap between two fixes of one vehicle that still yields a speed, seconds.
    pub max_fix_gap: f64,
    /// Farthest a fix may lie from a segment, meters.
    pub max_distance: f64,
    /// Largest heading difference to a segment, degrees.
    pub max_heading_error_deg: f64,
}

impl Default for ProbeAssignment {
    fn default() -> Self {
        Self {
            max_fix_gap: 90.0,
            max_distance: 12.0,
            max_heading_error_deg: 30.0,
        }
    }
}

/// Turns raw fixes into per-segment speed records, ordered by time.
///
/// Consecutive fixes of one vehicle give a velocity; the later fix is matched
/// to the nearest segment with a compatible heading and the velocity is
/// projected onto that segment's direction. Pairs too far apart in time, or
/// fixes matching no segment, are discarded.
pub fn derive_probe_records(fixes: &[GpsFix], topology: &RoadTopology, params: &ProbeAssignment) -> Vec<ProbeRecord> {
    let mut sorted: Vec<&GpsFix> = fixes.iter().collect();
    sorted.sort_by(|a, b| a.vehicle_id.cmp(&b.vehicle_id).then(a.time.total_cmp(&b.time)));
    let max_heading_error = params.max_heading_error_deg.to_radians();

    let mut records: Vec<ProbeRecord> = sorted
        .windows(2)
        .filter(|pair| pair[0].vehicle_id == pair[1].vehicle_id)
        .filter_map(|pair| {
            let (prev, fix) = (pair[0], pair[1]);
            let dt = fix.time - prev.time;
            if !(dt > 0.0 && dt <= params.max_fix_gap) {
                return None;
            }
            let velocity = (fix.position - prev.position) / dt;
            let heading = velocity.y.atan2(velocity.x);
            let segment = topology.nearest_segment(&fix.position, heading, params.max_distance, max_heading_error)?;
            let speed = velocity.dot(&topology.segments()[segment].direction());
            Some(ProbeRecord {
                time: fix.time,
                segment,
                speed,
            })
        })
        .collect();
    records.sort_by(|a, b| a.time.total_cmp(&b.time));
    records
}

/// Time-ordered probe records answering window queries with per-segment means.
#[derive(Debug, Clone, Default)]
pub struct ProbeLog {
    records: Vec<ProbeRecord>,
}

impl ProbeLog {
    pub fn new(mut records: Vec<ProbeRecord>) -> Self {
        records.sort_by(|a, b| a.time.total_cmp(&b.time));
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl ProbeSource for ProbeLog {
    fn average_speeds(&self, window: TimeWindow) -> SegmentSpeeds {
        let lo = self.records.partition_point(|r| r.time < window.start);
        let hi = self.records.partition_point(|r| r.time <= window.end);

        let mut sums: BTreeMap<SegmentIndex, (f64, usize)> = BTreeMap::new();
        for record in self.records[lo..hi.max(lo)].iter() {
            let entry = sums.entry(record.segment).or_insert((0.0, 0));
            entry.0 += record.speed;
            entry.1 += 1;
        }
        sums.into_iter()
            .map(|(segment, (sum, count))| (segment, sum / count as f64))
            .collect()
    }
}
