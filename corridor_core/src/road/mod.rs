// corridor_core/src/road/mod.rs

//! The corridor's segment / ramp topology.
//!
//! A [`RoadTopology`] is built once from an ordered list of waypoints and is
//! immutable afterwards, so it can be shared (e.g. behind an `Arc`) by every
//! estimator working on the same corridor.

pub mod geometry;

use crate::error::{EstimatorError, Result};
use crate::state::StateVariable;
use crate::types::SegmentIndex;
use nalgebra::{DMatrix, Point2, Vector2};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// How a segment connects to the rest of the network at its downstream end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RampKind {
    #[default]
    None,
    /// A merge: vehicles enter the mainline.
    On,
    /// A diverge: vehicles leave the mainline.
    Off,
}

/// A planar waypoint, tagged with the ramp event that happens at it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Waypoint {
    pub position: Point2<f64>,
    pub on_ramp: bool,
    pub off_ramp: bool,
}

impl Waypoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            position: Point2::new(x, y),
            on_ramp: false,
            off_ramp: false,
        }
    }

    pub fn with_on_ramp(mut self) -> Self {
        self.on_ramp = true;
        self
    }

    pub fn with_off_ramp(mut self) -> Self {
        self.off_ramp = true;
        self
    }
}

/// One directed stretch of roadway between two consecutive waypoints.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub start: Point2<f64>,
    pub end: Point2<f64>,
    /// Meters, always > 0.
    pub length: f64,
    /// Heading in radians, in `(-π, π]`.
    pub angle: f64,
    pub ramp_kind: RampKind,
}

impl Segment {
    /// Unit vector pointing downstream.
    pub fn direction(&self) -> Vector2<f64> {
        (self.end - self.start) / self.length
    }

    pub fn distance_to(&self, point: &Point2<f64>) -> f64 {
        geometry::point_segment_distance(point, &self.start, &self.end)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoadTopology {
    segments: Vec<Segment>,
    /// Segment index of each ramp slot, in upstream-to-downstream order.
    ramp_indices: Vec<SegmentIndex>,
    /// `n_states × n_states` ramp coupling pattern. The mainline block is zero.
    template: DMatrix<f64>,
}

impl RoadTopology {
    /// Builds the topology from an ordered list of waypoints.
    ///
    /// Segment `k` runs from waypoint `k` to waypoint `k + 1` and takes its ramp
    /// kind from the flags of waypoint `k + 1`, i.e. the segment *ending* at the
    /// merge/diverge carries it.
    pub fn from_waypoints(waypoints: &[Waypoint]) -> Result<Self> {
        if waypoints.len() < 2 {
            return Err(EstimatorError::config(format!(
                "a corridor needs at least 2 waypoints, got {}",
                waypoints.len()
            )));
        }
        if waypoints[0].on_ramp || waypoints[0].off_ramp {
            warn!("Ramp flags on the first waypoint have no segment to attach to and are ignored.");
        }

        let mut segments = Vec::with_capacity(waypoints.len() - 1);
        for (k, pair) in waypoints.windows(2).enumerate() {
            let (from, to) = (&pair[0], &pair[1]);
            let vec = to.position - from.position;
            let length = vec.norm();
            if !length.is_finite() || length <= 0.0 {
                return Err(EstimatorError::config(format!(
                    "segment {k} has non-positive length {length}"
                )));
            }
            let ramp_kind = match (to.on_ramp, to.off_ramp) {
                (true, true) => {
                    return Err(EstimatorError::config(format!(
                        "waypoint {} is flagged as both on-ramp and off-ramp",
                        k + 1
                    )))
                }
                (true, false) => RampKind::On,
                (false, true) => RampKind::Off,
                (false, false) => RampKind::None,
            };
            segments.push(Segment {
                start: from.position,
                end: to.position,
                length,
                angle: geometry::wrap_angle(vec.y.atan2(vec.x)),
                ramp_kind,
            });
        }
        Ok(Self::from_segments(segments))
    }

    fn from_segments(segments: Vec<Segment>) -> Self {
        let ramp_indices: Vec<SegmentIndex> = segments
            .iter()
            .enumerate()
            .filter(|(_, s)| s.ramp_kind != RampKind::None)
            .map(|(i, _)| i)
            .collect();

        let n_segments = segments.len();
        let n_states = n_segments + ramp_indices.len();
        let mut template = DMatrix::zeros(n_states, n_states);
        for (slot, &seg) in ramp_indices.iter().enumerate() {
            let ramp_state = n_segments + slot;
            // Ramps carry their own density forward unchanged.
            template[(ramp_state, ramp_state)] = 1.0;
            template[(seg, ramp_state)] = match segments[seg].ramp_kind {
                RampKind::On => 1.0,
                RampKind::Off => -1.0,
                RampKind::None => unreachable!("ramp slots only hold ramp segments"),
            };
        }

        Self {
            segments,
            ramp_indices,
            template,
        }
    }

    pub fn n_segments(&self) -> usize {
        self.segments.len()
    }

    pub fn n_ramps(&self) -> usize {
        self.ramp_indices.len()
    }

    /// Mainline densities followed by ramp densities.
    pub fn n_states(&self) -> usize {
        self.n_segments() + self.n_ramps()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn segment(&self, index: SegmentIndex) -> Option<&Segment> {
        self.segments.get(index)
    }

    pub fn lengths(&self) -> impl Iterator<Item = f64> + '_ {
        self.segments.iter().map(|s| s.length)
    }

    pub fn ramp_indices(&self) -> &[SegmentIndex] {
        &self.ramp_indices
    }

    /// One entry per ramp slot: `true` for on-ramps, `false` for off-ramps.
    pub fn on_ramp_mask(&self) -> Vec<bool> {
        self.ramp_indices
            .iter()
            .map(|&i| self.segments[i].ramp_kind == RampKind::On)
            .collect()
    }

    /// State-vector index of a ramp slot.
    pub fn ramp_state_index(&self, slot: usize) -> Option<usize> {
        (slot < self.n_ramps()).then(|| self.n_segments() + slot)
    }

    /// The fixed ramp-coupling pattern (`+1` on-ramp inflow, `-1` off-ramp outflow,
    /// identity on the ramp block). The mainline block is left zero.
    pub fn topology_template(&self) -> &DMatrix<f64> {
        &self.template
    }

    /// The ordered schema of the estimator's state vector.
    pub fn state_layout(&self) -> Vec<StateVariable> {
        (0..self.n_segments())
            .map(StateVariable::Density)
            .chain(
                self.ramp_indices
                    .iter()
                    .enumerate()
                    .map(|(slot, &segment)| StateVariable::RampDensity { slot, segment }),
            )
            .collect()
    }

    /// The closest segment to `point` that is within `max_distance` meters and
    /// whose heading differs from `heading` by at most `max_heading_error` radians.
    pub fn nearest_segment(
        &self,
        point: &Point2<f64>,
        heading: f64,
        max_distance: f64,
        max_heading_error: f64,
    ) -> Option<SegmentIndex> {
        self.segments
            .iter()
            .enumerate()
            .filter(|(_, s)| geometry::heading_difference(s.angle, heading) <= max_heading_error)
            .map(|(i, s)| (i, s.distance_to(point)))
            .filter(|&(_, d)| d <= max_distance)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, _)| i)
    }
}
