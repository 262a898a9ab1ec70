//! Read-only views of the simulation for renderers and analysis.

use crate::error::SimulationError;
use crate::{Simulation, VehicleId};
use itertools::{Itertools, MinMaxResult};

/// Traffic is congested when it flows at less than this fraction of the maximum velocity.
const CONGESTION_FLOW: f64 = 0.85;

/// An immutable copy of the simulation state at the end of a frame.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Snapshot {
    /// The frame index; zero before the first step.
    pub frame: usize,
    /// The simulated time in s.
    pub time: f64,
    /// The maximum velocity of the vehicles in m/s.
    pub max_vel: f64,
    /// The vehicles, in ascending order of position.
    pub vehicles: Vec<VehicleState>,
}

/// The state of one vehicle in a [Snapshot].
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VehicleState {
    pub id: VehicleId,
    /// The position of the front of the vehicle in m.
    pub pos: f64,
    /// The velocity in m/s.
    pub vel: f64,
    /// The gap to the vehicle ahead in m.
    pub gap: f64,
    /// Whether the vehicle decelerated in the last step.
    pub braking: bool,
}

/// Aggregate statistics over a [Snapshot].
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TrafficStats {
    /// The mean velocity in m/s.
    pub mean_vel: f64,
    /// The mean velocity as a fraction of the maximum velocity.
    pub flow: f64,
    /// The lowest velocity in m/s.
    pub min_vel: f64,
    /// The highest velocity in m/s.
    pub max_vel: f64,
    /// The smallest gap between two vehicles in m.
    pub min_gap: f64,
    /// The number of braking vehicles.
    pub num_braking: usize,
    /// Whether the traffic is flowing well below the maximum velocity.
    pub congested: bool,
}

impl Snapshot {
    /// The number of vehicles.
    pub fn len(&self) -> usize {
        self.vehicles.len()
    }

    /// Whether the snapshot contains no vehicles.
    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty()
    }

    /// Gets the state of the vehicle with the given ID.
    pub fn get(&self, id: VehicleId) -> Option<&VehicleState> {
        self.vehicles.iter().find(|v| v.id == id)
    }

    /// The vehicle travelling the slowest.
    pub fn slowest(&self) -> Option<&VehicleState> {
        self.vehicles
            .iter()
            .min_by(|a, b| a.vel.total_cmp(&b.vel))
    }

    /// Computes aggregate statistics of the traffic.
    pub fn stats(&self) -> TrafficStats {
        let count = usize::max(self.vehicles.len(), 1) as f64;
        let mean_vel = self.vehicles.iter().map(|v| v.vel).sum::<f64>() / count;
        let flow = if self.max_vel > 0.0 {
            mean_vel / self.max_vel
        } else {
            0.0
        };
        let (min_vel, max_vel) = match self.vehicles.iter().map(|v| v.vel).minmax() {
            MinMaxResult::NoElements => (0.0, 0.0),
            MinMaxResult::OneElement(vel) => (vel, vel),
            MinMaxResult::MinMax(min, max) => (min, max),
        };
        let min_gap = self
            .vehicles
            .iter()
            .map(|v| v.gap)
            .fold(f64::INFINITY, f64::min);
        TrafficStats {
            mean_vel,
            flow,
            min_vel,
            max_vel,
            min_gap,
            num_braking: self.vehicles.iter().filter(|v| v.braking).count(),
            congested: flow < CONGESTION_FLOW,
        }
    }

    /// Serializes the snapshot as JSON.
    #[cfg(feature = "serde")]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!(self)
    }
}

/// A lazy sequence of snapshots which steps the simulation as it is consumed.
///
/// Created by [Simulation::snapshots]. Ends after the requested number of steps,
/// or after yielding the first error.
pub struct Snapshots<'a> {
    sim: &'a mut Simulation,
    remaining: usize,
}

impl<'a> Snapshots<'a> {
    pub(crate) fn new(sim: &'a mut Simulation, steps: usize) -> Self {
        Self {
            sim,
            remaining: steps,
        }
    }
}

impl Iterator for Snapshots<'_> {
    type Item = Result<Snapshot, SimulationError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let result = self.sim.step();
        self.remaining = if result.is_ok() {
            self.remaining - 1
        } else {
            0
        };
        Some(result)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining))
    }
}

impl std::iter::FusedIterator for Snapshots<'_> {}
