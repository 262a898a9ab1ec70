use crate::util::rotated_range;
use crate::vehicle::Vehicle;
use crate::{VehicleId, VehicleSet};
use itertools::Itertools;

/// A closed, single lane loop of road.
///
/// Vehicles are kept in cyclic order: ascending position, with the vehicle
/// nearest the end of the road last. Vehicles cannot overtake, so the order
/// only ever rotates as vehicles cross the end of the road.
#[derive(Clone, Debug)]
pub struct Road {
    /// The circumference of the loop in m.
    length: f64,
    /// The vehicles on the road, in ascending order of position.
    vehicles: Vec<VehicleId>,
}

impl Road {
    /// Creates a new road.
    /// The vehicles must already be in ascending order of position.
    pub(crate) fn new(length: f64, vehicles: Vec<VehicleId>) -> Self {
        Self { length, vehicles }
    }

    /// Gets the length of the road in m.
    pub fn length(&self) -> f64 {
        self.length
    }

    /// The number of vehicles on the road.
    pub fn num_vehicles(&self) -> usize {
        self.vehicles.len()
    }

    /// The IDs of the vehicles on the road, in ascending order of position.
    pub fn vehicle_ids(&self) -> &[VehicleId] {
        &self.vehicles
    }

    /// The index of the vehicle in cyclic order.
    pub fn index_of(&self, id: VehicleId) -> Option<usize> {
        self.vehicles.iter().position(|v| *v == id)
    }

    /// The vehicle immediately ahead of the vehicle at `idx`.
    /// A lone vehicle follows itself.
    pub fn leader_of(&self, idx: usize) -> VehicleId {
        self.vehicles[(idx + 1) % self.vehicles.len()]
    }

    /// The vehicle immediately behind the vehicle at `idx`.
    pub fn follower_of(&self, idx: usize) -> VehicleId {
        let n = self.vehicles.len();
        self.vehicles[(idx + n - 1) % n]
    }

    /// The vehicle furthest along the road.
    pub fn front(&self) -> VehicleId {
        self.vehicles[self.vehicles.len() - 1]
    }

    /// Iterates over every vehicle paired with the vehicle ahead of it.
    pub fn pairs(&self) -> impl Iterator<Item = (VehicleId, VehicleId)> + '_ {
        (0..self.vehicles.len()).map(|idx| (self.vehicles[idx], self.leader_of(idx)))
    }

    /// Iterates over the vehicles in cyclic order, starting at `start`.
    pub fn ids_from(&self, start: usize) -> impl Iterator<Item = VehicleId> + '_ {
        rotated_range(self.vehicles.len(), start).map(|idx| self.vehicles[idx])
    }

    /// Computes the distance travelled going forward from `from` to `to`, in m.
    /// The result is in `[0, length)`.
    pub fn distance(&self, from: f64, to: f64) -> f64 {
        let dist = (to - from + self.length) % self.length;
        if dist < 0.0 {
            dist + self.length
        } else {
            dist
        }
    }

    /// Computes the bumper to bumper gap between two vehicles, in m.
    pub(crate) fn gap_between(&self, follower: &Vehicle, leader: &Vehicle) -> f64 {
        let dist = if follower.id() == leader.id() {
            self.length
        } else {
            self.distance(follower.pos(), leader.pos())
        };
        dist - leader.length()
    }

    /// Computes the gap between the vehicle at `idx` and the vehicle ahead of it, in m.
    pub(crate) fn gap_at(&self, vehicles: &VehicleSet, idx: usize) -> f64 {
        let follower = &vehicles[self.vehicles[idx]];
        let leader = &vehicles[self.leader_of(idx)];
        self.gap_between(follower, leader)
    }

    /// Computes the gap between the given vehicle and the vehicle ahead of it, in m.
    pub(crate) fn gap_ahead(&self, vehicles: &VehicleSet, id: VehicleId) -> Option<f64> {
        self.index_of(id).map(|idx| self.gap_at(vehicles, idx))
    }

    /// Restores the cyclic order after `wrapped` vehicles crossed the end of the road.
    /// Those vehicles were the last ones in the order, and are now the first.
    pub(crate) fn restore_order(&mut self, wrapped: usize) {
        let n = self.vehicles.len();
        if n > 0 {
            self.vehicles.rotate_right(wrapped % n);
        }
    }

    /// Finds the first vehicle which would be positioned behind the vehicle before it
    /// once the order is restored after `wrapped` vehicles crossed the end of the road.
    pub(crate) fn find_disorder(
        &self,
        vehicles: &VehicleSet,
        wrapped: usize,
    ) -> Option<VehicleId> {
        let n = self.vehicles.len();
        if n == 0 {
            return None;
        }
        self.ids_from((n - wrapped % n) % n)
            .tuple_windows()
            .find(|(a, b)| vehicles[*b].pos() < vehicles[*a].pos())
            .map(|(_, b)| b)
    }
}
