use crate::config::{SimulationConfig, Spacing, MAX_VELOCITY_ADJUST};
use crate::error::{
    ConfigError, InvariantViolation, PerturbationError, SimulationError, ViolationKind,
};
use crate::perturbation::{Disturbance, Perturbation, Target};
use crate::road::Road;
use crate::snapshot::{Snapshot, Snapshots, VehicleState};
use crate::vehicle::Vehicle;
use crate::{VehicleId, VehicleSet};
use log::{debug, error, info, trace, warn};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use slotmap::SecondaryMap;
use std::collections::VecDeque;

/// Gaps more negative than this, in m, are treated as a collision.
pub const GAP_TOLERANCE: f64 = 1e-6;

/// The number of frames of mean velocity history to keep.
const VELOCITY_HISTORY_LEN: usize = 500;

/// The lifecycle state of a [Simulation].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SimulationState {
    /// No steps have been taken since construction or the last reset.
    Ready,
    /// At least one step has been taken.
    Running,
    /// A step violated an invariant. The simulation cannot continue.
    Halted,
}

/// A traffic simulation on a ring road.
pub struct Simulation {
    /// The parameters the simulation was created with.
    config: SimulationConfig,
    /// The road and the cyclic order of vehicles on it.
    road: Road,
    /// The vehicles being simulated.
    vehicles: VehicleSet,
    /// The buffer the next state of the vehicles is integrated into.
    back: VehicleSet,
    /// The accelerations calculated for the current step.
    accs: SecondaryMap<VehicleId, f64>,
    /// The initial layout, used when resetting.
    initial: Vec<(VehicleId, f64, f64)>,
    /// Perturbations to apply at the start of the next step.
    pending: Vec<Perturbation>,
    /// The random number generator.
    rng: ChaCha8Rng,
    /// The current frame of simulation.
    frame: usize,
    /// The lifecycle state.
    state: SimulationState,
    /// The mean velocity of recent frames, oldest first.
    vel_history: VecDeque<f64>,
}

impl Simulation {
    /// Creates a new simulation with the vehicles laid out around the road.
    pub fn new(config: &SimulationConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        let vel_adjusts = sample_velocity_adjusts(config, &mut rng)?;
        let positions = layout(config, &mut rng)?;

        let mut vehicles = VehicleSet::with_capacity_and_key(config.num_vehicles);
        let ids: Vec<VehicleId> = vel_adjusts
            .iter()
            .map(|factor| {
                vehicles.insert_with_key(|id| {
                    Vehicle::new(id, &config.vehicle, &config.model, *factor)
                })
            })
            .collect();
        let road = Road::new(config.road_length, ids.clone());

        // Place the vehicles, then derive their initial velocities from the gaps
        for (id, pos) in ids.iter().zip(&positions) {
            vehicles[*id].set_location(*pos, 0.0);
        }
        let initial = (0..ids.len())
            .map(|idx| {
                let vehicle = &vehicles[ids[idx]];
                let vel = match config.initial_vel {
                    Some(vel) => vel,
                    None => vehicle.optimal_vel(road.gap_at(&vehicles, idx)),
                };
                (ids[idx], vehicle.pos(), vel)
            })
            .collect::<Vec<_>>();
        for (id, pos, vel) in &initial {
            vehicles[*id].set_location(*pos, *vel);
        }

        debug!(
            "created simulation of {} vehicles on a {} m road",
            config.num_vehicles, config.road_length
        );

        Ok(Self {
            config: config.clone(),
            road,
            back: vehicles.clone(),
            vehicles,
            accs: SecondaryMap::with_capacity(config.num_vehicles),
            initial,
            pending: vec![],
            rng,
            frame: 0,
            state: SimulationState::Ready,
            vel_history: VecDeque::with_capacity(VELOCITY_HISTORY_LEN),
        })
    }

    /// The parameters the simulation was created with.
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// The lifecycle state of the simulation.
    pub fn state(&self) -> SimulationState {
        self.state
    }

    /// Gets the current simulation frame index.
    pub fn frame(&self) -> usize {
        self.frame
    }

    /// The simulated time in s.
    pub fn time(&self) -> f64 {
        self.frame as f64 * self.config.dt
    }

    /// The road.
    pub fn road(&self) -> &Road {
        &self.road
    }

    /// Returns an iterator over all the vehicles, in ascending order of position.
    pub fn iter_vehicles(&self) -> impl Iterator<Item = &Vehicle> {
        self.road.vehicle_ids().iter().map(|id| &self.vehicles[*id])
    }

    /// Gets a reference to the vehicle with the given ID.
    pub fn get_vehicle(&self, vehicle_id: VehicleId) -> Option<&Vehicle> {
        self.vehicles.get(vehicle_id)
    }

    /// The gap between the given vehicle and the one ahead of it, in m.
    pub fn gap_ahead(&self, vehicle_id: VehicleId) -> Option<f64> {
        self.road.gap_ahead(&self.vehicles, vehicle_id)
    }

    /// The velocity vehicles with the configured attributes would all travel at
    /// if evenly spaced around the road, in m/s.
    pub fn equilibrium_vel(&self) -> f64 {
        let gap = self.config.spacing_len() - self.config.vehicle.length;
        self.config.vehicle.optimal_vel(&self.config.model, gap)
    }

    /// The mean velocity of the vehicles over recent frames, oldest first.
    pub fn mean_vel_history(&self) -> impl Iterator<Item = f64> + '_ {
        self.vel_history.iter().copied()
    }

    /// Takes a read-only copy of the current state.
    pub fn current_snapshot(&self) -> Snapshot {
        let vehicles = self
            .road
            .vehicle_ids()
            .iter()
            .enumerate()
            .map(|(idx, id)| {
                let vehicle = &self.vehicles[*id];
                VehicleState {
                    id: *id,
                    pos: vehicle.pos(),
                    vel: vehicle.vel(),
                    gap: self.road.gap_at(&self.vehicles, idx),
                    braking: vehicle.is_braking(),
                }
            })
            .collect();
        Snapshot {
            frame: self.frame,
            time: self.time(),
            max_vel: self.config.vehicle.max_vel,
            vehicles,
        }
    }

    /// Steps the simulation `steps` times as the returned iterator is consumed,
    /// yielding a snapshot after each step.
    pub fn snapshots(&mut self, steps: usize) -> Snapshots<'_> {
        Snapshots::new(self, steps)
    }

    /// Queues a disturbance to be applied to a vehicle at the start of the next step.
    /// Returns the ID of the targeted vehicle.
    pub fn inject_perturbation(
        &mut self,
        target: Target,
        disturbance: Disturbance,
    ) -> Result<VehicleId, PerturbationError> {
        if self.state == SimulationState::Halted {
            return Err(PerturbationError::Halted);
        }
        disturbance.validate()?;
        let vehicle_id = match target {
            Target::Vehicle(id) if self.vehicles.contains_key(id) => id,
            Target::Vehicle(id) => {
                warn!("perturbation targets unknown vehicle {:?}", id);
                return Err(PerturbationError::NotFound(id));
            }
            Target::Random => self.random_target(),
            Target::Leader => self.road.front(),
        };
        self.pending.push(Perturbation {
            vehicle_id,
            disturbance,
        });
        Ok(vehicle_id)
    }

    /// Chooses a random vehicle which has not braked recently
    /// and is not about to be perturbed, if possible.
    fn random_target(&mut self) -> VehicleId {
        let start = self.rng.gen_range(0..self.road.num_vehicles());
        self.road
            .ids_from(start)
            .find(|id| {
                !self.vehicles[*id].is_cooling_down()
                    && !self.pending.iter().any(|p| p.vehicle_id == *id)
            })
            .unwrap_or(self.road.vehicle_ids()[start])
    }

    /// Returns the vehicles to their initial layout and clears pending perturbations.
    pub fn reset(&mut self) -> Result<(), SimulationError> {
        if self.state == SimulationState::Halted {
            return Err(SimulationError::Halted);
        }
        for (id, pos, vel) in &self.initial {
            self.vehicles[*id].set_location(*pos, *vel);
        }
        self.road = Road::new(
            self.config.road_length,
            self.initial.iter().map(|(id, _, _)| *id).collect(),
        );
        self.pending.clear();
        self.vel_history.clear();
        self.frame = 0;
        self.state = SimulationState::Ready;
        debug!("simulation reset");
        Ok(())
    }

    /// Advances the simulation by one time step.
    pub fn step(&mut self) -> Result<Snapshot, SimulationError> {
        if self.state == SimulationState::Halted {
            return Err(SimulationError::Halted);
        }

        // Build the candidate state in the back buffer
        self.back.clone_from(&self.vehicles);
        self.apply_perturbations();
        self.calculate_accelerations();
        let wrapped = self.integrate();
        if let Err(violation) = self.check_candidate(wrapped) {
            return Err(self.halt(violation));
        }

        // Commit the new state
        std::mem::swap(&mut self.vehicles, &mut self.back);
        self.road.restore_order(wrapped);
        self.frame += 1;
        self.state = SimulationState::Running;

        let snapshot = self.current_snapshot();
        self.record_history(&snapshot);
        trace!("frame {}: {:?}", self.frame, snapshot.stats());
        Ok(snapshot)
    }

    /// Applies the queued perturbations to the back buffer and clears them.
    fn apply_perturbations(&mut self) {
        for perturbation in self.pending.drain(..) {
            if let Some(vehicle) = self.back.get_mut(perturbation.vehicle_id) {
                perturbation.disturbance.apply(vehicle);
                info!(
                    "applied {:?} to vehicle {:?} at t = {} s",
                    perturbation.disturbance,
                    perturbation.vehicle_id,
                    self.frame as f64 * self.config.dt
                );
            }
        }
    }

    /// Calculates the accelerations of all vehicles from the perturbed state
    /// in the back buffer.
    fn calculate_accelerations(&mut self) {
        self.accs.clear();
        for (idx, (follower, leader)) in self.road.pairs().enumerate() {
            let gap = self.road.gap_at(&self.back, idx);
            let leader_vel = self.back[leader].vel();
            let acc = self.back[follower].acceleration(gap, leader_vel);
            self.accs.insert(follower, acc);
        }
    }

    /// Integrates the next state of all vehicles in the back buffer.
    /// Returns the number of vehicles which crossed the end of the road.
    fn integrate(&mut self) -> usize {
        let mut wrapped = 0;
        for (id, vehicle) in &mut self.back {
            if vehicle.integrate(self.accs[id], self.config.dt, self.config.road_length) {
                wrapped += 1;
            }
        }
        wrapped
    }

    /// Checks the integrated state in the back buffer before it is committed.
    fn check_candidate(&self, wrapped: usize) -> Result<(), InvariantViolation> {
        let time = self.time() + self.config.dt;
        for &id in self.road.vehicle_ids() {
            let vehicle = &self.back[id];
            if !vehicle.vel_in_bounds() {
                return Err(InvariantViolation {
                    time,
                    kind: ViolationKind::VelocityOutOfBounds {
                        vehicle: id,
                        velocity: vehicle.vel(),
                    },
                });
            }
        }

        // Unwrap the displacements so that overtaking shows up as a negative gap
        if self.road.num_vehicles() > 1 {
            let moved = |id: VehicleId| {
                self.road
                    .distance(self.vehicles[id].pos(), self.back[id].pos())
            };
            for (follower, leader) in self.road.pairs() {
                let dist = self
                    .road
                    .distance(self.vehicles[follower].pos(), self.vehicles[leader].pos());
                let gap = dist + moved(leader) - moved(follower) - self.back[leader].length();
                if gap < -GAP_TOLERANCE {
                    return Err(InvariantViolation {
                        time,
                        kind: ViolationKind::Overlap {
                            follower,
                            leader,
                            gap,
                        },
                    });
                }
            }
        }

        if let Some(vehicle) = self.road.find_disorder(&self.back, wrapped) {
            return Err(InvariantViolation {
                time,
                kind: ViolationKind::OrderBroken { vehicle },
            });
        }
        Ok(())
    }

    /// Halts the simulation after an invariant violation.
    fn halt(&mut self, violation: InvariantViolation) -> SimulationError {
        error!("halting simulation: {}", violation);
        self.state = SimulationState::Halted;
        self.pending.clear();
        violation.into()
    }

    /// Records the mean velocity of the latest frame.
    fn record_history(&mut self, snapshot: &Snapshot) {
        if self.vel_history.len() == VELOCITY_HISTORY_LEN {
            self.vel_history.pop_front();
        }
        self.vel_history.push_back(snapshot.stats().mean_vel);
    }
}

/// Samples a maximum velocity adjustment factor for each vehicle.
fn sample_velocity_adjusts(
    config: &SimulationConfig,
    rng: &mut ChaCha8Rng,
) -> Result<Vec<f64>, ConfigError> {
    if config.vel_spread == 0.0 {
        return Ok(vec![1.0; config.num_vehicles]);
    }
    let distr = Normal::new(1.0, config.vel_spread).map_err(|_| ConfigError::InvalidParameter {
        name: "vel_spread",
        value: config.vel_spread,
    })?;
    let min_adjust = 2.0 - MAX_VELOCITY_ADJUST;
    Ok((0..config.num_vehicles)
        .map(|_| distr.sample(rng).clamp(min_adjust, MAX_VELOCITY_ADJUST))
        .collect())
}

/// Computes the initial position of each vehicle, in ascending order.
fn layout(config: &SimulationConfig, rng: &mut ChaCha8Rng) -> Result<Vec<f64>, ConfigError> {
    let spacing = config.spacing_len();
    let mut positions: Vec<f64> = (0..config.num_vehicles)
        .map(|i| i as f64 * spacing)
        .collect();

    if let Spacing::Jittered { stddev } = config.spacing {
        let distr = Normal::new(0.0, stddev * spacing).map_err(|_| {
            ConfigError::InvalidParameter {
                name: "spacing.stddev",
                value: stddev,
            }
        })?;
        let max_shift = 0.25 * (spacing - config.vehicle.length);
        for pos in &mut positions {
            let shift = distr.sample(rng).clamp(-max_shift, max_shift);
            *pos = (*pos + shift + config.road_length) % config.road_length;
        }
        // Only the first vehicle can be shifted behind the start of the road
        if positions.len() > 1 && positions[0] > positions[1] {
            positions.rotate_left(1);
        }
    }

    Ok(positions)
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use std::collections::HashSet;

    #[test]
    fn uniform_layout() {
        let sim = Simulation::new(&SimulationConfig::default()).unwrap();
        assert_eq!(sim.state(), SimulationState::Ready);
        assert_eq!(sim.frame(), 0);
        let eq_vel = sim.equilibrium_vel();
        for (idx, vehicle) in sim.iter_vehicles().enumerate() {
            assert_approx_eq!(vehicle.pos(), 50.0 * idx as f64);
            assert_approx_eq!(vehicle.vel(), eq_vel);
            assert_approx_eq!(sim.gap_ahead(vehicle.id()).unwrap(), 45.0);
        }
    }

    #[test]
    fn jittered_layout_keeps_order() {
        for seed in 0..20 {
            let sim = Simulation::new(&SimulationConfig {
                spacing: Spacing::Jittered { stddev: 0.5 },
                seed,
                ..Default::default()
            })
            .unwrap();
            let positions: Vec<_> = sim.iter_vehicles().map(|v| v.pos()).collect();
            assert!(positions.windows(2).all(|w| w[0] < w[1]));
            assert!(positions.iter().all(|pos| (0.0..1000.0).contains(pos)));
            // Each vehicle moves at most a quarter of the free space
            for vehicle in sim.iter_vehicles() {
                assert!(sim.gap_ahead(vehicle.id()).unwrap() >= 22.5 - 1e-9);
            }
        }
    }

    #[test]
    fn velocity_spread() {
        let sim = Simulation::new(&SimulationConfig {
            vel_spread: 0.5,
            seed: 1,
            ..Default::default()
        })
        .unwrap();
        let max_vels: Vec<_> = sim.iter_vehicles().map(|v| v.max_vel()).collect();
        assert!(max_vels.iter().all(|vel| (22.5..=37.5).contains(vel)));
        assert!(max_vels.iter().any(|vel| *vel != max_vels[0]));
        assert_approx_eq!(sim.equilibrium_vel(), 19.773555524, 1e-6);
    }

    #[test]
    fn random_targets_are_distinct() {
        let mut sim = Simulation::new(&SimulationConfig {
            num_vehicles: 3,
            road_length: 150.0,
            ..Default::default()
        })
        .unwrap();
        let targets: HashSet<_> = (0..3)
            .map(|_| {
                sim.inject_perturbation(Target::Random, Disturbance::VelocityDrop(1.0))
                    .unwrap()
            })
            .collect();
        assert_eq!(targets.len(), 3);

        // Every vehicle is already pending
        assert!(sim
            .inject_perturbation(Target::Random, Disturbance::VelocityDrop(1.0))
            .is_ok());
        assert_eq!(sim.pending.len(), 4);
        sim.step().unwrap();
        assert!(sim.pending.is_empty());
    }

    #[test]
    fn random_targets_skip_recent_brakes() {
        let mut sim = Simulation::new(&SimulationConfig {
            num_vehicles: 2,
            road_length: 100.0,
            ..Default::default()
        })
        .unwrap();
        let first = sim
            .inject_perturbation(Target::Random, Disturbance::pulse(0.2))
            .unwrap();
        sim.step().unwrap();
        assert!(sim.get_vehicle(first).unwrap().is_cooling_down());

        // The pulse was released, but the vehicle is still cooling down
        for _ in 0..5 {
            let id = sim
                .inject_perturbation(Target::Random, Disturbance::VelocityDrop(0.0))
                .unwrap();
            assert_ne!(id, first);
            sim.step().unwrap();
        }
    }

    #[test]
    fn broken_order_is_not_committed() {
        let mut sim = Simulation::new(&SimulationConfig {
            num_vehicles: 3,
            road_length: 150.0,
            ..Default::default()
        })
        .unwrap();
        let ids = sim.road().vehicle_ids().to_vec();
        sim.back.clone_from(&sim.vehicles);

        // Claiming a vehicle wrapped when none did puts the front vehicle first
        assert_eq!(sim.check_candidate(0), Ok(()));
        let violation = sim.check_candidate(1).unwrap_err();
        assert_eq!(violation.kind, ViolationKind::OrderBroken { vehicle: ids[0] });
        assert_eq!(sim.road().vehicle_ids(), &ids[..]);
    }

    #[test]
    fn time_follows_frames() {
        let mut sim = Simulation::new(&SimulationConfig::default()).unwrap();
        for _ in 0..30 {
            sim.step().unwrap();
        }
        assert_eq!(sim.frame(), 30);
        assert_eq!(sim.time(), 30.0 * 0.1);
        assert_eq!(sim.mean_vel_history().count(), 30);
    }
}
