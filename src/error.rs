//! Error types returned by the simulation.

use crate::VehicleId;
use thiserror::Error;

/// An invalid [SimulationConfig](crate::SimulationConfig).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("the simulation must contain at least one vehicle")]
    NoVehicles,
    #[error("road of length {road_length} m cannot fit vehicles totalling {required} m")]
    RoadTooShort { road_length: f64, required: f64 },
    #[error("time step must be greater than zero, got {0} s")]
    NonPositiveTimeStep(f64),
    #[error("time step of {dt} s allows {displacement} m per step, but vehicles are only {spacing} m apart")]
    TimeStepTooLarge {
        dt: f64,
        displacement: f64,
        spacing: f64,
    },
    #[error("invalid value for `{name}`: {value}")]
    InvalidParameter { name: &'static str, value: f64 },
}

/// A perturbation that could not be injected.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum PerturbationError {
    #[error("no vehicle with ID {0:?}")]
    NotFound(VehicleId),
    #[error("invalid disturbance magnitude {0}")]
    InvalidMagnitude(f64),
    #[error("the simulation has halted")]
    Halted,
}

/// A failed simulation step.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum SimulationError {
    #[error(transparent)]
    InvariantViolation(#[from] InvariantViolation),
    #[error("the simulation has halted")]
    Halted,
}

/// A physically inconsistent state produced by a step.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("invariant violated at t = {time} s: {kind}")]
pub struct InvariantViolation {
    /// The simulated time at which the step would have been committed.
    pub time: f64,
    /// What went wrong.
    pub kind: ViolationKind,
}

/// The kind of an [InvariantViolation].
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum ViolationKind {
    #[error("vehicle {follower:?} overlaps vehicle {leader:?} (gap {gap} m)")]
    Overlap {
        follower: VehicleId,
        leader: VehicleId,
        gap: f64,
    },
    #[error("vehicle {vehicle:?} has velocity {velocity} m/s")]
    VelocityOutOfBounds { vehicle: VehicleId, velocity: f64 },
    #[error("vehicle {vehicle:?} is out of cyclic order")]
    OrderBroken { vehicle: VehicleId },
}
