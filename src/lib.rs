//! A single lane ring road traffic simulation, for reproducing phantom traffic jams.

pub use config::{SimulationConfig, Spacing};
pub use error::{
    ConfigError, InvariantViolation, PerturbationError, SimulationError, ViolationKind,
};
pub use perturbation::{Disturbance, Target};
pub use road::Road;
pub use simulation::{Simulation, SimulationState, GAP_TOLERANCE};
pub use slotmap::{Key, KeyData};
use slotmap::{new_key_type, SlotMap};
pub use snapshot::{Snapshot, Snapshots, TrafficStats, VehicleState};
pub use util::Interval;
pub use vehicle::{ModelParams, Vehicle, VehicleAttributes};

mod config;
mod error;
mod perturbation;
mod road;
mod simulation;
mod snapshot;
mod util;
mod vehicle;

new_key_type! {
    /// Unique ID of a [Vehicle].
    pub struct VehicleId;
}

type VehicleSet = SlotMap<VehicleId, Vehicle>;
