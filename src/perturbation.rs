//! One-off disturbances used to trigger phantom jams.

use crate::error::PerturbationError;
use crate::vehicle::Vehicle;
use crate::VehicleId;

/// The vehicle a perturbation is aimed at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Target {
    /// A specific vehicle.
    Vehicle(VehicleId),
    /// A randomly chosen vehicle that is not already braking.
    Random,
    /// The vehicle furthest along the road.
    Leader,
}

/// A disturbance applied to a single vehicle.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Disturbance {
    /// Instantly reduces the vehicle's velocity by the given amount in m/s.
    VelocityDrop(f64),
    /// Instantly reduces the vehicle's velocity by `fraction` of its current value,
    /// then keeps it braking at its comfortable deceleration for `hold_steps` steps.
    BrakePulse { fraction: f64, hold_steps: usize },
}

/// A disturbance waiting to be applied at the start of the next step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Perturbation {
    pub vehicle_id: VehicleId,
    pub disturbance: Disturbance,
}

impl Disturbance {
    /// Creates a brake pulse which only lasts a single step.
    pub fn pulse(fraction: f64) -> Self {
        Self::BrakePulse {
            fraction,
            hold_steps: 0,
        }
    }

    /// Checks the magnitude of the disturbance.
    pub fn validate(&self) -> Result<(), PerturbationError> {
        match *self {
            Self::VelocityDrop(amount) if amount >= 0.0 && amount.is_finite() => Ok(()),
            Self::BrakePulse { fraction, .. } if (0.0..=1.0).contains(&fraction) => Ok(()),
            Self::VelocityDrop(value) | Self::BrakePulse { fraction: value, .. } => {
                Err(PerturbationError::InvalidMagnitude(value))
            }
        }
    }

    /// Applies the disturbance to a vehicle.
    pub(crate) fn apply(&self, vehicle: &mut Vehicle) {
        match *self {
            Self::VelocityDrop(amount) => vehicle.drop_velocity(amount),
            Self::BrakePulse {
                fraction,
                hold_steps,
            } => vehicle.brake_pulse(fraction, hold_steps),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn validate_magnitudes() {
        assert_eq!(Disturbance::VelocityDrop(3.0).validate(), Ok(()));
        assert_eq!(Disturbance::pulse(0.5).validate(), Ok(()));
        assert_eq!(Disturbance::pulse(1.0).validate(), Ok(()));
        assert_eq!(
            Disturbance::VelocityDrop(-1.0).validate(),
            Err(PerturbationError::InvalidMagnitude(-1.0))
        );
        assert_eq!(
            Disturbance::pulse(1.5).validate(),
            Err(PerturbationError::InvalidMagnitude(1.5))
        );
        assert!(Disturbance::VelocityDrop(f64::INFINITY).validate().is_err());
    }
}
