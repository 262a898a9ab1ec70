//! Construction parameters of a [Simulation](crate::Simulation).

use crate::error::ConfigError;
use crate::vehicle::{ModelParams, VehicleAttributes};

/// The furthest a per-vehicle velocity adjustment can scale the maximum velocity.
pub(crate) const MAX_VELOCITY_ADJUST: f64 = 1.25;

/// The parameters of a simulation.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SimulationConfig {
    /// The number of vehicles on the road.
    pub num_vehicles: usize,
    /// The circumference of the road in m.
    pub road_length: f64,
    /// The time step in s.
    pub dt: f64,
    /// The attributes shared by all vehicles.
    pub vehicle: VehicleAttributes,
    /// The car following model constants.
    pub model: ModelParams,
    /// How vehicles are initially laid out.
    pub spacing: Spacing,
    /// The initial velocity of every vehicle in m/s.
    /// If `None`, vehicles start at the optimal velocity for their gap.
    /// Must not exceed `vehicle.max_vel`. Vehicles given a lower maximum by
    /// `vel_spread` start at their own maximum instead.
    pub initial_vel: Option<f64>,
    /// The standard deviation of each vehicle's maximum velocity adjustment factor,
    /// which is sampled from a normal distribution with a mean of 1.
    /// Zero gives all vehicles the same maximum velocity.
    pub vel_spread: f64,
    /// Seeds the random number generator.
    pub seed: u64,
}

/// The initial layout of the vehicles.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Spacing {
    /// Vehicles are evenly spaced.
    Uniform,
    /// Vehicles are evenly spaced, then each shifted by a normally distributed
    /// amount with the given standard deviation as a fraction of the spacing.
    /// The shift is limited to a quarter of the free space between vehicles.
    Jittered { stddev: f64 },
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            num_vehicles: 20,
            road_length: 1000.0,
            dt: 0.1,
            vehicle: Default::default(),
            model: Default::default(),
            spacing: Spacing::Uniform,
            initial_vel: None,
            vel_spread: 0.0,
            seed: 0,
        }
    }
}

impl SimulationConfig {
    /// The distance between the fronts of adjacent vehicles in the initial layout, in m.
    pub fn spacing_len(&self) -> f64 {
        self.road_length / self.num_vehicles as f64
    }

    /// The highest maximum velocity any vehicle may be given, in m/s.
    pub fn top_vel(&self) -> f64 {
        if self.vel_spread > 0.0 {
            MAX_VELOCITY_ADJUST * self.vehicle.max_vel
        } else {
            self.vehicle.max_vel
        }
    }

    /// Checks that the parameters describe a valid simulation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_vehicles == 0 {
            return Err(ConfigError::NoVehicles);
        }
        positive("road_length", self.road_length)?;
        positive("vehicle.length", self.vehicle.length)?;
        positive("vehicle.max_vel", self.vehicle.max_vel)?;
        positive("vehicle.max_acc", self.vehicle.max_acc)?;
        positive("vehicle.comf_dec", self.vehicle.comf_dec)?;
        positive("vehicle.max_dec", self.vehicle.max_dec)?;
        if self.vehicle.max_dec < self.vehicle.comf_dec {
            return Err(ConfigError::InvalidParameter {
                name: "vehicle.max_dec",
                value: self.vehicle.max_dec,
            });
        }
        positive("model.sensitivity", self.model.sensitivity)?;
        non_negative("model.relative_gain", self.model.relative_gain)?;
        non_negative("model.interaction_distance", self.model.interaction_distance)?;
        positive("model.interaction_width", self.model.interaction_width)?;
        non_negative("model.min_gap", self.model.min_gap)?;
        positive("model.gap_floor", self.model.gap_floor)?;
        non_negative("vel_spread", self.vel_spread)?;
        if let Spacing::Jittered { stddev } = self.spacing {
            non_negative("spacing.stddev", stddev)?;
        }
        if let Some(vel) = self.initial_vel {
            non_negative("initial_vel", vel)?;
            if vel > self.vehicle.max_vel {
                return Err(ConfigError::InvalidParameter {
                    name: "initial_vel",
                    value: vel,
                });
            }
        }

        let required = self.num_vehicles as f64 * self.vehicle.length;
        if self.road_length <= required {
            return Err(ConfigError::RoadTooShort {
                road_length: self.road_length,
                required,
            });
        }

        if self.dt <= 0.0 || !self.dt.is_finite() {
            return Err(ConfigError::NonPositiveTimeStep(self.dt));
        }
        let displacement = self.top_vel() * self.dt;
        let spacing = self.spacing_len();
        if displacement >= spacing {
            return Err(ConfigError::TimeStepTooLarge {
                dt: self.dt,
                displacement,
                spacing,
            });
        }

        Ok(())
    }
}

fn positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::InvalidParameter { name, value })
    }
}

fn non_negative(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value >= 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::InvalidParameter { name, value })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert_eq!(SimulationConfig::default().validate(), Ok(()));
    }

    #[test]
    fn rejects_empty_road() {
        let config = SimulationConfig {
            num_vehicles: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::NoVehicles));
    }

    #[test]
    fn rejects_short_road() {
        let config = SimulationConfig {
            road_length: 100.0,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::RoadTooShort {
                road_length: 100.0,
                required: 100.0
            })
        );
    }

    #[test]
    fn rejects_bad_time_steps() {
        let config = SimulationConfig {
            dt: 0.0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::NonPositiveTimeStep(0.0)));

        let config = SimulationConfig {
            dt: 2.0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::TimeStepTooLarge { .. })
        ));
    }

    #[test]
    fn spread_widens_displacement_check() {
        let config = SimulationConfig {
            dt: 1.5,
            ..Default::default()
        };
        assert_eq!(config.validate(), Ok(()));
        let config = SimulationConfig {
            vel_spread: 0.1,
            ..config
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_bad_parameters() {
        let mut config = SimulationConfig::default();
        config.vehicle.max_dec = 1.0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidParameter {
                name: "vehicle.max_dec",
                value: 1.0
            })
        );

        let config = SimulationConfig {
            initial_vel: Some(f64::NAN),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = SimulationConfig {
            initial_vel: Some(100.0),
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidParameter {
                name: "initial_vel",
                value: 100.0
            })
        );
    }
}
