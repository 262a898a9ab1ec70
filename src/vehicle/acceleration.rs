use crate::util::Interval;

/// Decelerations needed to match the velocity of the vehicle ahead which are gentler
/// than this are left to the relative velocity term, in m/s<sup>2</sup>.
const MIN_CLOSING_DEC: f64 = 0.1;

/// The acceleration model of a vehicle.
///
/// An optimal velocity model with a relative velocity term: the vehicle relaxes
/// towards the optimal velocity for its current gap, and additionally reacts to
/// the speed at which it is closing on the vehicle ahead. When closing quickly, the
/// vehicle brakes at least hard enough to match the velocity of the vehicle ahead
/// before the gap shrinks to the minimum gap.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AccelerationModel {
    sensitivity: f64,
    rel_gain: f64,
    int_dist: f64,
    int_width: f64,
    min_gap: f64,
    gap_floor: f64,
    max_vel: f64,
    comf_dec: f64,
    limits: Interval,
}

/// The constants of the car following model.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ModelParams {
    /// How quickly the velocity relaxes towards the optimal velocity, in s<sup>-1</sup>.
    pub sensitivity: f64,
    /// The gain of the relative velocity term, in m/s.
    pub relative_gain: f64,
    /// The gap at which the optimal velocity function is steepest, in m.
    pub interaction_distance: f64,
    /// The width of the transition of the optimal velocity function, in m.
    pub interaction_width: f64,
    /// At or below this gap the vehicle brakes as hard as it can, in m.
    pub min_gap: f64,
    /// The smallest gap used to scale the relative velocity term, in m.
    pub gap_floor: f64,
}

/// The limits of a single vehicle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Limits {
    /// The maximum velocity in m/s.
    pub max_velocity: f64,
    /// The maximum acceleration in m/s<sup>2</sup>.
    pub max_acceleration: f64,
    /// The comfortable deceleration, a positive number in m/s<sup>2</sup>.
    pub comf_deceleration: f64,
    /// The maximum deceleration, a positive number in m/s<sup>2</sup>.
    pub max_deceleration: f64,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            sensitivity: 0.8,
            relative_gain: 6.0,
            interaction_distance: 40.0,
            interaction_width: 15.0,
            min_gap: 2.0,
            gap_floor: 1.0,
        }
    }
}

impl AccelerationModel {
    /// Creates a new acceleration model.
    pub fn new(params: &ModelParams, limits: &Limits) -> Self {
        AccelerationModel {
            sensitivity: params.sensitivity,
            rel_gain: params.relative_gain,
            int_dist: params.interaction_distance,
            int_width: params.interaction_width,
            min_gap: params.min_gap,
            gap_floor: params.gap_floor,
            max_vel: limits.max_velocity,
            comf_dec: limits.comf_deceleration,
            limits: Interval::new(-limits.max_deceleration, limits.max_acceleration),
        }
    }

    /// The maximum velocity in m/s.
    pub fn max_vel(&self) -> f64 {
        self.max_vel
    }

    /// The comfortable deceleration in m/s<sup>2</sup>.
    pub fn comf_dec(&self) -> f64 {
        self.comf_dec
    }

    /// The range of accelerations the model can produce.
    pub fn limits(&self) -> Interval {
        self.limits
    }

    /// The velocity the vehicle would like to travel at given its gap to the vehicle ahead.
    ///
    /// Zero at a zero gap, increasing, and saturating at the maximum velocity.
    pub fn optimal_velocity(&self, gap: f64) -> f64 {
        let offset = f64::tanh(self.int_dist / self.int_width);
        let rise = f64::tanh((gap - self.int_dist) / self.int_width);
        let vel = self.max_vel * (rise + offset) / (1.0 + offset);
        vel.clamp(0.0, self.max_vel)
    }

    /// Calculates the acceleration needed to follow the vehicle ahead.
    ///
    /// # Arguments
    /// * `gap` - The bumper to bumper distance to the vehicle ahead (m).
    /// * `my_vel` - The velocity of the simulated vehicle (m/s).
    /// * `their_vel` - The vehicle ahead's velocity (m/s).
    pub fn follow_vehicle(&self, gap: f64, my_vel: f64, their_vel: f64) -> f64 {
        if gap <= self.min_gap {
            return self.limits.min;
        }
        let relax = self.sensitivity * (self.optimal_velocity(gap) - my_vel);
        let closing = self.rel_gain * (their_vel - my_vel) / f64::max(gap, self.gap_floor);
        let mut acc = relax + closing;

        let appr = my_vel - their_vel;
        if appr > 0.0 {
            let match_acc = -appr.powi(2) / (2.0 * (gap - self.min_gap));
            if match_acc < -MIN_CLOSING_DEC {
                acc = f64::min(acc, match_acc);
            }
        }

        self.limits.clamp(acc)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn model() -> AccelerationModel {
        AccelerationModel::new(
            &ModelParams::default(),
            &Limits {
                max_velocity: 30.0,
                max_acceleration: 2.5,
                comf_deceleration: 3.0,
                max_deceleration: 9.0,
            },
        )
    }

    #[test]
    fn optimal_velocity_shape() {
        let acc = model();
        assert_approx_eq!(acc.optimal_velocity(0.0), 0.0);
        assert_approx_eq!(acc.optimal_velocity(45.0), 19.773555524, 1e-6);
        assert_approx_eq!(acc.optimal_velocity(1e4), 30.0);

        let mut prev = acc.optimal_velocity(0.0);
        for i in 1..200 {
            let vel = acc.optimal_velocity(i as f64);
            assert!(vel > prev);
            prev = vel;
        }
    }

    #[test]
    fn equilibrium_has_no_acceleration() {
        let acc = model();
        let vel = acc.optimal_velocity(45.0);
        assert_approx_eq!(acc.follow_vehicle(45.0, vel, vel), 0.0);
    }

    #[test]
    fn closing_speed_brakes_harder() {
        let acc = model();
        let vel = acc.optimal_velocity(30.0);
        let steady = acc.follow_vehicle(30.0, vel, vel);
        let closing = acc.follow_vehicle(30.0, vel, vel - 5.0);
        assert!(closing < steady);
        assert_approx_eq!(closing, -1.0);
    }

    #[test]
    fn brakes_to_match_stopped_vehicle() {
        let acc = model();
        // Stop within the 98 m left before the minimum gap.
        assert_approx_eq!(acc.follow_vehicle(100.0, 30.0, 0.0), -900.0 / 196.0);
    }

    #[test]
    fn output_is_clamped() {
        let acc = model();
        assert_eq!(acc.follow_vehicle(500.0, 0.0, 30.0), 2.5);
        assert_eq!(acc.follow_vehicle(3.0, 30.0, 0.0), -9.0);
        assert_eq!(acc.follow_vehicle(2.0, 0.0, 0.0), -9.0);
        assert_eq!(acc.follow_vehicle(0.0, 10.0, 10.0), -9.0);
    }
}
