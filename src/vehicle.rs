pub use self::acceleration::ModelParams;
use self::acceleration::{AccelerationModel, Limits};
use crate::util::Interval;
use crate::VehicleId;

mod acceleration;

/// The acceleration below which a vehicle is considered to be braking, in m/s<sup>2</sup>.
const BRAKING_THRESHOLD: f64 = -1e-3;

/// The number of steps after a brake pulse is released before the vehicle
/// is picked for another random one.
const BRAKE_COOLDOWN_STEPS: usize = 20;

/// A simulated vehicle.
#[derive(Clone, Debug)]
pub struct Vehicle {
    /// The vehicle's ID.
    id: VehicleId,
    /// The vehicle's length in m.
    length: f64,
    /// The acceleration model.
    acc: AccelerationModel,
    /// The position of the vehicle's front bumper along the road, in m.
    pos: f64,
    /// The velocity in m/s.
    vel: f64,
    /// The acceleration applied during the last step, in m/s<sup>2</sup>.
    last_acc: f64,
    /// The number of steps remaining in a brake pulse.
    brake_hold: usize,
    /// The number of steps until the vehicle can be picked for a random brake pulse.
    brake_cooldown: usize,
}

/// The attributes of a simulated vehicle.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VehicleAttributes {
    /// The vehicle length in m.
    pub length: f64,
    /// The maximum velocity of the vehicle, in m/s.
    pub max_vel: f64,
    /// The maximum acceleration of the vehicle, in m/s^2.
    pub max_acc: f64,
    /// The comfortable deceleration of the vehicle, a positive number in m/s^2.
    pub comf_dec: f64,
    /// The hardest the vehicle can brake, a positive number in m/s^2.
    pub max_dec: f64,
}

impl Default for VehicleAttributes {
    fn default() -> Self {
        Self {
            length: 5.0,
            max_vel: 30.0,
            max_acc: 2.5,
            comf_dec: 3.0,
            max_dec: 9.0,
        }
    }
}

impl VehicleAttributes {
    /// The velocity a vehicle with these attributes settles at with the given gap
    /// ahead of it, in m/s.
    pub fn optimal_vel(&self, params: &ModelParams, gap: f64) -> f64 {
        AccelerationModel::new(params, &self.limits(1.0)).optimal_velocity(gap)
    }

    fn limits(&self, vel_adjust: f64) -> Limits {
        Limits {
            max_velocity: vel_adjust * self.max_vel,
            max_acceleration: self.max_acc,
            comf_deceleration: self.comf_dec,
            max_deceleration: self.max_dec,
        }
    }
}

impl Vehicle {
    /// Creates a new vehicle.
    ///
    /// # Parameters
    /// * `vel_adjust` - Scales the vehicle's maximum velocity.
    pub(crate) fn new(
        id: VehicleId,
        attributes: &VehicleAttributes,
        params: &ModelParams,
        vel_adjust: f64,
    ) -> Self {
        Self {
            id,
            length: attributes.length,
            acc: AccelerationModel::new(params, &attributes.limits(vel_adjust)),
            pos: 0.0,
            vel: 0.0,
            last_acc: 0.0,
            brake_hold: 0,
            brake_cooldown: 0,
        }
    }

    /// Gets the vehicle's ID.
    pub fn id(&self) -> VehicleId {
        self.id
    }

    /// The vehicle's length in m.
    pub fn length(&self) -> f64 {
        self.length
    }

    /// The position of the front of the vehicle along the road, in m.
    pub fn pos(&self) -> f64 {
        self.pos
    }

    /// The vehicle's velocity in m/s.
    pub fn vel(&self) -> f64 {
        self.vel
    }

    /// The vehicle's maximum velocity in m/s.
    pub fn max_vel(&self) -> f64 {
        self.acc.max_vel()
    }

    /// Whether the vehicle decelerated during the last step.
    pub fn is_braking(&self) -> bool {
        self.last_acc < BRAKING_THRESHOLD
    }

    /// Whether the vehicle is in the middle of a brake pulse.
    pub fn is_brake_held(&self) -> bool {
        self.brake_hold > 0
    }

    /// Whether the vehicle braked recently enough to be left out of random brake pulses.
    pub fn is_cooling_down(&self) -> bool {
        self.brake_cooldown > 0
    }

    /// The velocity this vehicle would settle at with the given gap ahead of it.
    pub fn optimal_vel(&self, gap: f64) -> f64 {
        self.acc.optimal_velocity(gap)
    }

    /// Whether the velocity is within the vehicle's limits.
    pub(crate) fn vel_in_bounds(&self) -> bool {
        Interval::new(0.0, self.max_vel()).contains(self.vel)
    }

    /// Places the vehicle on the road.
    pub(crate) fn set_location(&mut self, pos: f64, vel: f64) {
        self.pos = pos;
        self.vel = vel.clamp(0.0, self.max_vel());
        self.last_acc = 0.0;
        self.brake_hold = 0;
        self.brake_cooldown = 0;
    }

    /// Reduces the vehicle's velocity by the given amount in m/s.
    pub(crate) fn drop_velocity(&mut self, amount: f64) {
        self.vel = f64::max(self.vel - amount, 0.0);
    }

    /// Scales the vehicle's velocity down by `fraction`, then holds the brakes
    /// for the given number of steps.
    pub(crate) fn brake_pulse(&mut self, fraction: f64, hold_steps: usize) {
        self.vel = f64::max(self.vel * (1.0 - fraction), 0.0);
        self.brake_hold = hold_steps;
        self.brake_cooldown = hold_steps + BRAKE_COOLDOWN_STEPS;
    }

    /// Calculates the acceleration of the vehicle for the next step.
    ///
    /// # Parameters
    /// * `gap` - The bumper to bumper distance to the vehicle ahead, in m
    /// * `leader_vel` - The velocity of the vehicle ahead, in m/s
    pub(crate) fn acceleration(&self, gap: f64, leader_vel: f64) -> f64 {
        let acc = self.acc.follow_vehicle(gap, self.vel, leader_vel);
        if self.brake_hold > 0 {
            f64::max(f64::min(acc, -self.acc.comf_dec()), self.acc.limits().min)
        } else {
            acc
        }
    }

    /// Integrates the vehicle's velocity and position.
    /// Returns `true` iff the vehicle crossed the end of the road.
    ///
    /// # Parameters
    /// * `acc` - The acceleration to apply, in m/s^2
    /// * `dt` - The time step in seconds
    /// * `road_length` - The length of the road in m
    pub(crate) fn integrate(&mut self, acc: f64, dt: f64, road_length: f64) -> bool {
        let vel = (self.vel + dt * acc).clamp(0.0, self.max_vel());
        let pos = self.pos + self.vel * dt;
        self.vel = vel;
        self.last_acc = acc;
        self.brake_hold = self.brake_hold.saturating_sub(1);
        self.brake_cooldown = self.brake_cooldown.saturating_sub(1);
        if pos >= road_length {
            self.pos = pos % road_length;
            true
        } else {
            self.pos = pos;
            false
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::VehicleSet;
    use assert_approx_eq::assert_approx_eq;

    fn vehicle() -> Vehicle {
        let mut set = VehicleSet::with_key();
        let id = set.insert_with_key(|id| {
            Vehicle::new(id, &Default::default(), &Default::default(), 1.0)
        });
        set.remove(id).unwrap()
    }

    #[test]
    fn integrate_uses_previous_velocity() {
        let mut veh = vehicle();
        veh.set_location(10.0, 20.0);
        let wrapped = veh.integrate(2.0, 0.5, 1000.0);
        assert!(!wrapped);
        assert_approx_eq!(veh.pos(), 20.0);
        assert_approx_eq!(veh.vel(), 21.0);
        assert!(!veh.is_braking());
    }

    #[test]
    fn integrate_wraps_around() {
        let mut veh = vehicle();
        veh.set_location(995.0, 20.0);
        let wrapped = veh.integrate(0.0, 0.5, 1000.0);
        assert!(wrapped);
        assert_approx_eq!(veh.pos(), 5.0);
    }

    #[test]
    fn velocity_stays_in_bounds() {
        let mut veh = vehicle();
        veh.set_location(0.0, 1.0);
        veh.integrate(-9.0, 0.5, 1000.0);
        assert_eq!(veh.vel(), 0.0);
        assert!(veh.is_braking());

        veh.set_location(0.0, 29.9);
        veh.integrate(2.5, 0.5, 1000.0);
        assert_eq!(veh.vel(), 30.0);
        assert!(veh.vel_in_bounds());
    }

    #[test]
    fn brake_pulse_holds_for_steps() {
        let mut veh = vehicle();
        veh.set_location(0.0, 20.0);
        veh.brake_pulse(0.5, 2);
        assert_approx_eq!(veh.vel(), 10.0);

        // Plenty of room ahead, but the brakes are held.
        assert_approx_eq!(veh.acceleration(500.0, 30.0), -3.0);
        veh.integrate(-3.0, 0.1, 1000.0);
        assert!(veh.is_brake_held());
        veh.integrate(-3.0, 0.1, 1000.0);
        assert!(!veh.is_brake_held());
        assert_approx_eq!(veh.acceleration(500.0, 30.0), 2.5);
    }

    #[test]
    fn cooldown_outlasts_brake_pulse() {
        let mut veh = vehicle();
        veh.set_location(0.0, 20.0);
        veh.brake_pulse(0.5, 5);
        for _ in 0..5 {
            veh.integrate(0.0, 0.1, 1000.0);
        }
        assert!(!veh.is_brake_held());
        assert!(veh.is_cooling_down());
        for _ in 0..BRAKE_COOLDOWN_STEPS {
            veh.integrate(0.0, 0.1, 1000.0);
        }
        assert!(!veh.is_cooling_down());
    }

    #[test]
    fn nominal_optimal_velocity() {
        let attributes = VehicleAttributes::default();
        let params = ModelParams::default();
        assert_approx_eq!(attributes.optimal_vel(&params, 45.0), 19.773555524, 1e-6);

        let mut set = VehicleSet::with_key();
        let id = set.insert_with_key(|id| Vehicle::new(id, &attributes, &params, 0.8));
        assert!(set[id].optimal_vel(45.0) < attributes.optimal_vel(&params, 45.0));
    }
}
