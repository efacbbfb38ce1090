//! Simulated devices
//!
//! Stand-ins for the vendor drivers so the whole control core can run on a
//! desktop and in tests. Devices hold plain state; [`SimWorld`] advances the
//! physics once per scheduler period.

use super::{
    AnalogSensor, BooleanSensor, PositionActuator, PowerActuator, SharedAnalog, SharedPosition,
    SharedPower, SharedSwitch,
};
use crate::config::GantryConfig;
use crate::robot::RobotHardware;
use gantry_core::error::{GantryError, GantryResult};
use parking_lot::Mutex;
use std::sync::Arc;

/// Position actuator that slews toward its target at a fixed rate
#[derive(Debug, Clone)]
pub struct SimPositionActuator {
    name: &'static str,
    position: f64,
    target: f64,
    slew_per_step: f64,
    limits: (f64, f64),
    holding: bool,
    fault: Option<String>,
}

impl SimPositionActuator {
    pub fn new(name: &'static str, position: f64, slew_per_step: f64) -> Self {
        Self {
            name,
            position,
            target: position,
            slew_per_step: slew_per_step.abs(),
            limits: (f64::NEG_INFINITY, f64::INFINITY),
            holding: false,
            fault: None,
        }
    }

    /// Reject targets outside `min..=max`
    pub fn with_limits(mut self, min: f64, max: f64) -> Self {
        self.limits = (min, max);
        self
    }

    /// Make every following command fail with `reason`
    pub fn inject_fault(&mut self, reason: impl Into<String>) {
        self.fault = Some(reason.into());
    }

    pub fn clear_fault(&mut self) {
        self.fault = None;
    }

    /// Whether a target is being actively held
    pub fn is_holding(&self) -> bool {
        self.holding
    }

    pub fn at_target(&self, tolerance: f64) -> bool {
        (self.position - self.target).abs() <= tolerance
    }

    /// Advance one period
    pub fn step(&mut self) {
        if !self.holding {
            return;
        }
        let error = self.target - self.position;
        if error.abs() <= self.slew_per_step {
            self.position = self.target;
        } else {
            self.position += self.slew_per_step.copysign(error);
        }
    }

    fn check_fault(&self) -> GantryResult<()> {
        match &self.fault {
            Some(reason) => Err(GantryError::hardware(self.name, reason.clone())),
            None => Ok(()),
        }
    }
}

impl PositionActuator for SimPositionActuator {
    fn set_target(&mut self, target: f64) -> GantryResult<()> {
        self.check_fault()?;
        let (min, max) = self.limits;
        if !(min..=max).contains(&target) {
            return Err(GantryError::hardware(
                self.name,
                format!("target {:.3} outside {:.3}..={:.3}", target, min, max),
            ));
        }
        self.target = target;
        self.holding = true;
        Ok(())
    }

    fn target(&self) -> f64 {
        self.target
    }

    fn position(&self) -> f64 {
        self.position
    }

    fn stop(&mut self) -> GantryResult<()> {
        self.holding = false;
        self.target = self.position;
        self.check_fault()
    }
}

/// Open-loop motor
#[derive(Debug, Clone, Default)]
pub struct SimMotor {
    name: &'static str,
    power: f64,
    fault: Option<String>,
}

impl SimMotor {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            power: 0.0,
            fault: None,
        }
    }

    pub fn inject_fault(&mut self, reason: impl Into<String>) {
        self.fault = Some(reason.into());
    }

    pub fn clear_fault(&mut self) {
        self.fault = None;
    }
}

impl PowerActuator for SimMotor {
    fn set_power(&mut self, power: f64) -> GantryResult<()> {
        // Cutting power always succeeds so a faulted motor can still be stopped
        if power != 0.0 {
            if let Some(reason) = &self.fault {
                return Err(GantryError::hardware(self.name, reason.clone()));
            }
        }
        self.power = power.clamp(-1.0, 1.0);
        Ok(())
    }

    fn power(&self) -> f64 {
        self.power
    }
}

/// Switch whose state is set by the test or the simulated world
#[derive(Debug, Clone, Default)]
pub struct SimSwitch {
    pressed: bool,
}

impl SimSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, pressed: bool) {
        self.pressed = pressed;
    }
}

impl BooleanSensor for SimSwitch {
    fn read(&self) -> bool {
        self.pressed
    }
}

/// Range sensor reporting a settable distance
#[derive(Debug, Clone)]
pub struct SimRangeSensor {
    distance: f64,
}

impl SimRangeSensor {
    pub fn new(distance: f64) -> Self {
        Self { distance }
    }

    pub fn set_distance(&mut self, distance: f64) {
        self.distance = distance;
    }
}

impl AnalogSensor for SimRangeSensor {
    fn read(&self) -> f64 {
        self.distance
    }
}

/// Game piece handling of the simulated intake
#[derive(Debug, Clone)]
struct PieceModel {
    roller: Arc<Mutex<SimMotor>>,
    range: Arc<Mutex<SimRangeSensor>>,
    pickup_periods: u32,
    release_periods: u32,
    empty_range: f64,
    held_range: f64,
    held: bool,
    progress: u32,
}

impl PieceModel {
    fn step(&mut self) {
        let power = self.roller.lock().power();
        let pulling = power > 0.0 && !self.held;
        let pushing = power < 0.0 && self.held;

        if pulling || pushing {
            self.progress += 1;
        } else {
            self.progress = 0;
        }

        if pulling && self.progress >= self.pickup_periods {
            self.held = true;
            self.progress = 0;
            log::debug!("sim: piece reached the grabber");
        } else if pushing && self.progress >= self.release_periods {
            self.held = false;
            self.progress = 0;
            log::debug!("sim: piece left the grabber");
        }

        let distance = if self.held {
            self.held_range
        } else {
            self.empty_range
        };
        self.range.lock().set_distance(distance);
    }
}

/// Steps every simulated device once per period
#[derive(Debug, Clone, Default)]
pub struct SimWorld {
    actuators: Vec<Arc<Mutex<SimPositionActuator>>>,
    pieces: Option<PieceModel>,
    steps: u64,
}

impl SimWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_actuator(mut self, actuator: Arc<Mutex<SimPositionActuator>>) -> Self {
        self.actuators.push(actuator);
        self
    }

    /// Let `roller` pull a piece in front of `range` and push it out again
    pub fn with_intake(
        mut self,
        roller: Arc<Mutex<SimMotor>>,
        range: Arc<Mutex<SimRangeSensor>>,
        config: &crate::config::SimConfig,
    ) -> Self {
        self.pieces = Some(PieceModel {
            roller,
            range,
            pickup_periods: config.pickup_periods.max(1),
            release_periods: config.release_periods.max(1),
            empty_range: config.empty_range,
            held_range: config.held_range,
            held: false,
            progress: 0,
        });
        self
    }

    pub fn step(&mut self) {
        for actuator in &self.actuators {
            actuator.lock().step();
        }
        if let Some(pieces) = self.pieces.as_mut() {
            pieces.step();
        }
        self.steps += 1;
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn holding_piece(&self) -> bool {
        self.pieces.as_ref().is_some_and(|p| p.held)
    }
}

/// Complete set of simulated devices for the reference robot
#[derive(Clone)]
pub struct SimRobot {
    pub arm: Arc<Mutex<SimPositionActuator>>,
    pub grabber: Arc<Mutex<SimPositionActuator>>,
    pub roller: Arc<Mutex<SimMotor>>,
    pub drive: Arc<Mutex<SimMotor>>,
    pub range: Arc<Mutex<SimRangeSensor>>,
    pub confirm: Arc<Mutex<SimSwitch>>,
    pub abort_button: Arc<Mutex<SimSwitch>>,
    config: GantryConfig,
}

impl SimRobot {
    /// Devices start at rest in the stowed pose
    pub fn new(config: &GantryConfig) -> Self {
        let arm = SimPositionActuator::new("arm_joint", config.arm.stow, config.arm.slew_per_period)
            .with_limits(-0.5, 2.0);
        let grabber = SimPositionActuator::new(
            "claw",
            config.grabber.closed,
            config.grabber.slew_per_period,
        )
        .with_limits(config.grabber.closed, config.grabber.open);

        Self {
            arm: Arc::new(Mutex::new(arm)),
            grabber: Arc::new(Mutex::new(grabber)),
            roller: Arc::new(Mutex::new(SimMotor::new("intake_roller"))),
            drive: Arc::new(Mutex::new(SimMotor::new("drive"))),
            range: Arc::new(Mutex::new(SimRangeSensor::new(config.sim.empty_range))),
            confirm: Arc::new(Mutex::new(SimSwitch::new())),
            abort_button: Arc::new(Mutex::new(SimSwitch::new())),
            config: config.clone(),
        }
    }

    /// Capability handles for the robot assembly
    pub fn hardware(&self) -> RobotHardware {
        RobotHardware {
            arm: self.arm.clone() as SharedPosition,
            grabber: self.grabber.clone() as SharedPosition,
            roller: self.roller.clone() as SharedPower,
            drive: self.drive.clone() as SharedPower,
            proximity: self.range.clone() as SharedAnalog,
            confirm: self.confirm.clone() as SharedSwitch,
        }
    }

    /// World stepping these devices
    pub fn world(&self) -> SimWorld {
        SimWorld::new()
            .with_actuator(self.arm.clone())
            .with_actuator(self.grabber.clone())
            .with_intake(self.roller.clone(), self.range.clone(), &self.config.sim)
    }

    pub fn abort_input(&self) -> SharedSwitch {
        self.abort_button.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_actuator_slews_toward_target() {
        let mut arm = SimPositionActuator::new("arm", 0.0, 0.25);
        arm.set_target(0.6).unwrap();
        arm.step();
        assert_relative_eq!(arm.position(), 0.25);
        arm.step();
        assert_relative_eq!(arm.position(), 0.5);
        arm.step();
        assert_relative_eq!(arm.position(), 0.6);
        assert!(arm.at_target(1e-9));
    }

    #[test]
    fn test_stopped_actuator_does_not_move() {
        let mut arm = SimPositionActuator::new("arm", 0.0, 0.1);
        arm.set_target(1.0).unwrap();
        arm.step();
        arm.stop().unwrap();
        arm.step();
        arm.step();
        assert_relative_eq!(arm.position(), 0.1);
        assert_relative_eq!(arm.target(), 0.1);
        assert!(!arm.is_holding());
    }

    #[test]
    fn test_limits_and_faults() {
        let mut claw = SimPositionActuator::new("claw", 0.0, 0.01).with_limits(0.0, 0.1);
        assert!(claw.set_target(0.2).is_err());
        claw.inject_fault("encoder unplugged");
        let err = claw.set_target(0.05).unwrap_err();
        assert!(err.to_string().contains("encoder unplugged"));
        claw.clear_fault();
        assert!(claw.set_target(0.05).is_ok());
    }

    #[test]
    fn test_faulted_motor_can_still_be_stopped() {
        let mut motor = SimMotor::new("roller");
        motor.set_power(0.5).unwrap();
        motor.inject_fault("overcurrent");
        assert!(motor.set_power(0.7).is_err());
        assert!(motor.set_power(0.0).is_ok());
        assert_relative_eq!(motor.power(), 0.0);
    }

    #[test]
    fn test_motor_power_is_clamped() {
        let mut motor = SimMotor::new("drive");
        motor.set_power(3.0).unwrap();
        assert_relative_eq!(motor.power(), 1.0);
    }

    #[test]
    fn test_intake_picks_up_and_releases_piece() {
        let config = GantryConfig::default();
        let robot = SimRobot::new(&config);
        let mut world = robot.world();

        robot.roller.lock().set_power(0.8).unwrap();
        for _ in 0..config.sim.pickup_periods {
            world.step();
        }
        assert!(world.holding_piece());
        assert_relative_eq!(robot.range.lock().read(), config.sim.held_range);

        robot.roller.lock().set_power(-0.5).unwrap();
        for _ in 0..config.sim.release_periods {
            world.step();
        }
        assert!(!world.holding_piece());
        assert_relative_eq!(robot.range.lock().read(), config.sim.empty_range);
    }
}
