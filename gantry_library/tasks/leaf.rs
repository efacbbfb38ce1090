use crate::hardware::{SharedPosition, SharedPower};
use gantry_core::{GantryResult, Task, TaskContext};

/// Drive a position actuator to a setpoint and finish once it is within
/// tolerance
pub struct MoveToPosition {
    name: &'static str,
    actuator: SharedPosition,
    target: f64,
    tolerance: f64,
    arrived: bool,
}

impl MoveToPosition {
    pub fn new(name: &'static str, actuator: SharedPosition, target: f64, tolerance: f64) -> Self {
        Self {
            name,
            actuator,
            target,
            tolerance: tolerance.abs(),
            arrived: false,
        }
    }

    pub fn target(&self) -> f64 {
        self.target
    }

    fn check_arrival(&mut self) {
        let position = self.actuator.lock().position();
        self.arrived = (position - self.target).abs() <= self.tolerance;
    }
}

impl Task for MoveToPosition {
    fn name(&self) -> &'static str {
        self.name
    }

    fn start(&mut self, _ctx: &mut TaskContext<'_>) -> GantryResult<()> {
        self.actuator.lock().set_target(self.target)?;
        self.check_arrival();
        Ok(())
    }

    fn tick(&mut self, _ctx: &mut TaskContext<'_>) -> GantryResult<()> {
        self.check_arrival();
        Ok(())
    }

    fn is_complete(&self) -> bool {
        self.arrived
    }

    fn abort(&mut self, _ctx: &mut TaskContext<'_>) -> GantryResult<()> {
        self.actuator.lock().stop()
    }
}

/// Spin a roller until aborted. Never completes on its own.
pub struct RunRoller {
    name: &'static str,
    motor: SharedPower,
    power: f64,
}

impl RunRoller {
    pub fn new(name: &'static str, motor: SharedPower, power: f64) -> Self {
        Self { name, motor, power }
    }
}

impl Task for RunRoller {
    fn name(&self) -> &'static str {
        self.name
    }

    fn start(&mut self, _ctx: &mut TaskContext<'_>) -> GantryResult<()> {
        self.motor.lock().set_power(self.power)
    }

    fn tick(&mut self, _ctx: &mut TaskContext<'_>) -> GantryResult<()> {
        Ok(())
    }

    fn is_complete(&self) -> bool {
        false
    }

    fn abort(&mut self, _ctx: &mut TaskContext<'_>) -> GantryResult<()> {
        self.motor.lock().set_power(0.0)
    }
}

/// Apply power for a fixed number of periods, then cut it
pub struct TimedDrive {
    name: &'static str,
    motor: SharedPower,
    power: f64,
    remaining: u32,
}

impl TimedDrive {
    pub fn new(name: &'static str, motor: SharedPower, power: f64, periods: u32) -> Self {
        Self {
            name,
            motor,
            power,
            remaining: periods,
        }
    }
}

impl Task for TimedDrive {
    fn name(&self) -> &'static str {
        self.name
    }

    fn start(&mut self, _ctx: &mut TaskContext<'_>) -> GantryResult<()> {
        if self.remaining > 0 {
            self.motor.lock().set_power(self.power)?;
        }
        Ok(())
    }

    fn tick(&mut self, _ctx: &mut TaskContext<'_>) -> GantryResult<()> {
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            self.motor.lock().set_power(0.0)?;
        }
        Ok(())
    }

    fn is_complete(&self) -> bool {
        self.remaining == 0
    }

    fn abort(&mut self, _ctx: &mut TaskContext<'_>) -> GantryResult<()> {
        self.motor.lock().set_power(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::{shared, PositionActuator, PowerActuator, SimMotor, SimPositionActuator};
    use approx::assert_relative_eq;
    use gantry_core::{NodeSpec, Telemetry, TreeBuilder};

    #[test]
    fn test_move_completes_within_tolerance() {
        let arm = shared(SimPositionActuator::new("arm", 0.0, 0.3));
        let mut builder = TreeBuilder::new();
        let node = builder.add_root(NodeSpec::new("arm"));
        let mut tree = builder.build(Telemetry::disabled());

        tree.submit_task(node, Box::new(MoveToPosition::new("move_arm", arm.clone(), 1.0, 0.05)))
            .unwrap();
        arm.lock().step();
        tree.tick();
        assert!(!tree.is_idle(node));
        arm.lock().step();
        arm.lock().step();
        tree.tick();
        assert!(!tree.is_idle(node));
        arm.lock().step();
        tree.tick();
        assert!(tree.is_idle(node));
        assert_relative_eq!(arm.lock().position(), 1.0);
    }

    #[test]
    fn test_move_already_there_completes_at_start() {
        let arm = shared(SimPositionActuator::new("arm", 0.5, 0.1));
        let mut builder = TreeBuilder::new();
        let node = builder.add_root(NodeSpec::new("arm"));
        let mut tree = builder.build(Telemetry::disabled());

        tree.submit_task(node, Box::new(MoveToPosition::new("move_arm", arm, 0.5, 0.01)))
            .unwrap();
        assert!(tree.is_idle(node));
    }

    #[test]
    fn test_roller_abort_cuts_power() {
        let roller = shared(SimMotor::new("roller"));
        let mut builder = TreeBuilder::new();
        let node = builder.add_root(NodeSpec::new("intake"));
        let mut tree = builder.build(Telemetry::disabled());

        tree.submit_task(node, Box::new(RunRoller::new("run_roller", roller.clone(), 0.8)))
            .unwrap();
        for _ in 0..50 {
            tree.tick();
        }
        assert!(!tree.is_idle(node));
        assert_relative_eq!(roller.lock().power(), 0.8);

        tree.abort_active(node);
        assert_relative_eq!(roller.lock().power(), 0.0);
    }

    #[test]
    fn test_timed_drive_stops_after_periods() {
        let drive = shared(SimMotor::new("drive"));
        let mut builder = TreeBuilder::new();
        let node = builder.add_root(NodeSpec::new("drivebase"));
        let mut tree = builder.build(Telemetry::disabled());

        tree.submit_task(node, Box::new(TimedDrive::new("drive_forward", drive.clone(), 0.4, 3)))
            .unwrap();
        tree.tick();
        tree.tick();
        assert_relative_eq!(drive.lock().power(), 0.4);
        tree.tick();
        assert!(tree.is_idle(node));
        assert_relative_eq!(drive.lock().power(), 0.0);
    }
}
