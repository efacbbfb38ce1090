//! Hardware capability interfaces
//!
//! Tasks command actuators and read sensors only through these narrow
//! contracts. Vendor drivers (or the simulated devices in `gantry_library`)
//! implement them; the core never sees a concrete device type.
//!
//! Every call must return within the current period: implementations either
//! talk to non-blocking hardware or enforce their own bounded retry.

use crate::error::GantryResult;
use parking_lot::Mutex;
use std::sync::Arc;

/// Closed-loop positional actuator (arm joint, claw)
pub trait PositionActuator: Send {
    fn set_target(&mut self, target: f64) -> GantryResult<()>;
    fn target(&self) -> f64;
    fn position(&self) -> f64;
    /// Drop the active command and leave the mechanism quiescent
    fn stop(&mut self) -> GantryResult<()>;
}

/// Open-loop power output (roller, drive motor)
pub trait PowerActuator: Send {
    /// Power in the range -1.0..=1.0
    fn set_power(&mut self, power: f64) -> GantryResult<()>;
    fn power(&self) -> f64;
}

/// Digital input (limit switch, beam break, operator button)
pub trait BooleanSensor: Send {
    fn read(&self) -> bool;
}

/// Analog input (proximity/range sensor)
pub trait AnalogSensor: Send {
    fn read(&self) -> f64;
}

pub type SharedPosition = Arc<Mutex<dyn PositionActuator>>;
pub type SharedPower = Arc<Mutex<dyn PowerActuator>>;
pub type SharedSwitch = Arc<Mutex<dyn BooleanSensor>>;
pub type SharedAnalog = Arc<Mutex<dyn AnalogSensor>>;

/// Wrap a device so several tasks of the same node can hold it
pub fn shared<T>(device: T) -> Arc<Mutex<T>> {
    Arc::new(Mutex::new(device))
}
