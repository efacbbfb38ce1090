//! Hardware capabilities and their simulated implementations

pub mod sim;

pub use gantry_core::hardware::{
    shared, AnalogSensor, BooleanSensor, PositionActuator, PowerActuator, SharedAnalog,
    SharedPosition, SharedPower, SharedSwitch,
};
pub use sim::{SimMotor, SimPositionActuator, SimRangeSensor, SimRobot, SimSwitch, SimWorld};
