//! # GANTRY Standard Library
//!
//! Everything needed to run the GANTRY core on the reference manipulator.
//!
//! ## Structure
//!
//! ```text
//! gantry_library/
//! ── hardware/       # Capability traits and simulated devices
//! ── tasks/          # Leaf tasks and multi-node choreographies
//! ── dispatch.rs     # Operation -> task variant table
//! ── config.rs       # YAML robot configuration
//! ── robot.rs        # Resource tree assembly
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use gantry_library::{build_robot, GantryConfig, SimRobot};
//! use gantry_core::{GamePiece, Operation, Slot, Telemetry};
//!
//! let config = GantryConfig::default();
//! let sim = SimRobot::new(&config);
//! let robot = build_robot(&config, sim.hardware(), Telemetry::disabled()).unwrap();
//! let (mut scheduler, nodes, _) = robot.into_scheduler(&config);
//!
//! let mut world = sim.world();
//! scheduler.add_period_hook(move |_| world.step());
//!
//! scheduler
//!     .tree_mut()
//!     .submit(nodes.robot, Operation::collect(Slot::Left, GamePiece::Cube).on_ground())
//!     .unwrap();
//! scheduler.run_ticks(200);
//! assert!(scheduler.tree().is_idle(nodes.robot));
//! ```

pub mod config;
pub mod dispatch;
pub mod hardware;
pub mod robot;
pub mod tasks;

pub use config::GantryConfig;
pub use dispatch::{select_variant, ManipulatorDispatcher, TaskVariant};
pub use hardware::{SimMotor, SimPositionActuator, SimRangeSensor, SimRobot, SimSwitch, SimWorld};
pub use robot::{build_robot, Robot, RobotHardware, RobotNodes};
pub use tasks::{MoveToPosition, RunRoller, TimedDrive};
