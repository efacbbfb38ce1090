//! Tasks for the reference manipulator

pub mod choreography;
pub mod leaf;

pub use choreography::{
    auto_collect, auto_place, ground_collect, manual_collect, manual_place, shoot, stow,
    CollectPhase, Manipulator, ManipulatorHardware, ManipulatorNodes, PlacePhase, ShootPhase,
    StowPhase,
};
pub use leaf::{MoveToPosition, RunRoller, TimedDrive};
