//! Assembly of the reference robot
//!
//! ```text
//! robot            manipulator rules, full dispatch table
//! ├── arm          Stow only
//! ├── grabber      delegated tasks only
//! ├── intake       delegated tasks only
//! └── drivebase    delegated tasks only
//! ```

use crate::config::GantryConfig;
use crate::dispatch::{ArmStowDispatcher, ManipulatorDispatcher};
use crate::hardware::{SharedAnalog, SharedPosition, SharedPower, SharedSwitch};
use crate::tasks::{Manipulator, ManipulatorHardware, ManipulatorNodes};
use gantry_core::validation::AllowedActions;
use gantry_core::{
    Action, GantryResult, NodeId, NodeSpec, ResourceTree, RuleSet, Scheduler, Telemetry,
    TreeBuilder,
};
use std::sync::Arc;

/// Capability handles of the robot's devices
#[derive(Clone)]
pub struct RobotHardware {
    pub arm: SharedPosition,
    pub grabber: SharedPosition,
    pub roller: SharedPower,
    pub drive: SharedPower,
    pub proximity: SharedAnalog,
    pub confirm: SharedSwitch,
}

/// Ids of the robot's resource nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RobotNodes {
    pub robot: NodeId,
    pub arm: NodeId,
    pub grabber: NodeId,
    pub intake: NodeId,
    pub drivebase: NodeId,
}

/// A built robot: its tree plus the ids needed to address it
pub struct Robot {
    pub tree: ResourceTree,
    pub nodes: RobotNodes,
    pub hardware: RobotHardware,
}

impl Robot {
    /// Wrap the tree in a scheduler configured from `config`
    pub fn into_scheduler(self, config: &GantryConfig) -> (Scheduler, RobotNodes, RobotHardware) {
        let scheduler = Scheduler::new(self.tree).with_config(&config.scheduler);
        (scheduler, self.nodes, self.hardware)
    }
}

/// Build the resource tree of the reference robot
pub fn build_robot(
    config: &GantryConfig,
    hardware: RobotHardware,
    telemetry: Telemetry,
) -> GantryResult<Robot> {
    config.validate()?;

    let mut builder = TreeBuilder::new();
    let robot = builder.add_root(
        NodeSpec::new("robot").with_rules(RuleSet::manipulator(&config.constraints)),
    );
    let arm = builder.add_child(
        robot,
        NodeSpec::new("arm").with_rules(RuleSet::new().with(AllowedActions::new([Action::Stow]))),
    )?;
    let grabber = builder.add_child(robot, NodeSpec::new("grabber"))?;
    let intake = builder.add_child(robot, NodeSpec::new("intake"))?;
    let drivebase = builder.add_child(robot, NodeSpec::new("drivebase"))?;

    let manipulator = Manipulator {
        nodes: ManipulatorNodes {
            arm,
            grabber,
            intake,
        },
        hardware: ManipulatorHardware {
            arm: hardware.arm.clone(),
            grabber: hardware.grabber.clone(),
            roller: hardware.roller.clone(),
            proximity: hardware.proximity.clone(),
            confirm: hardware.confirm.clone(),
        },
        config: Arc::new(config.clone()),
    };
    builder.set_factory(robot, ManipulatorDispatcher::new(manipulator.clone()))?;
    builder.set_factory(arm, ArmStowDispatcher::new(manipulator))?;

    let tree = builder.try_build(telemetry)?;
    log::info!("Built robot with {} resource nodes", tree.len());

    Ok(Robot {
        tree,
        nodes: RobotNodes {
            robot,
            arm,
            grabber,
            intake,
            drivebase,
        },
        hardware,
    })
}
