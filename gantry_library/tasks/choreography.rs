//! Multi-node choreographies of the manipulator
//!
//! Each builder takes the [`Manipulator`] description and returns a
//! fully-built [`CompositeTask`]: every leaf task it will ever delegate is
//! constructed here, so a missing setpoint or bad target is reported before
//! the composite reaches a node.

use super::leaf::{MoveToPosition, RunRoller};
use crate::config::GantryConfig;
use crate::hardware::{SharedAnalog, SharedPosition, SharedPower, SharedSwitch};
use gantry_core::{
    Advance, BelowThreshold, CompositeTask, GantryResult, Level, NodeId, Phase, PhaseLabel,
    SensorTrigger,
};
use std::sync::Arc;

/// Node ids the choreographies delegate to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManipulatorNodes {
    pub arm: NodeId,
    pub grabber: NodeId,
    pub intake: NodeId,
}

/// Devices the choreographies command
#[derive(Clone)]
pub struct ManipulatorHardware {
    pub arm: SharedPosition,
    pub grabber: SharedPosition,
    pub roller: SharedPower,
    pub proximity: SharedAnalog,
    pub confirm: SharedSwitch,
}

/// Everything needed to build manipulator tasks
#[derive(Clone)]
pub struct Manipulator {
    pub nodes: ManipulatorNodes,
    pub hardware: ManipulatorHardware,
    pub config: Arc<GantryConfig>,
}

impl Manipulator {
    pub fn arm_to(&self, name: &'static str, target: f64) -> Box<MoveToPosition> {
        Box::new(MoveToPosition::new(
            name,
            self.hardware.arm.clone(),
            target,
            self.config.arm.tolerance,
        ))
    }

    fn grabber_to(&self, name: &'static str, target: f64) -> Box<MoveToPosition> {
        Box::new(MoveToPosition::new(
            name,
            self.hardware.grabber.clone(),
            target,
            self.config.grabber.tolerance,
        ))
    }

    fn open_grabber(&self) -> Box<MoveToPosition> {
        self.grabber_to("open_grabber", self.config.grabber.open)
    }

    fn close_grabber(&self) -> Box<MoveToPosition> {
        self.grabber_to("close_grabber", self.config.grabber.closed)
    }

    fn roller(&self, name: &'static str, power: f64) -> Box<RunRoller> {
        Box::new(RunRoller::new(name, self.hardware.roller.clone(), power))
    }

    fn piece_detected(&self) -> Advance {
        Advance::trigger(BelowThreshold::new(
            self.hardware.proximity.clone(),
            self.config.grabber.proximity_threshold,
        ))
    }

    /// Composite that brings the arm, grabber and roller to rest on abort
    fn composite<P: PhaseLabel>(&self, name: &'static str, done: P) -> CompositeTask<P> {
        let (n, hw) = (self.nodes, &self.hardware);
        CompositeTask::new(name, done)
            .owns(n.arm, hw.arm.clone())
            .owns(n.grabber, hw.grabber.clone())
            .owns(n.intake, hw.roller.clone())
    }

    fn operator_confirmed(&self) -> Advance {
        Advance::trigger(SensorTrigger::new(self.hardware.confirm.clone()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectPhase {
    Deploying,
    WaitingForSensor,
    WaitingForOperator,
    Retracting,
    Done,
}

impl PhaseLabel for CollectPhase {
    fn label(self) -> &'static str {
        match self {
            CollectPhase::Deploying => "Deploying",
            CollectPhase::WaitingForSensor => "WaitingForSensor",
            CollectPhase::WaitingForOperator => "WaitingForOperator",
            CollectPhase::Retracting => "Retracting",
            CollectPhase::Done => "Done",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacePhase {
    Extending,
    WaitingForOperator,
    Releasing,
    Dwelling,
    Retracting,
    Done,
}

impl PhaseLabel for PlacePhase {
    fn label(self) -> &'static str {
        match self {
            PlacePhase::Extending => "Extending",
            PlacePhase::WaitingForOperator => "WaitingForOperator",
            PlacePhase::Releasing => "Releasing",
            PlacePhase::Dwelling => "Dwelling",
            PlacePhase::Retracting => "Retracting",
            PlacePhase::Done => "Done",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShootPhase {
    Aiming,
    Firing,
    Retracting,
    Done,
}

impl PhaseLabel for ShootPhase {
    fn label(self) -> &'static str {
        match self {
            ShootPhase::Aiming => "Aiming",
            ShootPhase::Firing => "Firing",
            ShootPhase::Retracting => "Retracting",
            ShootPhase::Done => "Done",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StowPhase {
    Stowing,
    Done,
}

impl PhaseLabel for StowPhase {
    fn label(self) -> &'static str {
        match self {
            StowPhase::Stowing => "Stowing",
            StowPhase::Done => "Done",
        }
    }
}

/// How a collect hands over from deploying to retracting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Handoff {
    Sensor,
    Operator,
}

fn collect(
    m: &Manipulator,
    name: &'static str,
    arm_target: f64,
    handoff: Handoff,
) -> CompositeTask<CollectPhase> {
    let n = m.nodes;
    let intake = m.config.intake.intake_power;

    let wait = match handoff {
        Handoff::Sensor => Phase::new(CollectPhase::WaitingForSensor, m.piece_detected()),
        Handoff::Operator => Phase::new(CollectPhase::WaitingForOperator, m.operator_confirmed()),
    };

    m.composite(name, CollectPhase::Done)
        .phase(
            Phase::new(CollectPhase::Deploying, Advance::AllComplete)
                .await_task(n.arm, m.arm_to("arm_to_pickup", arm_target))
                .await_task(n.grabber, m.open_grabber())
                .background(n.intake, m.roller("intake_roller", intake)),
        )
        .phase(wait)
        .phase(
            Phase::new(CollectPhase::Retracting, Advance::AllComplete)
                .stop(n.intake)
                .await_task(n.grabber, m.close_grabber())
                .await_task(n.arm, m.arm_to("arm_to_stow", m.config.arm.stow)),
        )
}

/// Pick a piece off the floor, handing over when the grabber sees it
pub fn ground_collect(m: &Manipulator) -> CompositeTask<CollectPhase> {
    collect(m, "ground_collect", m.config.arm.ground, Handoff::Sensor)
}

/// Pick a piece from the loading station, handing over on the sensor
pub fn auto_collect(m: &Manipulator) -> CompositeTask<CollectPhase> {
    collect(m, "auto_collect", m.config.arm.station, Handoff::Sensor)
}

/// Pick a piece from the loading station, handing over on operator confirm
pub fn manual_collect(m: &Manipulator) -> CompositeTask<CollectPhase> {
    collect(m, "manual_collect", m.config.arm.station, Handoff::Operator)
}

fn place(
    m: &Manipulator,
    name: &'static str,
    level: Level,
    handoff: Option<Handoff>,
) -> GantryResult<CompositeTask<PlacePhase>> {
    let n = m.nodes;
    let setpoint = m.config.arm.setpoint(level)?;

    let mut task = m.composite(name, PlacePhase::Done).phase(
        Phase::new(PlacePhase::Extending, Advance::AllComplete)
            .await_task(n.arm, m.arm_to("arm_to_level", setpoint)),
    );
    if handoff == Some(Handoff::Operator) {
        task = task.phase(Phase::new(
            PlacePhase::WaitingForOperator,
            m.operator_confirmed(),
        ));
    }
    Ok(task
        .phase(
            Phase::new(PlacePhase::Releasing, Advance::AllComplete)
                .await_task(n.grabber, m.open_grabber())
                .background(n.intake, m.roller("eject_roller", m.config.intake.eject_power)),
        )
        .phase(Phase::new(
            PlacePhase::Dwelling,
            Advance::Dwell(m.config.timing.release_dwell_periods),
        ))
        .phase(
            Phase::new(PlacePhase::Retracting, Advance::AllComplete)
                .stop(n.intake)
                .await_task(n.grabber, m.close_grabber())
                .await_task(n.arm, m.arm_to("arm_to_stow", m.config.arm.stow)),
        ))
}

/// Place at `level` as soon as the arm is there
pub fn auto_place(m: &Manipulator, level: Level) -> GantryResult<CompositeTask<PlacePhase>> {
    place(m, "auto_place", level, None)
}

/// Place at `level` after the operator confirms alignment
pub fn manual_place(m: &Manipulator, level: Level) -> GantryResult<CompositeTask<PlacePhase>> {
    place(m, "manual_place", level, Some(Handoff::Operator))
}

/// Launch the held piece from the shooting angle
pub fn shoot(m: &Manipulator) -> CompositeTask<ShootPhase> {
    let n = m.nodes;
    m.composite("shoot", ShootPhase::Done)
        .phase(
            Phase::new(ShootPhase::Aiming, Advance::AllComplete)
                .await_task(n.arm, m.arm_to("arm_to_shoot", m.config.arm.shoot)),
        )
        .phase(
            Phase::new(
                ShootPhase::Firing,
                Advance::Dwell(m.config.timing.shoot_dwell_periods),
            )
            .background(n.intake, m.roller("shoot_roller", m.config.intake.shoot_power)),
        )
        .phase(
            Phase::new(ShootPhase::Retracting, Advance::AllComplete)
                .stop(n.intake)
                .await_task(n.arm, m.arm_to("arm_to_stow", m.config.arm.stow)),
        )
}

/// Fold the manipulator into its travel pose
pub fn stow(m: &Manipulator) -> CompositeTask<StowPhase> {
    let n = m.nodes;
    m.composite("stow", StowPhase::Done).phase(
        Phase::new(StowPhase::Stowing, Advance::AllComplete)
            .await_task(n.grabber, m.close_grabber())
            .await_task(n.arm, m.arm_to("arm_to_stow", m.config.arm.stow)),
    )
}
