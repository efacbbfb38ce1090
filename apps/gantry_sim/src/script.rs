//! Scripted operator sessions
//!
//! A script is a YAML list of steps, each applied right before the period
//! it names:
//!
//! ```yaml
//! name: manual_place
//! periods: 160
//! steps:
//!   - at: 1
//!     do: submit
//!     node: robot
//!     operation: { action: place, slot: left, level: mid, payload: cube, modifiers: { manual: true } }
//!   - at: 80
//!     do: press_confirm
//!   - at: 82
//!     do: release_confirm
//! ```

use anyhow::{Context, Result};
use gantry_core::{
    GamePiece, Level, Operation, Rejection, RejectionCause, ResourceTree, Slot, TaskTicket,
};
use gantry_library::SimRobot;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// One operator input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "do", rename_all = "snake_case")]
pub enum Step {
    Submit {
        at: u64,
        node: String,
        operation: Operation,
    },
    Abort {
        at: u64,
        node: String,
    },
    PressConfirm {
        at: u64,
    },
    ReleaseConfirm {
        at: u64,
    },
    PressAbort {
        at: u64,
    },
    ReleaseAbort {
        at: u64,
    },
}

impl Step {
    pub fn at(&self) -> u64 {
        match self {
            Step::Submit { at, .. }
            | Step::Abort { at, .. }
            | Step::PressConfirm { at }
            | Step::ReleaseConfirm { at }
            | Step::PressAbort { at }
            | Step::ReleaseAbort { at } => *at,
        }
    }

    fn submit(at: u64, node: &str, operation: Operation) -> Self {
        Step::Submit {
            at,
            node: node.to_string(),
            operation,
        }
    }
}

/// What applying a step did
#[derive(Debug, Clone, PartialEq)]
pub enum StepReport {
    Accepted(TaskTicket),
    Rejected(Rejection),
    Aborted(Option<&'static str>),
    Input(&'static str, bool),
}

impl StepReport {
    pub fn is_rejection(&self) -> bool {
        matches!(self, StepReport::Rejected(_))
    }
}

impl fmt::Display for StepReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepReport::Accepted(ticket) => {
                write!(f, "accepted as {}#{}", ticket.node, ticket.serial)
            }
            StepReport::Rejected(rejection) => write!(f, "{}", rejection),
            StepReport::Aborted(Some(task)) => write!(f, "aborted '{}'", task),
            StepReport::Aborted(None) => write!(f, "nothing to abort"),
            StepReport::Input(input, pressed) => write!(
                f,
                "{} {}",
                input,
                if *pressed { "pressed" } else { "released" }
            ),
        }
    }
}

/// Named operator session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Script {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Periods to run when the command line does not override it
    pub periods: u64,
    pub steps: Vec<Step>,
}

impl Script {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let mut script: Script =
            serde_yaml::from_str(yaml).context("failed to parse session script")?;
        script.steps.sort_by_key(Step::at);
        Ok(script)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read script {}", path.display()))?;
        Self::from_yaml(&content).with_context(|| format!("in script {}", path.display()))
    }

    /// Cursor over the steps in period order
    pub fn runner(&self) -> ScriptRunner {
        let mut steps = self.steps.clone();
        steps.sort_by_key(Step::at);
        ScriptRunner { steps, next: 0 }
    }

    /// Pick a cube off the floor
    pub fn ground_collect() -> Self {
        Self {
            name: "ground_collect".to_string(),
            description: "pick a cube off the floor and stow it".to_string(),
            periods: 150,
            steps: vec![Step::submit(
                1,
                "robot",
                Operation::collect(Slot::Left, GamePiece::Cube).on_ground(),
            )],
        }
    }

    /// Collect at the station, then score it on the high row
    pub fn collect_and_place() -> Self {
        Self {
            name: "collect_and_place".to_string(),
            description: "sensor-triggered collect followed by an automatic place".to_string(),
            periods: 320,
            steps: vec![
                Step::submit(1, "robot", Operation::collect(Slot::Right, GamePiece::Cone)),
                Step::submit(
                    140,
                    "robot",
                    Operation::place(Slot::Right, Level::High, GamePiece::Cone),
                ),
            ],
        }
    }

    /// Operator confirms the release of a manual place
    pub fn manual_place() -> Self {
        Self {
            name: "manual_place".to_string(),
            description: "place that waits for the operator button".to_string(),
            periods: 160,
            steps: vec![
                Step::submit(
                    1,
                    "robot",
                    Operation::place(Slot::Left, Level::Mid, GamePiece::Cube).manual(),
                ),
                Step::PressConfirm { at: 80 },
                Step::ReleaseConfirm { at: 82 },
            ],
        }
    }

    /// Abort button cancels a collect halfway, then the arm is stowed
    pub fn abort_button() -> Self {
        Self {
            name: "abort_button".to_string(),
            description: "abort a ground collect with the operator button".to_string(),
            periods: 120,
            steps: vec![
                Step::submit(
                    1,
                    "robot",
                    Operation::collect(Slot::Left, GamePiece::Cube).on_ground(),
                ),
                Step::PressAbort { at: 20 },
                Step::ReleaseAbort { at: 22 },
                Step::submit(30, "arm", Operation::stow()),
            ],
        }
    }

    /// Requests the robot must refuse
    pub fn rejections() -> Self {
        Self {
            name: "rejections".to_string(),
            description: "invalid, busy and unknown-node submissions".to_string(),
            periods: 100,
            steps: vec![
                Step::submit(
                    1,
                    "robot",
                    Operation::place(Slot::Left, Level::Low, GamePiece::Cube).on_ground(),
                ),
                Step::submit(
                    2,
                    "robot",
                    Operation::collect(Slot::Left, GamePiece::Cube).on_ground(),
                ),
                Step::submit(3, "robot", Operation::stow()),
                Step::submit(4, "robot", Operation::collect(Slot::Middle, GamePiece::Cube)),
                Step::submit(5, "drivebase", Operation::stow()),
                Step::submit(6, "turret", Operation::stow()),
            ],
        }
    }
}

/// Hands out the steps due before each period
#[derive(Debug, Clone)]
pub struct ScriptRunner {
    steps: Vec<Step>,
    next: usize,
}

impl ScriptRunner {
    /// Steps to apply before `period`, including any skipped earlier ones
    pub fn due(&mut self, period: u64) -> &[Step] {
        let start = self.next;
        while self.next < self.steps.len() && self.steps[self.next].at() <= period {
            self.next += 1;
        }
        &self.steps[start..self.next]
    }

    pub fn is_finished(&self) -> bool {
        self.next >= self.steps.len()
    }
}

/// Apply one step to the robot
pub fn apply(step: &Step, tree: &mut ResourceTree, sim: &SimRobot) -> StepReport {
    match step {
        Step::Submit {
            node, operation, ..
        } => match tree.submit_to(node, *operation) {
            Ok(ticket) => StepReport::Accepted(ticket),
            Err(rejection) => StepReport::Rejected(rejection),
        },
        Step::Abort { node, .. } => match tree.find(node) {
            Some(id) => StepReport::Aborted(tree.abort_active(id)),
            None => StepReport::Rejected(Rejection::new(node.as_str(), RejectionCause::UnknownNode)),
        },
        Step::PressConfirm { .. } => {
            sim.confirm.lock().set(true);
            StepReport::Input("confirm", true)
        }
        Step::ReleaseConfirm { .. } => {
            sim.confirm.lock().set(false);
            StepReport::Input("confirm", false)
        }
        Step::PressAbort { .. } => {
            sim.abort_button.lock().set(true);
            StepReport::Input("abort", true)
        }
        Step::ReleaseAbort { .. } => {
            sim.abort_button.lock().set(false);
            StepReport::Input("abort", false)
        }
    }
}
