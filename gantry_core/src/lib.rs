//! # GANTRY Core
//!
//! The control core of the GANTRY robot runtime.
//!
//! GANTRY arbitrates a robot's physical resources (arm, grabber, intake,
//! drivebase) among competing high-level requests and runs every accepted
//! request as a resumable state machine until it completes or is aborted.
//! This crate provides the fundamental building blocks:
//!
//! - **Operations**: Immutable high-level requests and the rules that gate them
//! - **Tasks**: Start/tick/complete/abort state machines bound to one resource
//! - **Composite tasks**: Phase machines that choreograph tasks on other resources
//! - **Resource tree**: Nodes that own at most one active task each
//! - **Scheduling**: The fixed-period run loop that ticks the tree
//! - **Telemetry**: Structured events passed explicitly to a pluggable sink
//!
//! ## Quick Start
//!
//! ```rust
//! use gantry_core::{GantryResult, Task, TaskContext, Telemetry, TreeBuilder, NodeSpec, Scheduler};
//!
//! struct Blink { ticks: u32 }
//!
//! impl Task for Blink {
//!     fn name(&self) -> &'static str { "blink" }
//!     fn start(&mut self, _ctx: &mut TaskContext<'_>) -> GantryResult<()> { Ok(()) }
//!     fn tick(&mut self, _ctx: &mut TaskContext<'_>) -> GantryResult<()> {
//!         self.ticks += 1;
//!         Ok(())
//!     }
//!     fn is_complete(&self) -> bool { self.ticks >= 3 }
//!     fn abort(&mut self, _ctx: &mut TaskContext<'_>) -> GantryResult<()> { Ok(()) }
//! }
//!
//! let mut builder = TreeBuilder::new();
//! let led = builder.add_root(NodeSpec::new("led"));
//! let tree = builder.build(Telemetry::disabled());
//!
//! let mut scheduler = Scheduler::new(tree);
//! scheduler.tree_mut().submit_task(led, Box::new(Blink { ticks: 0 })).unwrap();
//! scheduler.run_ticks(3);
//! assert!(scheduler.tree().is_idle(led));
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod hardware;
pub mod scheduling;
pub mod telemetry;
pub mod validation;

// Re-export commonly used types for easy access
pub use crate::core::{
    Action, Advance, BelowThreshold, CompositeTask, GamePiece, Level, Modifiers, NodeId,
    NodeMetrics, NodeSpec, Operation, Phase, PhaseLabel, Quiesce, ResourceNode, ResourceTree,
    SensorTrigger, Slot, Task, TaskContext, TaskFactory, TaskOutcome, TaskRunner, TaskState,
    TaskSummary, TaskTicket, TicketStatus, TreeBuilder, Trigger,
};
pub use config::SchedulerConfig;
pub use error::{GantryError, GantryResult, Rejection, RejectionCause};
pub use scheduling::{AbortInput, Scheduler, SchedulerStats};
pub use telemetry::{Telemetry, TelemetryEvent, TelemetrySink};
pub use validation::{DomainConstraints, OperationRule, RuleSet, RuleViolation};
