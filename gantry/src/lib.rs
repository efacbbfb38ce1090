//! # GANTRY
//!
//! Control core for real-time, multi-actuator robots: a fixed-period
//! cooperative scheduler that arbitrates physical resources between
//! competing operations and runs each accepted operation as a resumable
//! task until it completes or is aborted.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gantry::prelude::*;
//!
//! fn main() -> AnyResult<()> {
//!     let config = GantryConfig::default();
//!     let sim = SimRobot::new(&config);
//!     let robot = build_robot(&config, sim.hardware(), Telemetry::logging())?;
//!     let (mut scheduler, nodes, _) = robot.into_scheduler(&config);
//!
//!     let mut world = sim.world();
//!     scheduler.add_period_hook(move |_| world.step());
//!
//!     scheduler
//!         .tree_mut()
//!         .submit(nodes.robot, Operation::collect(Slot::Left, GamePiece::Cube).on_ground())?;
//!     scheduler.run_for(Duration::from_secs(2));
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **At most one active task per resource**, enforced by the node
//! - **Cascading cancellation** through composite tasks spanning resources
//! - **Validated operations**: rejected before any task is built
//! - **Structured telemetry** passed explicitly, no global state

// Re-export core components
pub use gantry_core::{self, *};

// Re-export standard library with alias
pub use gantry_library as library;

/// The GANTRY prelude - everything you need to get started
pub mod prelude {
    // Tasks and the resource tree
    pub use gantry_core::core::{
        Advance, CompositeTask, NodeId, NodeSpec, Phase, PhaseLabel, ResourceTree, Task,
        TaskContext, TaskTicket, TicketStatus, TreeBuilder,
    };

    // Operations and validation
    pub use gantry_core::core::{Action, GamePiece, Level, Modifiers, Operation, Slot};
    pub use gantry_core::validation::{DomainConstraints, RuleSet};

    // Scheduling
    pub use gantry_core::scheduling::Scheduler;

    // Telemetry
    pub use gantry_core::telemetry::{Telemetry, TelemetryEvent};

    // Error types
    pub use gantry_core::error::{GantryError, GantryResult, Rejection, RejectionCause};
    pub type Result<T> = GantryResult<T>;

    // Reference robot
    pub use gantry_library::{build_robot, GantryConfig, RobotNodes, SimRobot};

    // Common std types
    pub use std::sync::Arc;
    pub use std::time::{Duration, Instant};

    // Common traits
    pub use serde::{Deserialize, Serialize};

    // Re-export anyhow for error handling
    pub use anyhow::{anyhow, bail, ensure, Context, Result as AnyResult};
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get GANTRY version
pub fn version() -> &'static str {
    VERSION
}
