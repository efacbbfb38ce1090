//! Tasks, resource nodes and the tree that owns them

pub mod composite;
pub mod context;
pub mod node;
pub mod operation;
pub mod task;
pub mod tree;

pub use composite::{
    Advance, BelowThreshold, CompositeTask, Phase, PhaseLabel, Quiesce, SensorTrigger, Trigger,
};
pub use context::TaskContext;
pub use node::{
    NodeId, NodeMetrics, NodeSpec, ResourceNode, TaskFactory, TaskOutcome, TaskSummary,
    TaskTicket, TicketStatus, OUTCOME_HISTORY,
};
pub use operation::{Action, GamePiece, Level, Modifiers, Operation, Slot};
pub use task::{Task, TaskRunner, TaskState};
pub use tree::{ResourceTree, TreeBuilder};
