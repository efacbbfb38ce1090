use super::operation::Operation;
use super::task::{Task, TaskRunner, TaskState};
use crate::error::GantryResult;
use crate::validation::RuleSet;
use std::collections::VecDeque;
use std::fmt;

/// Number of finished tasks a node remembers for ticket lookups
pub const OUTCOME_HISTORY: usize = 16;

/// Stable index of a node inside its [`ResourceTree`](super::ResourceTree)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Handle to one task installed on one node.
///
/// Serials are per node and never reused, so a ticket keeps identifying the
/// same task after it finished and the node moved on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskTicket {
    pub node: NodeId,
    pub serial: u64,
}

/// How a task left its node
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Completed,
    Aborted,
    Failed(String),
}

/// Answer to a ticket lookup
#[derive(Debug, Clone, PartialEq)]
pub enum TicketStatus {
    /// Still the node's active task
    Running,
    /// Finished with the recorded outcome
    Finished(TaskOutcome),
    /// Unknown to the node (never issued, or pushed out of its history)
    Expired,
}

/// Introspection snapshot of a node's active task
#[derive(Debug, Clone, PartialEq)]
pub struct TaskSummary {
    pub name: &'static str,
    pub serial: u64,
    pub phase: Option<&'static str>,
    pub state: TaskState,
    pub ticks: u64,
}

/// Builds the concrete task for an accepted operation
pub trait TaskFactory: Send {
    fn build(&self, operation: &Operation) -> GantryResult<Box<dyn Task>>;
}

impl<F> TaskFactory for F
where
    F: Fn(&Operation) -> GantryResult<Box<dyn Task>> + Send,
{
    fn build(&self, operation: &Operation) -> GantryResult<Box<dyn Task>> {
        self(operation)
    }
}

/// Declaration of a node, consumed by [`TreeBuilder`](super::TreeBuilder)
pub struct NodeSpec {
    pub(crate) name: &'static str,
    pub(crate) rules: RuleSet,
    pub(crate) factory: Option<Box<dyn TaskFactory>>,
}

impl NodeSpec {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            rules: RuleSet::new(),
            factory: None,
        }
    }

    /// Validator rules checked before any task is built for this node
    pub fn with_rules(mut self, rules: RuleSet) -> Self {
        self.rules = rules;
        self
    }

    /// Dispatch table used by `submit`. Nodes without one only accept
    /// delegated tasks.
    pub fn with_factory(mut self, factory: impl TaskFactory + 'static) -> Self {
        self.factory = Some(Box::new(factory));
        self
    }
}

/// Per-node counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeMetrics {
    pub accepted: u64,
    pub rejected: u64,
    pub completed: u64,
    pub aborted: u64,
    pub failed: u64,
    pub abort_faults: u64,
}

pub(crate) enum Slot {
    Idle,
    Active(TaskRunner),
    /// The runner is checked out while it starts, ticks or aborts
    Executing(&'static str),
}

/// Addressable controllable unit of the robot
pub struct ResourceNode {
    pub(crate) id: NodeId,
    pub(crate) name: &'static str,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) slot: Slot,
    pub(crate) active_serial: Option<u64>,
    pub(crate) next_serial: u64,
    pub(crate) history: VecDeque<(u64, TaskOutcome)>,
    pub(crate) rules: RuleSet,
    pub(crate) factory: Option<Box<dyn TaskFactory>>,
    pub(crate) metrics: NodeMetrics,
}

impl ResourceNode {
    pub(crate) fn from_spec(id: NodeId, parent: Option<NodeId>, spec: NodeSpec) -> Self {
        Self {
            id,
            name: spec.name,
            parent,
            children: Vec::new(),
            slot: Slot::Idle,
            active_serial: None,
            next_serial: 1,
            history: VecDeque::with_capacity(OUTCOME_HISTORY),
            rules: spec.rules,
            factory: spec.factory,
            metrics: NodeMetrics::default(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }
    pub fn name(&self) -> &'static str {
        self.name
    }
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
    pub fn metrics(&self) -> &NodeMetrics {
        &self.metrics
    }
    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }
    pub fn accepts_operations(&self) -> bool {
        self.factory.is_some()
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.slot, Slot::Idle)
    }

    /// Name of the task occupying this node, if any
    pub fn busy_with(&self) -> Option<&'static str> {
        match &self.slot {
            Slot::Idle => None,
            Slot::Active(runner) => Some(runner.name()),
            Slot::Executing(name) => Some(*name),
        }
    }

    pub fn active_task(&self) -> Option<TaskSummary> {
        let serial = self.active_serial?;
        match &self.slot {
            Slot::Idle => None,
            Slot::Active(runner) => Some(TaskSummary {
                name: runner.name(),
                serial,
                phase: runner.phase(),
                state: runner.state().clone(),
                ticks: runner.ticks(),
            }),
            Slot::Executing(name) => Some(TaskSummary {
                name: *name,
                serial,
                phase: None,
                state: TaskState::Running,
                ticks: 0,
            }),
        }
    }

    pub fn ticket_status(&self, serial: u64) -> TicketStatus {
        if self.active_serial == Some(serial) {
            return TicketStatus::Running;
        }
        self.history
            .iter()
            .find(|(s, _)| *s == serial)
            .map(|(_, outcome)| TicketStatus::Finished(outcome.clone()))
            .unwrap_or(TicketStatus::Expired)
    }

    /// Return to idle and remember how the task ended
    pub(crate) fn finish(&mut self, serial: u64, outcome: TaskOutcome) {
        self.slot = Slot::Idle;
        self.active_serial = None;
        match outcome {
            TaskOutcome::Completed => self.metrics.completed += 1,
            TaskOutcome::Aborted => self.metrics.aborted += 1,
            TaskOutcome::Failed(_) => self.metrics.failed += 1,
        }
        if self.history.len() >= OUTCOME_HISTORY {
            self.history.pop_front();
        }
        self.history.push_back((serial, outcome));
    }
}

impl fmt::Debug for ResourceNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceNode")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("children", &self.children)
            .field("busy_with", &self.busy_with())
            .field("metrics", &self.metrics)
            .finish()
    }
}
