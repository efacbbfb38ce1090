use super::node::{NodeId, ResourceNode, TaskTicket, TicketStatus};
use super::task::Task;
use super::tree;
use crate::error::Rejection;
use crate::telemetry::{Telemetry, TelemetryEvent};

/// Runtime context handed to every task call.
///
/// Gives a task access to the rest of the resource tree while its own node is
/// checked out: it can delegate pre-built tasks to other nodes, poll their
/// tickets, abort them, and emit telemetry. It never exposes the task's own
/// slot, so a task cannot replace or abort itself through the context.
pub struct TaskContext<'a> {
    node: NodeId,
    nodes: &'a mut [ResourceNode],
    telemetry: &'a Telemetry,
}

impl<'a> TaskContext<'a> {
    pub(crate) fn new(
        node: NodeId,
        nodes: &'a mut [ResourceNode],
        telemetry: &'a Telemetry,
    ) -> Self {
        Self {
            node,
            nodes,
            telemetry,
        }
    }

    /// Node that owns the running task
    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn node_name(&self) -> &'static str {
        self.name_of(self.node)
    }

    pub fn name_of(&self, id: NodeId) -> &'static str {
        self.nodes
            .get(id.index())
            .map(|n| n.name())
            .unwrap_or("<unknown>")
    }

    pub fn lookup(&self, name: &str) -> Option<NodeId> {
        self.nodes.iter().find(|n| n.name() == name).map(|n| n.id())
    }

    pub fn is_idle(&self, id: NodeId) -> bool {
        self.nodes.get(id.index()).is_some_and(|n| n.is_idle())
    }

    pub fn telemetry(&self) -> &Telemetry {
        self.telemetry
    }

    pub fn emit(&self, event: TelemetryEvent) {
        self.telemetry.emit(event);
    }

    /// Scheduler period currently executing
    pub fn period(&self) -> u64 {
        self.telemetry.period()
    }

    /// Install an already-built task on another node and start it
    pub fn delegate(
        &mut self,
        target: NodeId,
        task: Box<dyn Task>,
    ) -> Result<TaskTicket, Rejection> {
        tree::install(&mut *self.nodes, self.telemetry, target, task)
    }

    pub fn status(&self, ticket: TaskTicket) -> TicketStatus {
        tree::ticket_status(self.nodes, ticket)
    }

    /// Abort the ticket's task if it is still the active task of its node.
    /// Cascades synchronously before returning.
    pub fn abort(&mut self, ticket: TaskTicket) -> bool {
        tree::abort_node(
            &mut *self.nodes,
            self.telemetry,
            ticket.node,
            Some(ticket.serial),
        )
        .is_some()
    }
}
