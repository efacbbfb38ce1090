use super::context::TaskContext;
use super::node::{
    NodeId, NodeSpec, ResourceNode, Slot, TaskFactory, TaskOutcome, TaskSummary, TaskTicket,
    TicketStatus,
};
use super::operation::Operation;
use super::task::{Task, TaskRunner};
use crate::error::{GantryError, GantryResult, Rejection, RejectionCause};
use crate::telemetry::{Telemetry, TelemetryEvent};
use crate::validation::RuleSet;
use std::collections::HashSet;
use std::mem;

/// Collects node declarations and freezes them into a [`ResourceTree`]
#[derive(Default)]
pub struct TreeBuilder {
    specs: Vec<(NodeSpec, Option<NodeId>)>,
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a top-level node
    pub fn add_root(&mut self, spec: NodeSpec) -> NodeId {
        let id = NodeId(self.specs.len());
        self.specs.push((spec, None));
        id
    }

    /// Add a child of an already declared node. Children are ticked in the
    /// order they are declared.
    pub fn add_child(&mut self, parent: NodeId, spec: NodeSpec) -> GantryResult<NodeId> {
        if parent.index() >= self.specs.len() {
            return Err(GantryError::UnknownNode(parent.to_string()));
        }
        let id = NodeId(self.specs.len());
        self.specs.push((spec, Some(parent)));
        Ok(id)
    }

    /// Attach a dispatch table after the fact, for factories that need the
    /// ids of nodes declared later
    pub fn set_factory(
        &mut self,
        id: NodeId,
        factory: impl TaskFactory + 'static,
    ) -> GantryResult<()> {
        let (spec, _) = self
            .specs
            .get_mut(id.index())
            .ok_or_else(|| GantryError::UnknownNode(id.to_string()))?;
        spec.factory = Some(Box::new(factory));
        Ok(())
    }

    pub fn set_rules(&mut self, id: NodeId, rules: RuleSet) -> GantryResult<()> {
        let (spec, _) = self
            .specs
            .get_mut(id.index())
            .ok_or_else(|| GantryError::UnknownNode(id.to_string()))?;
        spec.rules = rules;
        Ok(())
    }

    /// Check names are unique and build the tree
    pub fn try_build(self, telemetry: Telemetry) -> GantryResult<ResourceTree> {
        let mut seen = HashSet::new();
        for (spec, _) in &self.specs {
            if !seen.insert(spec.name) {
                return Err(GantryError::config(format!(
                    "duplicate resource node name '{}'",
                    spec.name
                )));
            }
        }
        Ok(self.build(telemetry))
    }

    /// Build the tree. Duplicate names are allowed here; lookups by name
    /// return the first match.
    pub fn build(self, telemetry: Telemetry) -> ResourceTree {
        let mut nodes: Vec<ResourceNode> = Vec::with_capacity(self.specs.len());
        let mut roots = Vec::new();

        for (index, (spec, parent)) in self.specs.into_iter().enumerate() {
            let id = NodeId(index);
            match parent {
                Some(parent) => nodes[parent.index()].children.push(id),
                None => roots.push(id),
            }
            nodes.push(ResourceNode::from_spec(id, parent, spec));
        }

        // Pre-order: parent before children, siblings in declaration order
        let mut order = Vec::with_capacity(nodes.len());
        let mut stack: Vec<NodeId> = roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(nodes[id.index()].children.iter().rev().copied());
        }

        ResourceTree {
            nodes,
            roots,
            order,
            telemetry,
        }
    }
}

/// Arena of resource nodes, built once at startup and never reparented
pub struct ResourceTree {
    nodes: Vec<ResourceNode>,
    roots: Vec<NodeId>,
    order: Vec<NodeId>,
    telemetry: Telemetry,
}

impl ResourceTree {
    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// Fixed pre-order in which `tick` visits nodes
    pub fn tick_order(&self) -> &[NodeId] {
        &self.order
    }

    pub fn node(&self, id: NodeId) -> Option<&ResourceNode> {
        self.nodes.get(id.index())
    }

    pub fn nodes(&self) -> impl Iterator<Item = &ResourceNode> {
        self.nodes.iter()
    }

    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.nodes.iter().find(|n| n.name() == name).map(|n| n.id())
    }

    pub fn is_idle(&self, id: NodeId) -> bool {
        self.node(id).is_some_and(|n| n.is_idle())
    }

    pub fn active_task(&self, id: NodeId) -> Option<TaskSummary> {
        self.node(id).and_then(|n| n.active_task())
    }

    pub fn ticket_status(&self, ticket: TaskTicket) -> TicketStatus {
        ticket_status(&self.nodes, ticket)
    }

    /// Validate, arbitrate, construct and start a task for `operation`.
    ///
    /// Rejections leave the node exactly as it was.
    pub fn submit(&mut self, id: NodeId, operation: Operation) -> Result<TaskTicket, Rejection> {
        let result = self.try_submit(id, &operation);
        match &result {
            Ok((ticket, task)) => {
                self.telemetry.emit(TelemetryEvent::OperationAccepted {
                    node: self.nodes[id.index()].name,
                    operation,
                    task: *task,
                    serial: ticket.serial,
                });
            }
            Err(rejection) => {
                log::warn!("{}", rejection);
                self.telemetry.emit(TelemetryEvent::OperationRejected {
                    node: rejection.node.clone(),
                    operation: Some(operation),
                    cause: rejection.cause.to_string(),
                    code: rejection.cause.code(),
                });
            }
        }
        result.map(|(ticket, _)| ticket)
    }

    /// Submit by node name
    pub fn submit_to(&mut self, name: &str, operation: Operation) -> Result<TaskTicket, Rejection> {
        match self.find(name) {
            Some(id) => self.submit(id, operation),
            None => {
                let rejection = Rejection::new(name, RejectionCause::UnknownNode);
                self.telemetry.emit(TelemetryEvent::OperationRejected {
                    node: name.to_string(),
                    operation: Some(operation),
                    cause: rejection.cause.to_string(),
                    code: rejection.cause.code(),
                });
                Err(rejection)
            }
        }
    }

    fn try_submit(
        &mut self,
        id: NodeId,
        operation: &Operation,
    ) -> Result<(TaskTicket, &'static str), Rejection> {
        let node = self
            .nodes
            .get_mut(id.index())
            .ok_or_else(|| Rejection::new(id.to_string(), RejectionCause::UnknownNode))?;

        if let Err(violation) = node.rules.check(operation) {
            node.metrics.rejected += 1;
            return Err(Rejection::new(node.name, violation.into()));
        }

        if let Some(active) = node.busy_with() {
            node.metrics.rejected += 1;
            return Err(Rejection::new(node.name, RejectionCause::Busy { active }));
        }

        let Some(factory) = node.factory.as_ref() else {
            node.metrics.rejected += 1;
            return Err(Rejection::new(node.name, RejectionCause::NoDispatcher));
        };

        let task = match factory.build(operation) {
            Ok(task) => task,
            Err(e) => {
                node.metrics.rejected += 1;
                return Err(Rejection::new(
                    node.name,
                    RejectionCause::Construction(e.to_string()),
                ));
            }
        };

        let task_name = task.name();
        let ticket = install(&mut self.nodes, &self.telemetry, id, task)?;
        Ok((ticket, task_name))
    }

    /// Install an already-built task (delegation from outside the tick, e.g.
    /// autonomous routines). Skips the operation validator.
    pub fn submit_task(&mut self, id: NodeId, task: Box<dyn Task>) -> Result<TaskTicket, Rejection> {
        let result = install(&mut self.nodes, &self.telemetry, id, task);
        if let Err(ref rejection) = result {
            log::warn!("{}", rejection);
            self.telemetry.emit(TelemetryEvent::OperationRejected {
                node: rejection.node.clone(),
                operation: None,
                cause: rejection.cause.to_string(),
                code: rejection.cause.code(),
            });
        }
        result
    }

    /// Abort the node's active task, if any, and return its name. The node
    /// is idle afterwards even when the task faults while aborting.
    pub fn abort_active(&mut self, id: NodeId) -> Option<&'static str> {
        abort_node(&mut self.nodes, &self.telemetry, id, None)
    }

    /// Abort every active task, parents first
    pub fn abort_all(&mut self) -> usize {
        let mut aborted = 0;
        for index in 0..self.order.len() {
            let id = self.order[index];
            if abort_node(&mut self.nodes, &self.telemetry, id, None).is_some() {
                aborted += 1;
            }
        }
        aborted
    }

    /// One pass over the tree in pre-order
    pub fn tick(&mut self) {
        for index in 0..self.order.len() {
            let id = self.order[index];
            tick_node(&mut self.nodes, &self.telemetry, id);
        }
    }
}

pub(crate) fn ticket_status(nodes: &[ResourceNode], ticket: TaskTicket) -> TicketStatus {
    nodes
        .get(ticket.node.index())
        .map(|n| n.ticket_status(ticket.serial))
        .unwrap_or(TicketStatus::Expired)
}

/// Arbitrate and start a task on `target`
pub(crate) fn install(
    nodes: &mut [ResourceNode],
    telemetry: &Telemetry,
    target: NodeId,
    task: Box<dyn Task>,
) -> Result<TaskTicket, Rejection> {
    let node = nodes
        .get_mut(target.index())
        .ok_or_else(|| Rejection::new(target.to_string(), RejectionCause::UnknownNode))?;

    if let Some(active) = node.busy_with() {
        node.metrics.rejected += 1;
        return Err(Rejection::new(node.name, RejectionCause::Busy { active }));
    }

    let node_name = node.name;
    let serial = node.next_serial;
    node.next_serial += 1;

    let mut runner = TaskRunner::new(task);
    let task_name = runner.name();
    node.slot = Slot::Executing(task_name);
    node.active_serial = Some(serial);

    let started = {
        let mut ctx = TaskContext::new(target, &mut *nodes, telemetry);
        runner.start(&mut ctx)
    };

    let node = &mut nodes[target.index()];
    match started {
        Ok(()) => {
            node.metrics.accepted += 1;
            telemetry.emit(TelemetryEvent::TaskStarted {
                node: node_name,
                task: task_name,
                serial,
            });
            if runner.is_complete() {
                node.finish(serial, TaskOutcome::Completed);
                telemetry.emit(TelemetryEvent::TaskCompleted {
                    node: node_name,
                    task: task_name,
                    serial,
                    ticks: 0,
                });
            } else {
                node.slot = Slot::Active(runner);
            }
            Ok(TaskTicket {
                node: target,
                serial,
            })
        }
        Err(e) => {
            node.slot = Slot::Idle;
            node.active_serial = None;
            node.metrics.rejected += 1;
            log::error!("[{}] Failed to start '{}': {}", node_name, task_name, e);
            telemetry.emit(TelemetryEvent::TaskFailed {
                node: node_name,
                task: task_name,
                serial,
                reason: e.to_string(),
            });
            Err(Rejection::new(
                node_name,
                RejectionCause::Construction(e.to_string()),
            ))
        }
    }
}

/// Abort the active task of `target`. With `expected` set, only the task with
/// that serial is aborted.
pub(crate) fn abort_node(
    nodes: &mut [ResourceNode],
    telemetry: &Telemetry,
    target: NodeId,
    expected: Option<u64>,
) -> Option<&'static str> {
    let node = nodes.get_mut(target.index())?;
    if expected.is_some() && node.active_serial != expected {
        return None;
    }

    let mut runner = match mem::replace(&mut node.slot, Slot::Idle) {
        Slot::Active(runner) => runner,
        other => {
            node.slot = other;
            return None;
        }
    };
    let node_name = node.name;
    let task_name = runner.name();
    let serial = node.active_serial.unwrap_or_default();
    node.slot = Slot::Executing(task_name);

    let result = {
        let mut ctx = TaskContext::new(target, &mut *nodes, telemetry);
        runner.abort(&mut ctx)
    };

    let node = &mut nodes[target.index()];
    if let Err(e) = result {
        node.metrics.abort_faults += 1;
        log::error!("[{}] Fault while aborting '{}': {}", node_name, task_name, e);
        telemetry.emit(TelemetryEvent::AbortFault {
            node: node_name,
            task: task_name,
            reason: e.to_string(),
        });
    }
    node.finish(serial, TaskOutcome::Aborted);
    telemetry.emit(TelemetryEvent::TaskAborted {
        node: node_name,
        task: task_name,
        serial,
    });
    Some(task_name)
}

/// Tick the active task of `target` and clear it when it finishes
pub(crate) fn tick_node(nodes: &mut [ResourceNode], telemetry: &Telemetry, target: NodeId) {
    let node = &mut nodes[target.index()];
    let mut runner = match mem::replace(&mut node.slot, Slot::Idle) {
        Slot::Active(runner) => runner,
        other => {
            node.slot = other;
            return;
        }
    };
    let node_name = node.name;
    let task_name = runner.name();
    let serial = node.active_serial.unwrap_or_default();
    node.slot = Slot::Executing(task_name);

    let result = {
        let mut ctx = TaskContext::new(target, &mut *nodes, telemetry);
        runner.tick(&mut ctx)
    };

    let node = &mut nodes[target.index()];
    match result {
        Err(e) => {
            log::error!("[{}] '{}' faulted: {}", node_name, task_name, e);
            node.finish(serial, TaskOutcome::Failed(e.to_string()));
            telemetry.emit(TelemetryEvent::TaskFailed {
                node: node_name,
                task: task_name,
                serial,
                reason: e.to_string(),
            });
        }
        Ok(()) if runner.is_complete() => {
            node.finish(serial, TaskOutcome::Completed);
            telemetry.emit(TelemetryEvent::TaskCompleted {
                node: node_name,
                task: task_name,
                serial,
                ticks: runner.ticks(),
            });
        }
        Ok(()) => node.slot = Slot::Active(runner),
    }
}
