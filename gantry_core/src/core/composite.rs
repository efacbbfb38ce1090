//! Phase machines that coordinate tasks on several nodes
//!
//! A [`CompositeTask`] owns every sub-task it will ever run from the moment it
//! is built. Entering a phase moves that phase's boxes into other nodes via
//! [`TaskContext::delegate`] and keeps the returned tickets; `tick()` polls
//! those tickets and the phase's advance condition, and makes at most one
//! transition per period.
//!
//! Sub-tasks that completed leave their devices holding the last command.
//! Devices registered with [`CompositeTask::owns`] are brought to rest when
//! the composite is aborted, whichever phase it was in.

use super::context::TaskContext;
use super::node::{NodeId, TaskOutcome, TaskTicket, TicketStatus};
use super::task::Task;
use crate::error::{GantryError, GantryResult};
use crate::hardware::{SharedAnalog, SharedPosition, SharedPower, SharedSwitch};
use crate::telemetry::TelemetryEvent;

/// Phase enum of a composite
pub trait PhaseLabel: Copy + Send + 'static {
    fn label(self) -> &'static str;
}

/// External predicate polled once per tick
pub trait Trigger: Send {
    fn fired(&mut self) -> bool;
}

/// Fires while a boolean sensor reads true
pub struct SensorTrigger {
    sensor: SharedSwitch,
}

impl SensorTrigger {
    pub fn new(sensor: SharedSwitch) -> Self {
        Self { sensor }
    }
}

impl Trigger for SensorTrigger {
    fn fired(&mut self) -> bool {
        self.sensor.lock().read()
    }
}

/// Fires while an analog reading is at or below a threshold
pub struct BelowThreshold {
    sensor: SharedAnalog,
    threshold: f64,
}

impl BelowThreshold {
    pub fn new(sensor: SharedAnalog, threshold: f64) -> Self {
        Self { sensor, threshold }
    }
}

impl Trigger for BelowThreshold {
    fn fired(&mut self) -> bool {
        self.sensor.lock().read() <= self.threshold
    }
}

/// Device a composite can bring to rest on abort
pub trait Quiesce: Send {
    fn quiesce(&self) -> GantryResult<()>;
}

impl Quiesce for SharedPosition {
    fn quiesce(&self) -> GantryResult<()> {
        self.lock().stop()
    }
}

impl Quiesce for SharedPower {
    fn quiesce(&self) -> GantryResult<()> {
        self.lock().set_power(0.0)
    }
}

/// When a phase may hand over to the next one. Awaited sub-tasks must have
/// completed in every case.
pub enum Advance {
    AllComplete,
    Trigger(Box<dyn Trigger>),
    /// Stay for this many ticks after entry
    Dwell(u32),
}

impl Advance {
    pub fn trigger(trigger: impl Trigger + 'static) -> Self {
        Advance::Trigger(Box::new(trigger))
    }
}

struct Step {
    target: NodeId,
    task: Option<Box<dyn Task>>,
}

/// One phase of a composite: the sub-tasks it starts and how it ends
pub struct Phase<P> {
    label: P,
    advance: Advance,
    awaited: Vec<Step>,
    background: Vec<Step>,
    stops: Vec<NodeId>,
}

impl<P: PhaseLabel> Phase<P> {
    pub fn new(label: P, advance: Advance) -> Self {
        Self {
            label,
            advance,
            awaited: Vec::new(),
            background: Vec::new(),
            stops: Vec::new(),
        }
    }

    /// Start `task` on `target` and wait for it before advancing
    pub fn await_task(mut self, target: NodeId, task: Box<dyn Task>) -> Self {
        self.awaited.push(Step {
            target,
            task: Some(task),
        });
        self
    }

    /// Start `task` on `target` and leave it running across phases
    pub fn background(mut self, target: NodeId, task: Box<dyn Task>) -> Self {
        self.background.push(Step {
            target,
            task: Some(task),
        });
        self
    }

    /// Abort the background sub-task an earlier phase left on `target`
    pub fn stop(mut self, target: NodeId) -> Self {
        self.stops.push(target);
        self
    }

    pub fn label(&self) -> P {
        self.label
    }
}

/// Task whose body is an explicit phase machine over other nodes
pub struct CompositeTask<P: PhaseLabel> {
    name: &'static str,
    phases: Vec<Phase<P>>,
    done: P,
    current: usize,
    awaited: Vec<TaskTicket>,
    background: Vec<TaskTicket>,
    dwell_remaining: u32,
    complete: bool,
    owned: Vec<(NodeId, Box<dyn Quiesce>)>,
}

impl<P: PhaseLabel> CompositeTask<P> {
    /// `done` is the terminal label reported once every phase has finished
    pub fn new(name: &'static str, done: P) -> Self {
        Self {
            name,
            phases: Vec::new(),
            done,
            current: 0,
            awaited: Vec::new(),
            background: Vec::new(),
            dwell_remaining: 0,
            complete: false,
            owned: Vec::new(),
        }
    }

    pub fn phase(mut self, phase: Phase<P>) -> Self {
        self.phases.push(phase);
        self
    }

    /// Register a device commanded through `node`. On abort it is brought to
    /// rest unless another task has taken the node over.
    pub fn owns(mut self, node: NodeId, device: impl Quiesce + 'static) -> Self {
        self.owned.push((node, Box::new(device)));
        self
    }

    /// Current phase label (the done label once complete)
    pub fn current(&self) -> P {
        if self.complete {
            self.done
        } else {
            self.phases
                .get(self.current)
                .map(|p| p.label)
                .unwrap_or(self.done)
        }
    }

    fn enter(&mut self, index: usize, ctx: &mut TaskContext<'_>) -> GantryResult<()> {
        let from = if index == 0 {
            None
        } else {
            Some(self.phases[index - 1].label.label())
        };
        self.current = index;
        self.awaited.clear();

        if index >= self.phases.len() {
            // Nothing this composite started may outlive it
            for ticket in self.background.drain(..) {
                ctx.abort(ticket);
            }
            self.complete = true;
            ctx.emit(TelemetryEvent::PhaseChanged {
                node: ctx.node_name(),
                task: self.name,
                from,
                to: self.done.label(),
            });
            return Ok(());
        }

        ctx.emit(TelemetryEvent::PhaseChanged {
            node: ctx.node_name(),
            task: self.name,
            from,
            to: self.phases[index].label.label(),
        });

        let phase = &mut self.phases[index];
        for target in &phase.stops {
            let mut kept = Vec::with_capacity(self.background.len());
            for ticket in self.background.drain(..) {
                if ticket.node == *target {
                    ctx.abort(ticket);
                } else {
                    kept.push(ticket);
                }
            }
            self.background = kept;
        }

        for step in &mut phase.background {
            if let Some(task) = step.task.take() {
                let ticket = delegate(self.name, ctx, step.target, task)?;
                if matches!(ctx.status(ticket), TicketStatus::Running) {
                    self.background.push(ticket);
                }
            }
        }
        for step in &mut phase.awaited {
            if let Some(task) = step.task.take() {
                let ticket = delegate(self.name, ctx, step.target, task)?;
                if matches!(ctx.status(ticket), TicketStatus::Running) {
                    self.awaited.push(ticket);
                }
            }
        }

        self.dwell_remaining = match phase.advance {
            Advance::Dwell(ticks) => ticks,
            _ => 0,
        };
        Ok(())
    }

    /// True when every awaited ticket has completed. Any other ending is a
    /// fault of the composite.
    fn awaited_complete(&mut self, ctx: &TaskContext<'_>) -> GantryResult<bool> {
        self.awaited = still_running(self.name, ctx, &self.awaited)?;
        Ok(self.awaited.is_empty())
    }

    fn check_background(&mut self, ctx: &TaskContext<'_>) -> GantryResult<()> {
        self.background = still_running(self.name, ctx, &self.background)?;
        Ok(())
    }
}

/// Tickets still running. Completed ones are dropped so they are never polled
/// after the node's outcome history forgets them; any other ending is a fault.
fn still_running(
    name: &'static str,
    ctx: &TaskContext<'_>,
    tickets: &[TaskTicket],
) -> GantryResult<Vec<TaskTicket>> {
    let mut running = Vec::with_capacity(tickets.len());
    for ticket in tickets {
        match ctx.status(*ticket) {
            TicketStatus::Running => running.push(*ticket),
            TicketStatus::Finished(TaskOutcome::Completed) => {}
            other => return Err(sub_task_lost(name, ctx, *ticket, &other)),
        }
    }
    Ok(running)
}

fn delegate(
    name: &'static str,
    ctx: &mut TaskContext<'_>,
    target: NodeId,
    task: Box<dyn Task>,
) -> GantryResult<TaskTicket> {
    ctx.delegate(target, task).map_err(|rejection| {
        GantryError::delegation(name, rejection.node.clone(), rejection.cause.to_string())
    })
}

fn sub_task_lost(
    name: &'static str,
    ctx: &TaskContext<'_>,
    ticket: TaskTicket,
    status: &TicketStatus,
) -> GantryError {
    let reason = match status {
        TicketStatus::Finished(TaskOutcome::Aborted) => "sub-task was aborted".to_string(),
        TicketStatus::Finished(TaskOutcome::Failed(why)) => format!("sub-task failed: {}", why),
        _ => "sub-task is no longer tracked".to_string(),
    };
    GantryError::delegation(name, ctx.name_of(ticket.node), reason)
}

impl<P: PhaseLabel> Task for CompositeTask<P> {
    fn name(&self) -> &'static str {
        self.name
    }

    fn start(&mut self, ctx: &mut TaskContext<'_>) -> GantryResult<()> {
        self.enter(0, ctx)
    }

    fn tick(&mut self, ctx: &mut TaskContext<'_>) -> GantryResult<()> {
        if self.complete {
            return Ok(());
        }

        let finished = self.awaited_complete(ctx)?;
        self.check_background(ctx)?;

        if self.dwell_remaining > 0 {
            self.dwell_remaining -= 1;
        }
        let ready = match &mut self.phases[self.current].advance {
            Advance::AllComplete => finished,
            Advance::Trigger(trigger) => finished && trigger.fired(),
            Advance::Dwell(_) => finished && self.dwell_remaining == 0,
        };

        if ready {
            self.enter(self.current + 1, ctx)?;
        }
        Ok(())
    }

    fn is_complete(&self) -> bool {
        self.complete
    }

    fn abort(&mut self, ctx: &mut TaskContext<'_>) -> GantryResult<()> {
        for ticket in self.awaited.drain(..).chain(self.background.drain(..)) {
            ctx.abort(ticket);
        }

        let mut fault = None;
        for (node, device) in &self.owned {
            if !ctx.is_idle(*node) {
                continue;
            }
            if let Err(e) = device.quiesce() {
                log::warn!(
                    "[{}] Could not quiesce device of '{}': {}",
                    self.name,
                    ctx.name_of(*node),
                    e
                );
                fault.get_or_insert(e);
            }
        }
        match fault {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn phase(&self) -> Option<&'static str> {
        Some(self.current().label())
    }
}
