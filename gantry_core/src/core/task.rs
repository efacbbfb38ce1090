use super::context::TaskContext;
use crate::error::{GantryError, GantryResult};
use crate::telemetry::TelemetryEvent;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Resumable unit of work bound to one resource node.
///
/// ## Lifecycle
///
/// 1. **Construction** - all fallible work (reading calibration, building
///    sub-tasks) happens here, before the task reaches a node
/// 2. **`start()`** - called exactly once; issues the first command
/// 3. **`tick()`** - called once per period while active; must be bounded
/// 4. **`is_complete()`** or **`abort()`** - terminal
///
/// Implementations do not have to guard against misuse: the node drives
/// every task through a [`TaskRunner`], which enforces call-once start,
/// latches completion and makes abort idempotent.
pub trait Task: Send {
    /// Task name for telemetry (stable, not unique)
    fn name(&self) -> &'static str;

    /// Issue the first command
    fn start(&mut self, ctx: &mut TaskContext<'_>) -> GantryResult<()>;

    /// Advance one period. Must not block.
    fn tick(&mut self, ctx: &mut TaskContext<'_>) -> GantryResult<()>;

    /// Whether the task reached its goal
    fn is_complete(&self) -> bool;

    /// Leave every actuator this task commands quiescent and cancel any work
    /// delegated to other nodes before returning.
    fn abort(&mut self, ctx: &mut TaskContext<'_>) -> GantryResult<()>;

    /// Current phase label, for tasks that are phase machines
    fn phase(&self) -> Option<&'static str> {
        None
    }
}

/// Lifecycle state tracked by [`TaskRunner`]
#[derive(Debug, Clone, PartialEq)]
pub enum TaskState {
    Constructed,
    Running,
    Complete,
    Aborted,
    Failed(String),
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Complete | TaskState::Aborted | TaskState::Failed(_)
        )
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskState::Constructed => write!(f, "Constructed"),
            TaskState::Running => write!(f, "Running"),
            TaskState::Complete => write!(f, "Complete"),
            TaskState::Aborted => write!(f, "Aborted"),
            TaskState::Failed(msg) => write!(f, "Failed: {}", msg),
        }
    }
}

/// Owns a task and enforces its lifecycle
pub struct TaskRunner {
    task: Box<dyn Task>,
    state: TaskState,
    ticks: u64,
}

impl TaskRunner {
    pub fn new(task: Box<dyn Task>) -> Self {
        Self {
            task,
            state: TaskState::Constructed,
            ticks: 0,
        }
    }

    pub fn name(&self) -> &'static str {
        self.task.name()
    }

    pub fn state(&self) -> &TaskState {
        &self.state
    }

    pub fn phase(&self) -> Option<&'static str> {
        self.task.phase()
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Latched: once true, stays true
    pub fn is_complete(&self) -> bool {
        self.state == TaskState::Complete
    }

    pub fn start(&mut self, ctx: &mut TaskContext<'_>) -> GantryResult<()> {
        let name = self.name();
        if self.state != TaskState::Constructed {
            return Err(GantryError::Lifecycle {
                task: name.to_string(),
                action: "start",
                state: self.state.to_string(),
            });
        }

        let task = &mut self.task;
        let started = guarded(name, || {
            task.start(ctx)?;
            Ok(task.is_complete())
        });

        match started {
            Ok(complete) => {
                self.state = if complete {
                    TaskState::Complete
                } else {
                    TaskState::Running
                };
                Ok(())
            }
            Err(e) => {
                // Whatever start managed to command must not keep running
                self.quiesce(ctx);
                self.state = TaskState::Failed(e.to_string());
                Err(e)
            }
        }
    }

    /// Tick a running task. A fault aborts the task and leaves it failed.
    pub fn tick(&mut self, ctx: &mut TaskContext<'_>) -> GantryResult<()> {
        if self.state != TaskState::Running {
            return Ok(());
        }
        self.ticks += 1;

        let name = self.name();
        let task = &mut self.task;
        let ticked = guarded(name, || {
            task.tick(ctx)?;
            Ok(task.is_complete())
        });

        match ticked {
            Ok(true) => {
                self.state = TaskState::Complete;
                Ok(())
            }
            Ok(false) => Ok(()),
            Err(e) => {
                self.quiesce(ctx);
                self.state = TaskState::Failed(e.to_string());
                Err(e)
            }
        }
    }

    /// Abort the task. Idempotent: only the first call reaches the task, and
    /// a task that never started has nothing to stop.
    pub fn abort(&mut self, ctx: &mut TaskContext<'_>) -> GantryResult<()> {
        match self.state {
            TaskState::Constructed => {
                self.state = TaskState::Aborted;
                Ok(())
            }
            TaskState::Running => {
                self.state = TaskState::Aborted;
                let name = self.name();
                let task = &mut self.task;
                guarded(name, || task.abort(ctx))
            }
            _ => Ok(()),
        }
    }

    fn quiesce(&mut self, ctx: &mut TaskContext<'_>) {
        let name = self.name();
        let task = &mut self.task;
        if let Err(e) = guarded(name, || task.abort(ctx)) {
            log::error!(
                "[{}] Fault while quiescing '{}' after failure: {}",
                ctx.node_name(),
                name,
                e
            );
            ctx.telemetry().emit(TelemetryEvent::AbortFault {
                node: ctx.node_name(),
                task: name,
                reason: e.to_string(),
            });
        }
    }
}

impl fmt::Debug for TaskRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRunner")
            .field("task", &self.name())
            .field("state", &self.state)
            .field("ticks", &self.ticks)
            .finish()
    }
}

/// Run a task callback, turning a panic into a [`GantryError::TaskPanic`]
pub(crate) fn guarded<T>(
    task: &'static str,
    f: impl FnOnce() -> GantryResult<T>,
) -> GantryResult<T> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(panic_err) => {
            let message = if let Some(s) = panic_err.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = panic_err.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic payload".to_string()
            };
            Err(GantryError::TaskPanic {
                task: task.to_string(),
                message,
            })
        }
    }
}
