//! Structured telemetry for the control core
//!
//! There is no global logger or registry: a [`Telemetry`] handle is created
//! by the application, handed to the resource tree at construction and
//! reaches every task through its `TaskContext`. The handle forwards
//! [`TelemetryEvent`]s to a pluggable [`TelemetrySink`].
//!
//! Provided sinks:
//! - [`LogSink`]: forwards to the `log` facade
//! - [`MemorySink`]: bounded in-memory history (tests, run summaries)
//! - [`JsonLinesSink`]: one JSON object per line to any writer
//! - [`FanoutSink`]: duplicates records to several sinks

use crate::core::Operation;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Default number of records kept by a [`MemorySink`]
pub const DEFAULT_HISTORY: usize = 1024;

/// Event emitted by the control core
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TelemetryEvent {
    OperationAccepted {
        node: &'static str,
        operation: Operation,
        task: &'static str,
        serial: u64,
    },
    OperationRejected {
        node: String,
        operation: Option<Operation>,
        cause: String,
        code: &'static str,
    },
    TaskStarted {
        node: &'static str,
        task: &'static str,
        serial: u64,
    },
    TaskCompleted {
        node: &'static str,
        task: &'static str,
        serial: u64,
        ticks: u64,
    },
    TaskAborted {
        node: &'static str,
        task: &'static str,
        serial: u64,
    },
    TaskFailed {
        node: &'static str,
        task: &'static str,
        serial: u64,
        reason: String,
    },
    PhaseChanged {
        node: &'static str,
        task: &'static str,
        from: Option<&'static str>,
        to: &'static str,
    },
    AbortFault {
        node: &'static str,
        task: &'static str,
        reason: String,
    },
    InterruptRouted {
        node: &'static str,
        aborted: Option<&'static str>,
    },
    SchedulingViolation {
        elapsed_us: u64,
        budget_us: u64,
    },
}

impl TelemetryEvent {
    /// Log level used when the event reaches the `log` facade
    pub fn level(&self) -> log::Level {
        match self {
            Self::OperationAccepted { .. }
            | Self::TaskStarted { .. }
            | Self::TaskCompleted { .. }
            | Self::InterruptRouted { .. } => log::Level::Info,
            Self::PhaseChanged { .. } => log::Level::Debug,
            Self::OperationRejected { .. }
            | Self::TaskAborted { .. }
            | Self::SchedulingViolation { .. } => log::Level::Warn,
            Self::TaskFailed { .. } | Self::AbortFault { .. } => log::Level::Error,
        }
    }

    /// Node the event concerns, if any
    pub fn node(&self) -> Option<&str> {
        match self {
            Self::OperationAccepted { node, .. }
            | Self::TaskStarted { node, .. }
            | Self::TaskCompleted { node, .. }
            | Self::TaskAborted { node, .. }
            | Self::TaskFailed { node, .. }
            | Self::PhaseChanged { node, .. }
            | Self::AbortFault { node, .. }
            | Self::InterruptRouted { node, .. } => Some(*node),
            Self::OperationRejected { node, .. } => Some(node.as_str()),
            Self::SchedulingViolation { .. } => None,
        }
    }

    /// One-line human readable summary
    pub fn summary(&self) -> String {
        match self {
            Self::OperationAccepted {
                node,
                operation,
                task,
                serial,
            } => format!("{} accepted '{}' as {}#{}", node, operation, task, serial),
            Self::OperationRejected { node, cause, .. } => {
                format!("{} rejected request: {}", node, cause)
            }
            Self::TaskStarted { node, task, serial } => {
                format!("{} started {}#{}", node, task, serial)
            }
            Self::TaskCompleted {
                node,
                task,
                serial,
                ticks,
            } => format!("{} completed {}#{} after {} ticks", node, task, serial, ticks),
            Self::TaskAborted { node, task, serial } => {
                format!("{} aborted {}#{}", node, task, serial)
            }
            Self::TaskFailed {
                node,
                task,
                serial,
                reason,
            } => format!("{} failed {}#{}: {}", node, task, serial, reason),
            Self::PhaseChanged {
                node,
                task,
                from,
                to,
            } => format!(
                "{} {}: {} -> {}",
                node,
                task,
                from.unwrap_or("<start>"),
                to
            ),
            Self::AbortFault { node, task, reason } => {
                format!("{} fault while aborting {}: {}", node, task, reason)
            }
            Self::InterruptRouted { node, aborted } => match aborted {
                Some(task) => format!("{} abort input: cancelled {}", node, task),
                None => format!("{} abort input: nothing to cancel", node),
            },
            Self::SchedulingViolation {
                elapsed_us,
                budget_us,
            } => format!("period overran budget: {}us > {}us", elapsed_us, budget_us),
        }
    }
}

/// Event stamped with the scheduler period it happened in
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryRecord {
    pub period: u64,
    #[serde(flatten)]
    pub event: TelemetryEvent,
}

/// Destination for telemetry records (external collaborator)
pub trait TelemetrySink: Send + Sync {
    fn record(&self, record: &TelemetryRecord);
}

struct TelemetryInner {
    sink: Option<Arc<dyn TelemetrySink>>,
    period: AtomicU64,
}

/// Explicitly passed telemetry context
#[derive(Clone)]
pub struct Telemetry {
    inner: Arc<TelemetryInner>,
}

impl Telemetry {
    pub fn new(sink: Arc<dyn TelemetrySink>) -> Self {
        Self {
            inner: Arc::new(TelemetryInner {
                sink: Some(sink),
                period: AtomicU64::new(0),
            }),
        }
    }

    /// Telemetry that only reaches the `log` facade
    pub fn logging() -> Self {
        Self::new(Arc::new(LogSink))
    }

    /// Telemetry that drops everything
    pub fn disabled() -> Self {
        Self {
            inner: Arc::new(TelemetryInner {
                sink: None,
                period: AtomicU64::new(0),
            }),
        }
    }

    pub fn emit(&self, event: TelemetryEvent) {
        if let Some(ref sink) = self.inner.sink {
            let record = TelemetryRecord {
                period: self.period(),
                event,
            };
            sink.record(&record);
        }
    }

    pub fn set_period(&self, period: u64) {
        self.inner.period.store(period, Ordering::Relaxed);
    }

    pub fn period(&self) -> u64 {
        self.inner.period.load(Ordering::Relaxed)
    }
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::logging()
    }
}

/// Forwards events to the `log` facade at their natural level
pub struct LogSink;

impl TelemetrySink for LogSink {
    fn record(&self, record: &TelemetryRecord) {
        log::log!(
            target: "gantry::telemetry",
            record.event.level(),
            "[{}] {}",
            record.period,
            record.event.summary()
        );
    }
}

/// Bounded in-memory history of records
pub struct MemorySink {
    records: Mutex<VecDeque<TelemetryRecord>>,
    capacity: usize,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_HISTORY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
        }
    }

    pub fn records(&self) -> Vec<TelemetryRecord> {
        self.records.lock().iter().cloned().collect()
    }

    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.records.lock().iter().map(|r| r.event.clone()).collect()
    }

    /// Phase labels entered by `task` on `node`, in order
    pub fn phases(&self, node: &str, task: &str) -> Vec<&'static str> {
        self.records
            .lock()
            .iter()
            .filter_map(|r| match r.event {
                TelemetryEvent::PhaseChanged {
                    node: n,
                    task: t,
                    to,
                    ..
                } if n == node && t == task => Some(to),
                _ => None,
            })
            .collect()
    }

    /// Count events matching a predicate
    pub fn count(&self, predicate: impl Fn(&TelemetryEvent) -> bool) -> usize {
        self.records
            .lock()
            .iter()
            .filter(|r| predicate(&r.event))
            .count()
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetrySink for MemorySink {
    fn record(&self, record: &TelemetryRecord) {
        let mut records = self.records.lock();
        if records.len() >= self.capacity {
            records.pop_front();
        }
        records.push_back(record.clone());
    }
}

/// Writes each record as a JSON object on its own line
pub struct JsonLinesSink<W: Write + Send> {
    writer: Mutex<W>,
    session: String,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W, session: impl Into<String>) -> Self {
        Self {
            writer: Mutex::new(writer),
            session: session.into(),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

#[derive(Serialize)]
struct JsonLine<'a> {
    session: &'a str,
    timestamp: String,
    #[serde(flatten)]
    record: &'a TelemetryRecord,
}

impl<W: Write + Send> TelemetrySink for JsonLinesSink<W> {
    fn record(&self, record: &TelemetryRecord) {
        let line = JsonLine {
            session: &self.session,
            timestamp: chrono::Local::now().format("%H:%M:%S%.3f").to_string(),
            record,
        };
        let mut writer = self.writer.lock();
        let written = serde_json::to_writer(&mut *writer, &line)
            .map_err(std::io::Error::from)
            .and_then(|_| writer.write_all(b"\n"));
        if let Err(e) = written {
            log::warn!("Failed to write telemetry line: {}", e);
        }
    }
}

/// Sends every record to all wrapped sinks
pub struct FanoutSink {
    sinks: Vec<Arc<dyn TelemetrySink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn TelemetrySink>>) -> Self {
        Self { sinks }
    }
}

impl TelemetrySink for FanoutSink {
    fn record(&self, record: &TelemetryRecord) {
        for sink in &self.sinks {
            sink.record(record);
        }
    }
}
