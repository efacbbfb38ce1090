use crate::config::SchedulerConfig;
use crate::core::{NodeId, ResourceTree};
use crate::hardware::SharedSwitch;
use crate::telemetry::TelemetryEvent;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Callback run at the start of every period, before interrupts are sampled
pub type PeriodHook = Box<dyn FnMut(u64) + Send>;

/// Rising-edge detector over a boolean input
///
/// Holding the input down fires once; it has to be released before it can
/// fire again.
pub struct AbortInput {
    input: SharedSwitch,
    last: bool,
}

impl AbortInput {
    pub fn new(input: SharedSwitch) -> Self {
        Self { input, last: false }
    }

    /// Sample the input; true on a false -> true transition
    pub fn poll(&mut self) -> bool {
        let now = self.input.lock().read();
        let edge = now && !self.last;
        self.last = now;
        edge
    }
}

/// Timing counters of the run loop, in microseconds
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SchedulerStats {
    pub periods: u64,
    pub violations: u64,
    pub interrupts_routed: u64,
    pub min_work_us: u64,
    pub max_work_us: u64,
    pub last_work_us: u64,
    pub total_work_us: u64,
}

impl SchedulerStats {
    pub fn avg_work_us(&self) -> u64 {
        if self.periods == 0 {
            0
        } else {
            self.total_work_us / self.periods
        }
    }

    fn record(&mut self, work: Duration) {
        let us = work.as_micros() as u64;
        self.min_work_us = if self.periods == 0 {
            us
        } else {
            self.min_work_us.min(us)
        };
        self.max_work_us = self.max_work_us.max(us);
        self.last_work_us = us;
        self.total_work_us += us;
        self.periods += 1;
    }
}

enum Limit {
    Forever,
    Duration(Duration),
    Periods(u64),
}

/// Fixed-period, single-threaded driver of a [`ResourceTree`]
///
/// Each period: run the period hooks, route rising edges of the abort
/// inputs to their nodes, tick the tree in pre-order and compare the work
/// time against the budget.
pub struct Scheduler {
    tree: ResourceTree,
    interrupts: Vec<(NodeId, AbortInput)>,
    hooks: Vec<PeriodHook>,
    period: Duration,
    budget: Duration,
    name: String,
    running: Arc<AtomicBool>,
    stats: SchedulerStats,
    period_index: u64,
}

impl Scheduler {
    /// Create a scheduler with the default 20 ms period
    pub fn new(tree: ResourceTree) -> Self {
        let config = SchedulerConfig::default();
        Self {
            tree,
            interrupts: Vec::new(),
            hooks: Vec::new(),
            period: config.period(),
            budget: config.budget(),
            name: config.name,
            running: Arc::new(AtomicBool::new(true)),
            stats: SchedulerStats::default(),
            period_index: 0,
        }
    }

    pub fn with_config(mut self, config: &SchedulerConfig) -> Self {
        self.period = config.period();
        self.budget = config.budget();
        self.name = config.name.clone();
        self
    }

    /// Set the period; the budget follows unless set separately afterwards
    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self.budget = period;
        self
    }

    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Route rising edges of `input` to `abort_active` of `node`
    pub fn add_abort_input(&mut self, node: NodeId, input: SharedSwitch) -> &mut Self {
        self.interrupts.push((node, AbortInput::new(input)));
        self
    }

    pub fn add_period_hook(&mut self, hook: impl FnMut(u64) + Send + 'static) -> &mut Self {
        self.hooks.push(Box::new(hook));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn tree(&self) -> &ResourceTree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut ResourceTree {
        &mut self.tree
    }

    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    /// Index of the last executed period (0 before the first)
    pub fn period_index(&self) -> u64 {
        self.period_index
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Ask a running loop to finish after the current period. The request
    /// sticks: a stop issued before `run` makes it return at once, until
    /// [`resume`](Self::resume) clears it.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Clear an earlier stop request
    pub fn resume(&self) {
        self.running.store(true, Ordering::SeqCst);
    }

    /// Shared stop flag, e.g. for a Ctrl+C handler
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    /// Execute exactly one period without pacing and return its work time
    pub fn tick_once(&mut self) -> Duration {
        self.period_index += 1;
        let period = self.period_index;
        self.tree.telemetry().set_period(period);

        let start = Instant::now();

        for hook in self.hooks.iter_mut() {
            hook(period);
        }

        for (node, input) in self.interrupts.iter_mut() {
            if input.poll() {
                let aborted = self.tree.abort_active(*node);
                let name = self.tree.node(*node).map(|n| n.name()).unwrap_or("<unknown>");
                self.stats.interrupts_routed += 1;
                self.tree
                    .telemetry()
                    .emit(TelemetryEvent::InterruptRouted { node: name, aborted });
            }
        }

        self.tree.tick();

        let work = start.elapsed();
        self.stats.record(work);
        if work > self.budget {
            self.stats.violations += 1;
            log::warn!(
                "[{}] Period {} overran its budget: {:?} > {:?}",
                self.name,
                period,
                work,
                self.budget
            );
            self.tree.telemetry().emit(TelemetryEvent::SchedulingViolation {
                elapsed_us: work.as_micros() as u64,
                budget_us: self.budget.as_micros() as u64,
            });
        }
        work
    }

    /// Execute `count` periods back to back without pacing
    pub fn run_ticks(&mut self, count: u64) {
        for _ in 0..count {
            self.tick_once();
        }
    }

    /// Run paced periods until stopped, then abort every active task
    pub fn run(&mut self) {
        self.run_loop(Limit::Forever);
    }

    /// Run paced periods for `duration`, then abort every active task
    pub fn run_for(&mut self, duration: Duration) {
        self.run_loop(Limit::Duration(duration));
    }

    /// Run `count` paced periods, then abort every active task
    pub fn run_periods(&mut self, count: u64) {
        self.run_loop(Limit::Periods(count));
    }

    fn run_loop(&mut self, limit: Limit) {
        if !self.is_running() {
            log::info!("[{}] Stop requested before start, not running", self.name);
        }
        log::info!(
            "[{}] Scheduler started: period {:?}, budget {:?}, {} nodes",
            self.name,
            self.period,
            self.budget,
            self.tree.len()
        );

        let start = Instant::now();
        let first = self.period_index;
        let mut next = start;

        while self.is_running() {
            match limit {
                Limit::Forever => {}
                Limit::Duration(max) => {
                    if start.elapsed() >= max {
                        log::info!("[{}] Reached time limit of {:?}", self.name, max);
                        break;
                    }
                }
                Limit::Periods(count) => {
                    if self.period_index - first >= count {
                        break;
                    }
                }
            }

            self.tick_once();

            // Late periods run back to back so none are skipped
            next += self.period;
            let now = Instant::now();
            if next > now {
                std::thread::sleep(next - now);
            }
        }

        let aborted = self.tree.abort_all();
        if aborted > 0 {
            log::info!("[{}] Aborted {} active tasks on shutdown", self.name, aborted);
        }
        log::info!(
            "[{}] Scheduler stopped after {} periods ({} budget violations)",
            self.name,
            self.stats.periods,
            self.stats.violations
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{NodeSpec, TreeBuilder};
    use crate::hardware::{shared, BooleanSensor};
    use crate::telemetry::Telemetry;
    use std::sync::atomic::AtomicU64;

    struct Button(Arc<AtomicBool>);

    impl BooleanSensor for Button {
        fn read(&self) -> bool {
            self.0.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn test_abort_input_fires_on_rising_edge_only() {
        let pressed = Arc::new(AtomicBool::new(false));
        let mut input = AbortInput::new(shared(Button(pressed.clone())));
        assert!(!input.poll());
        pressed.store(true, Ordering::SeqCst);
        assert!(input.poll());
        assert!(!input.poll());
        pressed.store(false, Ordering::SeqCst);
        assert!(!input.poll());
        pressed.store(true, Ordering::SeqCst);
        assert!(input.poll());
    }

    #[test]
    fn test_hooks_run_once_per_period() {
        let mut builder = TreeBuilder::new();
        builder.add_root(NodeSpec::new("robot"));
        let mut scheduler = Scheduler::new(builder.build(Telemetry::disabled()));

        let seen = Arc::new(AtomicU64::new(0));
        let hook_seen = seen.clone();
        scheduler.add_period_hook(move |period| {
            hook_seen.store(period, Ordering::SeqCst);
        });
        scheduler.run_ticks(5);
        assert_eq!(seen.load(Ordering::SeqCst), 5);
        assert_eq!(scheduler.stats().periods, 5);
        assert_eq!(scheduler.tree().telemetry().period(), 5);
    }

    #[test]
    fn test_run_periods_paces_and_stops() {
        let mut builder = TreeBuilder::new();
        builder.add_root(NodeSpec::new("robot"));
        let mut scheduler = Scheduler::new(builder.build(Telemetry::disabled()))
            .with_period(Duration::from_millis(2))
            .with_name("paced");

        let start = Instant::now();
        scheduler.run_periods(5);
        assert_eq!(scheduler.period_index(), 5);
        assert!(start.elapsed() >= Duration::from_millis(8));
    }

    #[test]
    fn test_stats_track_min_max() {
        let mut stats = SchedulerStats::default();
        stats.record(Duration::from_micros(30));
        stats.record(Duration::from_micros(10));
        stats.record(Duration::from_micros(20));
        assert_eq!(stats.min_work_us, 10);
        assert_eq!(stats.max_work_us, 30);
        assert_eq!(stats.avg_work_us(), 20);
        assert_eq!(stats.last_work_us, 20);
    }
}
