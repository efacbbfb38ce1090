use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use colored::*;
use gantry_core::telemetry::{FanoutSink, JsonLinesSink, LogSink, MemorySink};
use gantry_core::{Scheduler, Telemetry, TelemetryEvent, TelemetrySink};
use gantry_library::config::DEFAULT_CONFIG_PATH;
use gantry_library::{build_robot, GantryConfig, RobotNodes, SimRobot};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod script;

use script::{Script, StepReport};

#[derive(Parser)]
#[command(name = "gantry_sim")]
#[command(about = "GANTRY - run operator sessions against the simulated robot")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Robot configuration (YAML); defaults apply when the file is missing
    #[arg(short = 'c', long = "config", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Built-in scenario to run
    #[arg(short = 's', long = "scenario", value_enum, default_value_t = Scenario::GroundCollect)]
    scenario: Scenario,

    /// Session script (YAML); overrides --scenario
    #[arg(long = "script", value_name = "FILE")]
    script: Option<PathBuf>,

    /// Number of periods to run (defaults to the session's own length)
    #[arg(short = 'n', long = "periods")]
    periods: Option<u64>,

    /// Pace periods in real time instead of running them back to back
    #[arg(short = 'r', long = "realtime")]
    realtime: bool,

    /// Stop early once every step was applied and all nodes are idle
    #[arg(long = "until-idle")]
    until_idle: bool,

    /// Write telemetry as JSON lines to this file
    #[arg(short = 't', long = "telemetry-out", value_name = "FILE")]
    telemetry_out: Option<PathBuf>,

    /// Print the scheduler statistics as JSON at the end
    #[arg(long = "json-stats")]
    json_stats: bool,

    /// Print the effective configuration as YAML and exit
    #[arg(long = "print-config")]
    print_config: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Scenario {
    GroundCollect,
    CollectAndPlace,
    ManualPlace,
    AbortButton,
    Rejections,
}

impl Scenario {
    fn script(self) -> Script {
        match self {
            Scenario::GroundCollect => Script::ground_collect(),
            Scenario::CollectAndPlace => Script::collect_and_place(),
            Scenario::ManualPlace => Script::manual_place(),
            Scenario::AbortButton => Script::abort_button(),
            Scenario::Rejections => Script::rejections(),
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    "gantry_sim=info,gantry=info,gantry_core=info,gantry_library=info".into()
                }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let config = GantryConfig::load_or_default(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    if cli.print_config {
        print!("{}", config.to_yaml()?);
        return Ok(());
    }

    let script = match &cli.script {
        Some(path) => Script::load(path)?,
        None => cli.scenario.script(),
    };
    let periods = cli.periods.unwrap_or(script.periods);
    if periods == 0 {
        bail!("session '{}' has no periods to run", script.name);
    }

    let session = uuid::Uuid::new_v4().to_string();
    let memory = Arc::new(MemorySink::with_capacity(16_384));
    let mut sinks: Vec<Arc<dyn TelemetrySink>> = vec![Arc::new(LogSink), memory.clone()];
    if let Some(path) = &cli.telemetry_out {
        let file = File::create(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        sinks.push(Arc::new(JsonLinesSink::new(BufWriter::new(file), session.clone())));
    }
    let telemetry = Telemetry::new(Arc::new(FanoutSink::new(sinks)));

    let sim = SimRobot::new(&config);
    let robot = build_robot(&config, sim.hardware(), telemetry)?;
    let (mut scheduler, nodes, _hardware) = robot.into_scheduler(&config);

    let mut world = sim.world();
    scheduler.add_period_hook(move |_| world.step());
    scheduler.add_abort_input(nodes.robot, sim.abort_input());

    let running = scheduler.stop_handle();
    ctrlc::set_handler(move || {
        eprintln!("{}", "\nCtrl+C received! Stopping GANTRY simulation...".red());
        running.store(false, Ordering::SeqCst);
    })
    .context("failed to install Ctrl+C handler")?;

    println!(
        "{} {} ({})",
        "Running session".green().bold(),
        script.name.cyan(),
        if script.description.is_empty() {
            "scripted"
        } else {
            script.description.as_str()
        }
    );
    println!(
        "  {} periods of {:?}, session {}",
        periods,
        scheduler.period(),
        session.dimmed()
    );
    tracing::info!(session = %session, periods, "session started");

    let started = Instant::now();
    let rejected = run_session(&mut scheduler, &sim, &script, periods, &cli);
    let aborted = scheduler.tree_mut().abort_all();
    if aborted > 0 {
        tracing::info!(aborted, "aborted tasks still active at the end of the session");
    }

    print_summary(&scheduler, nodes, &memory, started, rejected);
    if cli.json_stats {
        println!("{}", serde_json::to_string_pretty(scheduler.stats())?);
    }
    Ok(())
}

/// Apply the script while stepping the scheduler; returns the rejection count
fn run_session(
    scheduler: &mut Scheduler,
    sim: &SimRobot,
    script: &Script,
    periods: u64,
    cli: &Cli,
) -> usize {
    let mut runner = script.runner();
    let mut rejected = 0;
    let mut next = Instant::now();

    while scheduler.is_running() && scheduler.period_index() < periods {
        let upcoming = scheduler.period_index() + 1;
        for step in runner.due(upcoming) {
            let report = script::apply(step, scheduler.tree_mut(), sim);
            if report.is_rejection() {
                rejected += 1;
                println!("  [{:>5}] {}", upcoming, report.to_string().yellow());
            } else {
                println!("  [{:>5}] {}", upcoming, report);
            }
            if let StepReport::Accepted(ticket) = report {
                tracing::debug!(node = %ticket.node, serial = ticket.serial, "step accepted");
            }
        }

        scheduler.tick_once();

        if cli.until_idle && runner.is_finished() && all_idle(scheduler) {
            tracing::info!(period = scheduler.period_index(), "all nodes idle");
            break;
        }

        if cli.realtime {
            next += scheduler.period();
            let now = Instant::now();
            if next > now {
                std::thread::sleep(next - now);
            }
        }
    }

    if !scheduler.is_running() {
        println!("{}", "Session interrupted".red());
    }
    rejected
}

fn all_idle(scheduler: &Scheduler) -> bool {
    scheduler.tree().nodes().all(|node| node.is_idle())
}

fn event_kind(event: &TelemetryEvent) -> &'static str {
    match event {
        TelemetryEvent::OperationAccepted { .. } => "operation_accepted",
        TelemetryEvent::OperationRejected { .. } => "operation_rejected",
        TelemetryEvent::TaskStarted { .. } => "task_started",
        TelemetryEvent::TaskCompleted { .. } => "task_completed",
        TelemetryEvent::TaskAborted { .. } => "task_aborted",
        TelemetryEvent::TaskFailed { .. } => "task_failed",
        TelemetryEvent::PhaseChanged { .. } => "phase_changed",
        TelemetryEvent::AbortFault { .. } => "abort_fault",
        TelemetryEvent::InterruptRouted { .. } => "interrupt_routed",
        TelemetryEvent::SchedulingViolation { .. } => "scheduling_violation",
    }
}

fn print_summary(
    scheduler: &Scheduler,
    nodes: RobotNodes,
    memory: &MemorySink,
    started: Instant,
    rejected: usize,
) {
    let stats = scheduler.stats();
    println!();
    println!("{}", "Session summary".green().bold());
    println!(
        "  periods: {}  wall time: {:.2?}  rejected steps: {}",
        stats.periods,
        started.elapsed(),
        rejected
    );
    println!(
        "  work per period: min {}us  avg {}us  max {}us",
        stats.min_work_us,
        stats.avg_work_us(),
        stats.max_work_us
    );
    let violations = format!("{}", stats.violations);
    println!(
        "  budget violations: {}  abort inputs routed: {}",
        if stats.violations > 0 {
            violations.red()
        } else {
            violations.normal()
        },
        stats.interrupts_routed
    );

    println!("{}", "Nodes".green().bold());
    for node in scheduler.tree().nodes() {
        let m = node.metrics();
        let marker = if node.id() == nodes.robot { "*" } else { " " };
        println!(
            "  {}{:<10} accepted {:>3}  rejected {:>3}  completed {:>3}  aborted {:>3}  failed {:>3}",
            marker,
            node.name().cyan(),
            m.accepted,
            m.rejected,
            m.completed,
            m.aborted,
            m.failed
        );
    }

    let mut counts: BTreeMap<&'static str, usize> = BTreeMap::new();
    for event in memory.events() {
        *counts.entry(event_kind(&event)).or_default() += 1;
    }
    println!("{}", "Telemetry".green().bold());
    for (kind, count) in counts {
        println!("  {:<22} {}", kind, count);
    }
}
