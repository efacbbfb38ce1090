// Arbitration, abort and fault handling of the resource tree
use gantry_core::telemetry::MemorySink;
use gantry_core::{
    Advance, CompositeTask, GantryError, GantryResult, NodeId, NodeSpec, Operation, Phase,
    PhaseLabel, RejectionCause, ResourceTree, RuleSet, Slot, Task, TaskContext, TaskOutcome,
    Telemetry, TelemetryEvent, TicketStatus, TreeBuilder,
};
use gantry_core::{DomainConstraints, GamePiece, Level};
use parking_lot::Mutex;
use std::sync::Arc;

/// What a probe does at each lifecycle call
#[derive(Clone, Copy, Default)]
enum Fault {
    #[default]
    None,
    Error,
    Panic,
}

fn inject(fault: Fault, call: &str) -> GantryResult<()> {
    match fault {
        Fault::None => Ok(()),
        Fault::Error => Err(GantryError::hardware("probe", format!("{} failed", call))),
        Fault::Panic => panic!("probe panicked in {}", call),
    }
}

/// Records every lifecycle call into a shared journal
#[derive(Clone, Default)]
struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    fn push(&self, entry: String) {
        self.0.lock().push(entry);
    }
    fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }
    fn count(&self, entry: &str) -> usize {
        self.0.lock().iter().filter(|e| e.as_str() == entry).count()
    }
}

struct Probe {
    name: &'static str,
    journal: Journal,
    ticks_to_finish: Option<u32>,
    ticks: u32,
    on_start: Fault,
    on_tick: Fault,
    on_abort: Fault,
}

impl Probe {
    fn new(name: &'static str, journal: &Journal) -> Self {
        Self {
            name,
            journal: journal.clone(),
            ticks_to_finish: None,
            ticks: 0,
            on_start: Fault::None,
            on_tick: Fault::None,
            on_abort: Fault::None,
        }
    }

    fn finishing_after(mut self, ticks: u32) -> Self {
        self.ticks_to_finish = Some(ticks);
        self
    }

    fn failing_start(mut self, fault: Fault) -> Self {
        self.on_start = fault;
        self
    }

    fn failing_tick(mut self, fault: Fault) -> Self {
        self.on_tick = fault;
        self
    }

    fn failing_abort(mut self, fault: Fault) -> Self {
        self.on_abort = fault;
        self
    }
}

impl Task for Probe {
    fn name(&self) -> &'static str {
        self.name
    }

    fn start(&mut self, ctx: &mut TaskContext<'_>) -> GantryResult<()> {
        self.journal.push(format!("{}:start@{}", self.name, ctx.node_name()));
        inject(self.on_start, "start")
    }

    fn tick(&mut self, ctx: &mut TaskContext<'_>) -> GantryResult<()> {
        self.ticks += 1;
        self.journal.push(format!("{}:tick@{}", self.name, ctx.node_name()));
        inject(self.on_tick, "tick")
    }

    fn is_complete(&self) -> bool {
        self.ticks_to_finish.is_some_and(|n| self.ticks >= n)
    }

    fn abort(&mut self, _ctx: &mut TaskContext<'_>) -> GantryResult<()> {
        self.journal.push(format!("{}:abort", self.name));
        inject(self.on_abort, "abort")
    }
}

struct Rig {
    tree: ResourceTree,
    sink: Arc<MemorySink>,
    robot: NodeId,
    arm: NodeId,
    grabber: NodeId,
    journal: Journal,
}

fn rig() -> Rig {
    let sink = Arc::new(MemorySink::new());
    let journal = Journal::default();
    let factory_journal = journal.clone();

    let mut builder = TreeBuilder::new();
    let robot = builder.add_root(
        NodeSpec::new("robot")
            .with_rules(RuleSet::manipulator(&DomainConstraints::default()))
            .with_factory(move |op: &Operation| -> GantryResult<Box<dyn Task>> {
                if op.level() == Level::High {
                    return Err(GantryError::construction("place", "no setpoint for level High"));
                }
                Ok(Box::new(Probe::new("operation", &factory_journal)))
            }),
    );
    let arm = builder.add_child(robot, NodeSpec::new("arm")).unwrap();
    let grabber = builder.add_child(robot, NodeSpec::new("grabber")).unwrap();
    let tree = builder.build(Telemetry::new(sink.clone()));

    Rig {
        tree,
        sink,
        robot,
        arm,
        grabber,
        journal,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Reach {
    Moving,
    Done,
}

impl PhaseLabel for Reach {
    fn label(self) -> &'static str {
        match self {
            Reach::Moving => "Moving",
            Reach::Done => "Done",
        }
    }
}

#[test]
fn test_mutual_exclusion() {
    let mut rig = rig();
    let first = rig
        .tree
        .submit_task(rig.arm, Box::new(Probe::new("first", &rig.journal)))
        .unwrap();

    let rejection = rig
        .tree
        .submit_task(rig.arm, Box::new(Probe::new("second", &rig.journal)))
        .unwrap_err();
    assert!(matches!(rejection.cause, RejectionCause::Busy { active: "first" }));

    // Busy rejection leaves the first task untouched
    assert_eq!(rig.tree.ticket_status(first), TicketStatus::Running);
    assert_eq!(rig.tree.active_task(rig.arm).unwrap().name, "first");
    assert_eq!(rig.journal.count("second:start@arm"), 0);
    assert_eq!(rig.journal.count("first:abort"), 0);

    rig.tree.tick();
    assert_eq!(rig.journal.count("first:tick@arm"), 1);
}

#[test]
fn test_busy_operation_rejected_without_building() {
    let mut rig = rig();
    let op = Operation::collect(Slot::Left, GamePiece::Cube);
    rig.tree.submit(rig.robot, op).unwrap();
    let rejection = rig.tree.submit(rig.robot, op).unwrap_err();
    assert!(rejection.is_busy());
    assert_eq!(rig.journal.count("operation:start@robot"), 1);
    assert_eq!(rig.tree.node(rig.robot).unwrap().metrics().rejected, 1);
}

#[test]
fn test_validator_gate() {
    let mut rig = rig();
    let ground_place = Operation::place(Slot::Left, Level::Low, GamePiece::Cube).on_ground();
    let rejection = rig.tree.submit(rig.robot, ground_place).unwrap_err();
    assert!(rejection.is_invalid());
    assert!(rig.tree.is_idle(rig.robot));

    let middle_collect = Operation::collect(Slot::Middle, GamePiece::Cube);
    assert!(rig.tree.submit(rig.robot, middle_collect).unwrap_err().is_invalid());
    assert!(rig.journal.entries().is_empty());

    assert_eq!(
        rig.sink.count(|e| matches!(e, TelemetryEvent::OperationRejected { code: "invalid", .. })),
        2
    );
}

#[test]
fn test_construction_fault_rejects_and_stays_idle() {
    let mut rig = rig();
    let high = Operation::place(Slot::Left, Level::High, GamePiece::Cube);
    let rejection = rig.tree.submit(rig.robot, high).unwrap_err();
    assert!(matches!(rejection.cause, RejectionCause::Construction(_)));
    assert!(rig.tree.is_idle(rig.robot));
    assert!(rig.journal.entries().is_empty());
}

#[test]
fn test_node_without_dispatcher_rejects_operations() {
    let mut rig = rig();
    let op = Operation::collect(Slot::Left, GamePiece::Cone);
    let rejection = rig.tree.submit(rig.arm, op).unwrap_err();
    assert_eq!(rejection.cause, RejectionCause::NoDispatcher);
}

#[test]
fn test_unknown_node_name_rejected() {
    let mut rig = rig();
    let op = Operation::stow();
    let rejection = rig.tree.submit_to("turret", op).unwrap_err();
    assert_eq!(rejection.cause, RejectionCause::UnknownNode);
    assert!(rig.tree.submit_to("robot", op).is_ok());
}

#[test]
fn test_start_fault_quiesces_and_stays_idle() {
    for fault in [Fault::Error, Fault::Panic] {
        let mut rig = rig();
        let probe = Probe::new("broken", &rig.journal).failing_start(fault);
        let rejection = rig.tree.submit_task(rig.arm, Box::new(probe)).unwrap_err();
        assert!(matches!(rejection.cause, RejectionCause::Construction(_)));
        assert!(rig.tree.is_idle(rig.arm));
        assert_eq!(
            rig.journal.entries(),
            vec!["broken:start@arm".to_string(), "broken:abort".to_string()]
        );
    }
}

#[test]
fn test_tick_fault_aborts_and_idles() {
    for fault in [Fault::Error, Fault::Panic] {
        let mut rig = rig();
        let probe = Probe::new("flaky", &rig.journal).failing_tick(fault);
        let ticket = rig.tree.submit_task(rig.arm, Box::new(probe)).unwrap();
        rig.tree.tick();

        assert!(rig.tree.is_idle(rig.arm));
        assert_eq!(rig.journal.count("flaky:abort"), 1);
        assert!(matches!(
            rig.tree.ticket_status(ticket),
            TicketStatus::Finished(TaskOutcome::Failed(_))
        ));
        assert_eq!(
            rig.sink.count(|e| matches!(e, TelemetryEvent::TaskFailed { task: "flaky", .. })),
            1
        );
    }
}

#[test]
fn test_idle_on_abort_even_when_abort_faults() {
    for fault in [Fault::None, Fault::Error, Fault::Panic] {
        let mut rig = rig();
        let probe = Probe::new("stubborn", &rig.journal).failing_abort(fault);
        let ticket = rig.tree.submit_task(rig.arm, Box::new(probe)).unwrap();

        assert_eq!(rig.tree.abort_active(rig.arm), Some("stubborn"));
        assert!(rig.tree.is_idle(rig.arm));
        assert_eq!(
            rig.tree.ticket_status(ticket),
            TicketStatus::Finished(TaskOutcome::Aborted)
        );

        // Second abort has nothing to do
        assert_eq!(rig.tree.abort_active(rig.arm), None);
        assert_eq!(rig.journal.count("stubborn:abort"), 1);

        let faults = rig.sink.count(|e| matches!(e, TelemetryEvent::AbortFault { .. }));
        let expected = if matches!(fault, Fault::None) { 0 } else { 1 };
        assert_eq!(faults, expected);
        assert_eq!(rig.tree.node(rig.arm).unwrap().metrics().abort_faults, expected as u64);

        // The node accepts new work right away
        assert!(rig
            .tree
            .submit_task(rig.arm, Box::new(Probe::new("next", &rig.journal)))
            .is_ok());
    }
}

#[test]
fn test_cascading_cancellation_across_two_nodes() {
    let mut rig = rig();
    let composite = CompositeTask::new("reach", Reach::Done).phase(
        Phase::new(Reach::Moving, Advance::AllComplete)
            .await_task(rig.arm, Box::new(Probe::new("arm_move", &rig.journal)))
            .background(rig.grabber, Box::new(Probe::new("roller", &rig.journal))),
    );
    rig.tree.submit_task(rig.robot, Box::new(composite)).unwrap();
    rig.tree.tick();
    assert!(!rig.tree.is_idle(rig.arm));
    assert!(!rig.tree.is_idle(rig.grabber));

    rig.tree.abort_active(rig.robot);

    assert!(rig.tree.is_idle(rig.robot));
    assert!(rig.tree.is_idle(rig.arm));
    assert!(rig.tree.is_idle(rig.grabber));
    assert_eq!(rig.journal.count("arm_move:abort"), 1);
    assert_eq!(rig.journal.count("roller:abort"), 1);
}

#[test]
fn test_cascading_cancellation_through_nested_composites() {
    let sink = Arc::new(MemorySink::new());
    let journal = Journal::default();
    let mut builder = TreeBuilder::new();
    let base = builder.add_root(NodeSpec::new("base"));
    let shoulder = builder.add_child(base, NodeSpec::new("shoulder")).unwrap();
    let wrist = builder.add_child(shoulder, NodeSpec::new("wrist")).unwrap();
    let mut tree = builder.build(Telemetry::new(sink.clone()));

    let inner = CompositeTask::new("inner", Reach::Done).phase(
        Phase::new(Reach::Moving, Advance::AllComplete)
            .await_task(wrist, Box::new(Probe::new("wrist_move", &journal))),
    );
    let outer = CompositeTask::new("outer", Reach::Done).phase(
        Phase::new(Reach::Moving, Advance::AllComplete).await_task(shoulder, Box::new(inner)),
    );
    tree.submit_task(base, Box::new(outer)).unwrap();
    tree.tick();
    assert!(!tree.is_idle(wrist));
    assert!(!tree.is_idle(shoulder));

    assert_eq!(tree.abort_active(base), Some("outer"));

    assert!(tree.is_idle(base));
    assert!(tree.is_idle(shoulder));
    assert!(tree.is_idle(wrist));
    assert_eq!(journal.count("wrist_move:abort"), 1);

    // Deepest task is aborted first; the call returns only after all of them
    let aborted: Vec<String> = sink
        .events()
        .into_iter()
        .filter_map(|e| match e {
            TelemetryEvent::TaskAborted { node, .. } => Some(node.to_string()),
            _ => None,
        })
        .collect();
    assert_eq!(aborted, vec!["wrist", "shoulder", "base"]);
}

#[test]
fn test_sub_task_aborted_by_other_faults_composite() {
    let mut rig = rig();
    let composite = CompositeTask::new("reach", Reach::Done).phase(
        Phase::new(Reach::Moving, Advance::AllComplete)
            .await_task(rig.arm, Box::new(Probe::new("arm_move", &rig.journal)))
            .background(rig.grabber, Box::new(Probe::new("roller", &rig.journal))),
    );
    let ticket = rig.tree.submit_task(rig.robot, Box::new(composite)).unwrap();

    // Someone else pulls the arm out from under the composite
    rig.tree.abort_active(rig.arm);
    rig.tree.tick();

    assert!(matches!(
        rig.tree.ticket_status(ticket),
        TicketStatus::Finished(TaskOutcome::Failed(_))
    ));
    assert!(rig.tree.is_idle(rig.grabber));
    assert_eq!(rig.journal.count("roller:abort"), 1);
}

#[test]
fn test_delegation_to_busy_node_rejects_composite() {
    let mut rig = rig();
    rig.tree
        .submit_task(rig.arm, Box::new(Probe::new("manual_jog", &rig.journal)))
        .unwrap();

    let composite = CompositeTask::new("reach", Reach::Done).phase(
        Phase::new(Reach::Moving, Advance::AllComplete)
            .background(rig.grabber, Box::new(Probe::new("roller", &rig.journal)))
            .await_task(rig.arm, Box::new(Probe::new("arm_move", &rig.journal))),
    );
    let rejection = rig.tree.submit_task(rig.robot, Box::new(composite)).unwrap_err();
    assert!(rejection.to_string().contains("busy"));

    assert!(rig.tree.is_idle(rig.robot));
    assert!(rig.tree.is_idle(rig.grabber));
    assert_eq!(rig.tree.active_task(rig.arm).unwrap().name, "manual_jog");
}

#[test]
fn test_completion_is_latched() {
    let mut rig = rig();
    let ticket = rig
        .tree
        .submit_task(rig.arm, Box::new(Probe::new("short", &rig.journal).finishing_after(2)))
        .unwrap();

    rig.tree.tick();
    assert_eq!(rig.tree.ticket_status(ticket), TicketStatus::Running);
    rig.tree.tick();
    assert_eq!(
        rig.tree.ticket_status(ticket),
        TicketStatus::Finished(TaskOutcome::Completed)
    );

    for _ in 0..5 {
        rig.tree.tick();
    }
    assert_eq!(rig.journal.count("short:tick@arm"), 2);
    assert_eq!(rig.tree.abort_active(rig.arm), None);
    assert_eq!(rig.journal.count("short:abort"), 0);
    assert_eq!(
        rig.tree.ticket_status(ticket),
        TicketStatus::Finished(TaskOutcome::Completed)
    );
}

#[test]
fn test_stale_ticket_reports_recorded_outcome() {
    let mut rig = rig();
    let first = rig
        .tree
        .submit_task(rig.arm, Box::new(Probe::new("first", &rig.journal)))
        .unwrap();
    rig.tree.abort_active(rig.arm);
    let second = rig
        .tree
        .submit_task(rig.arm, Box::new(Probe::new("second", &rig.journal)))
        .unwrap();

    assert!(second.serial > first.serial);
    assert_eq!(
        rig.tree.ticket_status(first),
        TicketStatus::Finished(TaskOutcome::Aborted)
    );
    assert_eq!(rig.tree.ticket_status(second), TicketStatus::Running);

    let mut never = second;
    never.serial += 100;
    assert_eq!(rig.tree.ticket_status(never), TicketStatus::Expired);
}

#[test]
fn test_tick_visits_nodes_in_pre_order() {
    let journal = Journal::default();
    let mut builder = TreeBuilder::new();
    let robot = builder.add_root(NodeSpec::new("robot"));
    let arm = builder.add_child(robot, NodeSpec::new("arm")).unwrap();
    let wrist = builder.add_child(arm, NodeSpec::new("wrist")).unwrap();
    let grabber = builder.add_child(robot, NodeSpec::new("grabber")).unwrap();
    let lights = builder.add_root(NodeSpec::new("lights"));
    let mut tree = builder.build(Telemetry::disabled());

    assert_eq!(tree.tick_order(), &[robot, arm, wrist, grabber, lights]);

    for id in [lights, grabber, wrist, arm, robot] {
        tree.submit_task(id, Box::new(Probe::new("probe", &journal))).unwrap();
    }
    journal.0.lock().clear();
    tree.tick();

    assert_eq!(
        journal.entries(),
        vec![
            "probe:tick@robot",
            "probe:tick@arm",
            "probe:tick@wrist",
            "probe:tick@grabber",
            "probe:tick@lights",
        ]
    );
}

#[test]
fn test_duplicate_names_rejected_by_try_build() {
    let mut builder = TreeBuilder::new();
    let robot = builder.add_root(NodeSpec::new("robot"));
    builder.add_child(robot, NodeSpec::new("arm")).unwrap();
    builder.add_child(robot, NodeSpec::new("arm")).unwrap();
    assert!(matches!(
        builder.try_build(Telemetry::disabled()),
        Err(GantryError::Config(_))
    ));
}
