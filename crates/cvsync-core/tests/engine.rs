//! Engine behavior against the in-memory controller.

use cvsync_controller::mock::{Call, MockController};
use cvsync_controller::ApplyResult;
use cvsync_core::{
    diff, Action, CoreError, Engine, ManualClock, ObservedState, RunOptions, TaskStatus,
    DEFAULT_POLL_INTERVAL,
};
use cvsync_schema::{DesiredState, Ensure};
use std::time::Duration;

fn engine_with(ctl: MockController) -> (Engine<MockController>, ManualClock) {
    let clock = ManualClock::new();
    let engine = Engine::new(ctl).with_clock(clock.clone());
    (engine, clock)
}

fn inventory(hosts: &[&str]) -> MockController {
    let ctl = MockController::new();
    for host in hosts {
        ctl.add_device(host);
    }
    ctl
}

fn e23() -> DesiredState {
    DesiredState::new("e23", "interface Eth23\n no shutdown")
        .with_containers(["sw1"])
        .with_auto_run(true)
        .with_timeout_secs(30)
}

fn mutations(ctl: &MockController) -> Vec<Call> {
    ctl.calls()
        .into_iter()
        .filter(|c| {
            matches!(
                c,
                Call::AddConfiglet(_)
                    | Call::UpdateConfiglet(_)
                    | Call::DeleteConfiglet(_)
                    | Call::Apply { .. }
                    | Call::Remove { .. }
            )
        })
        .collect()
}

#[test]
fn create_attaches_and_fails_on_cancelled_task() {
    let ctl = inventory(&["sw1"]);
    ctl.queue_apply_reply(ApplyResult::with_tasks(["t1"]));
    ctl.script_task("t1", &["Cancelled"]);
    let (engine, _) = engine_with(ctl);

    let observed = engine.read("e23").unwrap();
    assert!(!observed.exists);

    let err = engine.create(&e23()).unwrap_err();
    match err {
        CoreError::TaskFailed { task_id, status } => {
            assert_eq!(task_id, "t1");
            assert_eq!(status, "Cancelled");
        }
        other => panic!("expected TaskFailed, got {other}"),
    }

    let ctl = engine.client();
    assert_eq!(
        mutations(ctl),
        vec![
            Call::AddConfiglet("e23".to_owned()),
            Call::Apply {
                device: "sw1".to_owned(),
                configlet: "e23".to_owned()
            },
        ]
    );
    assert_eq!(ctl.count_calls(|c| *c == Call::ExecuteTask("t1".to_owned())), 1);
    assert_eq!(ctl.count_calls(|c| *c == Call::GetTaskById("t1".to_owned())), 1);
}

#[test]
fn create_then_read_reflects_desired_state() {
    let ctl = inventory(&["sw1", "sw2", "sw3"]);
    let (engine, _) = engine_with(ctl);
    let desired = e23().with_containers(["sw3", "sw1"]);

    engine.create(&desired).unwrap();
    let observed = engine.read("e23").unwrap();

    assert!(observed.exists);
    assert_eq!(observed.content, desired.content.trim());
    let mut attached = observed.containers.clone();
    attached.sort();
    assert_eq!(attached, vec!["sw1", "sw3"]);
    assert_eq!(observed.attached_device_count, 2);
}

#[test]
fn create_attaches_in_declared_order() {
    let ctl = inventory(&["sw1", "sw2"]);
    let (engine, _) = engine_with(ctl);
    engine
        .create(&e23().with_containers(["sw2", "sw1"]))
        .unwrap();

    let applies: Vec<String> = engine
        .client()
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            Call::Apply { device, .. } => Some(device),
            _ => None,
        })
        .collect();
    assert_eq!(applies, vec!["sw2", "sw1"]);
}

#[test]
fn destroy_detaches_every_device_before_delete() {
    let ctl = inventory(&["sw1", "sw2"]);
    ctl.insert_configlet("e23", "interface Eth23\n");
    ctl.attach_direct("e23", "sw1");
    ctl.attach_direct("e23", "sw2");
    let (engine, _) = engine_with(ctl);

    engine.destroy("e23", RunOptions::default()).unwrap();

    assert_eq!(
        mutations(engine.client()),
        vec![
            Call::Remove {
                device: "sw1".to_owned(),
                configlet: "e23".to_owned()
            },
            Call::Remove {
                device: "sw2".to_owned(),
                configlet: "e23".to_owned()
            },
            Call::DeleteConfiglet("e23".to_owned()),
        ]
    );
    assert!(!engine.client().exists("e23"));
}

#[test]
fn busy_second_device_prevents_delete() {
    let ctl = inventory(&["sw1", "sw2"]);
    ctl.insert_configlet("e23", "interface Eth23\n");
    ctl.attach_direct("e23", "sw1");
    ctl.attach_direct("e23", "sw2");
    ctl.set_device_tasks("sw2", &["42"]);
    let (engine, _) = engine_with(ctl);

    let err = engine.destroy("e23", RunOptions::default()).unwrap_err();
    assert!(matches!(err, CoreError::BusyTarget { ref device, .. } if device == "sw2"));

    let ctl = engine.client();
    assert_eq!(
        mutations(ctl),
        vec![Call::Remove {
            device: "sw1".to_owned(),
            configlet: "e23".to_owned()
        }]
    );
    assert_eq!(ctl.count_calls(|c| matches!(c, Call::DeleteConfiglet(_))), 0);
    assert!(ctl.exists("e23"));
    assert_eq!(ctl.attached_to("e23"), vec!["sw2"]);
}

#[test]
fn converged_attachments_issue_no_calls() {
    let ctl = inventory(&["sw1", "sw2"]);
    ctl.insert_configlet("e23", "interface Eth23\n no shutdown\n");
    ctl.attach_direct("e23", "sw1");
    ctl.attach_direct("e23", "sw2");
    let (engine, _) = engine_with(ctl);
    let desired = e23().with_containers(["sw2", "sw1"]);

    for _ in 0..2 {
        let observed = engine.read("e23").unwrap();
        let delta = diff(&desired, &observed);
        assert!(delta.is_empty());
        engine
            .update_attachments("e23", &delta, RunOptions::from(&desired))
            .unwrap();
    }
    assert!(mutations(engine.client()).is_empty());
}

#[test]
fn auto_run_off_leaves_tasks_pending() {
    let ctl = inventory(&["sw1"]);
    ctl.queue_apply_reply(ApplyResult::with_tasks(["t1"]));
    ctl.script_task("t1", &["Pending"]);
    let (engine, clock) = engine_with(ctl);

    let tasks = engine.create(&e23().with_auto_run(false)).unwrap();
    assert!(tasks.is_empty());
    assert_eq!(
        engine
            .client()
            .count_calls(|c| matches!(c, Call::ExecuteTask(_) | Call::GetTaskById(_))),
        0
    );
    assert_eq!(clock.sleeps(), 0);
}

#[test]
fn stuck_task_times_out_with_last_status() {
    let ctl = inventory(&["sw1"]);
    ctl.queue_apply_reply(ApplyResult::with_tasks(["t1"]));
    ctl.script_task("t1", &["Configlet Push in Progress"]);
    let (engine, clock) = engine_with(ctl);

    let desired = e23().with_timeout_secs(DEFAULT_POLL_INTERVAL.as_secs());
    let err = engine.create(&desired).unwrap_err();
    match err {
        CoreError::TaskTimeout {
            task_id,
            last_status,
            ..
        } => {
            assert_eq!(task_id, "t1");
            assert_eq!(last_status, "Configlet Push in Progress");
        }
        other => panic!("expected TaskTimeout, got {other}"),
    }
    assert!(clock.elapsed() > Duration::from_secs(desired.timeout_secs));
}

#[test]
fn reconcile_creates_then_converges() {
    let ctl = inventory(&["sw1"]);
    ctl.queue_apply_reply(ApplyResult::with_tasks(["t1"]));
    ctl.script_task("t1", &["Pending", "In-Progress", "Completed"]);
    let (engine, _) = engine_with(ctl);

    let first = engine.reconcile(&e23(), false).unwrap();
    assert!(first.applied);
    assert!(!first.observed.exists);
    assert!(matches!(first.plan.actions[..], [Action::Create { .. }]));
    assert_eq!(first.tasks.len(), 1);
    assert_eq!(first.tasks[0].status, TaskStatus::Completed);

    let second = engine.reconcile(&e23(), false).unwrap();
    assert!(second.plan.is_converged());
    assert!(!second.applied);
}

#[test]
fn reconcile_updates_drifted_content_and_attachments() {
    let ctl = inventory(&["sw1", "sw2"]);
    ctl.insert_configlet("e23", "interface Eth23\n shutdown\n");
    ctl.attach_direct("e23", "sw2");
    ctl.set_pending_tasks("e23", &["t9"]);
    ctl.script_task("t9", &["Completed"]);
    let (engine, _) = engine_with(ctl);

    let report = engine.reconcile(&e23(), false).unwrap();
    assert_eq!(report.plan.actions.len(), 2);
    assert_eq!(report.tasks.len(), 1);

    let ctl = engine.client();
    assert_eq!(ctl.content_of("e23").unwrap(), "interface Eth23\n no shutdown\n");
    assert_eq!(ctl.attached_to("e23"), vec!["sw1"]);
}

#[test]
fn dry_run_changes_nothing() {
    let ctl = inventory(&["sw1"]);
    let (engine, _) = engine_with(ctl);

    let report = engine.reconcile(&e23(), true).unwrap();
    assert!(!report.applied);
    assert_eq!(report.plan.actions.len(), 1);
    assert!(mutations(engine.client()).is_empty());
    assert!(!engine.client().exists("e23"));
}

#[test]
fn reconcile_absent_destroys() {
    let ctl = inventory(&["sw1"]);
    ctl.insert_configlet("e23", "x");
    ctl.attach_direct("e23", "sw1");
    let (engine, _) = engine_with(ctl);

    let desired = e23().with_ensure(Ensure::Absent);
    let report = engine.reconcile(&desired, false).unwrap();
    assert!(report.applied);
    assert!(!engine.client().exists("e23"));
    assert_eq!(engine.read("e23").unwrap(), ObservedState::absent("e23"));
}
