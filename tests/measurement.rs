mod common;

use std::env;
use std::io;
use std::time::Duration;

use assert_cmd::Command;
use predicates::prelude::*;

use memprobe::error::ErrorKind;
use memprobe::{
    watchdog, Coordinator, EventSpec, Identity, LocalGroup, Measurement, RandomTouch, Registry,
    RunConfiguration, Watchdog, MAX_EVENTS,
};

use common::{BrokenPipe, FakeCounters, Idle, NoMemory, Stall};

const KNOWN: [&str; 4] = ["PAPI_L1_DCM", "PAPI_L1_DCA", "PAPI_L3_TCM", "PAPI_L3_TCA"];

fn leader() -> Identity {
    Identity { rank: 0, size: 1 }
}

fn config(names: &[&str]) -> RunConfiguration {
    let events = EventSpec::new(names.iter().copied()).expect("bad event list");
    RunConfiguration::new(Duration::from_secs(120), events)
}

#[test]
fn test_resolve_preserves_order() {
    let fake = FakeCounters::new(&KNOWN);
    let registry = Registry::new(&fake);

    for n in 1..=KNOWN.len() {
        let names: Vec<&str> = KNOWN.iter().rev().take(n).copied().collect();
        let handles = registry
            .resolve(&EventSpec::new(names.clone()).unwrap())
            .unwrap();

        assert_eq!(handles.len(), n);
        for (name, handle) in names.iter().zip(&handles) {
            assert_eq!(KNOWN[handle.code() as usize], *name);
        }
    }
}

#[test]
fn test_resolve_full_event_list() {
    let names: Vec<&'static str> = (0..MAX_EVENTS).map(|i| KNOWN[i % KNOWN.len()]).collect();
    let fake = FakeCounters::new(&KNOWN);

    let handles = Registry::new(&fake)
        .resolve(&EventSpec::new(names).unwrap())
        .unwrap();
    assert_eq!(handles.len(), MAX_EVENTS);
}

#[test]
fn test_resolve_rejects_any_unknown_name() {
    let fake = FakeCounters::new(&KNOWN);
    let registry = Registry::new(&fake);

    for pos in 0..3 {
        let mut names = vec!["PAPI_L1_DCM", "PAPI_L3_TCA", "PAPI_L1_DCA"];
        names[pos] = "BAD_EVENT_NAME";

        let err = registry
            .resolve(&EventSpec::new(names).unwrap())
            .unwrap_err();
        assert_eq!(
            err.kind(),
            &ErrorKind::UnknownEvent("BAD_EVENT_NAME".to_string())
        );
    }
}

#[test]
fn test_measure_reports_in_event_order() {
    let fake = FakeCounters::new(&KNOWN);
    let calls = fake.calls.clone();
    let cfg = config(&["PAPI_L3_TCA", "PAPI_L1_DCM"]);

    let mut out = Vec::new();
    let mut diag = Vec::new();
    let samples = Measurement::new(&cfg, leader(), fake, Idle)
        .run(&mut out, &mut diag)
        .unwrap();

    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].values(), &[401, 101]);

    assert_eq!(
        String::from_utf8(out).unwrap(),
        "== Counters (rank 0):\nPAPI_L3_TCA: 401\nPAPI_L1_DCM: 101\n"
    );
    assert_eq!(String::from_utf8(diag).unwrap(), "1 MiB: OK\n");

    assert_eq!(
        *calls.borrow(),
        vec!["create", "add", "start", "reset", "read", "release"]
    );
}

#[test]
fn test_unknown_event_touches_no_counters() {
    let fake = FakeCounters::new(&KNOWN);
    let calls = fake.calls.clone();
    let cfg = config(&["PAPI_L1_DCM", "BAD_EVENT_NAME"]);

    let mut out = Vec::new();
    let err = Measurement::new(&cfg, leader(), fake, Idle)
        .run(&mut out, &mut Vec::new())
        .unwrap_err();

    assert!(matches!(err.kind(), ErrorKind::UnknownEvent(name) if name == "BAD_EVENT_NAME"));
    assert!(out.is_empty());
    assert!(calls.borrow().is_empty());
}

#[test]
fn test_counter_failures_release_the_group() {
    let cases = [
        ("add", ErrorKind::AddEventsFailed),
        ("start", ErrorKind::StartFailed),
        ("reset", ErrorKind::ResetFailed),
        ("read", ErrorKind::ReadFailed),
    ];

    for (op, want) in cases.iter() {
        let fake = FakeCounters::failing(&KNOWN, *op);
        let calls = fake.calls.clone();
        let cfg = RunConfiguration::default();

        let mut out = Vec::new();
        let err = Measurement::new(&cfg, leader(), fake, Idle)
            .run(&mut out, &mut Vec::new())
            .unwrap_err();

        assert_eq!(err.kind(), want, "failing {}", op);
        assert!(out.is_empty(), "report written after {} failed", op);

        let calls = calls.borrow();
        assert_eq!(calls.last(), Some(&"release"), "failing {}: {:?}", op, calls);
        assert_eq!(calls.iter().filter(|c| **c == "release").count(), 1);
    }
}

#[test]
fn test_create_failure() {
    let fake = FakeCounters::failing(&KNOWN, "create");
    let calls = fake.calls.clone();
    let cfg = RunConfiguration::default();

    let err = Measurement::new(&cfg, leader(), fake, Idle)
        .run(&mut Vec::new(), &mut Vec::new())
        .unwrap_err();

    assert_eq!(err.kind(), &ErrorKind::GroupCreateFailed);
    assert_eq!(calls.borrow().first(), Some(&"create"));
}

#[test]
fn test_workload_allocation_failure_still_reports() {
    let fake = FakeCounters::new(&KNOWN);
    let workload = NoMemory::default();
    let runs = workload.runs.clone();
    let cfg = RunConfiguration::default();

    let mut out = Vec::new();
    let mut diag = Vec::new();
    let samples = Measurement::new(&cfg, leader(), fake, workload)
        .run(&mut out, &mut diag)
        .unwrap();

    assert_eq!(*runs.borrow(), 1);
    assert_eq!(samples[0].len(), 4);

    let out = String::from_utf8(out).unwrap();
    assert!(out.starts_with("== Counters (rank 0):\n"));
    assert_eq!(out.lines().count(), 5);

    let diag = String::from_utf8(diag).unwrap();
    assert!(diag.contains("Cannot alloc memory, 1 MiB"), "got {:?}", diag);
}

#[test]
fn test_oversized_workload_is_survivable() {
    let fake = FakeCounters::new(&KNOWN);
    let cfg = RunConfiguration::default().with_workload_bytes(usize::MAX / 2);

    let mut out = Vec::new();
    let mut diag = Vec::new();
    Measurement::new(&cfg, leader(), fake, RandomTouch::with_seed(7))
        .run(&mut out, &mut diag)
        .unwrap();

    assert!(String::from_utf8(diag).unwrap().contains("Cannot alloc memory"));
    assert!(String::from_utf8(out).unwrap().contains("PAPI_L3_TCA: "));
}

#[test]
fn test_multiple_passes() {
    let fake = FakeCounters::new(&KNOWN);
    let calls = fake.calls.clone();
    let cfg = config(&["PAPI_L1_DCA"]).with_passes(3);

    let mut out = Vec::new();
    let samples = Measurement::new(&cfg, Identity { rank: 2, size: 4 }, fake, Idle)
        .run(&mut out, &mut Vec::new())
        .unwrap();

    let values: Vec<i64> = samples.iter().map(|s| s.values()[0]).collect();
    assert_eq!(values, vec![201, 202, 203]);

    let out = String::from_utf8(out).unwrap();
    assert_eq!(out.matches("== Counters (rank 2):").count(), 3);

    let calls = calls.borrow();
    assert_eq!(calls.iter().filter(|c| **c == "reset").count(), 3);
    assert_eq!(calls.iter().filter(|c| **c == "start").count(), 1);
}

#[test]
fn test_unwritable_diagnostics_do_not_stop_the_pass() {
    let fake = FakeCounters::new(&KNOWN);
    let cfg = RunConfiguration::default();

    let mut out = Vec::new();
    let samples = Measurement::new(&cfg, leader(), fake, Idle)
        .run(&mut out, &mut BrokenPipe)
        .unwrap();

    assert_eq!(samples.len(), 1);
    assert!(String::from_utf8(out).unwrap().starts_with("== Counters (rank 0):\n"));

    let mut out = Vec::new();
    Measurement::new(&cfg, leader(), FakeCounters::new(&KNOWN), NoMemory::default())
        .run(&mut out, &mut BrokenPipe)
        .unwrap();
    assert!(!out.is_empty());
}

const WATCHDOG_PASS: &str = "MEMPROBE_WATCHDOG_PASS";

// A full pass under a one second watchdog, run in a child process by the
// tests below. `stall` makes the workload outlive the watchdog.
#[test]
fn watchdog_pass() {
    let stall = match env::var(WATCHDOG_PASS) {
        Ok(ref mode) if mode == "stall" => Duration::from_secs(30),
        Ok(_) => Duration::from_millis(0),
        Err(_) => return,
    };

    let group = LocalGroup::init().unwrap();
    let id = group.identity();
    let abort = group.abort_handle();
    let timeout = Duration::from_secs(1);

    let mut dog = Watchdog::arm(timeout, move || {
        watchdog::expire(&mut io::stderr(), "memprobe", timeout, id, abort)
    })
    .unwrap();

    let cfg = RunConfiguration::new(timeout, EventSpec::default());
    let stdout = io::stdout();
    Measurement::new(&cfg, id, FakeCounters::new(&KNOWN), Stall(stall))
        .run(&mut stdout.lock(), &mut io::stderr())
        .unwrap();

    group.barrier();
    dog.disarm();
}

fn watchdog_pass_cmd(mode: &str) -> Command {
    let mut cmd = Command::new(env::current_exe().unwrap());
    cmd.env(WATCHDOG_PASS, mode).args(&[
        "--exact",
        "watchdog_pass",
        "--nocapture",
        "--test-threads=1",
    ]);
    cmd
}

#[test]
fn test_watchdog_aborts_overrunning_pass() {
    watchdog_pass_cmd("stall")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("== Counters").not())
        .stderr(predicate::str::contains(
            "memprobe: watchdog expired after 1 secs (rank 0)\nAlarm clock\n",
        ));
}

#[test]
fn test_pass_within_timeout_reports() {
    watchdog_pass_cmd("quick")
        .assert()
        .success()
        .stdout(predicate::str::contains("== Counters (rank 0):\nPAPI_L1_DCM: "))
        .stderr(predicate::str::contains("watchdog expired").not());
}
