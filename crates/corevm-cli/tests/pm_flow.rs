//! Integration tests for the program-manager state machine, exercising
//! `corevm-cli`'s public API the way the interactive shell would.

use corevm_cli::pm::{ProgramManager, ProgramState};

#[test]
fn submit_run_finished_flow() {
    let mut pm = ProgramManager::new();
    let pid = pm.submit("add").expect("submit should succeed");
    assert_eq!(pm.state(pid), Some(ProgramState::Submitted));

    pm.run(pid).expect("run should succeed");
    assert_eq!(pm.state(pid), Some(ProgramState::Finished));
}

#[test]
fn submit_debug_breakpoint_hit_continue_finished_flow() {
    let mut pm = ProgramManager::new();
    let pid = pm.submit("counter").expect("submit should succeed");

    let mut hits = 0;
    pm.debug(pid, |dbg| {
        dbg.start_session();
        dbg.add_breakpoint(2);
        loop {
            let report = dbg.cont();
            if report.starts_with("Hit breakpoint") {
                hits += 1;
            } else {
                assert_eq!(report, "Program finished");
                break;
            }
        }
    })
    .expect("debug session should succeed");

    assert_eq!(hits, 3);
    assert_eq!(pm.state(pid), Some(ProgramState::Finished));
}

#[test]
fn kill_tears_down_a_running_program() {
    let mut pm = ProgramManager::new();
    let pid = pm.submit("counter").expect("submit should succeed");
    pm.kill(pid).expect("kill should succeed");
    assert_eq!(pm.state(pid), Some(ProgramState::Finished));
    assert!(pm.memstat(pid).is_err(), "killed program has no VM instance");
}

#[test]
fn memstat_and_leaks_after_completion_report_a_clean_heap() {
    let mut pm = ProgramManager::new();
    let pid = pm.submit("add").expect("submit should succeed");
    pm.run(pid).expect("run should succeed");

    let memstat = pm.memstat(pid).expect("memstat should succeed");
    assert!(memstat.contains("GC Objects:    0"));

    let leaks = pm.leaks(pid).expect("leaks should succeed");
    assert_eq!(leaks, format!("PID {pid}: No leaks detected (0 objects on heap)"));
}

#[test]
fn list_reports_every_submitted_program() {
    let mut pm = ProgramManager::new();
    let first = pm.submit("add").unwrap();
    let second = pm.submit("branch").unwrap();
    pm.run(first).unwrap();

    let listing = pm.list();
    assert!(listing.contains("FINISHED"));
    assert!(listing.contains("SUBMITTED"));
    assert!(listing.contains("add"));
    assert!(listing.contains("branch"));
    let _ = second;
}

#[test]
fn submitting_an_unknown_example_fails_without_allocating_a_pid() {
    let mut pm = ProgramManager::new();
    assert!(pm.submit("does-not-exist").is_err());
    assert_eq!(pm.list(), "No programs submitted");
}

#[test]
fn division_by_zero_program_reaches_error_state() {
    let mut pm = ProgramManager::new();
    let pid = pm.submit("divzero").unwrap();
    pm.run(pid).unwrap();
    assert_eq!(pm.state(pid), Some(ProgramState::Error));
}

#[test]
fn debug_is_allowed_after_a_program_has_already_errored() {
    let mut pm = ProgramManager::new();
    let pid = pm.submit("divzero").unwrap();
    pm.run(pid).unwrap();
    assert_eq!(pm.state(pid), Some(ProgramState::Error));

    pm.debug(pid, |dbg| {
        dbg.start_session();
        assert_eq!(dbg.cont(), "Program finished");
    })
    .expect("debugging a finished-in-error program should be allowed");
    assert_eq!(pm.state(pid), Some(ProgramState::Finished));
}
