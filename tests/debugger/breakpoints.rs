use crate::common::{TestSession, RULES};
use ruledbg::debugger::ThreadState;
use ruledbg::sim::Function;
use serial_test::serial;
use std::thread;
use std::time::Duration;

#[test]
#[serial]
fn test_breakpoint_suspends_thread() {
    let mut session = TestSession::new();
    session.controller.set_breakpoint(42, RULES);

    // first two threads never reach the breakpoint
    for num in 1..=2 {
        let worker = session.spawn(Function::new("fire", RULES, 10));
        session.expect_event(&format!("THREAD_CREATE {num}"));
        worker.join().unwrap().unwrap();
    }

    let worker = session.spawn(
        Function::new("fire", RULES, 41).calls(Function::new("printout", RULES, 42)),
    );
    session.expect_event("THREAD_CREATE 3");
    session.expect_event("SUSPENDED_BREAK 3 42 9\nrules.clp");
    assert_eq!(
        session.controller.thread_state(3),
        Some(ThreadState::Suspended)
    );
    session.controller.join(3).unwrap();

    session.controller.resume(3).unwrap();
    session.expect_event("RESUMED 3");
    worker.join().unwrap().unwrap();
    assert_eq!(session.controller.thread_state(3), Some(ThreadState::Running));
}

#[test]
#[serial]
fn test_breakpoint_matches_base_name() {
    let mut session = TestSession::new();
    session.controller.set_breakpoint(7, "/home/user/rules/rules.clp");

    let worker = session.spawn(Function::new("fire", "/src/rules.clp", 7));
    session.expect_event("THREAD_CREATE 1");
    session.expect_event("SUSPENDED_BREAK 1 7 14\n/src/rules.clp");

    session.controller.resume(1).unwrap();
    session.expect_event("RESUMED 1");
    worker.join().unwrap().unwrap();
}

#[test]
#[serial]
fn test_breakpoint_hit_on_every_call() {
    let mut session = TestSession::new();
    session.controller.set_breakpoint(20, RULES);

    let rule = Function::new("modify", RULES, 20);
    let worker = session.spawn(
        Function::new("fire", RULES, 19)
            .calls(rule.clone())
            .calls(Function::new("printout", RULES, 21))
            .calls(rule),
    );
    session.expect_event("THREAD_CREATE 1");

    for _ in 0..2 {
        session.expect_event("SUSPENDED_BREAK 1 20 9\nrules.clp");
        session.controller.resume(1).unwrap();
        session.expect_event("RESUMED 1");
    }
    worker.join().unwrap().unwrap();
}

#[test]
#[serial]
fn test_remove_breakpoint() {
    let mut session = TestSession::new();
    session.controller.set_breakpoint(20, RULES);
    session.controller.set_breakpoint(21, RULES);
    session.controller.remove_breakpoint(20, RULES);
    // removing unknown breakpoint is not an error
    session.controller.remove_breakpoint(99, RULES);

    let worker = session.spawn(
        Function::new("fire", RULES, 19)
            .calls(Function::new("modify", RULES, 20))
            .calls(Function::new("printout", RULES, 21)),
    );
    session.expect_event("THREAD_CREATE 1");
    session.expect_event("SUSPENDED_BREAK 1 21 9\nrules.clp");
    assert!(session.calls().contains(&"return modify".to_string()));

    session.controller.resume(1).unwrap();
    session.expect_event("RESUMED 1");
    worker.join().unwrap().unwrap();
}

#[test]
#[serial]
fn test_suspend_running_thread() {
    let mut session = TestSession::new();
    session.controller.set_breakpoint(20, RULES);

    let worker = session.spawn(
        Function::new("fire", RULES, 19)
            .calls(Function::new("modify", RULES, 20))
            .calls(Function::new("printout", RULES, 21)),
    );
    session.expect_event("THREAD_CREATE 1");
    session.expect_event("SUSPENDED_BREAK 1 20 9\nrules.clp");

    // explicit suspend keeps the thread parked after resume of another thread
    session.controller.suspend(1).unwrap();
    session.expect_event("SUSPENDED 1");
    session.controller.resume(0).unwrap();
    session.expect_event("RESUMED 0");
    assert_eq!(
        session.controller.thread_state(1),
        Some(ThreadState::Suspended)
    );

    session.controller.resume(1).unwrap();
    session.expect_event("RESUMED 1");
    worker.join().unwrap().unwrap();
}

#[test]
#[serial]
fn test_resume_releases_only_target_thread() {
    let mut session = TestSession::new();
    session.controller.set_breakpoint(42, RULES);

    let rule = || Function::new("fire", RULES, 41).calls(Function::new("printout", RULES, 42));
    let first = session.spawn(rule());
    session.expect_event("THREAD_CREATE 1");
    session.expect_event("SUSPENDED_BREAK 1 42 9\nrules.clp");
    let second = session.spawn(rule());
    session.expect_event("THREAD_CREATE 2");
    session.expect_event("SUSPENDED_BREAK 2 42 9\nrules.clp");

    session.controller.resume(1).unwrap();
    session.expect_event("RESUMED 1");
    first.join().unwrap().unwrap();
    let calls = session.calls();

    // second thread was woken up too, but stays parked
    thread::sleep(Duration::from_millis(200));
    assert!(!second.is_finished());
    assert_eq!(
        session.controller.thread_state(2),
        Some(ThreadState::Suspended)
    );
    assert_eq!(session.calls(), calls);

    session.controller.resume(2).unwrap();
    session.expect_event("RESUMED 2");
    second.join().unwrap().unwrap();
}
