use crate::common::{wait_until, TestSession, RULES};
use ruledbg::debugger::{Error, ThreadState};
use ruledbg::sim::Function;
use serial_test::serial;
use std::thread;
use std::time::Duration;

/// fire (10)
///   printout (11)
///     format (12)
///     format (13)
///   assert (14)
fn fire_rule() -> Function {
    Function::new("fire", RULES, 10)
        .bind("?x", "1")
        .calls(
            Function::new("printout", RULES, 11)
                .calls(Function::new("format", RULES, 12))
                .calls(Function::new("format", RULES, 13)),
        )
        .calls(Function::new("assert", RULES, 14))
}

#[test]
#[serial]
fn test_step() {
    let mut session = TestSession::new();
    session.controller.set_breakpoint(10, RULES);

    let worker = session.spawn(fire_rule());
    session.expect_event("THREAD_CREATE 1");
    session.expect_event("SUSPENDED_BREAK 1 10 9\nrules.clp");

    session.controller.step(1).unwrap();
    session.expect_event("RESUMED_STEP 1");
    session.expect_event("SUSPENDED_STEP 1");
    assert_eq!(session.last_call().as_deref(), Some("call printout"));
    assert_eq!(
        session.controller.thread_state(1),
        Some(ThreadState::Suspended)
    );

    session.controller.stack(1).unwrap();
    session.expect_event("STACK 1 42\nprintout,rules.clp,11|fire,rules.clp,10,?x");

    session.controller.step(1).unwrap();
    session.expect_event("RESUMED_STEP 1");
    session.expect_event("SUSPENDED_STEP 1");
    assert_eq!(session.last_call().as_deref(), Some("call format"));

    session.controller.resume(1).unwrap();
    session.expect_event("RESUMED 1");
    worker.join().unwrap().unwrap();
    assert_eq!(session.calls().len(), 10);
}

#[test]
#[serial]
fn test_step_over() {
    let mut session = TestSession::new();
    session.controller.set_breakpoint(11, RULES);

    let worker = session.spawn(fire_rule());
    session.expect_event("THREAD_CREATE 1");
    session.expect_event("SUSPENDED_BREAK 1 11 9\nrules.clp");

    session.controller.step_over(1).unwrap();
    session.expect_event("RESUMED_STEP 1");
    session.expect_event("SUSPENDED_STEP 1");

    // thread runs through nested calls and parks at the first call after `printout` returns
    wait_until("call of assert", || {
        session.last_call().as_deref() == Some("call assert")
    });
    thread::sleep(Duration::from_millis(100));
    assert_eq!(
        session.calls(),
        vec![
            "call fire",
            "call printout",
            "call format",
            "return format",
            "call format",
            "return format",
            "return printout",
            "call assert",
        ]
    );
    assert_eq!(
        session.controller.thread_state(1),
        Some(ThreadState::Suspended)
    );
    session.controller.stack(1).unwrap();
    session.expect_event("STACK 1 40\nassert,rules.clp,14|fire,rules.clp,10,?x");

    session.controller.resume(1).unwrap();
    session.expect_event("RESUMED 1");
    worker.join().unwrap().unwrap();
}

#[test]
#[serial]
fn test_step_over_recursive_call() {
    let mut session = TestSession::new();
    session.controller.set_breakpoint(30, RULES);

    // inner call of the same function must not end the step
    let inner = Function::new("walk", RULES, 31);
    let outer = Function::new("walk", RULES, 30).calls(inner);
    let worker = session.spawn(
        Function::new("fire", RULES, 29)
            .calls(outer)
            .calls(Function::new("printout", RULES, 32)),
    );
    session.expect_event("THREAD_CREATE 1");
    session.expect_event("SUSPENDED_BREAK 1 30 9\nrules.clp");

    session.controller.step_over(1).unwrap();
    session.expect_event("RESUMED_STEP 1");
    session.expect_event("SUSPENDED_STEP 1");

    wait_until("call of printout", || {
        session.last_call().as_deref() == Some("call printout")
    });
    let calls = session.calls();
    assert_eq!(
        &calls[calls.len() - 3..],
        &["return walk", "return walk", "call printout"]
    );

    session.controller.resume(1).unwrap();
    session.expect_event("RESUMED 1");
    worker.join().unwrap().unwrap();
}

#[test]
#[serial]
fn test_step_requires_suspended_thread() {
    let mut session = TestSession::new();

    // thread 0 is suspended but never called anything
    assert!(matches!(
        session.controller.step_over(0),
        Err(Error::NoCurrentCall(0))
    ));
    session.controller.resume(0).unwrap();
    session.expect_event("RESUMED 0");
    assert!(matches!(
        session.controller.step(0),
        Err(Error::NotSuspended(0))
    ));
    assert!(matches!(
        session.controller.stack(0),
        Err(Error::NotSuspended(0))
    ));
}

#[test]
#[serial]
fn test_step_over_completes_during_print() {
    let mut session = TestSession::new();
    session.controller.set_breakpoint(11, RULES);
    session.controller.set_breakpoint(50, RULES);

    let stepping = session.spawn(fire_rule());
    session.expect_event("THREAD_CREATE 1");
    session.expect_event("SUSPENDED_BREAK 1 11 9\nrules.clp");
    let inspected = session.spawn(Function::new("inspect", RULES, 50).bind("?y", "7"));
    session.expect_event("THREAD_CREATE 2");
    session.expect_event("SUSPENDED_BREAK 2 50 9\nrules.clp");

    // thread 1 returns from the step-over target while thread 2 evaluates an expression
    let controller = session.controller.clone();
    let recorder = session.recorder();
    session.hooked.before_evaluation(move || {
        controller.step_over(1).unwrap();
        wait_until("return of printout", || {
            recorder.calls().contains(&"return printout".to_string())
        });
        thread::sleep(Duration::from_millis(100));
    });
    session.controller.print(2, 0, "?y").unwrap();

    session.expect_event("RESUMED_STEP 1");
    session.expect_event("SUSPENDED_STEP 1");
    session.expect_event("PRINT 2 0 ?y 1\n7");
    assert_eq!(
        session.controller.thread_state(1),
        Some(ThreadState::Suspended)
    );
    wait_until("call of assert", || {
        session.last_call().as_deref() == Some("call assert")
    });
    assert!(!stepping.is_finished());

    session.controller.resume(1).unwrap();
    session.expect_event("RESUMED 1");
    stepping.join().unwrap().unwrap();
    session.controller.resume(2).unwrap();
    session.expect_event("RESUMED 2");
    inspected.join().unwrap().unwrap();
}
