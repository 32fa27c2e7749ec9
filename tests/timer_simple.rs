use coop::{Error, Runtime, Task};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

#[test]
fn test_delay_basic() {
    let mut rt = Runtime::new();

    let start = Instant::now();
    rt.run(Task::<(), Error>::delay(Duration::from_millis(50)))
        .unwrap();
    let elapsed = start.elapsed();

    assert!(
        elapsed >= Duration::from_millis(50),
        "Delay should wait at least the specified duration"
    );
}

#[test]
fn test_delay_zero_duration() {
    let mut rt = Runtime::new();

    let start = Instant::now();
    rt.run(Task::<(), Error>::delay(Duration::ZERO)).unwrap();
    let elapsed = start.elapsed();

    // Should complete almost immediately
    assert!(
        elapsed < Duration::from_millis(10),
        "Zero duration delay should be fast"
    );
}

#[test]
fn test_delays_fire_in_deadline_order() {
    let mut rt = Runtime::new();
    let log = Rc::new(RefCell::new(Vec::new()));

    let tick = |ms: u64| {
        let log = log.clone();
        Task::<(), Error>::delay(Duration::from_millis(ms)).map(move |()| log.borrow_mut().push(ms))
    };

    rt.run(Task::parallel(vec![tick(30), tick(10), tick(20)]))
        .unwrap();

    assert_eq!(*log.borrow(), vec![10, 20, 30]);
}

#[test]
fn test_sequential_delays_accumulate() {
    let mut rt = Runtime::new();
    let start = Instant::now();

    let task = Task::<(), Error>::delay(Duration::from_millis(15))
        .then(Task::delay(Duration::from_millis(15)));
    rt.run(task).unwrap();

    assert!(start.elapsed() >= Duration::from_millis(30));
}

#[test]
fn test_cancelled_delay_never_fires() {
    let mut rt = Runtime::new();
    let fired = Rc::new(RefCell::new(false));

    let f = fired.clone();
    let canceler = Task::<(), Error>::delay(Duration::from_millis(10)).run(move |_| *f.borrow_mut() = true);
    canceler.cancel_detached();

    // nothing left to wait for, so this returns right away
    assert_eq!(rt.run_until_idle(), 0);
    rt.run(Task::<(), Error>::delay(Duration::from_millis(20)))
        .unwrap();

    assert!(!*fired.borrow(), "Cancelled delay must not fire");
}

#[test]
fn test_yield_now_resumes_on_a_later_turn() {
    let mut rt = Runtime::new();
    let log = Rc::new(RefCell::new(Vec::new()));

    let l = log.clone();
    let _ = Task::<(), Error>::yield_now().run(move |_| l.borrow_mut().push("resumed"));
    log.borrow_mut().push("started");

    rt.run_until_idle();
    assert_eq!(*log.borrow(), vec!["started", "resumed"]);
}
