use coop::{Error, MSem, QSem, Runtime, Task};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

#[test]
fn test_with_sections_never_overlap() {
    let mut rt = Runtime::new();
    let sem = QSem::new(1);
    let inside = Rc::new(Cell::new(0));
    let max_inside = Rc::new(Cell::new(0));

    let section = || {
        let enter = inside.clone();
        let max_inside = max_inside.clone();
        let leave = inside.clone();
        let work = Task::<(), Error>::lazy(move || {
            enter.set(enter.get() + 1);
            max_inside.set(max_inside.get().max(enter.get()));
            Ok(())
        })
        .then(Task::delay(Duration::from_millis(5)))
        .map(move |()| leave.set(leave.get() - 1));
        sem.with(work)
    };

    rt.run(Task::parallel(vec![section(), section(), section()]))
        .unwrap();

    assert_eq!(max_inside.get(), 1);
    assert_eq!(rt.run(sem.peek_avail::<Error>()), Ok(1));
}

#[test]
fn test_wait_blocks_until_signal() {
    let mut rt = Runtime::new();
    let sem = QSem::new(0);

    let waiter = rt.spawn(sem.wait::<Error>());
    rt.run_until_idle();
    assert!(!waiter.is_finished());

    rt.run(sem.signal::<Error>()).unwrap();
    rt.run(waiter.join()).unwrap();
    assert_eq!(rt.run(sem.peek_avail::<Error>()), Ok(0));
}

#[test]
fn test_waiters_wake_in_fifo_order() {
    let mut rt = Runtime::new();
    let sem = QSem::new(0);
    let order = Rc::new(RefCell::new(Vec::new()));

    let waiter = |name: &'static str| {
        let order = order.clone();
        sem.wait::<Error>().map(move |()| order.borrow_mut().push(name))
    };
    let a = rt.spawn(waiter("A"));
    rt.run_until_idle();
    let b = rt.spawn(waiter("B"));
    rt.run_until_idle();

    rt.run(sem.signal::<Error>()).unwrap();
    rt.run_until_idle();
    assert_eq!(*order.borrow(), vec!["A"]);
    assert!(a.is_finished());
    assert!(!b.is_finished());

    rt.run(sem.signal::<Error>()).unwrap();
    rt.run(b.join()).unwrap();
    assert_eq!(*order.borrow(), vec!["A", "B"]);
}

#[test]
fn test_negative_quantity_absorbs_signals() {
    let mut rt = Runtime::new();
    let sem = QSem::new(-1);

    let waiter = rt.spawn(sem.wait::<Error>());
    rt.run(sem.signal::<Error>()).unwrap();
    rt.run_until_idle();
    assert!(!waiter.is_finished(), "The first signal pays off the deficit");
    assert_eq!(rt.run(sem.peek_avail::<Error>()), Ok(0));

    rt.run(sem.signal::<Error>()).unwrap();
    rt.run(waiter.join()).unwrap();
}

#[test]
fn test_signal_without_waiters_leaves_token() {
    let mut rt = Runtime::new();
    let sem = QSem::new(0);

    rt.run(sem.signal::<Error>()).unwrap();
    assert_eq!(rt.run(sem.peek_avail::<Error>()), Ok(1));

    rt.run(sem.wait::<Error>()).unwrap();
    assert_eq!(rt.run(sem.peek_avail::<Error>()), Ok(0));
}

#[test]
fn test_killed_waiter_does_not_lose_a_signal() {
    let mut rt = Runtime::new();
    let sem = QSem::new(0);

    let doomed = rt.spawn(sem.wait::<Error>());
    rt.run_until_idle();
    let next = rt.spawn(sem.wait::<Error>());
    rt.run_until_idle();

    rt.run(doomed.kill()).unwrap();
    rt.run(sem.signal::<Error>()).unwrap();
    rt.run(next.join()).unwrap();

    assert_eq!(rt.run(sem.peek_avail::<Error>()), Ok(0));
}

#[test]
fn test_signal_handed_to_a_killed_waiter_is_reclaimed() {
    let mut rt = Runtime::new();
    let sem = QSem::new(0);

    let doomed = rt.spawn(sem.wait::<Error>());
    rt.run_until_idle();

    // the signal completes and its hand-off is waiting for the next drain,
    // but the waiter is killed before that drain runs
    let signal = rt.spawn(sem.signal::<Error>());
    let kill = Task::<(), Error>::defer(move || {
        let doomed = doomed.clone();
        signal.join().and_then(move |()| doomed.kill())
    });
    rt.run(kill).unwrap();

    assert_eq!(rt.run(sem.peek_avail::<Error>()), Ok(1));
    rt.run(sem.wait::<Error>().timeout(Duration::from_millis(50)))
        .unwrap();
}

#[test]
fn test_msem_shares_the_protocol() {
    let mut rt = Runtime::new();
    let sem = MSem::new(2);

    let result = rt.run(sem.with(sem.with(Task::<u8, Error>::pure(3))));

    assert_eq!(result, Ok(3));
    assert_eq!(rt.run(sem.peek_avail::<Error>()), Ok(2));
}
