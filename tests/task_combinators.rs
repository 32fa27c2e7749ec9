use coop::{Either, Error, RunError, Runtime, Step, Task};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::{Duration, Instant};

fn after<A: Clone + 'static>(ms: u64, value: A) -> Task<A, Error> {
    Task::<(), Error>::delay(Duration::from_millis(ms)).map(move |()| value.clone())
}

#[test]
fn test_compete_picks_the_faster_side() {
    let mut rt = Runtime::new();

    let left = after(30, "left");
    let right = after(20, "right");

    let winner = rt.run(left.compete(&right));
    assert!(
        matches!(winner, Ok(Either::Right("right"))),
        "The right side settles first, got {winner:?}"
    );
}

#[test]
fn test_race_cancels_losers() {
    let mut rt = Runtime::new();
    let losers_finished = Rc::new(Cell::new(0));

    let slow = |ms: u64| {
        let finished = losers_finished.clone();
        after(ms, ms).map(move |ms| {
            finished.set(finished.get() + 1);
            ms
        })
    };

    let winner = rt.run(Task::race(vec![slow(40), after(5, 5), slow(30)]));
    assert_eq!(winner, Ok(5));

    rt.run(Task::<(), Error>::delay(Duration::from_millis(50)))
        .unwrap();
    assert_eq!(losers_finished.get(), 0);
}

#[test]
fn test_race_settles_with_first_failure() {
    let mut rt = Runtime::new();

    let failing = Task::<(), Error>::delay(Duration::from_millis(5)).then(Task::<u8, Error>::fail(Error::msg("first")));
    let result = rt.run(Task::race(vec![after(30, 1u8), failing]));

    assert_eq!(result, Err(RunError::Failed(Error::msg("first"))));
}

#[test]
fn test_parallel_keeps_input_order() {
    let mut rt = Runtime::new();
    let start = Instant::now();

    let result = rt.run(Task::parallel(vec![after(30, 'a'), after(10, 'b'), after(20, 'c')]));

    assert_eq!(result, Ok(vec!['a', 'b', 'c']));
    assert!(
        start.elapsed() < Duration::from_millis(55),
        "Branches run concurrently"
    );
}

#[test]
fn test_parallel_of_nothing_is_empty() {
    let mut rt = Runtime::new();
    assert_eq!(rt.run(Task::<u8, Error>::parallel(Vec::new())), Ok(Vec::new()));
}

#[test]
fn test_parallel_fails_fast_and_cancels_the_rest() {
    let mut rt = Runtime::new();
    let other_finished = Rc::new(Cell::new(false));
    let start = Instant::now();

    let f = other_finished.clone();
    let slow = after(50, 1).map(move |n| {
        f.set(true);
        n
    });
    let failing = Task::<(), Error>::delay(Duration::from_millis(5)).then(Task::fail(Error::msg("nope")));

    let result = rt.run(Task::parallel(vec![slow, failing]));

    assert_eq!(result, Err(RunError::Failed(Error::msg("nope"))));
    assert!(start.elapsed() < Duration::from_millis(50));
    assert!(!other_finished.get());
}

#[test]
fn test_both_pairs_results() {
    let mut rt = Runtime::new();
    assert_eq!(rt.run(after(10, 1).both(&after(5, "two"))), Ok((1, "two")));
}

#[test]
fn test_ap_combines_independent_tasks() {
    let mut rt = Runtime::new();

    let f: fn(i32) -> i32 = |x| x * 2;
    let result = rt.run(after(10, f).ap(&after(5, 21)));

    assert_eq!(result, Ok(42));
}

#[test]
fn test_attempt_turns_failure_into_value() {
    let mut rt = Runtime::new();

    let task = Task::<u8, Error>::fail(Error::msg("caught")).attempt::<Error>();

    assert_eq!(rt.run(task), Ok(Err(Error::msg("caught"))));
}

#[test]
fn test_finally_runs_on_every_exit() {
    let mut rt = Runtime::new();
    let runs = Rc::new(Cell::new(0));

    let cleanup = {
        let runs = runs.clone();
        Task::<(), Error>::lazy(move || {
            runs.set(runs.get() + 1);
            Ok(())
        })
    };

    rt.run(Task::pure(1).finally(cleanup.clone())).unwrap();
    let _ = rt.run(Task::<u8, Error>::fail(Error::msg("x")).finally(cleanup.clone()));
    let _ = rt.run(
        Task::<u8, Error>::never()
            .finally(cleanup)
            .timeout(Duration::from_millis(5)),
    );

    assert_eq!(runs.get(), 3);
}

#[test]
fn test_chain_rec_with_asynchronous_steps() {
    let mut rt = Runtime::new();

    let countdown = Task::chain_rec(5u32, |n| {
        if n == 0 {
            Task::pure(Step::Done("liftoff"))
        } else {
            Task::<(), Error>::yield_now().map(move |()| Step::Loop(n - 1))
        }
    });

    assert_eq!(rt.run(countdown), Ok("liftoff"));
}

#[test]
fn test_forever_stops_on_failure() {
    let mut rt = Runtime::new();
    let count = Rc::new(Cell::new(0));

    let c = count.clone();
    let step = Task::<(), Error>::yield_now().and_then(move |()| {
        c.set(c.get() + 1);
        if c.get() == 3 {
            Task::fail(Error::msg("done"))
        } else {
            Task::unit()
        }
    });

    let result = rt.run(step.forever::<()>());

    assert_eq!(result, Err(RunError::Failed(Error::msg("done"))));
    assert_eq!(count.get(), 3);
}

#[test]
fn test_uninterruptible_finishes_before_cancel_completes() {
    let mut rt = Runtime::new();
    let log = Rc::new(RefCell::new(Vec::new()));

    let l = log.clone();
    let critical = Task::<(), Error>::delay(Duration::from_millis(10))
        .map(move |()| l.borrow_mut().push("critical done"))
        .uninterruptible();
    let fiber = rt.spawn(critical);

    let l = log.clone();
    rt.run(fiber.kill().map(move |()| l.borrow_mut().push("kill done")))
        .unwrap();

    assert_eq!(*log.borrow(), vec!["critical done", "kill done"]);
}

#[test]
fn test_from_callback_adapts_foreign_effect() {
    let mut rt = Runtime::new();

    let task = Task::<u32, Error>::from_callback(|callback| {
        std::thread::sleep(Duration::from_millis(1));
        callback(Ok(8));
    });

    assert_eq!(rt.run(task.map(|n| n * 2)), Ok(16));
}
