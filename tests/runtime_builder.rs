use coop::{AVar, Error, RunError, RuntimeBuilder, Task};
use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

#[test]
fn test_builder_creation() {
    let rt = RuntimeBuilder::new().build();
    assert_eq!(rt.jobs_per_tick(), 256);
    assert!(!rt.panics_on_unhandled());
}

#[test]
fn test_builder_settings() {
    let rt = RuntimeBuilder::new()
        .jobs_per_tick(8)
        .panic_on_unhandled(true)
        .build();

    assert_eq!(rt.jobs_per_tick(), 8);
    assert!(rt.panics_on_unhandled());
}

#[test]
fn test_builder_clamps_zero_budget() {
    let rt = RuntimeBuilder::new().jobs_per_tick(0).build();
    assert_eq!(rt.jobs_per_tick(), 1);
}

#[test]
fn test_builder_immediate_result() {
    let mut rt = RuntimeBuilder::new().build();
    let value = 42;

    let result = rt.block_on(async { value });

    assert_eq!(result, 42, "Future should return correct value");
}

#[test]
fn test_builder_multiple_instances() {
    let mut rt1 = RuntimeBuilder::new().build();
    let mut rt2 = RuntimeBuilder::new().build();

    let result1 = rt1.block_on(async { 10 });
    let result2 = rt2.block_on(async { 20 });

    assert_eq!(result1, 10);
    assert_eq!(result2, 20);
}

#[test]
fn test_block_on_awaits_tasks() {
    let mut rt = RuntimeBuilder::new().build();

    let result = rt.block_on(async {
        let first = Task::<(), Error>::delay(Duration::from_millis(5))
            .map(|()| 20)
            .await?;
        let second = Task::<u32, Error>::pure(22).await?;
        Ok::<_, RunError<Error>>(first + second)
    });

    assert_eq!(result, Ok(42));
}

#[test]
fn test_run_reports_failure() {
    let mut rt = RuntimeBuilder::new().build();
    let result = rt.run(Task::<u32, Error>::fail(Error::msg("boom")));

    assert_eq!(result, Err(RunError::Failed(Error::msg("boom"))));
}

#[test]
fn test_run_reports_stall() {
    let mut rt = RuntimeBuilder::new().build();
    let never_filled = AVar::<u32>::empty();

    let result = rt.run(never_filled.take::<Error>());

    assert_eq!(result, Err(RunError::Stalled));
    assert_eq!(
        never_filled.pending().takes,
        0,
        "A stalled run is cancelled and leaves no waiter behind"
    );
}

#[test]
#[should_panic(expected = "no work or timers remain")]
fn test_block_on_panics_on_stall() {
    let mut rt = RuntimeBuilder::new().build();
    rt.block_on(futures::future::pending::<()>());
}

#[test]
fn test_spawn_multiple_tasks() {
    let mut rt = RuntimeBuilder::new().build();
    let counter = Rc::new(Cell::new(0));

    let fibers: Vec<_> = (0..5)
        .map(|_| {
            let counter = counter.clone();
            rt.spawn(Task::<(), Error>::yield_now().map(move |()| counter.set(counter.get() + 1)))
        })
        .collect();

    rt.run_until_idle();

    assert_eq!(counter.get(), 5, "All 5 tasks should have run");
    assert!(fibers.iter().all(|fiber| fiber.is_finished()));
}

#[test]
fn test_small_budget_still_drains_everything() {
    let mut rt = RuntimeBuilder::new().jobs_per_tick(1).build();
    let counter = Rc::new(Cell::new(0));

    for _ in 0..10 {
        let counter = counter.clone();
        rt.spawn(Task::<(), Error>::yield_now().map(move |()| counter.set(counter.get() + 1)));
    }
    rt.run(Task::<(), Error>::yield_now()).unwrap();
    rt.run_until_idle();

    assert_eq!(counter.get(), 10);
}

#[test]
fn test_shutdown_discards_pending_work() {
    let mut rt = RuntimeBuilder::new().build();
    let fired = Rc::new(Cell::new(false));

    let f = fired.clone();
    rt.spawn(Task::<(), Error>::delay(Duration::from_millis(5)).map(move |()| f.set(true)));
    rt.shutdown();

    assert_eq!(rt.run(Task::<(), Error>::unit()), Ok(()));
    assert_eq!(rt.run_until_idle(), 0);
    assert!(!fired.get(), "Shut down runtime must not fire old timers");
}

#[test]
#[should_panic(expected = "unhandled failure")]
fn test_unhandled_fiber_failure_panics_when_configured() {
    let mut rt = RuntimeBuilder::new().panic_on_unhandled(true).build();

    rt.spawn(Task::<(), Error>::yield_now().then(Task::<(), Error>::fail(Error::msg("nobody listens"))));
    rt.run_until_idle();
}

#[test]
fn test_unhandled_fiber_failure_is_only_logged_by_default() {
    let mut rt = RuntimeBuilder::new().build();

    let fiber = rt.spawn(Task::<(), Error>::yield_now().then(Task::<(), Error>::fail(Error::msg("ignored"))));
    rt.run_until_idle();

    assert!(fiber.outcome().is_some_and(|outcome| outcome.is_failed()));
}
