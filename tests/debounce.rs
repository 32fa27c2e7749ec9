use coop::{Debounce, DebounceSettings, Error, Runtime, Task};
use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

const COOLDOWN: Duration = Duration::from_millis(20);

fn counting(runs: &Rc<Cell<u32>>) -> Task<(), Error> {
    let runs = runs.clone();
    Task::lazy(move || {
        runs.set(runs.get() + 1);
        Ok(())
    })
}

fn sleep(rt: &mut Runtime, duration: Duration) {
    rt.run(Task::<(), Error>::delay(duration)).unwrap();
}

#[test]
fn test_first_trigger_runs_immediately() {
    let mut rt = Runtime::new();
    let runs = Rc::new(Cell::new(0));
    let debounce = Debounce::new(DebounceSettings::new(counting(&runs)).cooldown(COOLDOWN));

    rt.run_until_idle();
    assert_eq!(runs.get(), 0, "No trigger, no run");

    debounce.trigger();
    rt.run_until_idle();
    assert_eq!(runs.get(), 1);
}

#[test_log::test]
fn test_triggers_collapse_during_cooldown() {
    let mut rt = Runtime::new();
    let runs = Rc::new(Cell::new(0));
    let debounce = Debounce::new(DebounceSettings::new(counting(&runs)).cooldown(COOLDOWN));

    debounce.trigger();
    rt.run_until_idle();
    debounce.trigger();
    debounce.trigger();
    debounce.trigger();
    rt.run_until_idle();
    assert_eq!(runs.get(), 1, "Triggers wait for the cooldown");

    sleep(&mut rt, COOLDOWN + COOLDOWN / 2);
    assert_eq!(runs.get(), 2, "The held triggers ran once");

    sleep(&mut rt, COOLDOWN * 2);
    assert_eq!(runs.get(), 2, "Nothing left to run");
}

#[test_log::test]
fn test_failing_action_keeps_the_loop_alive() {
    let mut rt = Runtime::new();
    let runs = Rc::new(Cell::new(0));
    let count = runs.clone();
    let failing = Task::<(), Error>::lazy(move || {
        count.set(count.get() + 1);
        Err(Error::msg("flaky"))
    });
    let debounce = Debounce::new(DebounceSettings::new(failing).cooldown(COOLDOWN));

    debounce.trigger();
    rt.run_until_idle();
    debounce.trigger();
    sleep(&mut rt, COOLDOWN * 2);

    assert_eq!(runs.get(), 2);
}

#[test]
fn test_kill_stops_the_loop() {
    let mut rt = Runtime::new();
    let runs = Rc::new(Cell::new(0));
    let debounce = Debounce::new(DebounceSettings::new(counting(&runs)).cooldown(COOLDOWN));

    rt.run(debounce.kill()).unwrap();
    debounce.trigger();
    sleep(&mut rt, COOLDOWN);

    assert_eq!(runs.get(), 0);
}
