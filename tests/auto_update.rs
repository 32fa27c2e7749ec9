use coop::{AutoUpdate, Error, RunError, Runtime, Task, UpdateSettings};
use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

const FREQUENCY: Duration = Duration::from_millis(20);

fn counting(runs: &Rc<Cell<u32>>) -> Task<u32, Error> {
    let runs = runs.clone();
    Task::lazy(move || {
        runs.set(runs.get() + 1);
        Ok(runs.get())
    })
}

fn sleep(rt: &mut Runtime, duration: Duration) {
    rt.run(Task::<(), Error>::delay(duration)).unwrap();
}

#[test]
fn test_nothing_runs_before_the_first_get() {
    let mut rt = Runtime::new();
    let runs = Rc::new(Cell::new(0));
    let _auto = AutoUpdate::new(UpdateSettings::new(counting(&runs)).frequency(FREQUENCY));

    rt.run_until_idle();
    assert_eq!(runs.get(), 0);
}

#[test_log::test]
fn test_value_is_cached_for_one_interval() {
    let mut rt = Runtime::new();
    let runs = Rc::new(Cell::new(0));
    let auto = AutoUpdate::new(UpdateSettings::new(counting(&runs)).frequency(FREQUENCY));

    assert_eq!(rt.run(auto.get()), Ok(1));
    assert_eq!(rt.run(auto.get()), Ok(1));
    assert_eq!(runs.get(), 1, "A fresh value is served from the cache");

    sleep(&mut rt, FREQUENCY * 2);
    assert_eq!(runs.get(), 1, "Expiry alone does not recompute");

    assert_eq!(rt.run(auto.get()), Ok(2));
    assert_eq!(runs.get(), 2);
}

#[test]
fn test_get_on_expiry_waits_for_the_fresh_value() {
    let mut rt = Runtime::new();
    let runs = Rc::new(Cell::new(0));
    let auto = AutoUpdate::new(UpdateSettings::new(counting(&runs)).frequency(FREQUENCY));

    assert_eq!(rt.run(auto.get()), Ok(1));

    // fires on the same turn the cached value expires
    let late = rt.spawn(Task::<(), Error>::delay(FREQUENCY).then(auto.get()));
    sleep(&mut rt, FREQUENCY * 2);

    assert_eq!(rt.run(late.join()), Ok(2));
    assert_eq!(runs.get(), 2);
}

#[test]
fn test_concurrent_gets_share_one_run() {
    let mut rt = Runtime::new();
    let runs = Rc::new(Cell::new(0));
    let slow = Task::<(), Error>::delay(Duration::from_millis(5)).then(counting(&runs));
    let auto = AutoUpdate::new(UpdateSettings::new(slow).frequency(FREQUENCY));

    let values = rt.run(Task::parallel(vec![auto.get(), auto.get(), auto.get()]));

    assert_eq!(values, Ok(vec![1, 1, 1]));
    assert_eq!(runs.get(), 1);
}

#[test]
fn test_failure_is_cached_like_a_value() {
    let mut rt = Runtime::new();
    let runs = Rc::new(Cell::new(0));
    let count = runs.clone();
    let failing = Task::<u32, Error>::lazy(move || {
        count.set(count.get() + 1);
        Err(Error::msg("backend down"))
    });
    let auto = AutoUpdate::new(UpdateSettings::new(failing).frequency(FREQUENCY));

    let expected = Err(RunError::Failed(Error::msg("backend down")));
    assert_eq!(rt.run(auto.get()), expected);
    assert_eq!(rt.run(auto.get()), expected);
    assert_eq!(runs.get(), 1);
}

#[test]
fn test_modify_derives_the_next_value() {
    let mut rt = Runtime::new();
    let runs = Rc::new(Cell::new(0));
    let settings = UpdateSettings::new(counting(&runs))
        .frequency(FREQUENCY)
        .modify(|previous| Task::pure(previous * 10));
    let auto = AutoUpdate::new(settings);

    assert_eq!(rt.run(auto.get()), Ok(1));
    sleep(&mut rt, FREQUENCY * 2);
    assert_eq!(rt.run(auto.get()), Ok(10));
    assert_eq!(runs.get(), 1, "The action ran only for the first value");
}

#[test]
fn test_kill_stops_the_updater() {
    let mut rt = Runtime::new();
    let runs = Rc::new(Cell::new(0));
    let auto = AutoUpdate::new(UpdateSettings::new(counting(&runs)).frequency(FREQUENCY));

    rt.run(auto.kill()).unwrap();

    let get = auto.get().timeout(Duration::from_millis(30));
    assert_eq!(rt.run(get), Err(RunError::Failed(Error::Timeout)));
    assert_eq!(runs.get(), 0);
}
