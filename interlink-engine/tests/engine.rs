// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

use interlink_engine::engine::Engine;
use interlink_engine::sim_error;
use interlink_engine::test_helpers::start_test;
use interlink_engine::time::SimTime;
use interlink_engine::traits::Event;
use interlink_engine::types::SimResult;

/// World used by these tests: a log of (time in ns, label).
type Log = Vec<(u64, &'static str)>;

struct Record(&'static str);

impl Event<Log> for Record {
    fn fire(self: Box<Self>, engine: &mut Engine<Log>, world: &mut Log) -> SimResult {
        world.push((engine.now().as_ps() / 1000, self.0));
        Ok(())
    }
}

#[test]
fn events_fire_in_time_order() {
    let mut engine: Engine<Log> = start_test(file!());
    engine.schedule(SimTime::from_ns(30), Record("c"));
    engine.schedule(SimTime::from_ns(10), Record("a"));
    engine.schedule(SimTime::from_ns(20), Record("b"));

    let mut log = Log::new();
    engine.run(&mut log).unwrap();
    assert_eq!(log, vec![(10, "a"), (20, "b"), (30, "c")]);
    assert_eq!(engine.now(), SimTime::from_ns(30));
    assert_eq!(engine.num_fired(), 3);
}

#[test]
fn equal_times_fire_in_schedule_order() {
    let mut engine: Engine<Log> = start_test(file!());
    for label in ["first", "second", "third"] {
        engine.schedule(SimTime::from_ns(5), Record(label));
    }

    let mut log = Log::new();
    engine.run(&mut log).unwrap();
    assert_eq!(log, vec![(5, "first"), (5, "second"), (5, "third")]);
}

#[test]
fn events_can_schedule_events() {
    let mut engine: Engine<Log> = start_test(file!());
    engine.schedule_fn(SimTime::from_ns(1), |engine, log: &mut Log| {
        log.push((engine.now().as_ps() / 1000, "outer"));
        engine.schedule(SimTime::from_ns(4), Record("inner"));
        Ok(())
    });

    let mut log = Log::new();
    engine.run(&mut log).unwrap();
    assert_eq!(log, vec![(1, "outer"), (5, "inner")]);
}

#[test]
fn end_time_stops_run() {
    let mut engine: Engine<Log> = start_test(file!());
    engine.set_end_time(SimTime::from_ns(15));
    engine.schedule(SimTime::from_ns(10), Record("in"));
    engine.schedule(SimTime::from_ns(20), Record("out"));

    let mut log = Log::new();
    engine.run(&mut log).unwrap();
    assert_eq!(log, vec![(10, "in")]);
    assert_eq!(engine.num_pending(), 1);
}

#[test]
fn run_until_resumes() {
    let mut engine: Engine<Log> = start_test(file!());
    engine.schedule(SimTime::from_ns(10), Record("a"));
    engine.schedule(SimTime::from_ns(30), Record("b"));

    let mut log = Log::new();
    engine.run_until(SimTime::from_ns(20), &mut log).unwrap();
    assert_eq!(log, vec![(10, "a")]);
    assert_eq!(engine.now(), SimTime::from_ns(20));

    engine.run(&mut log).unwrap();
    assert_eq!(log, vec![(10, "a"), (30, "b")]);
}

#[test]
fn error_stops_simulation() {
    let mut engine: Engine<Log> = start_test(file!());
    engine.schedule_fn(SimTime::from_ns(1), |_, _: &mut Log| sim_error!("broken"));
    engine.schedule(SimTime::from_ns(2), Record("never"));

    let mut log = Log::new();
    let result = engine.run(&mut log);
    assert_eq!(result.unwrap_err().0, "broken");
    assert!(log.is_empty());
}

#[test]
fn past_times_are_clamped_to_now() {
    let mut engine: Engine<Log> = start_test(file!());
    engine.schedule_fn(SimTime::from_ns(10), |engine, _: &mut Log| {
        engine.schedule_at(SimTime::from_ns(2), Record("late"));
        Ok(())
    });

    let mut log = Log::new();
    engine.run(&mut log).unwrap();
    assert_eq!(log, vec![(10, "late")]);
}
