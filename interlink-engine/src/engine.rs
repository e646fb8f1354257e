// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::rc::Rc;

use interlink_track::entity::{Entity, toplevel};
use interlink_track::tracker::stdout_tracker;
use interlink_track::{Tracker, set_time, trace};

use crate::time::SimTime;
use crate::traits::{Callback, Event};
use crate::types::{SimError, SimResult};

/// An event waiting in the queue.
///
/// Ordered so that the [`BinaryHeap`] pops the earliest time first and, for
/// equal times, the one scheduled first.
struct Pending<W> {
    at: SimTime,
    seq: u64,
    event: Box<dyn Event<W>>,
}

impl<W> PartialEq for Pending<W> {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl<W> Eq for Pending<W> {}

impl<W> PartialOrd for Pending<W> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<W> Ord for Pending<W> {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .at
            .cmp(&self.at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// The event scheduler for a world of type `W`.
pub struct Engine<W> {
    toplevel: Rc<Entity>,
    time_entity: Rc<Entity>,
    tracker: Tracker,

    now: SimTime,
    end_time: Option<SimTime>,
    next_seq: u64,
    num_fired: u64,
    queue: BinaryHeap<Pending<W>>,
}

impl<W> Engine<W> {
    /// Create a standalone engine.
    pub fn new(tracker: &Tracker) -> Self {
        let toplevel = toplevel(tracker, "top");
        let time_entity = Rc::new(Entity::new(&toplevel, "time"));
        Self {
            toplevel,
            time_entity,
            tracker: tracker.clone(),
            now: SimTime::ZERO,
            end_time: None,
            next_seq: 0,
            num_fired: 0,
            queue: BinaryHeap::new(),
        }
    }

    #[must_use]
    pub fn top(&self) -> &Rc<Entity> {
        &self.toplevel
    }

    #[must_use]
    pub fn tracker(&self) -> Tracker {
        self.tracker.clone()
    }

    #[must_use]
    pub fn now(&self) -> SimTime {
        self.now
    }

    #[must_use]
    pub fn time_now_ns(&self) -> f64 {
        self.now.as_ns_f64()
    }

    /// Events scheduled after the end time are never fired.
    pub fn set_end_time(&mut self, end_time: SimTime) {
        self.end_time = Some(end_time);
    }

    #[must_use]
    pub fn end_time(&self) -> Option<SimTime> {
        self.end_time
    }

    /// Schedule `event` to fire `delay` after the current time.
    pub fn schedule(&mut self, delay: SimTime, event: impl Event<W> + 'static) {
        let at = self.now.saturating_add(delay);
        self.schedule_at(at, event);
    }

    /// Schedule `event` to fire at an absolute time.
    ///
    /// Times in the past are treated as now.
    pub fn schedule_at(&mut self, at: SimTime, event: impl Event<W> + 'static) {
        let at = at.max(self.now);
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Pending {
            at,
            seq,
            event: Box::new(event),
        });
    }

    /// Schedule a closure to run `delay` after the current time.
    pub fn schedule_fn<F>(&mut self, delay: SimTime, callback: F)
    where
        F: FnOnce(&mut Engine<W>, &mut W) -> SimResult + 'static,
    {
        self.schedule(delay, Callback(callback));
    }

    /// Number of events waiting to fire.
    #[must_use]
    pub fn num_pending(&self) -> usize {
        self.queue.len()
    }

    /// Number of events that have fired so far.
    #[must_use]
    pub fn num_fired(&self) -> u64 {
        self.num_fired
    }

    /// Time of the next event, if there is one.
    #[must_use]
    pub fn next_event_time(&self) -> Option<SimTime> {
        self.queue.peek().map(|pending| pending.at)
    }

    /// Fire the next event.
    ///
    /// Returns `Ok(false)` when there is nothing left to do, either because
    /// the queue is empty or because the next event is beyond the end time.
    pub fn step(&mut self, world: &mut W) -> Result<bool, SimError> {
        let Some(next_at) = self.next_event_time() else {
            return Ok(false);
        };
        if self.end_time.is_some_and(|end_time| next_at > end_time) {
            return Ok(false);
        }

        let Some(pending) = self.queue.pop() else {
            return Ok(false);
        };
        if pending.at != self.now {
            self.now = pending.at;
            set_time!(self.time_entity ; self.now.as_ns_f64());
        }
        self.num_fired += 1;
        pending.event.fire(self, world)?;
        Ok(true)
    }

    /// Run until there are no more events (or the end time is reached).
    pub fn run(&mut self, world: &mut W) -> SimResult {
        while self.step(world)? {}
        trace!(self.toplevel ; "Finished at {} after {} events", self.now, self.num_fired);
        Ok(())
    }

    /// Run until `until`, leaving later events in the queue.
    ///
    /// Time is advanced to `until` even if the queue empties first.
    pub fn run_until(&mut self, until: SimTime, world: &mut W) -> SimResult {
        let saved_end_time = self.end_time;
        let limit = match saved_end_time {
            Some(end_time) => end_time.min(until),
            None => until,
        };
        self.end_time = Some(limit);
        let result = self.run(world);
        self.end_time = saved_end_time;
        result?;

        if self.now < limit {
            self.now = limit;
            set_time!(self.time_entity ; self.now.as_ns_f64());
        }
        Ok(())
    }
}

/// Create a default engine that sends [`Track`](interlink_track::Track)
/// events to stdout.
///
/// This is provided to keep documentation examples simple with fewer
/// concepts to have to consider at once.
impl<W> Default for Engine<W> {
    fn default() -> Self {
        let tracker = stdout_tracker(log::Level::Warn);
        Self::new(&tracker)
    }
}
