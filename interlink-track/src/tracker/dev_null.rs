// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Tracker used when a run wants no trace or log output at all.

use std::cell::Cell;

use crate::tracker::Track;
use crate::{Id, ROOT};

/// Discards every event. Ids are still distinct so entities can be told apart.
pub struct DevNullTracker {
    last_id: Cell<u64>,
}

impl DevNullTracker {
    #[must_use]
    pub fn new() -> Self {
        Self {
            last_id: Cell::new(ROOT.0),
        }
    }
}

impl Default for DevNullTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl Track for DevNullTracker {
    fn unique_id(&self) -> Id {
        let next = self.last_id.get() + 1;
        self.last_id.set(next);
        Id(next)
    }

    fn is_entity_enabled(&self, _id: Id, _level: log::Level) -> bool {
        false
    }

    fn add_entity(&self, _id: Id, _entity_name: &str) {}
    fn enter(&self, _id: Id, _obj: Id) {}
    fn exit(&self, _id: Id, _obj: Id) {}
    fn value(&self, _id: Id, _value: f64) {}
    fn create(&self, _id: Id, _obj: Id, _num_bytes: usize, _req_type: i8, _name: &str) {}
    fn destroy(&self, _id: Id, _obj: Id) {}
    fn connect(&self, _connect_from: Id, _connect_to: Id) {}
    fn log(&self, _id: Id, _level: log::Level, _msg: std::fmt::Arguments) {}
    fn time(&self, _set_by: Id, _time_ns: f64) {}
    fn shutdown(&self) {}
}
