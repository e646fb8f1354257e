// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! A fixed-delay link.

use std::rc::Rc;

use interlink_engine::time::SimTime;
use interlink_track::entity::Entity;

use crate::types::Hop;

pub struct Pipe {
    pub entity: Rc<Entity>,
    delay: SimTime,
    remote: Option<Hop>,
    num_carried: u64,
}

impl Pipe {
    #[must_use]
    pub fn new(parent: &Rc<Entity>, name: &str, delay: SimTime) -> Self {
        Self {
            entity: Rc::new(Entity::new(parent, name)),
            delay,
            remote: None,
            num_carried: 0,
        }
    }

    pub fn connect(&mut self, remote: Hop) {
        self.remote = Some(remote);
    }

    #[must_use]
    pub fn remote_endpoint(&self) -> Option<Hop> {
        self.remote
    }

    /// Accept a packet and return how long it takes to reach the far end.
    pub fn carry(&mut self) -> SimTime {
        self.num_carried += 1;
        self.delay
    }

    #[must_use]
    pub fn delay(&self) -> SimTime {
        self.delay
    }

    #[must_use]
    pub fn num_carried(&self) -> u64 {
        self.num_carried
    }
}
