// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! The terminal element of every route towards a host.

use std::collections::HashMap;
use std::rc::Rc;

use interlink_track::entity::Entity;
use interlink_track::error;

use crate::packet::Packet;
use crate::types::{FlowId, HostId, SinkId};

pub struct HostPort {
    pub entity: Rc<Entity>,
    host: HostId,
    sinks: HashMap<FlowId, SinkId>,
    num_unknown: u64,
}

impl HostPort {
    #[must_use]
    pub fn new(parent: &Rc<Entity>, host: HostId) -> Self {
        Self {
            entity: Rc::new(Entity::new(parent, &format!("host{}", host.0))),
            host,
            sinks: HashMap::new(),
            num_unknown: 0,
        }
    }

    #[must_use]
    pub fn host(&self) -> HostId {
        self.host
    }

    /// Direct packets of `flow` to `sink`. A later registration for the same
    /// flow replaces the earlier one.
    pub fn register(&mut self, flow: FlowId, sink: SinkId) {
        self.sinks.insert(flow, sink);
    }

    #[must_use]
    pub fn sink_for(&self, flow: FlowId) -> Option<SinkId> {
        self.sinks.get(&flow).copied()
    }

    /// Find the sink for an arriving packet; unknown flows are counted and
    /// logged.
    pub fn demux(&mut self, pkt: &Packet) -> Option<SinkId> {
        let sink = self.sink_for(pkt.flow);
        if sink.is_none() {
            self.num_unknown += 1;
            error!(self.entity ; "no sink registered for {}", pkt);
        }
        sink
    }

    #[must_use]
    pub fn num_unknown(&self) -> u64 {
        self.num_unknown
    }
}
