// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Per-flow receive statistics.

use std::rc::Rc;

use interlink_engine::time::SimTime;
use interlink_track::entity::Entity;
use interlink_track::{debug, trace};

use crate::packet::Packet;
use crate::types::{FlowId, HostId};

pub struct FlowSink {
    pub entity: Rc<Entity>,
    pub flow: FlowId,
    pub src: HostId,
    pub dst: HostId,
    expected_bytes: Option<u64>,
    received_bytes: u64,
    received_packets: u64,
    ecn_marked: u64,
    first_arrival: Option<SimTime>,
    last_arrival: Option<SimTime>,
    completed_at: Option<SimTime>,
}

impl FlowSink {
    /// `expected_bytes` of `None` means the flow never completes.
    #[must_use]
    pub fn new(
        parent: &Rc<Entity>,
        flow: FlowId,
        src: HostId,
        dst: HostId,
        expected_bytes: Option<u64>,
    ) -> Self {
        Self {
            entity: Rc::new(Entity::new(parent, &format!("sink{}", flow.0))),
            flow,
            src,
            dst,
            expected_bytes,
            received_bytes: 0,
            received_packets: 0,
            ecn_marked: 0,
            first_arrival: None,
            last_arrival: None,
            completed_at: None,
        }
    }

    pub fn receive(&mut self, pkt: &Packet, now: SimTime) {
        trace!(self.entity ; "receive {}", pkt);
        self.received_bytes += pkt.size_bytes as u64;
        self.received_packets += 1;
        if pkt.ecn_ce {
            self.ecn_marked += 1;
        }
        self.first_arrival.get_or_insert(now);
        self.last_arrival = Some(now);

        if self.completed_at.is_none()
            && self
                .expected_bytes
                .is_some_and(|expected| self.received_bytes >= expected)
        {
            debug!(self.entity ; "complete at {}", now);
            self.completed_at = Some(now);
        }
    }

    #[must_use]
    pub fn received_bytes(&self) -> u64 {
        self.received_bytes
    }

    #[must_use]
    pub fn received_packets(&self) -> u64 {
        self.received_packets
    }

    #[must_use]
    pub fn ecn_marked(&self) -> u64 {
        self.ecn_marked
    }

    #[must_use]
    pub fn first_arrival(&self) -> Option<SimTime> {
        self.first_arrival
    }

    #[must_use]
    pub fn last_arrival(&self) -> Option<SimTime> {
        self.last_arrival
    }

    #[must_use]
    pub fn completed_at(&self) -> Option<SimTime> {
        self.completed_at
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.completed_at.is_some()
    }
}
