// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Fair-share pacing stage.
//!
//! Packets are held in one FIFO per flow and sent at a fixed rate. Flows
//! with packets waiting are served in round-robin order, one packet each.

use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use interlink_engine::sim_error;
use interlink_engine::time::SimTime;
use interlink_engine::types::SimError;
use interlink_track::entity::Entity;
use interlink_track::trace;

use crate::packet::Packet;
use crate::types::FlowId;

pub struct FairScheduler {
    pub entity: Rc<Entity>,
    bits_per_sec: u64,
    flows: Vec<VecDeque<Packet>>,
    flow_index: HashMap<FlowId, usize>,
    candidate: usize,
    in_service: Option<Packet>,
    num_queued: usize,
}

impl FairScheduler {
    pub fn new(parent: &Rc<Entity>, name: &str, bits_per_sec: u64) -> Result<Self, SimError> {
        if bits_per_sec == 0 {
            return sim_error!(format!("{parent}::{name}: zero bit rate"));
        }
        Ok(Self {
            entity: Rc::new(Entity::new(parent, name)),
            bits_per_sec,
            flows: Vec::new(),
            flow_index: HashMap::new(),
            candidate: 0,
            in_service: None,
            num_queued: 0,
        })
    }

    /// Number of packets waiting, excluding the one being sent.
    #[must_use]
    pub fn num_queued(&self) -> usize {
        self.num_queued
    }

    #[must_use]
    pub fn num_flows(&self) -> usize {
        self.flows.len()
    }

    /// Add a packet. Returns the service time if the scheduler was idle.
    pub fn enqueue(&mut self, pkt: Packet) -> Option<SimTime> {
        let num_flows = self.flows.len();
        let index = *self.flow_index.entry(pkt.flow).or_insert(num_flows);
        if index == num_flows {
            self.flows.push(VecDeque::new());
        }
        trace!(self.entity ; "enqueue {} on input {}", pkt, index);
        self.flows[index].push_back(pkt);
        self.num_queued += 1;

        if self.in_service.is_some() {
            return None;
        }
        self.start_next()
    }

    fn start_next(&mut self) -> Option<SimTime> {
        let num_flows = self.flows.len();
        for i in 0..num_flows {
            let index = (i + self.candidate) % num_flows;
            if let Some(pkt) = self.flows[index].pop_front() {
                self.candidate = index + 1;
                self.num_queued -= 1;
                let delay = SimTime::serialization(pkt.size_bytes as u64, self.bits_per_sec);
                self.in_service = Some(pkt);
                return Some(delay);
            }
        }
        None
    }

    /// Finish sending the current packet. Returns it together with the
    /// service time of the next one, if any.
    pub fn complete_service(&mut self) -> Option<(Packet, Option<SimTime>)> {
        let pkt = self.in_service.take()?;
        Some((pkt, self.start_next()))
    }
}
