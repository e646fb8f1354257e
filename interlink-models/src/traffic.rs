// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Constant-rate flow sources.

use std::rc::Rc;

use interlink_components::packet::Packet;
use interlink_components::route::Route;
use interlink_components::types::{FlowId, HostId, PacketId, SinkId};
use interlink_engine::sim_error;
use interlink_engine::time::SimTime;
use interlink_engine::types::SimError;
use interlink_track::entity::Entity;
use rand::Rng;

/// Number of `mtu_bytes` packets needed to carry `flow_bytes`.
#[must_use]
pub fn packets_for(flow_bytes: u64, mtu_bytes: usize) -> u64 {
    flow_bytes.div_ceil(mtu_bytes.max(1) as u64)
}

/// The gap between packets that gives `bits_per_sec` with packets of
/// `packet_bytes`.
#[must_use]
pub fn packet_interval(bits_per_sec: f64, packet_bytes: usize) -> SimTime {
    if bits_per_sec <= 0.0 {
        return SimTime::MAX;
    }
    SimTime::from_secs_f64(packet_bytes as f64 * 8.0 / bits_per_sec)
}

/// Sends packets of one flow at a fixed interval, picking a route at random
/// for each packet.
pub struct ConstantRateSource {
    pub entity: Rc<Entity>,
    pub flow: FlowId,
    pub src: HostId,
    pub dst: HostId,
    pub sink: SinkId,
    routes: Vec<Rc<Route>>,
    interval: SimTime,
    packet_bytes: usize,

    /// `None` sends until the simulation ends.
    total_packets: Option<u64>,

    sent: u64,
}

impl ConstantRateSource {
    #[expect(clippy::too_many_arguments)]
    pub fn new(
        parent: &Rc<Entity>,
        flow: FlowId,
        src: HostId,
        dst: HostId,
        sink: SinkId,
        routes: Vec<Rc<Route>>,
        interval: SimTime,
        packet_bytes: usize,
        total_packets: Option<u64>,
    ) -> Result<Self, SimError> {
        if routes.is_empty() {
            return sim_error!(format!("{flow} from {src} to {dst} has no routes"));
        }
        if interval.is_zero() {
            return sim_error!(format!("{flow} has a zero packet interval"));
        }
        Ok(Self {
            entity: Rc::new(Entity::new(parent, &format!("src{}", flow.0))),
            flow,
            src,
            dst,
            sink,
            routes,
            interval,
            packet_bytes,
            total_packets,
            sent: 0,
        })
    }

    #[must_use]
    pub fn interval(&self) -> SimTime {
        self.interval
    }

    #[must_use]
    pub fn sent(&self) -> u64 {
        self.sent
    }

    #[must_use]
    pub fn total_packets(&self) -> Option<u64> {
        self.total_packets
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        self.total_packets.is_some_and(|total| self.sent >= total)
    }

    /// Build the next packet, or `None` once every packet has been sent.
    pub fn next_packet<R: Rng>(&mut self, id: PacketId, now: SimTime, rng: &mut R) -> Option<Packet> {
        if self.is_done() {
            return None;
        }
        let route = self.routes[rng.gen_range(0..self.routes.len())].clone();
        let mut pkt = Packet::data(id, self.flow, self.src, self.dst, self.packet_bytes, now);
        pkt.start_route(route);
        self.sent += 1;
        Some(pkt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packet_counts() {
        assert_eq!(packets_for(0, 4000), 0);
        assert_eq!(packets_for(1, 4000), 1);
        assert_eq!(packets_for(4000, 4000), 1);
        assert_eq!(packets_for(4001, 4000), 2);
    }

    #[test]
    fn interval_from_rate() {
        // 4000 bytes at 100Gbps
        assert_eq!(packet_interval(100e9, 4000), SimTime::from_ns(320));
        assert_eq!(packet_interval(0.0, 4000), SimTime::MAX);
    }
}
