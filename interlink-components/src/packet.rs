// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Packets.
//!
//! A [`Packet`] carries the route it is following and the index of the next
//! hop. Switches that make routing decisions replace the route and reset the
//! index.

use std::fmt;
use std::rc::Rc;

use interlink_engine::time::SimTime;

use crate::route::Route;
use crate::types::{FlowId, Hop, HostId, PacketId, SwitchId};

/// Whether a packet is travelling towards the core of a fabric or away from
/// it. Set by switches when they stamp a route.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Direction {
    #[default]
    None,
    Up,
    Down,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PacketKind {
    Data,
    /// Link-level pause (or resume when `pause` is false) sent by `sender`.
    Pause { sender: SwitchId, pause: bool },
}

/// Size of a pause frame in bytes.
pub const PAUSE_PACKET_BYTES: usize = 64;

#[derive(Clone, Debug)]
pub struct Packet {
    pub id: PacketId,
    pub flow: FlowId,
    pub src: HostId,
    pub dst: HostId,
    pub path_id: u32,
    pub size_bytes: usize,
    pub kind: PacketKind,
    pub direction: Direction,
    pub ecn_ce: bool,
    pub sent_at: SimTime,
    route: Option<Rc<Route>>,
    next_hop: usize,
}

impl Packet {
    #[must_use]
    pub fn data(
        id: PacketId,
        flow: FlowId,
        src: HostId,
        dst: HostId,
        size_bytes: usize,
        sent_at: SimTime,
    ) -> Self {
        Self {
            id,
            flow,
            src,
            dst,
            path_id: 0,
            size_bytes,
            kind: PacketKind::Data,
            direction: Direction::None,
            ecn_ce: false,
            sent_at,
            route: None,
            next_hop: 0,
        }
    }

    #[must_use]
    pub fn pause(id: PacketId, sender: SwitchId, pause: bool, sent_at: SimTime) -> Self {
        Self {
            kind: PacketKind::Pause { sender, pause },
            ..Self::data(
                id,
                FlowId::default(),
                HostId::default(),
                HostId::default(),
                PAUSE_PACKET_BYTES,
                sent_at,
            )
        }
    }

    #[must_use]
    pub fn is_pause(&self) -> bool {
        matches!(self.kind, PacketKind::Pause { .. })
    }

    /// Give a new packet its source route. The packet takes the route's
    /// path identifier and keeps it for the rest of its journey.
    pub fn start_route(&mut self, route: Rc<Route>) {
        self.path_id = route.path_id();
        self.set_route(route);
    }

    /// Replace the route and restart it from the first hop. The path
    /// identifier chosen at the source is left unchanged.
    pub fn set_route(&mut self, route: Rc<Route>) {
        self.route = Some(route);
        self.next_hop = 0;
    }

    #[must_use]
    pub fn route(&self) -> Option<&Rc<Route>> {
        self.route.as_ref()
    }

    /// Return the next hop and move past it.
    pub fn advance(&mut self) -> Option<Hop> {
        let hop = self.route.as_ref()?.at(self.next_hop)?;
        self.next_hop += 1;
        Some(hop)
    }

    /// Number of hops of the current route that are still to be visited.
    #[must_use]
    pub fn hops_remaining(&self) -> usize {
        self.route
            .as_ref()
            .map_or(0, |r| r.len().saturating_sub(self.next_hop))
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.kind {
            PacketKind::Data => write!(
                f,
                "{} {} {}->{} {}B",
                self.id, self.flow, self.src, self.dst, self.size_bytes
            ),
            PacketKind::Pause { sender, pause } => write!(
                f,
                "{} {} from {}",
                self.id,
                if pause { "pause" } else { "resume" },
                sender
            ),
        }
    }
}
