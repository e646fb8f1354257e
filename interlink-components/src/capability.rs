// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! The view of an egress link that routing decisions are made from.

use interlink_engine::time::SimTime;

use crate::types::Hop;

/// Number of distinct levels returned by the quantized measures.
pub const NUM_QUANTA: u8 = 4;

/// Congestion state exposed by an egress link.
///
/// Routing strategies only ever see links through this trait, so any link
/// model can be used by a switch.
pub trait LinkCapability {
    /// Bytes currently held, including the packet being serialized.
    fn instantaneous_occupancy(&self) -> u64;

    /// Occupancy reduced to `0..NUM_QUANTA`, higher is fuller.
    fn quantized_occupancy(&self) -> u8;

    /// Recent utilization reduced to `0..NUM_QUANTA`, higher is busier.
    fn quantized_utilization(&self, now: SimTime) -> u8;

    fn is_paused(&self) -> bool;

    /// The element this link feeds, if it has been connected.
    fn remote_endpoint(&self) -> Option<Hop>;
}
