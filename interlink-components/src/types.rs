// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Shared types.
//!
//! This file defines the handles used to refer to components held in the
//! network arena, and the [`Hop`] that routes are made of.

use std::fmt;

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident, $inner:ty, $prefix:expr) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub $inner);

        impl $name {
            #[must_use]
            pub fn index(&self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "{}{}", $prefix, self.0)
            }
        }
    };
}

handle!(
    /// Global identifier of an end host.
    HostId, usize, "h"
);
handle!(
    /// Handle of a [`Queue`](crate::queue::Queue) in the arena.
    QueueId, usize, "q"
);
handle!(
    /// Handle of a [`Pipe`](crate::pipe::Pipe) in the arena.
    PipeId, usize, "p"
);
handle!(
    /// Handle of a switch in the arena.
    SwitchId, usize, "sw"
);
handle!(
    /// Handle of a [`FairScheduler`](crate::scheduler::FairScheduler) in the
    /// arena.
    SchedulerId, usize, "fs"
);
handle!(
    /// Handle of a [`FlowSink`](crate::sink::FlowSink) in the arena.
    SinkId, usize, "sink"
);
handle!(
    /// Identifier of a flow; stable for the whole simulation.
    FlowId, u64, "flow"
);
handle!(
    /// Unique identifier of a packet.
    PacketId, u64, "pkt"
);

/// One step along a [`Route`](crate::route::Route).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Hop {
    Queue(QueueId),
    Pipe(PipeId),
    Switch(SwitchId),
    Scheduler(SchedulerId),
    /// The terminal port of a host, which hands packets to flow sinks.
    Host(HostId),
}

impl Hop {
    #[must_use]
    pub fn as_queue(&self) -> Option<QueueId> {
        match self {
            Hop::Queue(queue) => Some(*queue),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_switch(&self) -> Option<SwitchId> {
        match self {
            Hop::Switch(switch) => Some(*switch),
            _ => None,
        }
    }
}

impl fmt::Display for Hop {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Hop::Queue(id) => id.fmt(f),
            Hop::Pipe(id) => id.fmt(f),
            Hop::Switch(id) => id.fmt(f),
            Hop::Scheduler(id) => id.fmt(f),
            Hop::Host(id) => id.fmt(f),
        }
    }
}
