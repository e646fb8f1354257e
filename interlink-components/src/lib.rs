// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Simulation components.
//!
//! Everything a packet can pass through is stored in an arena and referred to
//! by a typed handle (see [`types`]). A [`Route`](route::Route) is a list of
//! [`Hop`](types::Hop)s and a [`Packet`](packet::Packet) carries the route it
//! is following.
//!
//! The components themselves are plain state machines: they are told the
//! current time and return what should happen next, leaving the scheduling of
//! events to the owner of the arena.

pub mod capability;
pub mod host;
pub mod packet;
pub mod pipe;
pub mod queue;
pub mod route;
pub mod scheduler;
pub mod sink;
pub mod types;
