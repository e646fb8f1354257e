// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Routing models for multi-site fabrics.
//!
//! A [`MultiSiteTopology`](multi_site::MultiSiteTopology) builds one
//! [`FatTreeTopology`](fat_tree::FatTreeTopology) per site, a gateway
//! [`Switch`](switch::Switch) per site and a full mesh of wide-area links
//! between the gateways. Every element lives in the
//! [`Network`](network::Network) arena, which is also the world that the
//! [`Engine`](interlink_engine::engine::Engine) drives.
//!
//! Switches build their forwarding tables lazily and choose among equal-cost
//! entries using one of the policies in [`strategy`].

pub mod compare;
pub mod config;
pub mod fat_tree;
pub mod fib;
pub mod multi_site;
pub mod network;
pub mod strategy;
pub mod switch;
pub mod traffic;
