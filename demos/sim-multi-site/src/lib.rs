// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Simulate constant-rate flows across several fat-tree sites.
//!
//! Each site is a three-tier fat tree whose core switches connect to a
//! gateway. The gateways of all sites are joined by a full mesh of
//! wide-area links.
//!
//! The flows to simulate come from a connection matrix file (`--tm`) or are
//! generated as an all-to-all pattern. Every flow sends at a constant rate
//! chosen so that the hosts are loaded evenly:
//!
//! ```text
//! rate = link speed / (connections / nodes) * rate_coef
//! ```
//!
//! where inter-site flows use the wide-area link speed. At the end a CSV
//! flow log is written with the completion time of every flow.
//!
//! # Examples
//!
//! Run the default all-to-all pattern between two sites of 64 hosts with
//! adaptive routing:
//!
//! ```bash
//! cargo run --bin sim-multi-site --release -- --strategy pkt-ar
//! ```
//!
//! Let every switch route packets between sites:
//!
//! ```bash
//! cargo run --bin sim-multi-site --release -- --nodes 32 --inter-site-paths switch-routed
//! ```

pub mod config;
pub mod connection_matrix;
pub mod flow_builder;
pub mod runner;
