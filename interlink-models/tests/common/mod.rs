// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

#![allow(dead_code)]

use std::rc::Rc;

use interlink_components::types::{FlowId, HostId};
use interlink_engine::engine::Engine;
use interlink_engine::test_helpers::start_test;
use interlink_engine::time::SimTime;
use interlink_models::config::{InterSitePaths, MultiSiteConfig, RoutingConfig, RoutingStrategy};
use interlink_models::multi_site::{FlowSetup, MultiSiteTopology};
use interlink_models::network::Network;

pub const GBPS: u64 = 1_000_000_000;

/// Two sites of four hosts each: one pod of radix 4 switches per site.
pub fn two_sites(paths: InterSitePaths) -> MultiSiteConfig {
    MultiSiteConfig {
        num_sites: 2,
        num_hosts: 8,
        inter_site_paths: paths,
        ..MultiSiteConfig::default()
    }
}

pub fn build(
    file: &str,
    config: MultiSiteConfig,
    strategy: RoutingStrategy,
) -> (Engine<Network>, MultiSiteTopology) {
    let engine = start_test(file);
    let routing = Rc::new(RoutingConfig::with_strategy(strategy));
    let topology = MultiSiteTopology::new(config, &routing, engine.top()).unwrap();
    (engine, topology)
}

/// Add a flow of `num_packets` MTU sized packets and start it at time zero.
pub fn start_flow(
    engine: &mut Engine<Network>,
    topology: &mut MultiSiteTopology,
    flow: u64,
    src: usize,
    dst: usize,
    num_packets: u64,
    bits_per_sec: u64,
) {
    let setup = FlowSetup {
        flow: FlowId(flow),
        src: HostId(src),
        dst: HostId(dst),
        size_bytes: num_packets * topology.config().fabric.mtu_bytes as u64,
        bits_per_sec: bits_per_sec as f64,
    };
    let index = topology.add_flow(&setup).unwrap().unwrap();
    topology
        .network_mut()
        .start_source(engine, index, SimTime::ZERO)
        .unwrap();
}
