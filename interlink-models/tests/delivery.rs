// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

mod common;

use std::rc::Rc;

use common::{GBPS, build, start_flow, two_sites};
use interlink_components::packet::Packet;
use interlink_components::types::{FlowId, HostId, PacketId};
use interlink_engine::engine::Engine;
use interlink_engine::test_helpers::start_test;
use interlink_engine::time::SimTime;
use interlink_models::config::{FabricConfig, InterSitePaths, RoutingConfig, RoutingStrategy};
use interlink_models::fat_tree::FatTreeTopology;
use interlink_models::network::Network;
use interlink_models::switch::SiteInfo;

const ALL_STRATEGIES: [RoutingStrategy; 7] = [
    RoutingStrategy::Ecmp,
    RoutingStrategy::PktAr,
    RoutingStrategy::P2cAr,
    RoutingStrategy::FlAr,
    RoutingStrategy::EcmpAr,
    RoutingStrategy::Rr,
    RoutingStrategy::RrEcmp,
];

#[test]
fn source_routed_flows_complete() {
    let (mut engine, mut topology) = build(file!(), two_sites(InterSitePaths::SourceRouted), RoutingStrategy::Ecmp);
    start_flow(&mut engine, &mut topology, 1, 0, 5, 10, 50 * GBPS);
    start_flow(&mut engine, &mut topology, 2, 6, 1, 10, 50 * GBPS);
    start_flow(&mut engine, &mut topology, 3, 0, 3, 10, 50 * GBPS);

    engine.run(topology.network_mut()).unwrap();

    let network = topology.network();
    assert_eq!(network.stats().packets_sent, 30);
    assert_eq!(network.stats().delivered, 30);
    assert_eq!(network.stats().routing_drops, 0);
    for sink in network.sinks() {
        assert!(sink.is_complete(), "{} incomplete", sink.flow);
        assert_eq!(sink.received_bytes(), 10 * 4000);
    }

    // Source routes never ask a switch for a decision
    assert!(network.switches().iter().all(|s| s.stats().decisions == 0));
}

#[test]
fn switch_routed_flows_complete_with_every_strategy() {
    for strategy in ALL_STRATEGIES {
        let (mut engine, mut topology) = build(file!(), two_sites(InterSitePaths::SwitchRouted), strategy);
        start_flow(&mut engine, &mut topology, 1, 0, 4, 20, 50 * GBPS);
        start_flow(&mut engine, &mut topology, 2, 7, 2, 20, 50 * GBPS);

        engine.run(topology.network_mut()).unwrap();

        let network = topology.network();
        assert_eq!(network.stats().delivered, 40, "{strategy:?}");
        assert_eq!(network.stats().routing_drops, 0, "{strategy:?}");
        assert!(network.sinks().iter().all(|sink| sink.is_complete()), "{strategy:?}");
        let gateway = network.switch(topology.gateway(0).unwrap()).unwrap();
        assert_eq!(gateway.stats().decisions, 40, "{strategy:?}");
    }
}

#[test]
fn switch_routed_crossing_takes_longer_than_wan_delay() {
    let (mut engine, mut topology) = build(file!(), two_sites(InterSitePaths::SwitchRouted), RoutingStrategy::Ecmp);
    start_flow(&mut engine, &mut topology, 1, 1, 6, 1, 50 * GBPS);
    engine.run(topology.network_mut()).unwrap();

    let sink = &topology.network().sinks()[0];
    let arrival = sink.completed_at().unwrap();
    assert!(arrival > topology.config().wan_delay);
}

#[test]
fn adaptive_avoids_a_paused_uplink() {
    let (mut engine, mut topology) = build(file!(), two_sites(InterSitePaths::SwitchRouted), RoutingStrategy::PktAr);
    let layout = topology.get_site(0).unwrap().layout().clone();
    let paused = layout.tor_up[0][0].queue;
    let open = layout.tor_up[0][1].queue;
    let queue = topology.network_mut().queue_mut(paused).unwrap();
    assert_eq!(queue.set_paused(true, SimTime::ZERO), None);

    start_flow(&mut engine, &mut topology, 1, 0, 4, 20, 50 * GBPS);
    engine.run(topology.network_mut()).unwrap();

    let network = topology.network();
    assert_eq!(network.queue(paused).unwrap().stats().enqueued, 0);
    assert_eq!(network.queue(open).unwrap().stats().enqueued, 20);
    assert!(network.sinks()[0].is_complete());
}

#[test]
fn flowlet_keeps_a_busy_flow_on_one_uplink() {
    let (mut engine, mut topology) = build(file!(), two_sites(InterSitePaths::SwitchRouted), RoutingStrategy::FlAr);
    start_flow(&mut engine, &mut topology, 1, 0, 4, 50, 50 * GBPS);
    engine.run(topology.network_mut()).unwrap();

    let layout = topology.get_site(0).unwrap().layout().clone();
    let network = topology.network();
    let used: Vec<u64> = layout.tor_up[0]
        .iter()
        .map(|link| network.queue(link.queue).unwrap().stats().enqueued)
        .collect();
    assert_eq!(used.iter().sum::<u64>(), 50);
    assert!(used.contains(&50), "{used:?}");
}

#[test]
fn round_robin_spreads_packets_over_uplinks() {
    let (mut engine, mut topology) = build(file!(), two_sites(InterSitePaths::SwitchRouted), RoutingStrategy::Rr);
    start_flow(&mut engine, &mut topology, 1, 0, 4, 20, 50 * GBPS);
    engine.run(topology.network_mut()).unwrap();

    let layout = topology.get_site(0).unwrap().layout().clone();
    let network = topology.network();
    for link in &layout.tor_up[0] {
        assert_eq!(network.queue(link.queue).unwrap().stats().enqueued, 10);
    }
}

#[test]
fn core_without_a_gateway_drops() {
    let mut engine: Engine<Network> = start_test(file!());
    let mut network = Network::new(engine.top(), 1);
    let site = SiteInfo {
        index: 0,
        num_sites: 2,
        hosts_per_site: 4,
        gateway: None,
    };
    let fabric = FabricConfig {
        num_hosts: 4,
        ..FabricConfig::default()
    };
    let routing = Rc::new(RoutingConfig::default());
    let topology = FatTreeTopology::new(&mut network, engine.top(), "site0", &fabric, &routing, site).unwrap();

    let mut pkt = Packet::data(PacketId(1), FlowId(1), HostId(0), HostId(5), 4000, SimTime::ZERO);
    pkt.set_route(Rc::new(topology.access_route(0).unwrap()));
    network.send(&mut engine, pkt).unwrap();
    engine.run(&mut network).unwrap();

    assert_eq!(network.stats().delivered, 0);
    assert_eq!(network.stats().routing_drops, 1);
    let misses: u64 = network.switches().iter().map(|s| s.stats().routing_misses).sum();
    assert_eq!(misses, 1);
}

#[test]
fn unknown_flows_are_dropped_at_the_host() {
    let (mut engine, mut topology) = build(file!(), two_sites(InterSitePaths::SourceRouted), RoutingStrategy::Ecmp);
    let route = topology.get_bidir_paths(HostId(0), HostId(1), false).remove(0);
    let mut pkt = Packet::data(PacketId(1), FlowId(99), HostId(0), HostId(1), 4000, SimTime::ZERO);
    pkt.set_route(route);
    topology.network_mut().send(&mut engine, pkt).unwrap();
    engine.run(topology.network_mut()).unwrap();

    assert_eq!(topology.network().stats().unknown_flow_drops, 1);
    assert_eq!(topology.network().stats().delivered, 0);
}
