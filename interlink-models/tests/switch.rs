// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

mod common;

use std::collections::HashSet;
use std::rc::Rc;

use common::{build, two_sites};
use interlink_components::capability::LinkCapability;
use interlink_components::packet::{Direction, Packet};
use interlink_components::route::Route;
use interlink_components::types::{FlowId, Hop, HostId, PacketId, QueueId};
use interlink_engine::engine::Engine;
use interlink_engine::test_helpers::start_test;
use interlink_engine::time::SimTime;
use interlink_models::config::{ComparatorKind, InterSitePaths, MultiSiteConfig, RoutingConfig, RoutingStrategy};
use interlink_models::fat_tree::FabricLayout;
use interlink_models::fib::FibEntry;
use interlink_models::multi_site::{FlowSetup, MultiSiteTopology};
use interlink_models::network::Network;
use interlink_models::strategy::{Chooser, Decision, FlowletPolicy, RoutePolicy};
use interlink_models::switch::SwitchAction;

fn data(id: u64, flow: u64, src: usize, dst: usize) -> Packet {
    Packet::data(PacketId(id), FlowId(flow), HostId(src), HostId(dst), 4000, SimTime::ZERO)
}

/// Two sites of eight hosts: two pods per site.
fn two_pods() -> MultiSiteConfig {
    MultiSiteConfig {
        num_hosts: 16,
        ..two_sites(InterSitePaths::SwitchRouted)
    }
}

fn site0_layout(topology: &MultiSiteTopology) -> Rc<FabricLayout> {
    topology.get_site(0).unwrap().layout().clone()
}

/// One entry per uplink of the first access switch.
fn uplink_entries(layout: &FabricLayout) -> Vec<FibEntry> {
    layout.tor_up[0]
        .iter()
        .map(|link| FibEntry::new(Rc::new(Route::from_hops(link.hops().to_vec())), 1, Direction::Up))
        .collect()
}

fn first_queue(route: &Route) -> QueueId {
    route.first().and_then(|hop| hop.as_queue()).unwrap()
}

/// Fill a queue without letting it drain.
fn load(topology: &mut MultiSiteTopology, queue: QueueId, num_packets: u64) {
    let queue = topology.network_mut().queue_mut(queue).unwrap();
    queue.set_paused(true, SimTime::ZERO);
    for id in 0..num_packets {
        queue.enqueue(data(100 + id, 1, 0, 5), SimTime::ZERO);
    }
}

#[test]
fn decision_then_crossbar_then_forward() {
    let (_engine, mut topology) = build(file!(), two_sites(InterSitePaths::SwitchRouted), RoutingStrategy::Ecmp);
    let layout = site0_layout(&topology);
    let latency = topology.config().fabric.switch_latency;
    let (tor, links) = topology.network_mut().switch_with_links(layout.tors[0]).unwrap();
    assert_eq!(tor.policy_name(), "ecmp");

    let mut pkt = data(1, 1, 0, 5);
    let action = tor.process(&mut pkt, &links, SimTime::ZERO);
    assert_eq!(action, SwitchAction::Crossbar(latency));
    assert_eq!(tor.num_in_ingress(), 1);
    assert_eq!(pkt.direction, Direction::Up);
    let egress = first_queue(pkt.route().unwrap());
    assert!(layout.tor_up[0].iter().any(|link| link.queue == egress));

    // The same packet coming out of the crossbar is sent on
    assert_eq!(tor.process(&mut pkt, &links, SimTime::from_ns(1)), SwitchAction::Forward);
    assert_eq!(tor.num_in_ingress(), 0);
    assert_eq!(tor.stats().decisions, 1);
    assert_eq!(tor.stats().forwarded, 1);
}

#[test]
fn stamped_route_keeps_the_source_path_id() {
    let (_engine, mut topology) = build(file!(), two_sites(InterSitePaths::SwitchRouted), RoutingStrategy::Ecmp);
    let layout = site0_layout(&topology);
    let (tor, links) = topology.network_mut().switch_with_links(layout.tors[0]).unwrap();

    let mut pkt = data(1, 1, 0, 5);
    pkt.start_route(Rc::new(Route::from_hops(vec![Hop::Switch(layout.tors[0])]).with_path_id(3)));
    tor.process(&mut pkt, &links, SimTime::ZERO);
    assert_eq!(pkt.path_id, 3);
    assert_eq!(pkt.route().unwrap().path_id(), 0);
}

#[test]
fn pause_frame_pauses_the_port_towards_the_sender() {
    let (mut engine, mut topology) = build(file!(), two_sites(InterSitePaths::SwitchRouted), RoutingStrategy::Ecmp);
    let layout = site0_layout(&topology);
    let (tor, agg) = (layout.tors[0], layout.aggs[0]);
    let port = layout.tor_up[0][0].queue;

    topology.network_mut().send_pause(&mut engine, agg, tor, true).unwrap();
    let network = topology.network();
    assert!(network.queue(port).unwrap().is_paused());
    assert!(!network.queue(layout.tor_up[0][1].queue).unwrap().is_paused());
    assert_eq!(network.switch(tor).unwrap().stats().pause_frames, 1);
    assert_eq!(network.switch(tor).unwrap().stats().decisions, 0);

    topology.network_mut().send_pause(&mut engine, agg, tor, false).unwrap();
    assert!(!topology.network().queue(port).unwrap().is_paused());
    assert_eq!(topology.network().stats().routing_drops, 0);
}

#[test]
fn pause_from_an_unlinked_switch_is_dropped() {
    let (mut engine, mut topology) = build(file!(), two_sites(InterSitePaths::SwitchRouted), RoutingStrategy::Ecmp);
    let layout = site0_layout(&topology);

    // Access switches have no link to a core
    topology
        .network_mut()
        .send_pause(&mut engine, layout.cores[0], layout.tors[0], true)
        .unwrap();
    let network = topology.network();
    assert_eq!(network.stats().routing_drops, 1);
    assert_eq!(network.switch(layout.tors[0]).unwrap().stats().pause_frames, 0);
    assert!(layout.tor_up[0].iter().all(|link| !network.queue(link.queue).unwrap().is_paused()));
}

#[test]
fn access_switch_drops_local_host_of_another_switch() {
    let (_engine, mut topology) = build(file!(), two_sites(InterSitePaths::SwitchRouted), RoutingStrategy::Ecmp);
    let layout = site0_layout(&topology);
    let (tor, links) = topology.network_mut().switch_with_links(layout.tors[0]).unwrap();

    // Host 2 is in this site but hangs off the second access switch
    let mut pkt = data(1, 1, 0, 2);
    assert_eq!(tor.process(&mut pkt, &links, SimTime::ZERO), SwitchAction::Drop);
    assert_eq!(tor.stats().routing_misses, 1);
    assert_eq!(tor.num_in_ingress(), 0);
    assert!(tor.fib().lookup(HostId(2)).is_none());
}

#[test]
fn aggregation_switch_drops_another_pod_of_its_site() {
    let (_engine, mut topology) = build(file!(), two_pods(), RoutingStrategy::Ecmp);
    let layout = site0_layout(&topology);
    assert_eq!(layout.num_pods, 2);
    let (agg, links) = topology.network_mut().switch_with_links(layout.aggs[0]).unwrap();

    // Own pod: down to the access switch of the host
    let mut pkt = data(1, 1, 0, 2);
    let route = agg.decide(&mut pkt, &links, SimTime::ZERO).unwrap();
    assert_eq!(pkt.direction, Direction::Down);
    assert_eq!(route.last(), Some(Hop::Switch(layout.tors[1])));

    // Other site: up to every core this switch reaches
    let mut pkt = data(2, 1, 0, 9);
    agg.decide(&mut pkt, &links, SimTime::ZERO).unwrap();
    assert_eq!(pkt.direction, Direction::Up);
    assert_eq!(agg.fib().lookup(HostId(9)).unwrap().len(), layout.agg_up[0].len());

    // Other pod of this site
    let mut pkt = data(3, 1, 0, 5);
    assert!(agg.decide(&mut pkt, &links, SimTime::ZERO).is_err());
    assert_eq!(agg.process(&mut pkt, &links, SimTime::ZERO), SwitchAction::Drop);
    assert_eq!(agg.stats().routing_misses, 1);
}

#[test]
fn ecmp_pins_each_flow_at_a_switch() {
    let (_engine, mut topology) = build(file!(), two_sites(InterSitePaths::SwitchRouted), RoutingStrategy::Ecmp);
    let layout = site0_layout(&topology);
    let (tor, links) = topology.network_mut().switch_with_links(layout.tors[0]).unwrap();

    let mut used = HashSet::new();
    for flow in 0..32 {
        let egress: Vec<QueueId> = (0..4)
            .map(|n| {
                let mut pkt = data(flow * 10 + n, flow, 0, 5);
                first_queue(&tor.decide(&mut pkt, &links, SimTime::from_us(n)).unwrap())
            })
            .collect();
        assert!(egress.iter().all(|q| *q == egress[0]), "flow {flow}: {egress:?}");
        used.insert(egress[0]);
    }
    assert_eq!(used.len(), layout.tor_up[0].len());
}

#[test]
fn adaptive_choices_avoid_a_loaded_uplink() {
    let (_engine, mut topology) = build(file!(), two_sites(InterSitePaths::SwitchRouted), RoutingStrategy::PktAr);
    let layout = site0_layout(&topology);
    load(&mut topology, layout.tor_up[0][0].queue, 2);
    let entries = uplink_entries(&layout);
    let links = topology.network().links();
    assert_eq!(links.link(layout.tor_up[0][0].queue).unwrap().instantaneous_occupancy(), 8000);

    let mut chooser = Chooser::new(3, ComparatorKind::default());
    for _ in 0..20 {
        assert_eq!(chooser.adaptive(&entries, &links, SimTime::ZERO), 1);
    }

    // Replacing the worst choice always moves off the loaded uplink, and
    // never moves off a better one
    for _ in 0..20 {
        assert_eq!(chooser.replace_worst(&entries, &links, SimTime::ZERO, 0), 1);
        assert_eq!(chooser.replace_worst(&entries, &links, SimTime::ZERO, 1), 1);
    }
}

#[test]
fn replace_worst_keeps_the_choice_when_all_tie() {
    let (_engine, topology) = build(file!(), two_sites(InterSitePaths::SwitchRouted), RoutingStrategy::EcmpAr);
    let layout = site0_layout(&topology);
    let entries = uplink_entries(&layout);
    let links = topology.network().links();

    let mut chooser = Chooser::new(3, ComparatorKind::default());
    for _ in 0..20 {
        assert_eq!(chooser.replace_worst(&entries, &links, SimTime::ZERO, 0), 0);
        assert_eq!(chooser.replace_worst(&entries, &links, SimTime::ZERO, 1), 1);
    }
}

#[test]
fn power_of_two_prefers_the_emptier_uplink() {
    let (_engine, mut topology) = build(file!(), two_sites(InterSitePaths::SwitchRouted), RoutingStrategy::P2cAr);
    let layout = site0_layout(&topology);
    load(&mut topology, layout.tor_up[0][0].queue, 3);
    let entries = uplink_entries(&layout);
    let links = topology.network().links();

    let mut chooser = Chooser::new(11, ComparatorKind::default());
    let mut counts = [0usize; 2];
    for _ in 0..200 {
        counts[chooser.power_of_two(&entries, &links)] += 1;
    }
    // The loaded uplink is only chosen when it is sampled twice
    assert!(counts[0] < counts[1], "{counts:?}");
    assert!(counts[0] > 0, "{counts:?}");
}

#[test]
fn flowlet_moves_only_after_a_gap_and_only_to_a_better_uplink() {
    let (_engine, mut topology) = build(file!(), two_sites(InterSitePaths::SwitchRouted), RoutingStrategy::FlAr);
    let layout = site0_layout(&topology);
    let mut entries = uplink_entries(&layout);
    let sticky_delta = SimTime::from_us(10);
    let mut policy = FlowletPolicy::new(sticky_delta);
    let mut chooser = Chooser::new(7, ComparatorKind::default());
    let pkt = data(1, 4, 0, 5);

    let mut choose = |topology: &MultiSiteTopology, entries: &mut [FibEntry], policy: &mut FlowletPolicy, now: SimTime| {
        let links = topology.network().links();
        let decision = Decision {
            pkt: &pkt,
            links: &links,
            now,
        };
        policy.choose(&mut chooser, entries, &decision)
    };

    let pinned = choose(&topology, &mut entries, &mut policy, SimTime::ZERO);
    assert!(policy.record(FlowId(4)).is_some());
    assert!(policy.record(FlowId(5)).is_none());

    // Equally good uplinks: never worth moving, gap or not
    for n in 1..=20 {
        let now = SimTime::from_us(n * 100);
        assert_eq!(choose(&topology, &mut entries, &mut policy, now), pinned);
        assert_eq!(policy.record(FlowId(4)).unwrap().last, now);
    }

    // Pause the pinned uplink: packets close together stay on it
    let queue = first_queue(&entries[pinned].route);
    topology.network_mut().queue_mut(queue).unwrap().set_paused(true, SimTime::ZERO);
    let mut now = SimTime::from_us(2000);
    for _ in 0..20 {
        now += SimTime::from_us(5);
        assert_eq!(choose(&topology, &mut entries, &mut policy, now), pinned);
    }

    // After gaps longer than the threshold the flow moves to the open uplink
    let other = 1 - pinned;
    for _ in 0..40 {
        now += sticky_delta + SimTime::from_us(1);
        choose(&topology, &mut entries, &mut policy, now);
    }
    assert_eq!(policy.record(FlowId(4)).unwrap().egress, other);

    // and does not go back to the paused one
    for _ in 0..20 {
        now += sticky_delta + SimTime::from_us(1);
        assert_eq!(choose(&topology, &mut entries, &mut policy, now), other);
    }
}

#[test]
fn host_routes_are_installed_per_flow() {
    let (_engine, mut topology) = build(file!(), two_sites(InterSitePaths::SourceRouted), RoutingStrategy::Ecmp);
    let layout = site0_layout(&topology);
    let setup = |flow: u64, src: usize, dst: usize| FlowSetup {
        flow: FlowId(flow),
        src: HostId(src),
        dst: HostId(dst),
        size_bytes: 4000,
        bits_per_sec: 1e9,
    };
    topology.add_flow(&setup(1, 0, 1)).unwrap().unwrap();
    topology.add_flow(&setup(2, 0, 5)).unwrap().unwrap();

    let fib = topology.network().switch(layout.tors[0]).unwrap().fib();
    // Flow 1 at both of its hosts, flow 2 at its source
    assert_eq!(fib.num_host_routes(), 3);
    assert!(fib.host_route(HostId(1), FlowId(1)).is_some());
    assert!(fib.host_route(HostId(1), FlowId(2)).is_none());
}

#[test]
fn switches_share_one_routing_config() {
    let engine: Engine<Network> = start_test(file!());
    let routing = Rc::new(RoutingConfig::with_strategy(RoutingStrategy::FlAr));
    let topology = MultiSiteTopology::new(two_sites(InterSitePaths::SwitchRouted), &routing, engine.top()).unwrap();

    let switches = topology.network().switches();
    assert_eq!(Rc::strong_count(&routing), 1 + switches.len());
    assert!(switches.iter().all(|s| s.routing().strategy == RoutingStrategy::FlAr));

    let layout = site0_layout(&topology);
    let tor = topology.network().switch(layout.tors[0]).unwrap();
    assert_eq!(tor.policy_name(), "flowlet");
    let gateway = topology.network().switch(topology.gateway(0).unwrap()).unwrap();
    assert_eq!(gateway.policy_name(), "ecmp");
}
