// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

use interlink_components::packet::Packet;
use interlink_components::scheduler::FairScheduler;
use interlink_components::types::{FlowId, HostId, PacketId};
use interlink_engine::time::SimTime;
use interlink_track::entity::toplevel;
use interlink_track::test_helpers::create_tracker;

fn pkt(id: u64, flow: u64) -> Packet {
    Packet::data(PacketId(id), FlowId(flow), HostId(0), HostId(1), 1000, SimTime::ZERO)
}

#[test]
fn zero_rate_is_an_error() {
    let top = toplevel(&create_tracker(file!()), "top");
    assert!(FairScheduler::new(&top, "fs", 0).is_err());
}

#[test]
fn flows_served_round_robin() {
    let top = toplevel(&create_tracker(file!()), "top");
    let mut fs = FairScheduler::new(&top, "fs", 8_000_000_000).unwrap();

    assert_eq!(fs.enqueue(pkt(1, 10)), Some(SimTime::from_us(1)));
    assert_eq!(fs.enqueue(pkt(2, 10)), None);
    assert_eq!(fs.enqueue(pkt(3, 10)), None);
    assert_eq!(fs.enqueue(pkt(4, 20)), None);
    assert_eq!(fs.enqueue(pkt(5, 20)), None);
    assert_eq!(fs.num_flows(), 2);
    assert_eq!(fs.num_queued(), 4);

    let mut order = Vec::new();
    while let Some((p, _)) = fs.complete_service() {
        order.push(p.id.0);
    }
    assert_eq!(order, vec![1, 4, 2, 5, 3]);
    assert_eq!(fs.num_queued(), 0);
}

#[test]
fn restarts_when_idle() {
    let top = toplevel(&create_tracker(file!()), "top");
    let mut fs = FairScheduler::new(&top, "fs", 8_000_000_000).unwrap();
    assert!(fs.enqueue(pkt(1, 1)).is_some());
    let (_, next) = fs.complete_service().unwrap();
    assert_eq!(next, None);
    assert!(fs.complete_service().is_none());
    assert!(fs.enqueue(pkt(2, 1)).is_some());
}
