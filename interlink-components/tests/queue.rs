// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

use std::rc::Rc;

use interlink_components::capability::LinkCapability;
use interlink_components::packet::Packet;
use interlink_components::queue::{EnqueueOutcome, Queue, QueueConfig, UTILIZATION_WINDOW};
use interlink_components::types::{FlowId, Hop, HostId, PacketId, PipeId, SwitchId};
use interlink_engine::time::SimTime;
use interlink_track::entity::{Entity, toplevel};
use interlink_track::test_helpers::create_tracker;

const GBPS: u64 = 1_000_000_000;

fn top(file: &str) -> Rc<Entity> {
    toplevel(&create_tracker(file), "top")
}

fn pkt(id: u64, size: usize) -> Packet {
    Packet::data(PacketId(id), FlowId(1), HostId(0), HostId(1), size, SimTime::ZERO)
}

fn queue(top: &Rc<Entity>, capacity: u64) -> Queue {
    Queue::new(top, "q", QueueConfig::new(capacity, 8 * GBPS), 1000).unwrap()
}

#[test]
fn rejects_tiny_capacity() {
    let top = top(file!());
    assert!(Queue::new(&top, "q", QueueConfig::new(500, GBPS), 1000).is_err());
    assert!(Queue::new(&top, "q", QueueConfig::new(5000, 0), 1000).is_err());
}

#[test]
fn serves_in_order() {
    let top = top(file!());
    let mut q = queue(&top, 10_000);

    // 1000 bytes at 8Gbps takes 1us
    match q.enqueue(pkt(1, 1000), SimTime::ZERO) {
        EnqueueOutcome::StartService(delay) => assert_eq!(delay, SimTime::from_us(1)),
        other => panic!("unexpected {other:?}"),
    }
    assert!(matches!(q.enqueue(pkt(2, 2000), SimTime::ZERO), EnqueueOutcome::Queued));
    assert_eq!(q.instantaneous_occupancy(), 3000);

    let (first, next) = q.complete_service(SimTime::from_us(1)).unwrap();
    assert_eq!(first.id, PacketId(1));
    assert_eq!(next, Some(SimTime::from_us(2)));

    let (second, next) = q.complete_service(SimTime::from_us(3)).unwrap();
    assert_eq!(second.id, PacketId(2));
    assert_eq!(next, None);
    assert!(q.is_empty());
    assert_eq!(q.stats().bytes_sent, 3000);
    assert!(q.complete_service(SimTime::from_us(3)).is_none());
}

#[test]
fn drop_tail() {
    let top = top(file!());
    let mut q = queue(&top, 2500);
    q.enqueue(pkt(1, 1000), SimTime::ZERO);
    q.enqueue(pkt(2, 1000), SimTime::ZERO);
    match q.enqueue(pkt(3, 1000), SimTime::ZERO) {
        EnqueueOutcome::Dropped(p) => assert_eq!(p.id, PacketId(3)),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(q.stats().dropped, 1);
    assert_eq!(q.stats().enqueued, 2);
}

#[test]
fn ecn_marks_above_threshold() {
    let top = top(file!());
    let mut q = queue(&top, 4000);
    q.enqueue(pkt(1, 1000), SimTime::ZERO);
    q.enqueue(pkt(2, 1000), SimTime::ZERO);
    q.enqueue(pkt(3, 1000), SimTime::ZERO);

    let marks: Vec<bool> = (0..3)
        .map(|i| q.complete_service(SimTime::from_us(i + 1)).unwrap().0.ecn_ce)
        .collect();
    assert_eq!(marks, vec![false, false, true]);
    assert_eq!(q.stats().ecn_marked, 1);
}

#[test]
fn quantized_occupancy_bands() {
    let top = top(file!());
    // bands at 2000 (speculative), 5000 (ecn) and 7500
    let mut q = queue(&top, 10_000);
    assert_eq!(q.quantized_occupancy(), 0);
    q.enqueue(pkt(1, 1000), SimTime::ZERO);
    assert_eq!(q.quantized_occupancy(), 0);
    q.enqueue(pkt(2, 1000), SimTime::ZERO);
    assert_eq!(q.quantized_occupancy(), 1);
    q.enqueue(pkt(3, 3000), SimTime::ZERO);
    assert_eq!(q.quantized_occupancy(), 2);
    q.enqueue(pkt(4, 3000), SimTime::ZERO);
    assert_eq!(q.quantized_occupancy(), 3);
}

#[test]
fn pause_lets_current_packet_finish() {
    let top = top(file!());
    let mut q = queue(&top, 10_000);
    q.enqueue(pkt(1, 1000), SimTime::ZERO);
    q.enqueue(pkt(2, 1000), SimTime::ZERO);

    assert_eq!(q.set_paused(true, SimTime::ZERO), None);
    assert!(q.is_paused());

    let (first, next) = q.complete_service(SimTime::from_us(1)).unwrap();
    assert_eq!(first.id, PacketId(1));
    assert_eq!(next, None);

    assert!(matches!(q.enqueue(pkt(3, 1000), SimTime::from_us(1)), EnqueueOutcome::Queued));
    assert_eq!(q.set_paused(false, SimTime::from_us(2)), Some(SimTime::from_us(1)));
    assert_eq!(q.set_paused(false, SimTime::from_us(2)), None);
}

#[test]
fn utilization_quartiles() {
    let top = top(file!());
    // 10us at 8Gbps is 10000 bytes
    let mut q = queue(&top, 100_000);
    for i in 0..6 {
        q.enqueue(pkt(i, 1000), SimTime::ZERO);
    }
    for i in 0..6 {
        q.complete_service(SimTime::from_us(i + 1));
    }
    assert_eq!(q.quantized_utilization(SimTime::from_us(9)), 0);
    assert_eq!(q.quantized_utilization(UTILIZATION_WINDOW), 2);
    assert_eq!(q.quantized_utilization(UTILIZATION_WINDOW * 3), 0);
}

#[test]
fn owner_and_remote() {
    let top = top(file!());
    let mut q = queue(&top, 10_000);
    assert_eq!(q.remote_endpoint(), None);
    q.set_owner(SwitchId(4));
    q.connect(Hop::Pipe(PipeId(9)));
    assert_eq!(q.owner(), Some(SwitchId(4)));
    assert_eq!(q.remote_endpoint(), Some(Hop::Pipe(PipeId(9))));
}
