// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Ranking of forwarding entries by the state of their egress link.
//!
//! Every comparison returns [`Ordering::Greater`] when the left entry is the
//! better choice. Combined comparators apply their criteria in order and
//! only fall through to the next one on a tie.

use std::cmp::Ordering;
use std::collections::HashMap;

use interlink_components::types::QueueId;
use interlink_engine::time::SimTime;

use crate::config::ComparatorKind;
use crate::fib::FibEntry;
use crate::network::Links;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Criterion {
    /// An unpaused link beats a paused one
    Pause,

    /// Lower quantized occupancy wins
    Queue,

    /// Lower quantized utilization wins
    Bandwidth,

    /// Fewer flows already placed on the link wins
    FlowCount,
}

impl ComparatorKind {
    #[must_use]
    pub fn criteria(&self) -> &'static [Criterion] {
        use Criterion::*;
        match self {
            ComparatorKind::Pause => &[Pause],
            ComparatorKind::Queue => &[Queue],
            ComparatorKind::Bandwidth => &[Bandwidth],
            ComparatorKind::FlowCount => &[FlowCount],
            ComparatorKind::PauseQueueBandwidth => &[Pause, Queue, Bandwidth],
            ComparatorKind::PauseQueue => &[Pause, Queue],
            ComparatorKind::QueueBandwidth => &[Queue, Bandwidth],
            ComparatorKind::PauseBandwidth => &[Pause, Bandwidth],
        }
    }
}

/// Everything a comparison may look at.
pub struct CompareContext<'a> {
    pub links: &'a Links<'a>,
    pub flow_counts: &'a HashMap<QueueId, u32>,
    pub now: SimTime,
}

/// The queue a forwarding entry transmits on.
#[must_use]
pub fn egress_queue(entry: &FibEntry) -> Option<QueueId> {
    entry.route.first().and_then(|hop| hop.as_queue())
}

#[must_use]
pub fn compare_entries(
    kind: ComparatorKind,
    left: &FibEntry,
    right: &FibEntry,
    ctx: &CompareContext,
) -> Ordering {
    for criterion in kind.criteria() {
        let ordering = compare_by(*criterion, left, right, ctx);
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn compare_by(criterion: Criterion, left: &FibEntry, right: &FibEntry, ctx: &CompareContext) -> Ordering {
    let (Some(lq), Some(rq)) = (egress_queue(left), egress_queue(right)) else {
        return Ordering::Equal;
    };

    if criterion == Criterion::FlowCount {
        let count = |q: QueueId| ctx.flow_counts.get(&q).copied().unwrap_or(0);
        return count(rq).cmp(&count(lq));
    }

    let (Some(l), Some(r)) = (ctx.links.link(lq), ctx.links.link(rq)) else {
        return Ordering::Equal;
    };
    match criterion {
        Criterion::Pause => r.is_paused().cmp(&l.is_paused()),
        Criterion::Queue => r.quantized_occupancy().cmp(&l.quantized_occupancy()),
        Criterion::Bandwidth => r
            .quantized_utilization(ctx.now)
            .cmp(&l.quantized_utilization(ctx.now)),
        Criterion::FlowCount => Ordering::Equal,
    }
}
