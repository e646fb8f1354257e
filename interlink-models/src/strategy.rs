// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Selection among equal-cost forwarding entries.
//!
//! Each switch owns one [`RoutePolicy`] (chosen from the configured
//! [`RoutingStrategy`] and the switch role) and one [`Chooser`] that holds
//! the state the policies share: the random number generator, the ECMP
//! salt and the per-port flow counts.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::collections::hash_map::Entry;

use interlink_components::packet::Packet;
use interlink_components::types::{FlowId, QueueId};
use interlink_engine::time::SimTime;
use rand::seq::SliceRandom;
use rand::{Rng, RngCore, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::compare::{CompareContext, compare_entries, egress_queue};
use crate::config::{ComparatorKind, RoutingStrategy};
use crate::fib::FibEntry;
use crate::network::Links;
use crate::switch::SwitchRole;

/// Round robin reshuffles its candidates after this many passes.
pub const RR_PASSES_PER_SHUFFLE: usize = 5;

macro_rules! mix {
    ($a:ident, $b:ident, $c:ident) => {
        $a = $a.wrapping_sub($b).wrapping_sub($c) ^ ($c >> 13);
        $b = $b.wrapping_sub($c).wrapping_sub($a) ^ ($a << 8);
        $c = $c.wrapping_sub($a).wrapping_sub($b) ^ ($b >> 13);
        $a = $a.wrapping_sub($b).wrapping_sub($c) ^ ($c >> 12);
        $b = $b.wrapping_sub($c).wrapping_sub($a) ^ ($a << 16);
        $c = $c.wrapping_sub($a).wrapping_sub($b) ^ ($b >> 5);
        $a = $a.wrapping_sub($b).wrapping_sub($c) ^ ($c >> 3);
        $b = $b.wrapping_sub($c).wrapping_sub($a) ^ ($a << 10);
        $c = $c.wrapping_sub($a).wrapping_sub($b) ^ ($b >> 15);
    };
}

/// Bob Jenkins' 96 bit mix as used by the FreeBSD multipath hash.
#[must_use]
pub fn multipath_hash(flow: u32, path: u32, salt: u32) -> u32 {
    let mut a: u32 = 0x9e37_79b9;
    let mut b: u32 = 0x9e37_79b9;
    let mut c: u32 = salt;
    a = a.wrapping_add(flow);
    b = b.wrapping_add(path);
    mix!(a, b, c);
    c
}

/// What a policy is deciding for.
pub struct Decision<'a> {
    pub pkt: &'a Packet,
    pub links: &'a Links<'a>,
    pub now: SimTime,
}

/// Per-switch state used by the policies.
pub struct Chooser {
    rng: Xoshiro256PlusPlus,
    salt: u32,
    comparator: ComparatorKind,
    flow_counts: HashMap<QueueId, u32>,
}

impl Chooser {
    #[must_use]
    pub fn new(seed: u64, comparator: ComparatorKind) -> Self {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
        let salt = rng.next_u32();
        Self {
            rng,
            salt,
            comparator,
            flow_counts: HashMap::new(),
        }
    }

    pub fn rng(&mut self) -> &mut Xoshiro256PlusPlus {
        &mut self.rng
    }

    #[must_use]
    pub fn flow_count(&self, queue: QueueId) -> u32 {
        self.flow_counts.get(&queue).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn ecmp(&self, pkt: &Packet, num_entries: usize) -> usize {
        multipath_hash(pkt.flow.0 as u32, pkt.path_id, self.salt) as usize % num_entries
    }

    /// Compare two entries; `Greater` means `left` is preferred.
    #[must_use]
    pub fn compare(&self, left: &FibEntry, right: &FibEntry, links: &Links, now: SimTime) -> Ordering {
        let ctx = CompareContext {
            links,
            flow_counts: &self.flow_counts,
            now,
        };
        compare_entries(self.comparator, left, right, &ctx)
    }

    /// Indices of the entries that tie for best, and the index of the worst.
    fn rank(&self, entries: &[FibEntry], links: &Links, now: SimTime) -> (Vec<usize>, usize) {
        let mut best = vec![0];
        let mut worst = 0;
        for i in 1..entries.len() {
            match self.compare(&entries[best[0]], &entries[i], links, now) {
                Ordering::Less => {
                    best.clear();
                    best.push(i);
                }
                Ordering::Equal => best.push(i),
                Ordering::Greater => {}
            }
            if self.compare(&entries[worst], &entries[i], links, now) == Ordering::Greater {
                worst = i;
            }
        }
        (best, worst)
    }

    /// Pick uniformly among the best entries.
    pub fn adaptive(&mut self, entries: &[FibEntry], links: &Links, now: SimTime) -> usize {
        let (best, _) = self.rank(entries, links, now);
        let choice = best[self.rng.gen_range(0..best.len())];

        if self.comparator == ComparatorKind::FlowCount {
            if let Some(queue) = egress_queue(&entries[choice]) {
                *self.flow_counts.entry(queue).or_insert(0) += 1;
            }
        }
        choice
    }

    /// Sample two entries and keep the one with the emptier egress queue.
    pub fn power_of_two(&mut self, entries: &[FibEntry], links: &Links) -> usize {
        let mut choice = 0;
        let mut min = u64::MAX;
        for _ in 0..2 {
            let candidate = self.rng.gen_range(0..entries.len());
            let occupancy = egress_queue(&entries[candidate])
                .and_then(|q| links.link(q))
                .map_or(0, |link| link.instantaneous_occupancy());
            if occupancy < min {
                choice = candidate;
                min = occupancy;
            }
        }
        choice
    }

    /// If `my_choice` is as bad as the worst entry, swap it for one of the
    /// best. When every entry ties `my_choice` is kept.
    pub fn replace_worst(
        &mut self,
        entries: &[FibEntry],
        links: &Links,
        now: SimTime,
        my_choice: usize,
    ) -> usize {
        let (best, worst) = self.rank(entries, links, now);
        let worst = &entries[worst];
        if self.compare(&entries[my_choice], worst, links, now) != Ordering::Equal
            || self.compare(&entries[best[0]], worst, links, now) == Ordering::Equal
        {
            return my_choice;
        }
        best[self.rng.gen_range(0..best.len())]
    }

    pub fn permute(&mut self, entries: &mut [FibEntry]) {
        entries.shuffle(&mut self.rng);
    }
}

/// A way of choosing one of several equal-cost entries.
pub trait RoutePolicy {
    fn name(&self) -> &'static str;

    /// Return the index of the chosen entry. `entries` is never empty.
    fn choose(&mut self, chooser: &mut Chooser, entries: &mut [FibEntry], decision: &Decision) -> usize;
}

#[derive(Default)]
pub struct EcmpPolicy;

impl RoutePolicy for EcmpPolicy {
    fn name(&self) -> &'static str {
        "ecmp"
    }

    fn choose(&mut self, chooser: &mut Chooser, entries: &mut [FibEntry], decision: &Decision) -> usize {
        chooser.ecmp(decision.pkt, entries.len())
    }
}

#[derive(Default)]
pub struct AdaptivePolicy;

impl RoutePolicy for AdaptivePolicy {
    fn name(&self) -> &'static str {
        "adaptive"
    }

    fn choose(&mut self, chooser: &mut Chooser, entries: &mut [FibEntry], decision: &Decision) -> usize {
        chooser.adaptive(entries, decision.links, decision.now)
    }
}

#[derive(Default)]
pub struct PowerOfTwoPolicy;

impl RoutePolicy for PowerOfTwoPolicy {
    fn name(&self) -> &'static str {
        "power-of-two"
    }

    fn choose(&mut self, chooser: &mut Chooser, entries: &mut [FibEntry], decision: &Decision) -> usize {
        chooser.power_of_two(entries, decision.links)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FlowletRecord {
    pub egress: usize,
    pub last: SimTime,
}

/// Adaptive routing that keeps a flow on its egress until a gap in the flow
/// of more than `sticky_delta`.
pub struct FlowletPolicy {
    sticky_delta: SimTime,
    records: HashMap<FlowId, FlowletRecord>,
}

impl FlowletPolicy {
    #[must_use]
    pub fn new(sticky_delta: SimTime) -> Self {
        Self {
            sticky_delta,
            records: HashMap::new(),
        }
    }

    #[must_use]
    pub fn record(&self, flow: FlowId) -> Option<&FlowletRecord> {
        self.records.get(&flow)
    }
}

impl RoutePolicy for FlowletPolicy {
    fn name(&self) -> &'static str {
        "flowlet"
    }

    fn choose(&mut self, chooser: &mut Chooser, entries: &mut [FibEntry], decision: &Decision) -> usize {
        let now = decision.now;
        let record = match self.records.entry(decision.pkt.flow) {
            Entry::Vacant(vacant) => {
                let egress = chooser.adaptive(entries, decision.links, now);
                vacant.insert(FlowletRecord { egress, last: now });
                return egress;
            }
            Entry::Occupied(occupied) => occupied.into_mut(),
        };

        let current = record.egress % entries.len();
        record.egress = current;
        if now.saturating_sub(record.last) > self.sticky_delta && chooser.rng().gen_bool(0.5) {
            let candidate = chooser.adaptive(entries, decision.links, now);
            if chooser.compare(&entries[current], &entries[candidate], decision.links, now)
                == Ordering::Less
            {
                record.egress = candidate;
            }
        }
        record.last = now;
        record.egress
    }
}

#[derive(Default)]
pub struct EcmpAdaptivePolicy;

impl RoutePolicy for EcmpAdaptivePolicy {
    fn name(&self) -> &'static str {
        "ecmp-adaptive"
    }

    fn choose(&mut self, chooser: &mut Chooser, entries: &mut [FibEntry], decision: &Decision) -> usize {
        let choice = chooser.ecmp(decision.pkt, entries.len());
        if chooser.rng().gen_bool(0.5) {
            chooser.replace_worst(entries, decision.links, decision.now, choice)
        } else {
            choice
        }
    }
}

/// Cycle through the entries, shuffling them every
/// [`RR_PASSES_PER_SHUFFLE`] passes.
///
/// The counter is shared by all destinations at a switch.
#[derive(Default)]
pub struct RoundRobinPolicy {
    counter: usize,
}

impl RoundRobinPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn counter(&self) -> usize {
        self.counter
    }
}

impl RoutePolicy for RoundRobinPolicy {
    fn name(&self) -> &'static str {
        "round-robin"
    }

    fn choose(&mut self, chooser: &mut Chooser, entries: &mut [FibEntry], _decision: &Decision) -> usize {
        if self.counter >= RR_PASSES_PER_SHUFFLE * entries.len() {
            self.counter = 0;
            chooser.permute(entries);
        }
        let choice = self.counter % entries.len();
        self.counter += 1;
        choice
    }
}

/// Build the policy a switch of `role` uses under `strategy`.
///
/// Gateways always hash.
#[must_use]
pub fn build_policy(strategy: RoutingStrategy, role: SwitchRole, sticky_delta: SimTime) -> Box<dyn RoutePolicy> {
    if role == SwitchRole::Gateway {
        return Box::new(EcmpPolicy);
    }
    match strategy {
        RoutingStrategy::Ecmp => Box::new(EcmpPolicy),
        RoutingStrategy::PktAr => Box::new(AdaptivePolicy),
        RoutingStrategy::P2cAr => Box::new(PowerOfTwoPolicy),
        RoutingStrategy::FlAr => Box::new(FlowletPolicy::new(sticky_delta)),
        RoutingStrategy::EcmpAr => Box::new(EcmpAdaptivePolicy),
        RoutingStrategy::Rr => Box::new(RoundRobinPolicy::new()),
        RoutingStrategy::RrEcmp => {
            if role == SwitchRole::Access {
                Box::new(RoundRobinPolicy::new())
            } else {
                Box::new(EcmpPolicy)
            }
        }
    }
}
