// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! A forwarding switch.
//!
//! Packets that arrive at a switch go through two phases:
//!  - on first arrival the switch chooses an egress entry, stamps the packet
//!    with the entry's route and direction, and sends it through the
//!    crossbar (a fixed latency),
//!  - when the packet comes back out of the crossbar it is forwarded along
//!    the stamped route.
//!
//! Pause frames skip both phases and are applied straight to the egress
//! queue facing the sender.
//!
//! Forwarding entries are built the first time a destination is seen, by an
//! algorithm that depends on the [`SwitchRole`]. Gateways are the exception:
//! all of their entries are installed when the topology is built.

use std::collections::HashSet;
use std::rc::Rc;

use interlink_components::packet::{Direction, Packet, PacketKind};
use interlink_components::route::Route;
use interlink_components::types::{FlowId, Hop, HostId, PacketId, PipeId, QueueId, SwitchId};
use interlink_engine::sim_error;
use interlink_engine::time::SimTime;
use interlink_engine::types::SimResult;
use interlink_track::entity::Entity;
use interlink_track::{error, trace, warn};
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::config::RoutingConfig;
use crate::fat_tree::FabricLayout;
use crate::fib::{Fib, RoutingMiss};
use crate::network::Links;
use crate::strategy::{Chooser, Decision, RoutePolicy, build_policy};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SwitchRole {
    /// Leaf switch with hosts attached
    Access,
    Aggregation,
    Core,
    /// Terminates the wide-area mesh for a site
    Gateway,
}

/// Where a switch sits in the multi-site address space.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SiteInfo {
    pub index: usize,
    pub num_sites: usize,
    pub hosts_per_site: usize,
    pub gateway: Option<SwitchId>,
}

impl SiteInfo {
    /// A lone site with no gateway.
    #[must_use]
    pub fn single(num_hosts: usize) -> Self {
        Self {
            index: 0,
            num_sites: 1,
            hosts_per_site: num_hosts,
            gateway: None,
        }
    }

    #[must_use]
    pub fn site_of(&self, host: HostId) -> usize {
        host.0 / self.hosts_per_site
    }

    #[must_use]
    pub fn local_id(&self, host: HostId) -> usize {
        host.0 % self.hosts_per_site
    }

    #[must_use]
    pub fn host_offset(&self) -> usize {
        self.index * self.hosts_per_site
    }

    #[must_use]
    pub fn is_valid_host(&self, host: HostId) -> bool {
        host.0 < self.hosts_per_site * self.num_sites
    }

    #[must_use]
    pub fn is_local(&self, host: HostId) -> bool {
        self.site_of(host) == self.index
    }
}

/// What the owner of a switch must do with a packet after
/// [`Switch::process`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SwitchAction {
    Drop,
    /// Return the packet to this switch after the delay.
    Crossbar(SimTime),
    /// Send the packet on along its route.
    Forward,
    /// Pause or resume an egress queue.
    Pause { queue: QueueId, pause: bool },
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SwitchStats {
    pub decisions: u64,
    pub forwarded: u64,
    pub routing_misses: u64,
    pub pause_frames: u64,
}

pub struct Switch {
    pub entity: Rc<Entity>,
    id: SwitchId,
    role: SwitchRole,

    /// Index of this switch within its tier of the fabric.
    tier_index: usize,

    site: SiteInfo,
    layout: Option<Rc<FabricLayout>>,
    ports: Vec<QueueId>,
    fib: Fib,

    /// First remote destination whose uplink entry set is shared by all
    /// other remote destinations (access switches only).
    uplink_dest: Option<HostId>,

    policy: Box<dyn RoutePolicy>,
    chooser: Chooser,
    routing: Rc<RoutingConfig>,
    latency: SimTime,
    in_ingress: HashSet<PacketId>,
    stats: SwitchStats,
}

impl Switch {
    #[must_use]
    #[expect(clippy::too_many_arguments)]
    pub fn new(
        parent: &Rc<Entity>,
        name: &str,
        id: SwitchId,
        role: SwitchRole,
        tier_index: usize,
        site: SiteInfo,
        routing: &Rc<RoutingConfig>,
        latency: SimTime,
    ) -> Self {
        let seed = routing.seed ^ (id.0 as u64 + 1).wrapping_mul(0x9e37_79b9_7f4a_7c15);
        Self {
            entity: Rc::new(Entity::new(parent, name)),
            id,
            role,
            tier_index,
            site,
            layout: None,
            ports: Vec::new(),
            fib: Fib::new(),
            uplink_dest: None,
            policy: build_policy(routing.strategy, role, routing.sticky_delta),
            chooser: Chooser::new(seed, routing.comparator),
            routing: routing.clone(),
            latency,
            in_ingress: HashSet::new(),
            stats: SwitchStats::default(),
        }
    }

    #[must_use]
    pub fn id(&self) -> SwitchId {
        self.id
    }

    #[must_use]
    pub fn role(&self) -> SwitchRole {
        self.role
    }

    #[must_use]
    pub fn tier_index(&self) -> usize {
        self.tier_index
    }

    #[must_use]
    pub fn site(&self) -> &SiteInfo {
        &self.site
    }

    pub fn set_gateway(&mut self, gateway: SwitchId) {
        self.site.gateway = Some(gateway);
    }

    pub fn attach_layout(&mut self, layout: Rc<FabricLayout>) {
        self.layout = Some(layout);
    }

    pub fn add_port(&mut self, queue: QueueId) {
        self.ports.push(queue);
    }

    #[must_use]
    pub fn ports(&self) -> &[QueueId] {
        &self.ports
    }

    #[must_use]
    pub fn fib(&self) -> &Fib {
        &self.fib
    }

    #[must_use]
    pub fn routing(&self) -> &RoutingConfig {
        &self.routing
    }

    #[must_use]
    pub fn stats(&self) -> &SwitchStats {
        &self.stats
    }

    #[must_use]
    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    #[must_use]
    pub fn num_in_ingress(&self) -> usize {
        self.in_ingress.len()
    }

    /// Install a forwarding entry directly. Used for the entries a gateway
    /// is given when the topology is built.
    pub fn install_entry(&mut self, dest: HostId, route: Rc<Route>, direction: Direction) {
        self.fib.add_entry(dest, route, 1, direction);
    }

    /// Install an inter-site entry at a gateway.
    pub fn add_wan_route(&mut self, dest: HostId, route: Rc<Route>) -> SimResult {
        if self.role != SwitchRole::Gateway {
            warn!(self.entity ; "add_wan_route for {} on a {:?} switch", dest, self.role);
            return sim_error!(format!(
                "{}: WAN routes can only be added to gateways",
                self.entity
            ));
        }
        self.install_entry(dest, route, Direction::Down);
        Ok(())
    }

    /// Install the route used to reach an attached host for one flow.
    pub fn add_host_route(&mut self, dest: HostId, flow: FlowId, route: Rc<Route>) {
        self.fib.add_host_route(dest, flow, route);
    }

    /// The egress queue whose link leads to `target`.
    #[must_use]
    pub fn port_towards(&self, target: Hop, links: &Links) -> Option<QueueId> {
        self.ports
            .iter()
            .copied()
            .find(|q| links.far_end(*q) == Some(target))
    }

    /// Advance a packet through the switch pipeline.
    pub fn process(&mut self, pkt: &mut Packet, links: &Links, now: SimTime) -> SwitchAction {
        if let PacketKind::Pause { sender, pause } = pkt.kind {
            return match self.port_towards(Hop::Switch(sender), links) {
                Some(queue) => {
                    self.stats.pause_frames += 1;
                    SwitchAction::Pause { queue, pause }
                }
                None => {
                    error!(self.entity ; "no port towards {} for {}", sender, pkt);
                    SwitchAction::Drop
                }
            };
        }

        if self.in_ingress.remove(&pkt.id) {
            self.stats.forwarded += 1;
            return SwitchAction::Forward;
        }

        match self.decide(pkt, links, now) {
            Ok(route) => {
                if let Some(egress) = route.first() {
                    trace!(self.entity ; "{} to {} {:?}", pkt, egress, pkt.direction);
                }
                pkt.set_route(route);
                self.in_ingress.insert(pkt.id);
                self.stats.decisions += 1;
                SwitchAction::Crossbar(self.latency)
            }
            Err(miss) => {
                error!(self.entity ; "drop {}: {}", pkt, miss);
                self.stats.routing_misses += 1;
                SwitchAction::Drop
            }
        }
    }

    /// Choose the route for a packet and stamp its direction.
    pub fn decide(&mut self, pkt: &mut Packet, links: &Links, now: SimTime) -> Result<Rc<Route>, RoutingMiss> {
        let dest = pkt.dst;
        if !self.site.is_valid_host(dest) {
            return Err(RoutingMiss(format!("{dest} is not a valid host")));
        }

        if self.role == SwitchRole::Gateway {
            let entries = self
                .fib
                .lookup(dest)
                .ok_or_else(|| RoutingMiss(format!("gateway has no entry for {dest}")))?;
            let choice = if entries.len() > 1 {
                self.chooser.ecmp(pkt, entries.len())
            } else {
                0
            };
            pkt.direction = Direction::Down;
            return Ok(entries[choice].route.clone());
        }

        let layout = self
            .layout
            .clone()
            .ok_or_else(|| RoutingMiss(String::from("switch is not part of a fabric")))?;

        if self.role == SwitchRole::Access && self.site.is_local(dest) {
            let local = self.site.local_id(dest);
            if layout.host_tor(local) == self.tier_index {
                let route = self.fib.host_route(dest, pkt.flow).cloned().ok_or_else(|| {
                    RoutingMiss(format!("no host route for {} to {}", pkt.flow, dest))
                })?;
                pkt.direction = Direction::Down;
                return Ok(route);
            }
        }

        let builder = FibBuilder {
            role: self.role,
            tier_index: self.tier_index,
            site: &self.site,
            layout: &layout,
            ports: &self.ports,
            links,
        };
        let uplink_dest = &mut self.uplink_dest;
        let rng = self.chooser.rng();
        let entries = self
            .fib
            .get_or_build(dest, |fib| builder.populate(dest, fib, rng, uplink_dest))?;

        let choice = if entries.len() > 1 {
            let decision = Decision {
                pkt: &*pkt,
                links,
                now,
            };
            self.policy.choose(&mut self.chooser, entries, &decision)
        } else {
            0
        };
        let entry = &entries[choice];
        pkt.direction = entry.direction;
        Ok(entry.route.clone())
    }
}

/// The role-specific population of forwarding entries.
struct FibBuilder<'a> {
    role: SwitchRole,
    tier_index: usize,
    site: &'a SiteInfo,
    layout: &'a FabricLayout,
    ports: &'a [QueueId],
    links: &'a Links<'a>,
}

fn link_route(queue: QueueId, pipe: PipeId, next: SwitchId) -> Rc<Route> {
    Rc::new(Route::from_hops(vec![
        Hop::Queue(queue),
        Hop::Pipe(pipe),
        Hop::Switch(next),
    ]))
}

impl FibBuilder<'_> {
    fn populate(
        &self,
        dest: HostId,
        fib: &mut Fib,
        rng: &mut Xoshiro256PlusPlus,
        uplink_dest: &mut Option<HostId>,
    ) -> Result<(), RoutingMiss> {
        let inter_site = !self.site.is_local(dest);
        let local = self.site.local_id(dest);
        let layout = self.layout;
        let half = layout.half();

        match self.role {
            SwitchRole::Access => {
                if !inter_site {
                    return Err(RoutingMiss(format!(
                        "{dest} is in this site but not attached to this switch"
                    )));
                }
                if let Some(first) = *uplink_dest {
                    if fib.alias_routes(dest, first) {
                        return Ok(());
                    }
                }
                let pod = layout.tor_pod(self.tier_index);
                for (position, link) in layout.tor_up[self.tier_index].iter().enumerate() {
                    let agg = layout.aggs[pod * half + position];
                    fib.add_entry(dest, link_route(link.queue, link.pipe, agg), 1, Direction::Up);
                }
                fib.permute(dest, rng);
                *uplink_dest = Some(dest);
                Ok(())
            }
            SwitchRole::Aggregation => {
                if !inter_site && layout.host_pod(local) == layout.agg_pod(self.tier_index) {
                    let tor = layout.host_tor(local);
                    let link = layout.agg_down[self.tier_index][tor % half];
                    fib.add_entry(dest, link_route(link.queue, link.pipe, layout.tors[tor]), 1, Direction::Down);
                    Ok(())
                } else if inter_site {
                    let position = self.tier_index % half;
                    for (l, link) in layout.agg_up[self.tier_index].iter().enumerate() {
                        let core = layout.cores[l * half + position];
                        fib.add_entry(dest, link_route(link.queue, link.pipe, core), 1, Direction::Up);
                    }
                    fib.permute(dest, rng);
                    Ok(())
                } else {
                    Err(RoutingMiss(format!("{dest} is in another pod of this site")))
                }
            }
            SwitchRole::Core => {
                if inter_site {
                    let gateway = self
                        .site
                        .gateway
                        .ok_or_else(|| RoutingMiss(String::from("site has no gateway")))?;
                    let queue = self
                        .ports
                        .iter()
                        .copied()
                        .find(|q| self.links.far_end(*q) == Some(Hop::Switch(gateway)))
                        .ok_or_else(|| RoutingMiss(format!("no link to gateway {gateway}")))?;
                    let pipe = self
                        .links
                        .pipe_after(queue)
                        .ok_or_else(|| RoutingMiss(format!("{queue} is not connected")))?;
                    fib.add_entry(dest, link_route(queue, pipe, gateway), 1, Direction::Up);
                    Ok(())
                } else {
                    let pod = layout.host_pod(local);
                    if pod >= layout.num_pods {
                        return Err(RoutingMiss(format!("{dest} is beyond the last pod")));
                    }
                    let agg = layout.aggs[pod * half + self.tier_index % half];
                    let link = layout.core_down[self.tier_index][pod];
                    fib.add_entry(dest, link_route(link.queue, link.pipe, agg), 1, Direction::Down);
                    Ok(())
                }
            }
            SwitchRole::Gateway => Err(RoutingMiss(String::from(
                "gateway entries are installed when the topology is built",
            ))),
        }
    }
}
