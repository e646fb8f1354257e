// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! A three-tier fat tree built from radix `k` switches.
//!
//! With `half = k / 2`:
//!  - each access switch (ToR) has `half` hosts and `half` uplinks,
//!  - each pod has `half` access and `half` aggregation switches,
//!  - there are `half * half` core switches.
//!
//! The aggregation switch at position `p` in its pod connects to the cores
//! `l * half + p` for `l < half`. Only as many pods as the hosts need are
//! built.
//!
//! Every link is a [`Queue`] feeding a [`Pipe`]; links between tiers exist in
//! both directions.

use std::rc::Rc;

use interlink_components::host::HostPort;
use interlink_components::packet::PAUSE_PACKET_BYTES;
use interlink_components::pipe::Pipe;
use interlink_components::queue::{Queue, QueueConfig};
use interlink_components::route::Route;
use interlink_components::types::{FlowId, Hop, HostId, PipeId, QueueId, SinkId, SwitchId};
use interlink_engine::sim_error;
use interlink_engine::types::{SimError, SimResult};
use interlink_track::entity::Entity;
use interlink_track::{error, info};
use itertools::iproduct;

use crate::config::{FabricConfig, RoutingConfig};
use crate::network::Network;
use crate::switch::{SiteInfo, Switch, SwitchRole};

/// Smallest packet a fabric queue must be able to hold.
const MIN_QUEUE_BYTES: u64 = PAUSE_PACKET_BYTES as u64;

/// One direction of a physical link.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Link {
    pub queue: QueueId,
    pub pipe: PipeId,
}

impl Link {
    #[must_use]
    pub fn hops(&self) -> [Hop; 2] {
        [Hop::Queue(self.queue), Hop::Pipe(self.pipe)]
    }
}

/// Geometry and wiring of one fat tree, shared read-only by its switches.
#[derive(Debug)]
pub struct FabricLayout {
    pub radix: usize,
    pub num_hosts: usize,
    pub host_offset: usize,
    pub num_pods: usize,
    pub tors: Vec<SwitchId>,
    pub aggs: Vec<SwitchId>,
    pub cores: Vec<SwitchId>,

    /// `[local host]`
    pub host_up: Vec<Link>,
    /// `[tor][host position]`
    pub tor_down: Vec<Vec<Link>>,
    /// `[tor][aggregation position]`
    pub tor_up: Vec<Vec<Link>>,
    /// `[agg][tor position]`
    pub agg_down: Vec<Vec<Link>>,
    /// `[agg][l]`, leading to core `l * half + position`
    pub agg_up: Vec<Vec<Link>>,
    /// `[core][pod]`
    pub core_down: Vec<Vec<Link>>,
}

impl FabricLayout {
    #[must_use]
    pub fn half(&self) -> usize {
        self.radix / 2
    }

    #[must_use]
    pub fn hosts_per_pod(&self) -> usize {
        self.half() * self.half()
    }

    #[must_use]
    pub fn host_tor(&self, local: usize) -> usize {
        local / self.half()
    }

    #[must_use]
    pub fn host_pod(&self, local: usize) -> usize {
        local / self.hosts_per_pod()
    }

    #[must_use]
    pub fn tor_pod(&self, tor: usize) -> usize {
        tor / self.half()
    }

    #[must_use]
    pub fn agg_pod(&self, agg: usize) -> usize {
        agg / self.half()
    }
}

/// Builds queues, pipes and their connections for one fabric.
struct LinkBuilder<'a> {
    parent: &'a Rc<Entity>,
    queue_config: QueueConfig,
    config: &'a FabricConfig,
}

impl LinkBuilder<'_> {
    fn add(
        &self,
        net: &mut Network,
        name: &str,
        owner: Option<SwitchId>,
        far_end: Hop,
    ) -> Result<Link, SimError> {
        let min_bytes = (self.config.mtu_bytes as u64).max(MIN_QUEUE_BYTES);
        let queue = Queue::new(
            self.parent,
            &format!("q_{name}"),
            self.queue_config.clone(),
            min_bytes,
        )?;
        let queue = net.add_queue(queue);
        let pipe = net.add_pipe(Pipe::new(self.parent, &format!("p_{name}"), self.config.link_delay));
        net.connect(owner, queue, pipe, far_end)?;
        Ok(Link { queue, pipe })
    }
}

pub struct FatTreeTopology {
    pub entity: Rc<Entity>,
    layout: Rc<FabricLayout>,
    site: SiteInfo,
    config: FabricConfig,
    queue_config: QueueConfig,
    core_to_gateway: Vec<Link>,
    gateway_to_core: Vec<Link>,
}

impl FatTreeTopology {
    /// Build the fabric of `site` into `net`.
    pub fn new(
        net: &mut Network,
        parent: &Rc<Entity>,
        name: &str,
        config: &FabricConfig,
        routing: &Rc<RoutingConfig>,
        site: SiteInfo,
    ) -> Result<Self, SimError> {
        let entity = Rc::new(Entity::new(parent, name));
        let num_hosts = config.num_hosts;
        let radix = config.radix();
        if num_hosts == 0 {
            return sim_error!(format!("{entity}: no hosts"));
        }
        if radix < 2 || radix % 2 != 0 {
            return sim_error!(format!("{entity}: radix {radix} must be even and at least 2"));
        }
        if num_hosts > radix * radix * radix / 4 {
            return sim_error!(format!(
                "{entity}: radix {radix} cannot hold {num_hosts} hosts"
            ));
        }
        if site.hosts_per_site != num_hosts {
            return sim_error!(format!(
                "{entity}: site has {} hosts but the fabric {num_hosts}",
                site.hosts_per_site
            ));
        }

        let half = radix / 2;
        let num_pods = num_hosts.div_ceil(half * half);
        let num_tors = num_pods * half;
        let num_aggs = num_pods * half;
        let num_cores = half * half;
        let host_offset = site.host_offset();
        info!(entity ; "radix {}, {} hosts, {} pods, {} cores", radix, num_hosts, num_pods, num_cores);

        let mut add_tier = |role: SwitchRole, prefix: &str, count: usize| -> Vec<SwitchId> {
            (0..count)
                .map(|i| {
                    net.add_switch(|id| {
                        Switch::new(
                            &entity,
                            &format!("{prefix}{i}"),
                            id,
                            role,
                            i,
                            site,
                            routing,
                            config.switch_latency,
                        )
                    })
                })
                .collect()
        };
        let tors = add_tier(SwitchRole::Access, "tor", num_tors);
        let aggs = add_tier(SwitchRole::Aggregation, "agg", num_aggs);
        let cores = add_tier(SwitchRole::Core, "core", num_cores);

        let queue_config = QueueConfig::new(config.queue_bytes, config.link_bits_per_sec)
            .with_thresholds(
                routing.ecn_threshold_fraction,
                routing.speculative_threshold_fraction,
            );
        let links = LinkBuilder {
            parent: &entity,
            queue_config: queue_config.clone(),
            config,
        };

        let mut host_up = Vec::with_capacity(num_hosts);
        let mut tor_down = vec![Vec::new(); num_tors];
        for local in 0..num_hosts {
            let host = HostId(host_offset + local);
            let tor = local / half;
            net.add_host(HostPort::new(&entity, host))?;
            host_up.push(links.add(net, &format!("host{local}_tor{tor}"), None, Hop::Switch(tors[tor]))?);
            tor_down[tor].push(links.add(
                net,
                &format!("tor{tor}_host{local}"),
                Some(tors[tor]),
                Hop::Host(host),
            )?);
        }

        let mut tor_up = vec![Vec::new(); num_tors];
        let mut agg_down = vec![Vec::new(); num_aggs];
        for (tor, position) in iproduct!(0..num_tors, 0..half) {
            let agg = (tor / half) * half + position;
            tor_up[tor].push(links.add(
                net,
                &format!("tor{tor}_agg{agg}"),
                Some(tors[tor]),
                Hop::Switch(aggs[agg]),
            )?);
        }
        for (agg, position) in iproduct!(0..num_aggs, 0..half) {
            let tor = (agg / half) * half + position;
            agg_down[agg].push(links.add(
                net,
                &format!("agg{agg}_tor{tor}"),
                Some(aggs[agg]),
                Hop::Switch(tors[tor]),
            )?);
        }

        let mut agg_up = vec![Vec::new(); num_aggs];
        let mut core_down = vec![Vec::new(); num_cores];
        for (agg, l) in iproduct!(0..num_aggs, 0..half) {
            let core = l * half + agg % half;
            agg_up[agg].push(links.add(
                net,
                &format!("agg{agg}_core{core}"),
                Some(aggs[agg]),
                Hop::Switch(cores[core]),
            )?);
        }
        for (core, pod) in iproduct!(0..num_cores, 0..num_pods) {
            let agg = pod * half + core % half;
            core_down[core].push(links.add(
                net,
                &format!("core{core}_agg{agg}"),
                Some(cores[core]),
                Hop::Switch(aggs[agg]),
            )?);
        }

        let layout = Rc::new(FabricLayout {
            radix,
            num_hosts,
            host_offset,
            num_pods,
            tors,
            aggs,
            cores,
            host_up,
            tor_down,
            tor_up,
            agg_down,
            agg_up,
            core_down,
        });
        for id in layout.tors.iter().chain(&layout.aggs).chain(&layout.cores) {
            if let Some(switch) = net.switch_mut(*id) {
                switch.attach_layout(layout.clone());
            }
        }

        Ok(Self {
            entity,
            layout,
            site,
            config: config.clone(),
            queue_config,
            core_to_gateway: Vec::new(),
            gateway_to_core: Vec::new(),
        })
    }

    #[must_use]
    pub fn layout(&self) -> &Rc<FabricLayout> {
        &self.layout
    }

    #[must_use]
    pub fn site(&self) -> &SiteInfo {
        &self.site
    }

    #[must_use]
    pub fn no_of_nodes(&self) -> usize {
        self.layout.num_hosts
    }

    #[must_use]
    pub fn host_offset(&self) -> usize {
        self.layout.host_offset
    }

    #[must_use]
    pub fn contains(&self, host: HostId) -> bool {
        host.0 >= self.host_offset() && host.0 < self.host_offset() + self.no_of_nodes()
    }

    fn local(&self, host: HostId) -> Option<usize> {
        self.contains(host).then(|| host.0 - self.host_offset())
    }

    /// Every switch of the fabric.
    pub fn switch_ids(&self) -> impl Iterator<Item = SwitchId> + '_ {
        self.layout
            .tors
            .iter()
            .chain(&self.layout.aggs)
            .chain(&self.layout.cores)
            .copied()
    }

    /// Wire every core switch to `gateway` in both directions and tell the
    /// switches which gateway serves their site.
    pub fn connect_gateway(&mut self, net: &mut Network, gateway: SwitchId) -> SimResult {
        let links = LinkBuilder {
            parent: &self.entity,
            queue_config: self.queue_config.clone(),
            config: &self.config,
        };
        for (c, core) in self.layout.cores.iter().enumerate() {
            self.core_to_gateway.push(links.add(
                net,
                &format!("core{c}_gateway"),
                Some(*core),
                Hop::Switch(gateway),
            )?);
            self.gateway_to_core.push(links.add(
                net,
                &format!("gateway_core{c}"),
                Some(gateway),
                Hop::Switch(*core),
            )?);
        }
        self.site.gateway = Some(gateway);
        let ids: Vec<SwitchId> = self.switch_ids().collect();
        for id in ids {
            if let Some(switch) = net.switch_mut(id) {
                switch.set_gateway(gateway);
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn gateway_to_core(&self) -> &[Link] {
        &self.gateway_to_core
    }

    /// Register `sink` for `flow` at `host` and give the host's access
    /// switch a route to it.
    pub fn add_host_port(&self, net: &mut Network, host: HostId, flow: FlowId, sink: SinkId) -> SimResult {
        let Some(local) = self.local(host) else {
            return sim_error!(format!("{}: {host} is not in this fabric", self.entity));
        };
        let tor = self.layout.host_tor(local);
        let link = self.layout.tor_down[tor][local % self.layout.half()];
        let mut route = Route::new();
        route.append(&link.hops());
        route.push(Hop::Host(host));

        match net.host_port_mut(host) {
            Some(port) => port.register(flow, sink),
            None => return sim_error!(format!("{}: {host} has no port", self.entity)),
        }
        match net.switch_mut(self.layout.tors[tor]) {
            Some(switch) => switch.add_host_route(host, flow, Rc::new(route)),
            None => return sim_error!(format!("{}: missing access switch", self.entity)),
        }
        Ok(())
    }

    /// The final hops from the access switch of `local` to the host.
    fn down_from_tor(&self, local: usize, route: &mut Route) {
        let tor = self.layout.host_tor(local);
        route.append(&self.layout.tor_down[tor][local % self.layout.half()].hops());
        route.push(Hop::Host(HostId(self.host_offset() + local)));
    }

    /// All equal-cost routes between two local hosts.
    fn routes_between(&self, src: usize, dst: usize) -> Vec<Route> {
        let layout = &*self.layout;
        let half = layout.half();
        let src_tor = layout.host_tor(src);
        let dst_tor = layout.host_tor(dst);
        let src_pod = layout.host_pod(src);
        let dst_pod = layout.host_pod(dst);
        let nic = layout.host_up[src].hops();

        let mut routes = Vec::new();
        if src_tor == dst_tor {
            let mut route = Route::from_hops(nic.to_vec());
            self.down_from_tor(dst, &mut route);
            routes.push(route);
        } else if src_pod == dst_pod {
            for position in 0..half {
                let agg = src_pod * half + position;
                let mut route = Route::from_hops(nic.to_vec());
                route.append(&layout.tor_up[src_tor][position].hops());
                route.append(&layout.agg_down[agg][dst_tor % half].hops());
                self.down_from_tor(dst, &mut route);
                routes.push(route);
            }
        } else {
            for (position, l) in iproduct!(0..half, 0..half) {
                let src_agg = src_pod * half + position;
                let dst_agg = dst_pod * half + position;
                let core = l * half + position;
                let mut route = Route::from_hops(nic.to_vec());
                route.append(&layout.tor_up[src_tor][position].hops());
                route.append(&layout.agg_up[src_agg][l].hops());
                route.append(&layout.core_down[core][dst_pod].hops());
                route.append(&layout.agg_down[dst_agg][dst_tor % half].hops());
                self.down_from_tor(dst, &mut route);
                routes.push(route);
            }
        }
        for (path_id, route) in routes.iter_mut().enumerate() {
            route.set_path_id(path_id as u32);
        }
        routes
    }

    /// All equal-cost source routes from `src` to `dst` (global host ids).
    ///
    /// With `reverse` set each route carries the matching route back.
    /// Returns nothing (and logs) for hosts outside this fabric.
    #[must_use]
    pub fn get_bidir_paths(&self, src: HostId, dst: HostId, reverse: bool) -> Vec<Rc<Route>> {
        let (Some(s), Some(d)) = (self.local(src), self.local(dst)) else {
            error!(self.entity ; "no paths from {} to {}: not in this fabric", src, dst);
            return Vec::new();
        };
        if s == d {
            error!(self.entity ; "no paths from {} to itself", src);
            return Vec::new();
        }

        let forward = self.routes_between(s, d);
        if !reverse {
            return forward.into_iter().map(Rc::new).collect();
        }
        let backward = self.routes_between(d, s);
        forward
            .into_iter()
            .zip(backward)
            .map(|(mut route, back)| {
                route.set_reverse(Rc::new(back));
                Rc::new(route)
            })
            .collect()
    }

    #[must_use]
    pub fn num_paths_to_gateway(&self) -> usize {
        self.layout.half() * self.layout.half()
    }

    /// Source route from a local host up to (but not into) the gateway.
    #[must_use]
    pub fn path_to_gateway(&self, local: usize, choice: usize) -> Option<Route> {
        let layout = &*self.layout;
        if local >= layout.num_hosts || self.core_to_gateway.is_empty() {
            return None;
        }
        let half = layout.half();
        let choice = choice % self.num_paths_to_gateway();
        let (position, l) = (choice / half, choice % half);
        let tor = layout.host_tor(local);
        let agg = layout.host_pod(local) * half + position;
        let core = l * half + position;

        let mut route = Route::from_hops(layout.host_up[local].hops().to_vec());
        route.append(&layout.tor_up[tor][position].hops());
        route.append(&layout.agg_up[agg][l].hops());
        route.append(&self.core_to_gateway[core].hops());
        Some(route)
    }

    /// Source route from the gateway down to a local host.
    #[must_use]
    pub fn path_from_gateway(&self, local: usize, choice: usize) -> Option<Route> {
        let layout = &*self.layout;
        if local >= layout.num_hosts || self.gateway_to_core.is_empty() {
            return None;
        }
        let half = layout.half();
        let core = choice % layout.cores.len();
        let pod = layout.host_pod(local);
        let agg = pod * half + core % half;

        let mut route = Route::from_hops(self.gateway_to_core[core].hops().to_vec());
        route.append(&layout.core_down[core][pod].hops());
        route.append(&layout.agg_down[agg][layout.host_tor(local) % half].hops());
        self.down_from_tor(local, &mut route);
        Some(route)
    }

    /// The NIC link of a host followed by its access switch, for packets
    /// that the switches route.
    #[must_use]
    pub fn access_route(&self, local: usize) -> Option<Route> {
        let link = self.layout.host_up.get(local)?;
        let mut route = Route::from_hops(link.hops().to_vec());
        route.push(Hop::Switch(self.layout.tors[self.layout.host_tor(local)]));
        Some(route)
    }
}
