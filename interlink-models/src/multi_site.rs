// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Several fat-tree sites joined by a full mesh of wide-area links.
//!
//! Every site has a gateway switch wired to all of the site's core switches.
//! Each ordered pair of gateways is joined by a wide-area queue and pipe.
//! Gateways have all of their forwarding entries installed here; the other
//! switches build theirs as packets arrive.
//!
//! Host identifiers are global: host `h` is local host
//! `h % hosts_per_site` of site `h / hosts_per_site`.

use std::collections::HashMap;
use std::rc::Rc;

use interlink_components::packet::Direction;
use interlink_components::pipe::Pipe;
use interlink_components::queue::{Queue, QueueConfig};
use interlink_components::route::Route;
use interlink_components::scheduler::FairScheduler;
use interlink_components::sink::FlowSink;
use interlink_components::types::{FlowId, Hop, HostId, SchedulerId, SinkId, SwitchId};
use interlink_engine::sim_error;
use interlink_engine::time::SimTime;
use interlink_engine::types::{SimError, SimResult};
use interlink_track::entity::Entity;
use interlink_track::{debug, error, info};

use crate::config::{InterSitePaths, MultiSiteConfig, RoutingConfig};
use crate::fat_tree::{FatTreeTopology, Link};
use crate::network::Network;
use crate::switch::{SiteInfo, Switch, SwitchRole};
use crate::traffic::{ConstantRateSource, packet_interval, packets_for};

/// A constant-rate flow to be set up between two hosts.
#[derive(Clone, Debug)]
pub struct FlowSetup {
    pub flow: FlowId,
    pub src: HostId,
    pub dst: HostId,

    /// Bytes to send; zero sends until the end of the simulation.
    pub size_bytes: u64,

    pub bits_per_sec: f64,
}

pub struct MultiSiteTopology {
    pub entity: Rc<Entity>,
    config: MultiSiteConfig,
    hosts_per_site: usize,
    network: Network,
    sites: Vec<FatTreeTopology>,
    gateways: Vec<SwitchId>,

    /// `[from site][to site]`
    wan: Vec<Vec<Option<Link>>>,

    /// One inter-site route per host pair, always with its reverse.
    route_cache: HashMap<(HostId, HostId), Rc<Route>>,

    /// Fair-share pacing stage of each ordered host pair.
    fair_share: HashMap<(HostId, HostId), SchedulerId>,
}

impl MultiSiteTopology {
    pub fn new(
        config: MultiSiteConfig,
        routing: &Rc<RoutingConfig>,
        parent: &Rc<Entity>,
    ) -> Result<Self, SimError> {
        routing.validate()?;
        let hosts_per_site = config.hosts_per_site()?;
        let fabric = config.site_fabric()?;
        let num_sites = config.num_sites;

        let entity = Rc::new(Entity::new(parent, "multi_site"));
        let mut network = Network::new(&entity, routing.seed);

        let site_info = |index: usize| SiteInfo {
            index,
            num_sites,
            hosts_per_site,
            gateway: None,
        };

        let mut sites = Vec::with_capacity(num_sites);
        for s in 0..num_sites {
            sites.push(FatTreeTopology::new(
                &mut network,
                &entity,
                &format!("site{s}"),
                &fabric,
                routing,
                site_info(s),
            )?);
        }

        let gateways: Vec<SwitchId> = (0..num_sites)
            .map(|s| {
                network.add_switch(|id| {
                    Switch::new(
                        &entity,
                        &format!("gateway{s}"),
                        id,
                        SwitchRole::Gateway,
                        s,
                        site_info(s),
                        routing,
                        fabric.switch_latency,
                    )
                })
            })
            .collect();

        let wan_queue_config = QueueConfig::new(config.wan_queue_bytes, config.wan_bits_per_sec)
            .with_thresholds(
                routing.ecn_threshold_fraction,
                routing.speculative_threshold_fraction,
            );
        let mut wan = vec![vec![None; num_sites]; num_sites];
        for from in 0..num_sites {
            for to in (0..num_sites).filter(|to| *to != from) {
                let queue = network.add_queue(Queue::new(
                    &entity,
                    &format!("wan_queue_site{from}_to_site{to}"),
                    wan_queue_config.clone(),
                    fabric.mtu_bytes as u64,
                )?);
                let pipe = network.add_pipe(Pipe::new(
                    &entity,
                    &format!("wan_pipe_site{from}_to_site{to}"),
                    config.wan_delay,
                ));
                network.connect(Some(gateways[from]), queue, pipe, Hop::Switch(gateways[to]))?;
                wan[from][to] = Some(Link { queue, pipe });
            }
        }

        for (site, gateway) in sites.iter_mut().zip(&gateways) {
            site.connect_gateway(&mut network, *gateway)?;
        }

        let mut topology = Self {
            entity,
            config,
            hosts_per_site,
            network,
            sites,
            gateways,
            wan,
            route_cache: HashMap::new(),
            fair_share: HashMap::new(),
        };
        topology.install_gateway_routes()?;
        info!(topology.entity ; "{} sites of {} hosts, {} switches",
            num_sites, hosts_per_site, topology.network.switches().len());
        Ok(topology)
    }

    /// Give every gateway an entry per local host (one route through each
    /// core switch) and an entry per remote host (across the wide-area link
    /// to the remote gateway).
    fn install_gateway_routes(&mut self) -> SimResult {
        for (s, site) in self.sites.iter().enumerate() {
            let gateway = self.gateways[s];
            let core_routes: Vec<Rc<Route>> = site
                .gateway_to_core()
                .iter()
                .zip(&site.layout().cores)
                .map(|(link, core)| {
                    let mut route = Route::from_hops(link.hops().to_vec());
                    route.push(Hop::Switch(*core));
                    Rc::new(route)
                })
                .collect();

            let Some(switch) = self.network.switch_mut(gateway) else {
                return sim_error!(format!("missing gateway {gateway}"));
            };
            for local in 0..self.hosts_per_site {
                let host = HostId(site.host_offset() + local);
                for route in &core_routes {
                    switch.install_entry(host, route.clone(), Direction::Down);
                }
            }

            for (remote, link) in self.wan[s].iter().enumerate() {
                let Some(link) = link else {
                    continue;
                };
                let mut route = Route::from_hops(link.hops().to_vec());
                route.push(Hop::Switch(self.gateways[remote]));
                let route = Rc::new(route);
                for local in 0..self.hosts_per_site {
                    switch.add_wan_route(HostId(remote * self.hosts_per_site + local), route.clone())?;
                }
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn config(&self) -> &MultiSiteConfig {
        &self.config
    }

    #[must_use]
    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn network_mut(&mut self) -> &mut Network {
        &mut self.network
    }

    #[must_use]
    pub fn num_sites(&self) -> usize {
        self.sites.len()
    }

    #[must_use]
    pub fn no_of_nodes(&self) -> usize {
        self.hosts_per_site * self.sites.len()
    }

    #[must_use]
    pub fn hosts_per_site(&self) -> usize {
        self.hosts_per_site
    }

    #[must_use]
    pub fn is_valid_host(&self, host: HostId) -> bool {
        host.0 < self.no_of_nodes()
    }

    #[must_use]
    pub fn site_id(&self, host: HostId) -> usize {
        host.0 / self.hosts_per_site
    }

    #[must_use]
    pub fn local_host_id(&self, host: HostId) -> usize {
        host.0 % self.hosts_per_site
    }

    #[must_use]
    pub fn get_site(&self, site: usize) -> Option<&FatTreeTopology> {
        self.sites.get(site)
    }

    #[must_use]
    pub fn gateway(&self, site: usize) -> Option<SwitchId> {
        self.gateways.get(site).copied()
    }

    #[must_use]
    pub fn wan_link(&self, from: usize, to: usize) -> Option<Link> {
        *self.wan.get(from)?.get(to)?
    }

    #[must_use]
    pub fn is_inter_dc_flow(&self, src: HostId, dst: HostId) -> bool {
        self.site_id(src) != self.site_id(dst)
    }

    /// Pre-install an inter-site entry for `dest` at the gateway of `site`.
    pub fn add_wan_route(&mut self, site: usize, dest: HostId, route: Rc<Route>) -> SimResult {
        let Some(gateway) = self.gateway(site) else {
            return sim_error!(format!("no site {site}"));
        };
        match self.network.switch_mut(gateway) {
            Some(switch) => switch.add_wan_route(dest, route),
            None => sim_error!(format!("missing gateway {gateway}")),
        }
    }

    /// Register `sink` as the receiver of `flow` at `host`. Must be called
    /// before packets of the flow are sent towards `host`.
    pub fn add_host_port(&mut self, host: HostId, flow: FlowId, sink: SinkId) -> SimResult {
        if !self.is_valid_host(host) {
            return sim_error!(format!("{host} is not a valid host"));
        }
        let site = self.site_id(host);
        self.sites[site].add_host_port(&mut self.network, host, flow, sink)
    }

    /// The first hops of a host's packets when switches do the routing.
    #[must_use]
    pub fn access_route(&self, host: HostId) -> Option<Route> {
        if !self.is_valid_host(host) {
            return None;
        }
        self.sites[self.site_id(host)].access_route(self.local_host_id(host))
    }

    /// Candidate routes from `src` to `dst`.
    ///
    /// Hosts in the same site get every equal-cost route of their fabric.
    /// Hosts in different sites get a single route that is built once per
    /// host pair and then returned from the cache. That route carries its
    /// reverse whatever `reverse` is. An empty result means no route exists.
    pub fn get_bidir_paths(&mut self, src: HostId, dst: HostId, reverse: bool) -> Vec<Rc<Route>> {
        if !self.is_valid_host(src) || !self.is_valid_host(dst) {
            error!(self.entity ; "no paths from {} to {}: invalid host", src, dst);
            return Vec::new();
        }
        let src_site = self.site_id(src);
        if src_site == self.site_id(dst) {
            return self.sites[src_site].get_bidir_paths(src, dst, reverse);
        }
        match self.inter_site_route(src, dst) {
            Ok(route) => vec![route],
            Err(e) => {
                error!(self.entity ; "no paths from {} to {}: {}", src, dst, e);
                Vec::new()
            }
        }
    }

    /// The cached route for a host pair. The route always carries its
    /// reverse, whether or not the caller asked for it.
    fn inter_site_route(&mut self, src: HostId, dst: HostId) -> Result<Rc<Route>, SimError> {
        if let Some(route) = self.route_cache.get(&(src, dst)) {
            return Ok(route.clone());
        }
        let mut route = self.build_inter_site_route(src, dst)?;
        route.set_reverse(Rc::new(self.build_inter_site_route(dst, src)?));
        debug!(self.entity ; "route {} to {}: {} hops", src, dst, route.len());
        let route = Rc::new(route);
        self.route_cache.insert((src, dst), route.clone());
        Ok(route)
    }

    fn fair_share_scheduler(&mut self, src: HostId, dst: HostId) -> Result<SchedulerId, SimError> {
        if let Some(id) = self.fair_share.get(&(src, dst)) {
            return Ok(*id);
        }
        let scheduler = FairScheduler::new(
            &self.entity,
            &format!("fair_share_{}_{}", src.0, dst.0),
            self.config.fabric.link_bits_per_sec,
        )?;
        let id = self.network.add_scheduler(scheduler);
        self.fair_share.insert((src, dst), id);
        Ok(id)
    }

    fn build_inter_site_route(&mut self, src: HostId, dst: HostId) -> Result<Route, SimError> {
        if self.config.inter_site_paths == InterSitePaths::SwitchRouted {
            return match self.access_route(src) {
                Some(route) => Ok(route),
                None => sim_error!(format!("no access route for {src}")),
            };
        }

        let (src_site, dst_site) = (self.site_id(src), self.site_id(dst));
        let (src_local, dst_local) = (self.local_host_id(src), self.local_host_id(dst));
        let Some(wan) = self.wan_link(src_site, dst_site) else {
            return sim_error!(format!("no wide-area link from site{src_site} to site{dst_site}"));
        };
        let Some(up) = self.sites[src_site].path_to_gateway(src_local, dst_local) else {
            return sim_error!(format!("no path from {src} to its gateway"));
        };
        let Some(down) = self.sites[dst_site].path_from_gateway(dst_local, src_local) else {
            return sim_error!(format!("no path from the gateway to {dst}"));
        };

        let mut route = Route::new();
        if self.config.fair_share_prefix {
            route.push(Hop::Scheduler(self.fair_share_scheduler(src, dst)?));
        }
        route.extend_from(&up);
        route.append(&wan.hops());
        route.extend_from(&down);
        Ok(route)
    }

    /// Create the sink and source of a constant-rate flow.
    ///
    /// Returns the index of the source in the network, or `None` if there
    /// is no route between the hosts.
    pub fn add_flow(&mut self, setup: &FlowSetup) -> Result<Option<usize>, SimError> {
        let routes = self.get_bidir_paths(setup.src, setup.dst, true);
        if routes.is_empty() {
            return Ok(None);
        }

        let expected = (setup.size_bytes > 0).then_some(setup.size_bytes);
        let sink = self.network.add_sink(FlowSink::new(
            &self.entity,
            setup.flow,
            setup.src,
            setup.dst,
            expected,
        ));
        self.add_host_port(setup.dst, setup.flow, sink)?;
        self.add_host_port(setup.src, setup.flow, sink)?;

        let mtu = self.config.fabric.mtu_bytes;
        let source = ConstantRateSource::new(
            &self.entity,
            setup.flow,
            setup.src,
            setup.dst,
            sink,
            routes,
            packet_interval(setup.bits_per_sec, mtu),
            mtu,
            expected.map(|bytes| packets_for(bytes, mtu)),
        )?;
        Ok(Some(self.network.add_source(source)))
    }

    /// Time taken to send one MTU on a fabric link.
    #[must_use]
    pub fn mtu_time(&self) -> SimTime {
        SimTime::serialization(
            self.config.fabric.mtu_bytes as u64,
            self.config.fabric.link_bits_per_sec,
        )
    }
}
