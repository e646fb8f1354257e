// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! The arena holding every network element, and the events that move
//! packets between them.
//!
//! Each kind of element lives in its own vector so that a switch can be
//! borrowed mutably while it inspects the queues and pipes of its links
//! through a [`Links`] view.

use std::collections::HashMap;
use std::rc::Rc;

use interlink_components::capability::LinkCapability;
use interlink_components::host::HostPort;
use interlink_components::packet::Packet;
use interlink_components::pipe::Pipe;
use interlink_components::queue::{EnqueueOutcome, Queue};
use interlink_components::scheduler::FairScheduler;
use interlink_components::sink::FlowSink;
use interlink_components::types::{
    Hop, HostId, PacketId, PipeId, QueueId, SchedulerId, SinkId, SwitchId,
};
use interlink_engine::engine::Engine;
use interlink_engine::sim_error;
use interlink_engine::time::SimTime;
use interlink_engine::traits::Event;
use interlink_engine::types::SimResult;
use interlink_track::entity::Entity;
use interlink_track::{debug, error, trace};
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::switch::{Switch, SwitchAction};
use crate::traffic::ConstantRateSource;

/// Read-only view of the queues and pipes.
#[derive(Clone, Copy)]
pub struct Links<'a> {
    queues: &'a [Queue],
    pipes: &'a [Pipe],
}

impl<'a> Links<'a> {
    #[must_use]
    pub fn new(queues: &'a [Queue], pipes: &'a [Pipe]) -> Self {
        Self { queues, pipes }
    }

    #[must_use]
    pub fn queue(&self, id: QueueId) -> Option<&'a Queue> {
        self.queues.get(id.index())
    }

    #[must_use]
    pub fn link(&self, id: QueueId) -> Option<&'a dyn LinkCapability> {
        self.queue(id).map(|q| q as &dyn LinkCapability)
    }

    /// The pipe fed by a queue.
    #[must_use]
    pub fn pipe_after(&self, id: QueueId) -> Option<PipeId> {
        match self.queue(id)?.remote_endpoint()? {
            Hop::Pipe(pipe) => Some(pipe),
            _ => None,
        }
    }

    /// The element at the far end of the link that starts with `id`.
    #[must_use]
    pub fn far_end(&self, id: QueueId) -> Option<Hop> {
        let pipe = self.pipe_after(id)?;
        self.pipes.get(pipe.index())?.remote_endpoint()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NetworkStats {
    pub packets_sent: u64,
    pub delivered: u64,
    pub queue_drops: u64,
    pub routing_drops: u64,
    pub unknown_flow_drops: u64,
}

pub struct Network {
    pub entity: Rc<Entity>,
    queues: Vec<Queue>,
    pipes: Vec<Pipe>,
    switches: Vec<Switch>,
    schedulers: Vec<FairScheduler>,
    hosts: Vec<HostPort>,
    host_index: HashMap<HostId, usize>,
    sinks: Vec<FlowSink>,
    sources: Vec<ConstantRateSource>,
    rng: Xoshiro256PlusPlus,
    next_packet_id: u64,
    stats: NetworkStats,
}

impl Network {
    #[must_use]
    pub fn new(parent: &Rc<Entity>, seed: u64) -> Self {
        Self {
            entity: Rc::new(Entity::new(parent, "net")),
            queues: Vec::new(),
            pipes: Vec::new(),
            switches: Vec::new(),
            schedulers: Vec::new(),
            hosts: Vec::new(),
            host_index: HashMap::new(),
            sinks: Vec::new(),
            sources: Vec::new(),
            rng: Xoshiro256PlusPlus::seed_from_u64(seed),
            next_packet_id: 1,
            stats: NetworkStats::default(),
        }
    }

    pub fn add_queue(&mut self, queue: Queue) -> QueueId {
        self.queues.push(queue);
        QueueId(self.queues.len() - 1)
    }

    pub fn add_pipe(&mut self, pipe: Pipe) -> PipeId {
        self.pipes.push(pipe);
        PipeId(self.pipes.len() - 1)
    }

    /// Add a switch; `build` is given the handle the switch will have.
    pub fn add_switch<F>(&mut self, build: F) -> SwitchId
    where
        F: FnOnce(SwitchId) -> Switch,
    {
        let id = SwitchId(self.switches.len());
        self.switches.push(build(id));
        id
    }

    pub fn add_scheduler(&mut self, scheduler: FairScheduler) -> SchedulerId {
        self.schedulers.push(scheduler);
        SchedulerId(self.schedulers.len() - 1)
    }

    pub fn add_host(&mut self, port: HostPort) -> SimResult {
        let host = port.host();
        if self.host_index.contains_key(&host) {
            return sim_error!(format!("{host} added twice"));
        }
        self.host_index.insert(host, self.hosts.len());
        self.hosts.push(port);
        Ok(())
    }

    pub fn add_sink(&mut self, sink: FlowSink) -> SinkId {
        self.sinks.push(sink);
        SinkId(self.sinks.len() - 1)
    }

    pub fn add_source(&mut self, source: ConstantRateSource) -> usize {
        self.sources.push(source);
        self.sources.len() - 1
    }

    /// Join `queue` to `pipe` and `pipe` to `far_end`. If the queue belongs
    /// to a switch it becomes one of the switch's egress ports.
    pub fn connect(
        &mut self,
        owner: Option<SwitchId>,
        queue: QueueId,
        pipe: PipeId,
        far_end: Hop,
    ) -> SimResult {
        let Some(q) = self.queues.get_mut(queue.index()) else {
            return sim_error!(format!("connect: no {queue}"));
        };
        q.connect(Hop::Pipe(pipe));
        if let Some(owner) = owner {
            q.set_owner(owner);
            match self.switches.get_mut(owner.index()) {
                Some(switch) => switch.add_port(queue),
                None => return sim_error!(format!("connect: no {owner}")),
            }
        }
        match self.pipes.get_mut(pipe.index()) {
            Some(p) => p.connect(far_end),
            None => return sim_error!(format!("connect: no {pipe}")),
        }
        Ok(())
    }

    #[must_use]
    pub fn links(&self) -> Links<'_> {
        Links::new(&self.queues, &self.pipes)
    }

    #[must_use]
    pub fn queue(&self, id: QueueId) -> Option<&Queue> {
        self.queues.get(id.index())
    }

    pub fn queue_mut(&mut self, id: QueueId) -> Option<&mut Queue> {
        self.queues.get_mut(id.index())
    }

    #[must_use]
    pub fn pipe(&self, id: PipeId) -> Option<&Pipe> {
        self.pipes.get(id.index())
    }

    #[must_use]
    pub fn switch(&self, id: SwitchId) -> Option<&Switch> {
        self.switches.get(id.index())
    }

    pub fn switch_mut(&mut self, id: SwitchId) -> Option<&mut Switch> {
        self.switches.get_mut(id.index())
    }

    /// A switch together with the view of the links it inspects.
    pub fn switch_with_links(&mut self, id: SwitchId) -> Option<(&mut Switch, Links<'_>)> {
        let links = Links::new(&self.queues, &self.pipes);
        let switch = self.switches.get_mut(id.index())?;
        Some((switch, links))
    }

    #[must_use]
    pub fn switches(&self) -> &[Switch] {
        &self.switches
    }

    #[must_use]
    pub fn scheduler(&self, id: SchedulerId) -> Option<&FairScheduler> {
        self.schedulers.get(id.index())
    }

    #[must_use]
    pub fn host_port(&self, host: HostId) -> Option<&HostPort> {
        self.hosts.get(*self.host_index.get(&host)?)
    }

    pub fn host_port_mut(&mut self, host: HostId) -> Option<&mut HostPort> {
        self.hosts.get_mut(*self.host_index.get(&host)?)
    }

    #[must_use]
    pub fn num_hosts(&self) -> usize {
        self.hosts.len()
    }

    #[must_use]
    pub fn sink(&self, id: SinkId) -> Option<&FlowSink> {
        self.sinks.get(id.index())
    }

    #[must_use]
    pub fn sinks(&self) -> &[FlowSink] {
        &self.sinks
    }

    #[must_use]
    pub fn sources(&self) -> &[ConstantRateSource] {
        &self.sources
    }

    #[must_use]
    pub fn stats(&self) -> &NetworkStats {
        &self.stats
    }

    pub fn next_packet_id(&mut self) -> PacketId {
        let id = PacketId(self.next_packet_id);
        self.next_packet_id += 1;
        id
    }

    /// Start a packet along its route.
    pub fn send(&mut self, engine: &mut Engine<Network>, pkt: Packet) -> SimResult {
        self.stats.packets_sent += 1;
        self.send_on(engine, pkt)
    }

    /// Deliver a pause (or resume) frame from `from` to the switch `to`.
    pub fn send_pause(
        &mut self,
        engine: &mut Engine<Network>,
        from: SwitchId,
        to: SwitchId,
        pause: bool,
    ) -> SimResult {
        let id = self.next_packet_id();
        let pkt = Packet::pause(id, from, pause, engine.now());
        self.receive(engine, Hop::Switch(to), pkt)
    }

    /// Schedule the first packet of a source.
    pub fn start_source(&mut self, engine: &mut Engine<Network>, index: usize, at: SimTime) -> SimResult {
        if index >= self.sources.len() {
            return sim_error!(format!("no source {index}"));
        }
        engine.schedule_at(at, SourceTick(index));
        Ok(())
    }

    fn send_on(&mut self, engine: &mut Engine<Network>, mut pkt: Packet) -> SimResult {
        match pkt.advance() {
            Some(hop) => self.receive(engine, hop, pkt),
            None => {
                error!(self.entity ; "{} ran out of route", pkt);
                self.stats.routing_drops += 1;
                Ok(())
            }
        }
    }

    fn receive(&mut self, engine: &mut Engine<Network>, hop: Hop, mut pkt: Packet) -> SimResult {
        let now = engine.now();
        match hop {
            Hop::Queue(id) => {
                let Some(queue) = self.queues.get_mut(id.index()) else {
                    return sim_error!(format!("{pkt} routed to missing {id}"));
                };
                match queue.enqueue(pkt, now) {
                    EnqueueOutcome::Dropped(_) => self.stats.queue_drops += 1,
                    EnqueueOutcome::Queued => {}
                    EnqueueOutcome::StartService(delay) => engine.schedule(delay, QueueDone(id)),
                }
            }
            Hop::Pipe(id) => {
                let Some(pipe) = self.pipes.get_mut(id.index()) else {
                    return sim_error!(format!("{pkt} routed to missing {id}"));
                };
                engine.schedule(pipe.carry(), Forward(pkt));
            }
            Hop::Switch(id) => {
                let links = Links::new(&self.queues, &self.pipes);
                let Some(switch) = self.switches.get_mut(id.index()) else {
                    return sim_error!(format!("{pkt} routed to missing {id}"));
                };
                match switch.process(&mut pkt, &links, now) {
                    SwitchAction::Drop => self.stats.routing_drops += 1,
                    SwitchAction::Crossbar(delay) => engine.schedule(
                        delay,
                        Arrive {
                            to: Hop::Switch(id),
                            pkt,
                        },
                    ),
                    SwitchAction::Forward => return self.send_on(engine, pkt),
                    SwitchAction::Pause { queue, pause } => {
                        let Some(q) = self.queues.get_mut(queue.index()) else {
                            return sim_error!(format!("pause of missing {queue}"));
                        };
                        if let Some(delay) = q.set_paused(pause, now) {
                            engine.schedule(delay, QueueDone(queue));
                        }
                    }
                }
            }
            Hop::Scheduler(id) => {
                let Some(scheduler) = self.schedulers.get_mut(id.index()) else {
                    return sim_error!(format!("{pkt} routed to missing {id}"));
                };
                if let Some(delay) = scheduler.enqueue(pkt) {
                    engine.schedule(delay, SchedulerDone(id));
                }
            }
            Hop::Host(host) => {
                let Some(&index) = self.host_index.get(&host) else {
                    return sim_error!(format!("{pkt} routed to missing {host}"));
                };
                let Some(sink_id) = self.hosts[index].demux(&pkt) else {
                    self.stats.unknown_flow_drops += 1;
                    return Ok(());
                };
                let Some(sink) = self.sinks.get_mut(sink_id.index()) else {
                    return sim_error!(format!("{host} has a missing {sink_id}"));
                };
                sink.receive(&pkt, now);
                self.stats.delivered += 1;
            }
        }
        Ok(())
    }

    fn queue_done(&mut self, engine: &mut Engine<Network>, id: QueueId) -> SimResult {
        let Some(queue) = self.queues.get_mut(id.index()) else {
            return sim_error!(format!("service of missing {id}"));
        };
        let Some((pkt, next)) = queue.complete_service(engine.now()) else {
            return Ok(());
        };
        if let Some(delay) = next {
            engine.schedule(delay, QueueDone(id));
        }
        self.send_on(engine, pkt)
    }

    fn scheduler_done(&mut self, engine: &mut Engine<Network>, id: SchedulerId) -> SimResult {
        let Some(scheduler) = self.schedulers.get_mut(id.index()) else {
            return sim_error!(format!("service of missing {id}"));
        };
        let Some((pkt, next)) = scheduler.complete_service() else {
            return Ok(());
        };
        if let Some(delay) = next {
            engine.schedule(delay, SchedulerDone(id));
        }
        self.send_on(engine, pkt)
    }

    fn source_tick(&mut self, engine: &mut Engine<Network>, index: usize) -> SimResult {
        let now = engine.now();
        let id = self.next_packet_id();
        let Some(source) = self.sources.get_mut(index) else {
            return sim_error!(format!("no source {index}"));
        };
        let Some(pkt) = source.next_packet(id, now, &mut self.rng) else {
            return Ok(());
        };
        if !source.is_done() {
            engine.schedule(source.interval(), SourceTick(index));
        } else {
            debug!(source.entity ; "sent last packet at {}", now);
        }
        trace!(self.entity ; "send {}", pkt);
        self.send(engine, pkt)
    }
}

/// A packet reaches an element.
pub struct Arrive {
    pub to: Hop,
    pub pkt: Packet,
}

impl Event<Network> for Arrive {
    fn fire(self: Box<Self>, engine: &mut Engine<Network>, net: &mut Network) -> SimResult {
        let Arrive { to, pkt } = *self;
        net.receive(engine, to, pkt)
    }
}

/// A packet continues to the next hop of its route.
struct Forward(Packet);

impl Event<Network> for Forward {
    fn fire(self: Box<Self>, engine: &mut Engine<Network>, net: &mut Network) -> SimResult {
        net.send_on(engine, self.0)
    }
}

struct QueueDone(QueueId);

impl Event<Network> for QueueDone {
    fn fire(self: Box<Self>, engine: &mut Engine<Network>, net: &mut Network) -> SimResult {
        net.queue_done(engine, self.0)
    }
}

struct SchedulerDone(SchedulerId);

impl Event<Network> for SchedulerDone {
    fn fire(self: Box<Self>, engine: &mut Engine<Network>, net: &mut Network) -> SimResult {
        net.scheduler_done(engine, self.0)
    }
}

struct SourceTick(usize);

impl Event<Network> for SourceTick {
    fn fire(self: Box<Self>, engine: &mut Engine<Network>, net: &mut Network) -> SimResult {
        net.source_tick(engine, self.0)
    }
}
