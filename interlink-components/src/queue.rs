// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! A drop-tail output queue.
//!
//! The queue serializes packets at a fixed bit rate. It does not schedule
//! anything itself: [`Queue::enqueue`], [`Queue::complete_service`] and
//! [`Queue::set_paused`] return the delay after which the owner must call
//! [`Queue::complete_service`] again.
//!
//! Packets that arrive while the queue holds more than the ECN fraction of
//! its capacity are marked congestion-experienced.

use std::collections::VecDeque;
use std::rc::Rc;

use interlink_engine::sim_error;
use interlink_engine::time::SimTime;
use interlink_engine::types::SimError;
use interlink_track::entity::Entity;
use interlink_track::{debug, trace};

use crate::capability::{LinkCapability, NUM_QUANTA};
use crate::packet::Packet;
use crate::types::{Hop, SwitchId};

/// Length of the window over which utilization is measured.
pub const UTILIZATION_WINDOW: SimTime = SimTime::from_us(10);

#[derive(Clone, Debug)]
pub struct QueueConfig {
    pub capacity_bytes: u64,
    pub bits_per_sec: u64,
    pub ecn_fraction: f64,
    pub speculative_fraction: f64,
}

impl QueueConfig {
    #[must_use]
    pub fn new(capacity_bytes: u64, bits_per_sec: u64) -> Self {
        Self {
            capacity_bytes,
            bits_per_sec,
            ecn_fraction: 0.5,
            speculative_fraction: 0.2,
        }
    }

    #[must_use]
    pub fn with_thresholds(mut self, ecn_fraction: f64, speculative_fraction: f64) -> Self {
        self.ecn_fraction = ecn_fraction;
        self.speculative_fraction = speculative_fraction;
        self
    }
}

/// What happened to a packet handed to [`Queue::enqueue`].
#[derive(Debug)]
pub enum EnqueueOutcome {
    /// No room; the packet is handed back.
    Dropped(Packet),
    /// Stored behind other packets (or behind a pause).
    Queued,
    /// The queue was idle; service completes after the given delay.
    StartService(SimTime),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub enqueued: u64,
    pub dropped: u64,
    pub ecn_marked: u64,
    pub bytes_sent: u64,
}

#[derive(Default)]
struct UtilizationWindow {
    index: u64,
    current_bytes: u64,
    previous_bytes: u64,
}

impl UtilizationWindow {
    fn window_index(now: SimTime) -> u64 {
        now.as_ps() / UTILIZATION_WINDOW.as_ps()
    }

    fn record(&mut self, now: SimTime, num_bytes: u64) {
        let index = Self::window_index(now);
        if index != self.index {
            self.previous_bytes = if index == self.index + 1 {
                self.current_bytes
            } else {
                0
            };
            self.current_bytes = 0;
            self.index = index;
        }
        self.current_bytes += num_bytes;
    }

    /// Bytes served in the last completed window.
    fn last_complete(&self, now: SimTime) -> u64 {
        let index = Self::window_index(now);
        if index == self.index {
            self.previous_bytes
        } else if index == self.index + 1 {
            self.current_bytes
        } else {
            0
        }
    }
}

pub struct Queue {
    pub entity: Rc<Entity>,
    config: QueueConfig,
    buffer: VecDeque<Packet>,
    occupancy: u64,
    serving: bool,
    paused: bool,
    owner: Option<SwitchId>,
    remote: Option<Hop>,
    window: UtilizationWindow,
    stats: QueueStats,
}

impl Queue {
    /// Create a queue; it must be able to hold at least one packet of
    /// `min_packet_bytes`.
    pub fn new(
        parent: &Rc<Entity>,
        name: &str,
        config: QueueConfig,
        min_packet_bytes: u64,
    ) -> Result<Self, SimError> {
        if config.capacity_bytes < min_packet_bytes {
            return sim_error!(format!(
                "{parent}::{name}: capacity {} bytes cannot hold a {min_packet_bytes} byte packet",
                config.capacity_bytes
            ));
        }
        if config.bits_per_sec == 0 {
            return sim_error!(format!("{parent}::{name}: zero bit rate"));
        }
        Ok(Self {
            entity: Rc::new(Entity::new(parent, name)),
            config,
            buffer: VecDeque::new(),
            occupancy: 0,
            serving: false,
            paused: false,
            owner: None,
            remote: None,
            window: UtilizationWindow::default(),
            stats: QueueStats::default(),
        })
    }

    pub fn set_owner(&mut self, owner: SwitchId) {
        self.owner = Some(owner);
    }

    #[must_use]
    pub fn owner(&self) -> Option<SwitchId> {
        self.owner
    }

    pub fn connect(&mut self, remote: Hop) {
        self.remote = Some(remote);
    }

    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.config.capacity_bytes
    }

    #[must_use]
    pub fn bits_per_sec(&self) -> u64 {
        self.config.bits_per_sec
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    #[must_use]
    pub fn stats(&self) -> &QueueStats {
        &self.stats
    }

    fn fraction_of_capacity(&self, fraction: f64) -> u64 {
        (self.config.capacity_bytes as f64 * fraction) as u64
    }

    fn service_time(&self, pkt: &Packet) -> SimTime {
        SimTime::serialization(pkt.size_bytes as u64, self.config.bits_per_sec)
    }

    /// Start serializing the head packet if the queue is allowed to.
    fn try_start(&mut self) -> Option<SimTime> {
        if self.serving || self.paused {
            return None;
        }
        let delay = self.service_time(self.buffer.front()?);
        self.serving = true;
        Some(delay)
    }

    pub fn enqueue(&mut self, mut pkt: Packet, now: SimTime) -> EnqueueOutcome {
        let size = pkt.size_bytes as u64;
        if self.occupancy + size > self.config.capacity_bytes {
            self.stats.dropped += 1;
            debug!(self.entity ; "drop {} at {}, occupancy {}B", pkt, now, self.occupancy);
            return EnqueueOutcome::Dropped(pkt);
        }

        self.occupancy += size;
        if !pkt.is_pause() && self.occupancy > self.fraction_of_capacity(self.config.ecn_fraction)
        {
            if !pkt.ecn_ce {
                self.stats.ecn_marked += 1;
            }
            pkt.ecn_ce = true;
        }
        trace!(self.entity ; "enqueue {}, occupancy {}B", pkt, self.occupancy);
        self.stats.enqueued += 1;
        self.buffer.push_back(pkt);

        match self.try_start() {
            Some(delay) => EnqueueOutcome::StartService(delay),
            None => EnqueueOutcome::Queued,
        }
    }

    /// Finish serializing the head packet.
    ///
    /// Returns the packet and, if another packet can be sent, the time it
    /// will take.
    pub fn complete_service(&mut self, now: SimTime) -> Option<(Packet, Option<SimTime>)> {
        let pkt = self.buffer.pop_front()?;
        let size = pkt.size_bytes as u64;
        self.serving = false;
        self.occupancy -= size;
        self.stats.bytes_sent += size;
        self.window.record(now, size);
        let next = self.try_start();
        Some((pkt, next))
    }

    /// Pause or resume the queue.
    ///
    /// A packet already being serialized is allowed to finish. Returns the
    /// service delay if resuming restarts transmission.
    pub fn set_paused(&mut self, paused: bool, now: SimTime) -> Option<SimTime> {
        if self.paused != paused {
            debug!(self.entity ; "{} at {}", if paused { "paused" } else { "resumed" }, now);
        }
        self.paused = paused;
        if paused { None } else { self.try_start() }
    }
}

impl LinkCapability for Queue {
    fn instantaneous_occupancy(&self) -> u64 {
        self.occupancy
    }

    fn quantized_occupancy(&self) -> u8 {
        let ecn = self.config.ecn_fraction;
        let bands = [
            self.fraction_of_capacity(self.config.speculative_fraction),
            self.fraction_of_capacity(ecn),
            self.fraction_of_capacity(ecn + (1.0 - ecn) / 2.0),
        ];
        bands.iter().take_while(|&&b| self.occupancy >= b).count() as u8
    }

    fn quantized_utilization(&self, now: SimTime) -> u8 {
        let served = self.window.last_complete(now) as u128;
        let possible = u128::from(self.config.bits_per_sec) * u128::from(UTILIZATION_WINDOW.as_ps())
            / (8 * 1_000_000_000_000);
        if possible == 0 {
            return 0;
        }
        let quantum = (served * u128::from(NUM_QUANTA) / possible) as u8;
        quantum.min(NUM_QUANTA - 1)
    }

    fn is_paused(&self) -> bool {
        self.paused
    }

    fn remote_endpoint(&self) -> Option<Hop> {
        self.remote
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utilization_window_rolls() {
        let mut window = UtilizationWindow::default();
        window.record(SimTime::from_us(1), 100);
        window.record(SimTime::from_us(9), 50);
        assert_eq!(window.last_complete(SimTime::from_us(9)), 0);
        assert_eq!(window.last_complete(SimTime::from_us(15)), 150);
        assert_eq!(window.last_complete(SimTime::from_us(25)), 0);

        window.record(SimTime::from_us(12), 10);
        assert_eq!(window.last_complete(SimTime::from_us(12)), 150);

        window.record(SimTime::from_us(45), 10);
        assert_eq!(window.last_complete(SimTime::from_us(45)), 0);
    }
}
