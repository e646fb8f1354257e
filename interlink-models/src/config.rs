// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Configuration shared by the topologies and switches.
//!
//! All configuration is built once before a simulation starts and then
//! shared read-only: every switch holds an `Rc` of the one
//! [`RoutingConfig`].

use interlink_engine::sim_error;
use interlink_engine::time::SimTime;
use interlink_engine::types::SimError;
use serde::{Deserialize, Serialize};

/// How a switch chooses among equal-cost forwarding entries.
#[derive(clap::ValueEnum, Clone, Copy, Default, Debug, Serialize, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoutingStrategy {
    #[default]
    /// Hash of flow and path identifiers
    Ecmp,

    /// Adaptive decision for every packet
    PktAr,

    /// Best of two randomly sampled entries
    #[serde(rename = "p2c-ar")]
    #[value(name = "p2c-ar")]
    P2cAr,

    /// Adaptive decision that sticks to a flowlet
    FlAr,

    /// ECMP with a probabilistic adaptive repair
    EcmpAr,

    /// Round robin at every switch
    Rr,

    /// Round robin at access switches, ECMP elsewhere
    RrEcmp,
}

/// The criteria used to rank two forwarding entries.
#[derive(clap::ValueEnum, Clone, Copy, Default, Debug, Serialize, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComparatorKind {
    Pause,
    Queue,
    Bandwidth,
    FlowCount,
    #[default]
    PauseQueueBandwidth,
    PauseQueue,
    QueueBandwidth,
    PauseBandwidth,
}

#[derive(Clone, Debug)]
pub struct RoutingConfig {
    pub strategy: RoutingStrategy,

    /// Minimum gap between packets of a flow before a flowlet may move.
    pub sticky_delta: SimTime,

    pub ecn_threshold_fraction: f64,
    pub speculative_threshold_fraction: f64,
    pub comparator: ComparatorKind,

    /// Seed for the per-switch random number generators.
    pub seed: u64,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            strategy: RoutingStrategy::default(),
            sticky_delta: SimTime::from_us(10),
            ecn_threshold_fraction: 0.5,
            speculative_threshold_fraction: 0.2,
            comparator: ComparatorKind::default(),
            seed: 1,
        }
    }
}

impl RoutingConfig {
    #[must_use]
    pub fn with_strategy(strategy: RoutingStrategy) -> Self {
        Self {
            strategy,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), SimError> {
        let in_range = |f: f64| f > 0.0 && f <= 1.0;
        if !in_range(self.ecn_threshold_fraction) {
            return sim_error!(format!(
                "ECN threshold fraction {} not in (0, 1]",
                self.ecn_threshold_fraction
            ));
        }
        if !in_range(self.speculative_threshold_fraction) {
            return sim_error!(format!(
                "speculative threshold fraction {} not in (0, 1]",
                self.speculative_threshold_fraction
            ));
        }
        if self.speculative_threshold_fraction > self.ecn_threshold_fraction {
            return sim_error!("speculative threshold fraction exceeds the ECN threshold fraction");
        }
        Ok(())
    }
}

/// Parameters of the fat tree built at each site.
#[derive(Clone, Debug)]
pub struct FabricConfig {
    pub num_hosts: usize,

    /// Switch radix; derived from `num_hosts` when not given.
    pub radix: Option<usize>,

    pub link_bits_per_sec: u64,
    pub queue_bytes: u64,
    pub link_delay: SimTime,

    /// Time a packet spends crossing a switch.
    pub switch_latency: SimTime,

    pub mtu_bytes: usize,
}

impl Default for FabricConfig {
    fn default() -> Self {
        Self {
            num_hosts: 16,
            radix: None,
            link_bits_per_sec: 100_000_000_000,
            queue_bytes: 8 * 4000,
            link_delay: SimTime::from_ns(500),
            switch_latency: SimTime::ZERO,
            mtu_bytes: 4000,
        }
    }
}

/// The smallest even radix whose three-tier fat tree holds `num_hosts`.
#[must_use]
pub fn default_radix(num_hosts: usize) -> usize {
    let mut k = 2;
    while k * k * k / 4 < num_hosts {
        k += 2;
    }
    k
}

impl FabricConfig {
    #[must_use]
    pub fn radix(&self) -> usize {
        self.radix.unwrap_or_else(|| default_radix(self.num_hosts))
    }
}

/// How routes between sites are produced.
#[derive(clap::ValueEnum, Clone, Copy, Default, Debug, Serialize, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InterSitePaths {
    #[default]
    /// The full path is fixed when a connection is set up
    SourceRouted,

    /// Packets are handed to the access switch, every switch decides
    SwitchRouted,
}

#[derive(Clone, Debug)]
pub struct MultiSiteConfig {
    pub num_sites: usize,

    /// Hosts across all sites; must be a multiple of `num_sites`.
    pub num_hosts: usize,

    pub wan_bits_per_sec: u64,
    pub wan_queue_bytes: u64,
    pub wan_delay: SimTime,
    pub inter_site_paths: InterSitePaths,

    /// Prefix every synthesized inter-site route with a fair-share pacing
    /// stage.
    pub fair_share_prefix: bool,

    /// Per-site fabric; its `num_hosts` is replaced by the per-site count.
    pub fabric: FabricConfig,
}

impl Default for MultiSiteConfig {
    fn default() -> Self {
        Self {
            num_sites: 2,
            num_hosts: 8,
            wan_bits_per_sec: 400_000_000_000,
            wan_queue_bytes: 5000 * 4000,
            wan_delay: SimTime::from_us(1),
            inter_site_paths: InterSitePaths::default(),
            fair_share_prefix: false,
            fabric: FabricConfig::default(),
        }
    }
}

impl MultiSiteConfig {
    pub fn hosts_per_site(&self) -> Result<usize, SimError> {
        if self.num_sites == 0 {
            return sim_error!("at least one site is required");
        }
        if self.num_hosts == 0 {
            return sim_error!("at least one host is required");
        }
        if self.num_hosts % self.num_sites != 0 {
            return sim_error!(format!(
                "{} hosts cannot be split evenly across {} sites",
                self.num_hosts, self.num_sites
            ));
        }
        Ok(self.num_hosts / self.num_sites)
    }

    /// The fabric configuration of a single site.
    pub fn site_fabric(&self) -> Result<FabricConfig, SimError> {
        Ok(FabricConfig {
            num_hosts: self.hosts_per_site()?,
            ..self.fabric.clone()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn radix_from_hosts() {
        assert_eq!(default_radix(1), 2);
        assert_eq!(default_radix(2), 2);
        assert_eq!(default_radix(4), 4);
        assert_eq!(default_radix(16), 4);
        assert_eq!(default_radix(17), 6);
        assert_eq!(default_radix(128), 8);
    }

    #[test]
    fn routing_validation() {
        assert!(RoutingConfig::default().validate().is_ok());

        let bad = RoutingConfig {
            speculative_threshold_fraction: 0.7,
            ..RoutingConfig::default()
        };
        assert!(bad.validate().is_err());

        let bad = RoutingConfig {
            ecn_threshold_fraction: 0.0,
            ..RoutingConfig::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn hosts_split_across_sites() {
        let config = MultiSiteConfig {
            num_sites: 3,
            num_hosts: 8,
            ..MultiSiteConfig::default()
        };
        assert!(config.hosts_per_site().is_err());
        assert_eq!(MultiSiteConfig::default().site_fabric().unwrap().num_hosts, 4);
    }
}
