// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Configuration of the simulator.
//!
//! Every option can come from four places. Later sources override earlier
//! ones:
//!  1. the built-in defaults,
//!  2. a TOML file given with `--conf-file`,
//!  3. environment variables prefixed with `INTERLINK_` (for example
//!     `INTERLINK_NODES=64`),
//!  4. options given on the command line.

use std::path::{Path, PathBuf};

use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use interlink_engine::sim_error;
use interlink_engine::time::SimTime;
use interlink_engine::types::SimError;
use interlink_models::config::{
    ComparatorKind, FabricConfig, InterSitePaths, MultiSiteConfig, RoutingConfig, RoutingStrategy,
};
use serde::{Deserialize, Serialize};

pub const ENV_PREFIX: &str = "INTERLINK_";

const GBPS: f64 = 1e9;

/// Every field is optional so that a command-line option only overrides
/// the other sources when it is given.
#[derive(Parser, Serialize, Deserialize, Clone, Debug, PartialEq)]
#[command(about = "Multi-site fat-tree routing simulation")]
pub struct Config {
    /// Number of hosts across all sites.
    #[arg(long)]
    pub nodes: Option<usize>,

    /// Number of sites.
    #[arg(long)]
    pub sites: Option<usize>,

    /// Switch radix; the smallest that fits the hosts of a site if not set.
    #[arg(long)]
    pub radix: Option<usize>,

    /// Speed of the links inside a site.
    #[arg(long)]
    pub link_speed_gbps: Option<f64>,

    /// Speed of the wide-area links; 100Gbps per host of a site if not set.
    #[arg(long)]
    pub wan_speed_gbps: Option<f64>,

    /// Propagation delay of the wide-area links.
    #[arg(long)]
    pub wan_delay_us: Option<f64>,

    /// Size of the wide-area queues in MTU sized packets.
    #[arg(long)]
    pub wan_queue_packets: Option<u64>,

    /// Size of the queues inside a site in MTU sized packets.
    #[arg(long)]
    pub queue_packets: Option<u64>,

    /// Packet size in bytes.
    #[arg(long)]
    pub mtu: Option<usize>,

    /// How switches choose among equal-cost routes.
    #[arg(long, value_enum)]
    pub strategy: Option<RoutingStrategy>,

    /// How adaptive strategies rank routes.
    #[arg(long, value_enum)]
    pub comparator: Option<ComparatorKind>,

    /// Gap after which a flowlet may move to another route.
    #[arg(long)]
    pub sticky_delta_us: Option<f64>,

    /// How routes between sites are produced.
    #[arg(long, value_enum)]
    pub inter_site_paths: Option<InterSitePaths>,

    /// Pace source-routed inter-site flows through a fair-share stage.
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub fair_share_prefix: Option<bool>,

    /// Connection matrix to load; an all-to-all matrix is generated if not
    /// set.
    #[arg(long)]
    pub tm: Option<PathBuf>,

    /// Bytes per flow of a generated connection matrix.
    #[arg(long)]
    pub flow_size: Option<u64>,

    /// Scale applied to the send rate of every flow.
    #[arg(long)]
    pub rate_coef: Option<f64>,

    /// Time at which to stop. Use 0 to run until every flow completes.
    #[arg(long)]
    pub end_us: Option<f64>,

    /// File the per-flow results are written to.
    #[arg(long)]
    pub flow_log: Option<PathBuf>,

    /// Seed for the random number generators.
    #[arg(long)]
    pub seed: Option<u64>,

    /// TOML file of options.
    #[arg(long)]
    #[serde(skip)]
    pub conf_file: Option<PathBuf>,

    /// Show a progress bar of received packets.
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub progress: Option<bool>,

    /// Enable logging to the console.
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub stdout: Option<bool>,

    /// Level of log message to display.
    #[arg(long)]
    pub stdout_level: Option<log::Level>,

    /// Entities matching this regular expression log at `--stdout-level`,
    /// all others only log errors.
    #[arg(long)]
    pub stdout_filter_regex: Option<String>,

    /// Write the log to this file instead of the console.
    #[arg(long)]
    pub log_file: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            nodes: Some(128),
            sites: Some(2),
            radix: None,
            link_speed_gbps: Some(100.0),
            wan_speed_gbps: None,
            wan_delay_us: Some(1.0),
            wan_queue_packets: Some(5000),
            queue_packets: Some(8),
            mtu: Some(4000),
            strategy: Some(RoutingStrategy::default()),
            comparator: Some(ComparatorKind::default()),
            sticky_delta_us: Some(10.0),
            inter_site_paths: Some(InterSitePaths::default()),
            fair_share_prefix: Some(false),
            tm: None,
            flow_size: Some(2_000_000),
            rate_coef: Some(1.0),
            end_us: Some(1200.0),
            flow_log: Some(PathBuf::from("flowlog.csv")),
            seed: Some(1),
            conf_file: None,
            progress: Some(false),
            stdout: Some(true),
            stdout_level: Some(log::Level::Info),
            stdout_filter_regex: Some(String::new()),
            log_file: None,
        }
    }
}

macro_rules! merge_fields {
    ($config:ident, $cli:ident ; $($field:ident),* $(,)?) => {
        $(
            if $cli.$field.is_some() {
                $config.$field = $cli.$field;
            }
        )*
    };
}

macro_rules! required {
    ($config:ident . $field:ident) => {
        match $config.$field.clone() {
            Some(value) => value,
            None => return sim_error!(concat!("no value for `", stringify!($field), "`")),
        }
    };
}

impl Config {
    /// Parse the command line and combine it with the other sources.
    pub fn parse_all_sources() -> Result<Self, SimError> {
        let cli = Self::parse();
        Self::from_sources(cli)
    }

    /// Combine `cli` with the defaults, the configuration file it names and
    /// the environment.
    pub fn from_sources(cli: Self) -> Result<Self, SimError> {
        let config = Self::figment(cli.conf_file.as_deref())
            .extract::<Self>()
            .or_else(|e| sim_error!(format!("invalid configuration: {e}")))?;
        Ok(config.merge(cli))
    }

    /// The defaults, file and environment layers.
    #[must_use]
    pub fn figment(conf_file: Option<&Path>) -> Figment {
        let mut figment = Figment::new().merge(Serialized::defaults(Self::default()));
        if let Some(conf_file) = conf_file {
            figment = figment.merge(Toml::file(conf_file));
        }
        figment.merge(Env::prefixed(ENV_PREFIX))
    }

    /// Override fields of `self` with those set in `cli`.
    #[must_use]
    pub fn merge(mut self, cli: Self) -> Self {
        merge_fields!(self, cli ;
            nodes, sites, radix, link_speed_gbps, wan_speed_gbps, wan_delay_us,
            wan_queue_packets, queue_packets, mtu, strategy, comparator,
            sticky_delta_us, inter_site_paths, fair_share_prefix, tm, flow_size,
            rate_coef, end_us, flow_log, seed, conf_file, progress, stdout,
            stdout_level, stdout_filter_regex, log_file,
        );
        self
    }

    pub fn routing_config(&self) -> Result<RoutingConfig, SimError> {
        let config = RoutingConfig {
            strategy: required!(self.strategy),
            sticky_delta: SimTime::from_us_f64(required!(self.sticky_delta_us)),
            comparator: required!(self.comparator),
            seed: required!(self.seed),
            ..RoutingConfig::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn multi_site_config(&self) -> Result<MultiSiteConfig, SimError> {
        let nodes = required!(self.nodes);
        let sites = required!(self.sites);
        let mtu = required!(self.mtu);
        if sites == 0 || nodes % sites != 0 {
            return sim_error!(format!("{nodes} nodes cannot be split across {sites} sites"));
        }
        let link_speed_gbps = required!(self.link_speed_gbps);
        let wan_speed_gbps = self
            .wan_speed_gbps
            .unwrap_or(100.0 * (nodes / sites) as f64);

        let fabric = FabricConfig {
            num_hosts: nodes / sites,
            radix: self.radix,
            link_bits_per_sec: (link_speed_gbps * GBPS) as u64,
            queue_bytes: required!(self.queue_packets) * mtu as u64,
            mtu_bytes: mtu,
            ..FabricConfig::default()
        };
        Ok(MultiSiteConfig {
            num_sites: sites,
            num_hosts: nodes,
            wan_bits_per_sec: (wan_speed_gbps * GBPS) as u64,
            wan_queue_bytes: required!(self.wan_queue_packets) * mtu as u64,
            wan_delay: SimTime::from_us_f64(required!(self.wan_delay_us)),
            inter_site_paths: required!(self.inter_site_paths),
            fair_share_prefix: self.fair_share_prefix.unwrap_or(false),
            fabric,
        })
    }

    /// The time to stop at, or `None` to run until every flow completes.
    #[must_use]
    pub fn end_time(&self) -> Option<SimTime> {
        self.end_us
            .filter(|end_us| *end_us > 0.0)
            .map(SimTime::from_us_f64)
    }
}
