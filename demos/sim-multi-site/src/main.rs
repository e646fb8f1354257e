// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Simulate flows across a multi-site fabric.
//!
//! See `lib.rs` for details.

use std::rc::Rc;

use indicatif::ProgressBar;
use interlink_engine::engine::Engine;
use interlink_engine::sim_error;
use interlink_engine::types::SimError;
use interlink_models::multi_site::MultiSiteTopology;
use interlink_models::network::Network;
use interlink_track::builder::{TrackerConfig, TrackersConfig, setup_trackers};
use interlink_track::{Track, Tracker, info};
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use sim_multi_site::config::Config;
use sim_multi_site::connection_matrix::ConnectionMatrix;
use sim_multi_site::flow_builder::build_flows;
use sim_multi_site::runner::{print_summary, run, save_flow_log};

fn setup_all_trackers(config: &Config) -> Result<Tracker, SimError> {
    let level = config.stdout_level.unwrap_or(log::Level::Info);
    let filter_regex = config.stdout_filter_regex.as_deref().unwrap_or("");
    let trackers = TrackersConfig {
        stdout: TrackerConfig {
            enable: config.stdout.unwrap_or(false),
            level,
            filter_regex,
            file: None,
        },
        log_file: TrackerConfig {
            enable: config.log_file.is_some(),
            level,
            filter_regex,
            file: config.log_file.as_deref(),
        },
    };
    setup_trackers(&trackers).or_else(|e| sim_error!(e))
}

fn main() -> Result<(), SimError> {
    let config = Config::parse_all_sources()?;
    let tracker = setup_all_trackers(&config)?;

    let mut engine: Engine<Network> = Engine::new(&tracker);
    let top = engine.top().clone();

    let routing = Rc::new(config.routing_config()?);
    let multi_site = config.multi_site_config()?;
    info!(top ; "{} sites of {} hosts, {:?} routing, {:?} inter-site paths",
        multi_site.num_sites, multi_site.num_hosts / multi_site.num_sites,
        routing.strategy, multi_site.inter_site_paths);
    info!(top ; "Link speed {}Gbps, WAN speed {}Gbps",
        multi_site.fabric.link_bits_per_sec / 1_000_000_000,
        multi_site.wan_bits_per_sec / 1_000_000_000);
    let mut topology = MultiSiteTopology::new(multi_site, &routing, &top)?;

    let matrix = match &config.tm {
        Some(path) => ConnectionMatrix::load(path)?,
        None => ConnectionMatrix::all_to_all(
            topology.no_of_nodes(),
            topology.num_sites(),
            config.flow_size.unwrap_or(0),
        ),
    };
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(routing.seed);
    let flows = build_flows(
        &mut engine,
        &mut topology,
        &matrix,
        config.rate_coef.unwrap_or(1.0),
        &mut rng,
    )?;

    let progress_bar = config.progress.unwrap_or(false).then(|| {
        let packets_per_flow = |size: u64| size.div_ceil(topology.config().fabric.mtu_bytes as u64);
        ProgressBar::new(flows.iter().map(|flow| packets_per_flow(flow.size_bytes)).sum())
    });

    info!(top ; "Starting simulation");
    run(
        &mut engine,
        topology.network_mut(),
        &flows,
        config.end_time(),
        progress_bar.as_ref(),
    )?;
    if let Some(progress_bar) = progress_bar {
        progress_bar.finish();
    }
    info!(top ; "Done");

    if let Some(flow_log) = &config.flow_log {
        save_flow_log(flow_log, topology.network(), &flows)?;
    }
    print_summary(&top, topology.network(), &flows, engine.now());
    tracker.shutdown();
    Ok(())
}
