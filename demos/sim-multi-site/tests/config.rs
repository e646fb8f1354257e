// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

use std::io::Write;

use clap::Parser;
use interlink_engine::time::SimTime;
use interlink_models::config::{InterSitePaths, RoutingStrategy};
use serial_test::serial;
use sim_multi_site::config::Config;

fn cli(args: &[&str]) -> Config {
    Config::parse_from(std::iter::once("sim-multi-site").chain(args.iter().copied()))
}

#[test]
#[serial]
fn defaults() {
    let config = Config::from_sources(cli(&[])).unwrap();
    assert_eq!(config, Config::default());

    let multi_site = config.multi_site_config().unwrap();
    assert_eq!(multi_site.num_sites, 2);
    assert_eq!(multi_site.num_hosts, 128);
    assert_eq!(multi_site.fabric.num_hosts, 64);
    assert_eq!(multi_site.wan_bits_per_sec, 6_400_000_000_000);
    assert_eq!(multi_site.fabric.queue_bytes, 8 * 4000);
    assert_eq!(multi_site.wan_queue_bytes, 5000 * 4000);
    assert_eq!(config.end_time(), Some(SimTime::from_us(1200)));

    let routing = config.routing_config().unwrap();
    assert_eq!(routing.strategy, RoutingStrategy::Ecmp);
    assert_eq!(routing.sticky_delta, SimTime::from_us(10));
}

#[test]
#[serial]
fn command_line_overrides() {
    let config = Config::from_sources(cli(&[
        "--nodes",
        "16",
        "--strategy",
        "fl-ar",
        "--inter-site-paths",
        "switch-routed",
        "--fair-share-prefix",
        "--end-us",
        "0",
    ]))
    .unwrap();
    assert_eq!(config.nodes, Some(16));
    assert_eq!(config.sites, Some(2));
    assert_eq!(config.strategy, Some(RoutingStrategy::FlAr));
    assert_eq!(config.fair_share_prefix, Some(true));
    assert_eq!(config.end_time(), None);

    let multi_site = config.multi_site_config().unwrap();
    assert_eq!(multi_site.inter_site_paths, InterSitePaths::SwitchRouted);
    assert_eq!(multi_site.wan_bits_per_sec, 800_000_000_000);
}

#[test]
#[serial]
fn file_then_environment_then_command_line() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(file, "nodes = 32\nsites = 4\nrate_coef = 0.5\nstrategy = \"pkt-ar\"").unwrap();
    let path = file.path().to_str().unwrap().to_string();

    let config = Config::from_sources(cli(&["--conf-file", &path])).unwrap();
    assert_eq!(config.nodes, Some(32));
    assert_eq!(config.sites, Some(4));
    assert_eq!(config.strategy, Some(RoutingStrategy::PktAr));
    approx::assert_relative_eq!(config.rate_coef.unwrap(), 0.5);

    // SAFETY: tests touching the environment run serially
    unsafe { std::env::set_var("INTERLINK_SITES", "8") };
    let config = Config::from_sources(cli(&["--conf-file", &path])).unwrap();
    assert_eq!(config.sites, Some(8));

    let config = Config::from_sources(cli(&["--conf-file", &path, "--sites", "2"])).unwrap();
    unsafe { std::env::remove_var("INTERLINK_SITES") };
    assert_eq!(config.sites, Some(2));
    assert_eq!(config.nodes, Some(32));
}

#[test]
#[serial]
fn invalid_values_are_rejected() {
    let config = Config::from_sources(cli(&["--nodes", "15"])).unwrap();
    assert!(config.multi_site_config().is_err());

    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(file, "strategy = \"shortest\"").unwrap();
    let path = file.path().to_str().unwrap().to_string();
    assert!(Config::from_sources(cli(&["--conf-file", &path])).is_err());
}
