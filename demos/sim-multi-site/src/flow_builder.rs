// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Turn a connection matrix into sources and sinks.

use interlink_components::types::{FlowId, HostId, SinkId};
use interlink_engine::engine::Engine;
use interlink_engine::sim_error;
use interlink_engine::time::SimTime;
use interlink_engine::types::SimError;
use interlink_models::multi_site::{FlowSetup, MultiSiteTopology};
use interlink_models::network::Network;
use interlink_models::traffic::packet_interval;
use interlink_track::{info, warn};
use rand::Rng;

use crate::connection_matrix::ConnectionMatrix;

/// A flow that was set up and started.
#[derive(Clone, Debug)]
pub struct Flow {
    pub id: FlowId,
    pub src: HostId,
    pub dst: HostId,

    /// Index of the source in the network.
    pub source: usize,
    pub sink: SinkId,
    pub start: SimTime,
    pub size_bytes: u64,
    pub inter_site: bool,
}

/// Send rate of one flow when `num_connections` flows share `num_nodes`
/// hosts, each of which can send at `bits_per_sec`.
#[must_use]
pub fn flow_rate(bits_per_sec: u64, num_connections: usize, num_nodes: usize, rate_coef: f64) -> f64 {
    let flows_per_node = num_connections as f64 / num_nodes as f64;
    bits_per_sec as f64 / flows_per_node * rate_coef
}

/// Create a source and sink for every connection and schedule its start.
///
/// Connections without a route are reported and skipped.
pub fn build_flows<R: Rng>(
    engine: &mut Engine<Network>,
    topology: &mut MultiSiteTopology,
    matrix: &ConnectionMatrix,
    rate_coef: f64,
    rng: &mut R,
) -> Result<Vec<Flow>, SimError> {
    let top = engine.top().clone();
    if matrix.nodes != topology.no_of_nodes() {
        return sim_error!(format!(
            "connection matrix is for {} nodes but the topology has {}",
            matrix.nodes,
            topology.no_of_nodes()
        ));
    }
    if matrix.is_empty() {
        return sim_error!("connection matrix has no connections");
    }

    let config = topology.config().clone();
    let mtu = config.fabric.mtu_bytes;
    let mut flows = Vec::with_capacity(matrix.len());
    for connection in &matrix.connections {
        let (src, dst) = (connection.src, connection.dst);
        let inter_site = topology.is_inter_dc_flow(src, dst);
        let speed = if inter_site {
            config.wan_bits_per_sec
        } else {
            config.fabric.link_bits_per_sec
        };
        let bits_per_sec = flow_rate(speed, matrix.len(), matrix.nodes, rate_coef);

        let setup = FlowSetup {
            flow: connection.id,
            src,
            dst,
            size_bytes: connection.size_bytes,
            bits_per_sec,
        };
        let Some(source) = topology.add_flow(&setup)? else {
            warn!(top ; "skipping {}: no route from {} to {}", connection.id, src, dst);
            continue;
        };

        let gap = packet_interval(bits_per_sec, mtu).as_ps();
        let jitter = if gap > 0 { rng.gen_range(0..gap) } else { 0 };
        let start = connection.start + SimTime::from_ps(jitter);
        topology.network_mut().start_source(engine, source, start)?;

        let sink = topology.network().sources()[source].sink;
        flows.push(Flow {
            id: connection.id,
            src,
            dst,
            source,
            sink,
            start,
            size_bytes: connection.size_bytes,
            inter_site,
        });
    }

    info!(top ; "Set up {} of {} connections", flows.len(), matrix.len());
    for flow in flows.iter().filter(|flow| flow.inter_site) {
        info!(top ; "Inter-site: {} -> {} (site{} -> site{})",
            flow.src.0, flow.dst.0, topology.site_id(flow.src), topology.site_id(flow.dst));
    }
    Ok(flows)
}
