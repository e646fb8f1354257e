// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Drive the simulation and report the results.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::rc::Rc;

use byte_unit::{AdjustedByte, Byte, UnitType};
use indicatif::ProgressBar;
use interlink_engine::engine::Engine;
use interlink_engine::sim_error;
use interlink_engine::time::SimTime;
use interlink_engine::types::{SimError, SimResult};
use interlink_models::network::Network;
use interlink_track::entity::Entity;
use interlink_track::{info, warn};

use crate::flow_builder::Flow;

/// Simulated time between progress reports.
pub const PROGRESS_INTERVAL: SimTime = SimTime::from_us(100);

/// True once every flow has received all of its bytes.
#[must_use]
pub fn all_complete(network: &Network, flows: &[Flow]) -> bool {
    flows
        .iter()
        .all(|flow| network.sink(flow.sink).is_some_and(|sink| sink.is_complete()))
}

/// Run until `end`, or until every flow completes if `end` is `None`.
pub fn run(
    engine: &mut Engine<Network>,
    network: &mut Network,
    flows: &[Flow],
    end: Option<SimTime>,
    progress_bar: Option<&ProgressBar>,
) -> SimResult {
    let top = engine.top().clone();
    if end.is_none() && flows.iter().any(|flow| flow.size_bytes == 0) {
        return sim_error!("flows without a size never complete, an end time is required");
    }
    if let Some(end) = end {
        engine.set_end_time(end);
    }

    let mut checkpoint = PROGRESS_INTERVAL;
    loop {
        engine.run_until(checkpoint, network)?;
        info!(top ; "Simulation time {:.1}us", engine.now().as_us_f64());
        if let Some(progress_bar) = progress_bar {
            progress_bar.set_position(network.stats().delivered);
        }

        if end.is_none() && all_complete(network, flows) {
            info!(top ; "All flows completed");
            break;
        }
        if engine.next_event_time().is_none() {
            break;
        }
        if end.is_some_and(|end| checkpoint >= end) {
            break;
        }
        checkpoint += PROGRESS_INTERVAL;
    }
    Ok(())
}

/// Time from the start of a flow to its last byte arriving; zero if the
/// flow did not complete.
#[must_use]
pub fn completion_time(network: &Network, flow: &Flow) -> SimTime {
    network
        .sink(flow.sink)
        .and_then(|sink| sink.completed_at())
        .map_or(SimTime::ZERO, |at| at.saturating_sub(flow.start))
}

/// Write one CSV line per flow.
pub fn write_flow_log<W: Write>(out: &mut W, network: &Network, flows: &[Flow]) -> std::io::Result<()> {
    writeln!(out, "Flow ID,Src->Dest,Completion Time,ReceivedBytes,PacketsSent,InterDC")?;
    for flow in flows {
        let received = network.sink(flow.sink).map_or(0, |sink| sink.received_bytes());
        let sent = network.sources().get(flow.source).map_or(0, |source| source.sent());
        writeln!(
            out,
            "{},{}->{},{},{},{},{}",
            flow.id.0,
            flow.src.0,
            flow.dst.0,
            completion_time(network, flow).as_ps(),
            received,
            sent,
            u8::from(flow.inter_site)
        )?;
    }
    Ok(())
}

pub fn save_flow_log(path: &Path, network: &Network, flows: &[Flow]) -> SimResult {
    let result = File::create(path).and_then(|file| {
        let mut out = BufWriter::new(file);
        write_flow_log(&mut out, network, flows)?;
        out.flush()
    });
    match result {
        Ok(()) => Ok(()),
        Err(e) => sim_error!(format!("unable to write {}: {e}", path.display())),
    }
}

/// Log the flows that did not complete and the overall throughput.
pub fn print_summary(top: &Rc<Entity>, network: &Network, flows: &[Flow], time_now: SimTime) {
    let mut incomplete = 0;
    for flow in flows.iter().filter(|flow| flow.size_bytes > 0) {
        let received = network.sink(flow.sink).map_or(0, |sink| sink.received_bytes());
        if received < flow.size_bytes {
            incomplete += 1;
            let sent = network.sources().get(flow.source).map_or(0, |source| source.sent());
            warn!(top ; "Incomplete {} {}->{}: received {} of {} bytes, sent {} packets",
                flow.id, flow.src.0, flow.dst.0, received, flow.size_bytes, sent);
        }
    }

    let stats = network.stats();
    let received_bytes: u64 = network.sinks().iter().map(|sink| sink.received_bytes()).sum();
    let (total, per_second) = compute_adjusted_value_and_rate(time_now.as_secs_f64(), received_bytes);
    info!(top ; "{}/{} flows complete at {}", flows.len() - incomplete, flows.len(), time_now);
    info!(top ; "Packets sent {}, delivered {}, dropped {} (queues) {} (routing) {} (unknown flow)",
        stats.packets_sent, stats.delivered, stats.queue_drops, stats.routing_drops, stats.unknown_flow_drops);
    info!(top ; "Received {total:.2} ({per_second:.2}/s)");
}

fn compute_adjusted_value_and_rate(time_now_s: f64, num_bytes: u64) -> (AdjustedByte, AdjustedByte) {
    // Convert to a binary-only unit (KiB, MiB, etc)
    let count = Byte::from_u64(num_bytes).get_appropriate_unit(UnitType::Binary);
    let rate = if time_now_s > 0.0 {
        num_bytes as f64 / time_now_s
    } else {
        0.0
    };
    let per_second = Byte::from_f64(rate)
        .unwrap_or_else(|| Byte::from_u64(0))
        .get_appropriate_unit(UnitType::Binary);
    (count, per_second)
}
