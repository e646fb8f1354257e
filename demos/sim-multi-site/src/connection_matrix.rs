// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Connection matrices: the list of flows to simulate.
//!
//! The text format is
//! ```text
//! Nodes 8
//! Connections 2
//! 0->5 id 1 start 0 size 400000
//! 6->1 id 2 start 1000000 size 400000
//! ```
//! where `start` is in picoseconds and `size` in bytes. The `id`, `start`
//! and `size` fields may be left out; ids then count up from 1.

use std::fs;
use std::path::Path;
use std::str::FromStr;

use interlink_components::types::{FlowId, HostId};
use interlink_engine::sim_error;
use interlink_engine::time::SimTime;
use interlink_engine::types::SimError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Connection {
    pub id: FlowId,
    pub src: HostId,
    pub dst: HostId,
    pub start: SimTime,

    /// Zero means send until the end of the simulation.
    pub size_bytes: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConnectionMatrix {
    pub nodes: usize,
    pub connections: Vec<Connection>,
}

fn parse_number<T: FromStr>(value: Option<&str>, what: &str, line_no: usize) -> Result<T, SimError> {
    match value.map(str::parse::<T>) {
        Some(Ok(v)) => Ok(v),
        _ => sim_error!(format!("line {line_no}: expected a number for {what}")),
    }
}

fn parse_header(line: Option<(usize, &str)>, key: &str) -> Result<usize, SimError> {
    let Some((line_no, line)) = line else {
        return sim_error!(format!("missing `{key}` line"));
    };
    let mut words = line.split_whitespace();
    if words.next() != Some(key) {
        return sim_error!(format!("line {line_no}: expected `{key} <count>`"));
    }
    parse_number(words.next(), key, line_no)
}

fn parse_connection(line: &str, line_no: usize, default_id: u64) -> Result<Connection, SimError> {
    let mut words = line.split_whitespace();
    let Some((src, dst)) = words.next().and_then(|pair| pair.split_once("->")) else {
        return sim_error!(format!("line {line_no}: expected `src->dst`"));
    };
    let mut connection = Connection {
        id: FlowId(default_id),
        src: HostId(parse_number(Some(src), "src", line_no)?),
        dst: HostId(parse_number(Some(dst), "dst", line_no)?),
        start: SimTime::ZERO,
        size_bytes: 0,
    };

    while let Some(key) = words.next() {
        let value = words.next();
        match key {
            "id" => connection.id = FlowId(parse_number(value, key, line_no)?),
            "start" => connection.start = SimTime::from_ps(parse_number(value, key, line_no)?),
            "size" => connection.size_bytes = parse_number(value, key, line_no)?,
            _ => return sim_error!(format!("line {line_no}: unknown field `{key}`")),
        }
    }
    Ok(connection)
}

impl FromStr for ConnectionMatrix {
    type Err = SimError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let mut lines = text
            .lines()
            .enumerate()
            .map(|(i, line)| (i + 1, line.trim()))
            .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'));

        let nodes = parse_header(lines.next(), "Nodes")?;
        let num_connections = parse_header(lines.next(), "Connections")?;

        let mut connections = Vec::with_capacity(num_connections);
        for (line_no, line) in lines {
            let connection = parse_connection(line, line_no, connections.len() as u64 + 1)?;
            if connection.src.0 >= nodes || connection.dst.0 >= nodes {
                return sim_error!(format!("line {line_no}: host out of range for {nodes} nodes"));
            }
            if connection.src == connection.dst {
                return sim_error!(format!("line {line_no}: {} connects to itself", connection.src));
            }
            connections.push(connection);
        }

        if connections.len() != num_connections {
            return sim_error!(format!(
                "expected {num_connections} connections, found {}",
                connections.len()
            ));
        }
        Ok(Self { nodes, connections })
    }
}

impl ConnectionMatrix {
    pub fn load(path: &Path) -> Result<Self, SimError> {
        match fs::read_to_string(path) {
            Ok(text) => text.parse(),
            Err(e) => sim_error!(format!("unable to read {}: {e}", path.display())),
        }
    }

    /// Every host sends to every other host of its own site, then to every
    /// host of every other site.
    #[must_use]
    pub fn all_to_all(nodes: usize, sites: usize, size_bytes: u64) -> Self {
        let per_site = nodes / sites.max(1);
        let site_hosts = |site: usize| site * per_site..(site + 1) * per_site;

        let mut pairs = Vec::new();
        for site in 0..sites {
            for src in site_hosts(site) {
                pairs.extend(site_hosts(site).filter(|dst| *dst != src).map(|dst| (src, dst)));
            }
        }
        for from in 0..sites {
            for to in (0..sites).filter(|to| *to != from) {
                for src in site_hosts(from) {
                    pairs.extend(site_hosts(to).map(|dst| (src, dst)));
                }
            }
        }

        let connections = pairs
            .into_iter()
            .zip(1..)
            .map(|((src, dst), id)| Connection {
                id: FlowId(id),
                src: HostId(src),
                dst: HostId(dst),
                start: SimTime::ZERO,
                size_bytes,
            })
            .collect();
        Self { nodes, connections }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Render in the text format accepted by [`FromStr`].
    #[must_use]
    pub fn to_text(&self) -> String {
        let mut text = format!("Nodes {}\nConnections {}\n", self.nodes, self.connections.len());
        for c in &self.connections {
            text.push_str(&format!(
                "{}->{} id {} start {} size {}\n",
                c.src.0,
                c.dst.0,
                c.id.0,
                c.start.as_ps(),
                c.size_bytes
            ));
        }
        text
    }
}
