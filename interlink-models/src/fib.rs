// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Forwarding information base.
//!
//! A [`Fib`] maps a destination host to a set of candidate [`FibEntry`]s.
//! Entry sets are held in an arena so that several destinations can share
//! one set (an access switch uses the same uplinks for every remote
//! destination). Sets are only ever added to, never invalidated.
//!
//! Access switches also hold host routes, keyed by destination and flow,
//! for the hosts attached to them.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use interlink_components::packet::Direction;
use interlink_components::route::Route;
use interlink_components::types::{FlowId, HostId};
use rand::Rng;
use rand::seq::SliceRandom;

#[derive(Clone, Debug)]
pub struct FibEntry {
    pub route: Rc<Route>,
    pub direction: Direction,
    pub metric: u32,
}

impl FibEntry {
    #[must_use]
    pub fn new(route: Rc<Route>, metric: u32, direction: Direction) -> Self {
        Self {
            route,
            direction,
            metric,
        }
    }
}

/// A destination for which no forwarding entry could be produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoutingMiss(pub String);

impl fmt::Display for RoutingMiss {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "routing miss: {}", self.0)
    }
}

impl std::error::Error for RoutingMiss {}

#[derive(Default)]
pub struct Fib {
    sets: Vec<Vec<FibEntry>>,
    by_dest: HashMap<HostId, usize>,
    host_routes: HashMap<(HostId, FlowId), Rc<Route>>,
}

impl Fib {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn lookup(&self, dest: HostId) -> Option<&[FibEntry]> {
        let index = *self.by_dest.get(&dest)?;
        let set = &self.sets[index];
        if set.is_empty() {
            None
        } else {
            Some(set.as_slice())
        }
    }

    pub fn lookup_mut(&mut self, dest: HostId) -> Option<&mut [FibEntry]> {
        let index = *self.by_dest.get(&dest)?;
        let set = &mut self.sets[index];
        if set.is_empty() {
            None
        } else {
            Some(set.as_mut_slice())
        }
    }

    /// Append a candidate for `dest`. Entries are not de-duplicated.
    pub fn add_entry(&mut self, dest: HostId, route: Rc<Route>, metric: u32, direction: Direction) {
        let index = match self.by_dest.get(&dest) {
            Some(&index) => index,
            None => {
                self.sets.push(Vec::new());
                let index = self.sets.len() - 1;
                self.by_dest.insert(dest, index);
                index
            }
        };
        self.sets[index].push(FibEntry::new(route, metric, direction));
    }

    /// Return the entries for `dest`, calling `builder` to install them the
    /// first time the destination is seen.
    ///
    /// A builder that fails leaves the table unchanged so a later packet
    /// will try again.
    pub fn get_or_build<F>(&mut self, dest: HostId, builder: F) -> Result<&mut [FibEntry], RoutingMiss>
    where
        F: FnOnce(&mut Fib) -> Result<(), RoutingMiss>,
    {
        if self.lookup(dest).is_none() {
            builder(self)?;
        }
        self.lookup_mut(dest)
            .ok_or_else(|| RoutingMiss(format!("no entries installed for {dest}")))
    }

    /// Make `dest` share the entry set already held for `from`.
    pub fn alias_routes(&mut self, dest: HostId, from: HostId) -> bool {
        match self.by_dest.get(&from) {
            Some(&index) => {
                self.by_dest.insert(dest, index);
                true
            }
            None => false,
        }
    }

    /// Randomly reorder the entries for `dest`. This affects every
    /// destination sharing the set.
    pub fn permute<R: Rng>(&mut self, dest: HostId, rng: &mut R) {
        if let Some(entries) = self.lookup_mut(dest) {
            entries.shuffle(rng);
        }
    }

    pub fn add_host_route(&mut self, dest: HostId, flow: FlowId, route: Rc<Route>) {
        self.host_routes.insert((dest, flow), route);
    }

    #[must_use]
    pub fn host_route(&self, dest: HostId, flow: FlowId) -> Option<&Rc<Route>> {
        self.host_routes.get(&(dest, flow))
    }

    #[must_use]
    pub fn num_destinations(&self) -> usize {
        self.by_dest.len()
    }

    #[must_use]
    pub fn num_entry_sets(&self) -> usize {
        self.sets.len()
    }

    #[must_use]
    pub fn num_host_routes(&self) -> usize {
        self.host_routes.len()
    }
}
