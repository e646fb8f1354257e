// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Source routes.
//!
//! A [`Route`] is the ordered list of hops a packet visits. Routes are shared
//! between packets (and between routing tables) through `Rc`, so they are
//! immutable once built.

use std::rc::Rc;

use crate::types::{Hop, QueueId};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Route {
    hops: Vec<Hop>,
    path_id: u32,
    reverse: Option<Rc<Route>>,
}

impl Route {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_hops(hops: Vec<Hop>) -> Self {
        Self {
            hops,
            path_id: 0,
            reverse: None,
        }
    }

    pub fn push(&mut self, hop: Hop) {
        self.hops.push(hop);
    }

    /// Append all hops of `other` to this route.
    pub fn extend_from(&mut self, other: &Route) {
        self.hops.extend_from_slice(&other.hops);
    }

    /// Append a list of hops to this route.
    pub fn append(&mut self, hops: &[Hop]) {
        self.hops.extend_from_slice(hops);
    }

    #[must_use]
    pub fn with_path_id(mut self, path_id: u32) -> Self {
        self.path_id = path_id;
        self
    }

    pub fn set_path_id(&mut self, path_id: u32) {
        self.path_id = path_id;
    }

    #[must_use]
    pub fn path_id(&self) -> u32 {
        self.path_id
    }

    pub fn set_reverse(&mut self, reverse: Rc<Route>) {
        self.reverse = Some(reverse);
    }

    #[must_use]
    pub fn reverse(&self) -> Option<&Rc<Route>> {
        self.reverse.as_ref()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.hops.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hops.is_empty()
    }

    #[must_use]
    pub fn first(&self) -> Option<Hop> {
        self.hops.first().copied()
    }

    #[must_use]
    pub fn last(&self) -> Option<Hop> {
        self.hops.last().copied()
    }

    #[must_use]
    pub fn at(&self, index: usize) -> Option<Hop> {
        self.hops.get(index).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Hop> {
        self.hops.iter()
    }

    /// Count the queue hops that satisfy `pred`.
    pub fn count_queues_where<P>(&self, mut pred: P) -> usize
    where
        P: FnMut(QueueId) -> bool,
    {
        self.hops
            .iter()
            .filter_map(Hop::as_queue)
            .filter(|queue| pred(*queue))
            .count()
    }

    #[must_use]
    pub fn hops(&self) -> &[Hop] {
        &self.hops
    }
}

impl FromIterator<Hop> for Route {
    fn from_iter<T: IntoIterator<Item = Hop>>(iter: T) -> Self {
        Self::from_hops(iter.into_iter().collect())
    }
}
