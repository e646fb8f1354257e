// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Named nodes of the tracking tree.
//!
//! Every switch, queue, pipe and flow of a network owns an [`Entity`]. The
//! entity ties log output to an [`Id`] and a `::` separated path such as
//! `top::multi_site::site0::tor1`, which is what the level filters of the
//! [`EntityManager`](crate::tracker::EntityManager) match against.

use std::fmt;
use std::rc::Rc;

use crate::{Id, Tracker, create, destroy};

const SEPARATOR: &str = "::";

pub struct Entity {
    /// Last component of the path.
    pub name: String,

    /// `None` only for the root made by [`toplevel`].
    pub parent: Option<Rc<Entity>>,

    pub id: Id,
    pub tracker: Tracker,

    path: String,
}

impl Entity {
    /// Register a child of `parent` with the parent's tracker.
    #[must_use]
    pub fn new(parent: &Rc<Entity>, name: &str) -> Self {
        let path = format!("{}{SEPARATOR}{name}", parent.path);
        let tracker = parent.tracker.clone();
        let id = tracker.unique_id();
        tracker.add_entity(id, &path);

        let entity = Self {
            name: name.to_owned(),
            parent: Some(parent.clone()),
            id,
            tracker,
            path,
        };
        create!(entity);
        entity
    }

    /// The path from the root, computed once when the entity is made.
    #[must_use]
    pub fn full_name(&self) -> &str {
        &self.path
    }

    /// Number of ancestors between this entity and the root.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.parent.as_ref().map_or(0, |parent| parent.depth() + 1)
    }
}

impl Drop for Entity {
    fn drop(&mut self) {
        destroy!(self);
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("path", &self.path)
            .field("id", &self.id)
            .finish()
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

/// The root of a tracking tree.
pub fn toplevel(tracker: &Tracker, name: &str) -> Rc<Entity> {
    let id = tracker.unique_id();
    tracker.add_entity(id, name);
    let top = Rc::new(Entity {
        name: name.to_owned(),
        parent: None,
        id,
        tracker: tracker.clone(),
        path: name.to_owned(),
    });
    create!(top);
    top
}
