// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! The Interlink event engine.
//!
//! A simulation is a *world* (any type `W` owning the model state) plus an
//! [`Engine<W>`](crate::engine::Engine) holding the queue of future
//! [events](crate::traits::Event). Each event is given mutable access to both
//! when it fires, so it can update the world and schedule further events.
//!
//! Everything runs on one thread; events scheduled for the same time fire in
//! the order they were scheduled.
//!
//! # Example
//!
//! ```rust
//! use interlink_engine::engine::Engine;
//! use interlink_engine::time::SimTime;
//! use interlink_track::tracker::dev_null_tracker;
//!
//! let mut engine: Engine<Vec<u64>> = Engine::new(&dev_null_tracker());
//! engine.schedule_fn(SimTime::from_ns(5), |engine, world: &mut Vec<u64>| {
//!     world.push(engine.now().as_ps());
//!     Ok(())
//! });
//!
//! let mut world = Vec::new();
//! engine.run(&mut world).unwrap();
//! assert_eq!(world, vec![5000]);
//! ```

pub mod engine;
pub mod test_helpers;
pub mod time;
pub mod traits;
pub mod types;
