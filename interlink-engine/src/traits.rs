// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Traits implemented by anything the [`Engine`](crate::engine::Engine) can
//! execute.

use crate::engine::Engine;
use crate::types::SimResult;

/// A one-shot action scheduled to run at a future time against world `W`.
pub trait Event<W> {
    /// Execute the event. It is consumed in the process.
    fn fire(self: Box<Self>, engine: &mut Engine<W>, world: &mut W) -> SimResult;
}

/// Adapter that allows any closure to be scheduled as an [`Event`].
pub struct Callback<F>(pub F);

impl<W, F> Event<W> for Callback<F>
where
    F: FnOnce(&mut Engine<W>, &mut W) -> SimResult,
{
    fn fire(self: Box<Self>, engine: &mut Engine<W>, world: &mut W) -> SimResult {
        (self.0)(engine, world)
    }
}
