//! The master-side fold target result chunks are combined into — spec
//! §4.5's "accumulator derived from the user's combine".
//!
//! `Collector` gates every call on the `done` set before invoking
//! [`Accumulator::combine`] (see `collector.rs`), which resolves spec §9's
//! open question on double-dispatch: duplicate deliveries are dropped
//! rather than folded twice.

use redwork_protocol::Blob;
use std::collections::BTreeMap;

/// A user combine function, applied once per delivered slot.
pub trait Accumulator: Send {
    /// Folds `value` (delivered for output slot `n`) into the running
    /// result. An `Err` is a `CombineError` (spec §7) — captured by the
    /// collector, never panics the run.
    fn combine(&mut self, slot: u64, value: Blob) -> Result<(), String>;

    /// Produces the final reduced result once collection completes.
    fn into_result(self: Box<Self>) -> Blob;
}

/// Default accumulator: retains every delivered value keyed by slot and
/// serializes the slot-ordered sequence as the final result. Matches spec
/// §5's ordering guarantee ("under single-level reduce the accumulator
/// reorders by slot index") without needing to know what the values mean.
pub struct OrderedAccumulator {
    values: BTreeMap<u64, Blob>,
}

impl OrderedAccumulator {
    pub fn new() -> Self {
        Self { values: BTreeMap::new() }
    }
}

impl Default for OrderedAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl Accumulator for OrderedAccumulator {
    fn combine(&mut self, slot: u64, value: Blob) -> Result<(), String> {
        self.values.insert(slot, value);
        Ok(())
    }

    fn into_result(self: Box<Self>) -> Blob {
        let ordered: Vec<Blob> = self.values.into_values().collect();
        Blob::new(serde_json::to_vec(&ordered).unwrap_or_default())
    }
}
