//! Interfaces standing in for spec.md §1's external collaborators — named
//! only by the interface they expose, never implemented here beyond a
//! trivial default.

use redwork_protocol::Blob;
use std::collections::HashSet;

/// Iteration over the user's input — spec.md's "a restartable or one-shot
/// producer of task arguments". Each call returns the next task's raw
/// argument tuple (pre-RNG-stream); `None` signals the input is exhausted
/// and fixes N.
pub trait ArgsProducer: Send {
    fn next(&mut self) -> Option<Vec<Blob>>;
}

/// A producer over an already-materialized, finite set of argument tuples —
/// the common case for a caller that already knows its input.
pub struct VecArgsProducer {
    items: std::vec::IntoIter<Vec<Blob>>,
}

impl VecArgsProducer {
    pub fn new(items: Vec<Vec<Blob>>) -> Self {
        Self { items: items.into_iter() }
    }
}

impl ArgsProducer for VecArgsProducer {
    fn next(&mut self) -> Option<Vec<Blob>> {
        self.items.next()
    }
}

/// RNG stream derivation — spec.md's external "next-stream" function. The
/// core only requires a producer of per-task seed blobs that are
/// reproducible and independent (spec §9), plus the ability to checkpoint
/// and restore state so [`crate::cleanup::Cleanup`] can "restore master-side
/// RNG state" per spec §4.7 step 4.
pub trait StreamSource: Send {
    fn next_stream(&mut self) -> Blob;
    fn checkpoint(&self) -> Vec<u8>;
    fn restore(&mut self, checkpoint: &[u8]);
}

/// Symbol/package discovery to seed a worker environment — spec.md's
/// external introspection function. `redwork_core` ships only the trivial
/// default; real discovery is a worker-runtime concern.
pub trait PackageResolver: Send + Sync {
    fn exports(&self, package: &str) -> HashSet<String>;
}

/// The default resolver: no packages are introspected, so auto-discovery
/// never adds bindings sourced from `packages`.
pub struct NullPackageResolver;

impl PackageResolver for NullPackageResolver {
    fn exports(&self, _package: &str) -> HashSet<String> {
        HashSet::new()
    }
}
