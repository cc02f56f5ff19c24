//! redwork's master-side coordinator — spec components C2 through C7, plus
//! the `Dispatcher` facade that ties them together (spec §6's public API).
//!
//! Everything below `register`/`remove_queue`/`submit`/`info` takes its
//! configuration and store handle explicitly; the only global state is the
//! [`registry::global`] singleton, confined to this module's free functions.

pub mod accumulator;
pub mod cleanup;
pub mod collector;
pub mod dispatcher;
pub mod envelope;
pub mod external;
pub mod fault;
pub mod producer;
pub mod registry;
pub mod rng;
#[cfg(any(test, feature = "testkit"))]
pub mod testkit;
pub mod types;

use std::num::NonZeroUsize;

pub use redwork_protocol::{
    ArgsTuple, Blob, ConfigError, DispatchError, Envelope, ErrorPolicy, ReduceSpec, ResultChunk,
    TaskChunk,
};
pub use accumulator::{Accumulator, OrderedAccumulator};
pub use dispatcher::{info, submit, submit_with, SubmitContext};
pub use external::{ArgsProducer, NullPackageResolver, PackageResolver, StreamSource, VecArgsProducer};
pub use registry::RegisterOptions;
pub use rng::DefaultStreamSource;
pub use types::{InfoItem, InfoValue, JobSpec, SubmitOutcome};

/// `register(queue, host, port, password?, ...)` — spec §6. Opens the store
/// connection and writes `Q.live` if absent.
pub async fn register(opts: RegisterOptions) -> Result<(), DispatchError> {
    // `Registry::register` awaits a store connection; a std `MutexGuard`
    // must not be held across that point (it isn't `Send`, and would block
    // every other registry access for the duration of the connect call).
    // `Registry` itself is cheap to move out of the lock and back in.
    let mut registry = std::mem::take(&mut *registry::global().lock().unwrap());
    let result = registry.register(opts).await;
    *registry::global().lock().unwrap() = registry;
    result
}

/// `removeQueue(queue)` — spec §6. Idempotent: a second call is a no-op.
pub async fn remove_queue(queue: &str) -> Result<(), DispatchError> {
    let mut registry = std::mem::take(&mut *registry::global().lock().unwrap());
    let result = registry.teardown(queue).await;
    *registry::global().lock().unwrap() = registry;
    result
}

/// `setChunkSize(n)` — registry writer, spec §4.2.
pub fn set_chunk_size(n: NonZeroUsize) {
    registry::global().lock().unwrap().chunk_size = n;
}

/// `setReduce(fn|null|defer)` — registry writer, spec §4.2.
pub fn set_reduce(spec: ReduceSpec) {
    registry::global().lock().unwrap().reduce = spec;
}

/// `setExport(names)` — registry writer, spec §4.2.
pub fn set_export(names: impl IntoIterator<Item = String>) {
    registry::global().lock().unwrap().export = names.into_iter().collect();
}

/// `setPackages(pkgs)` — registry writer, spec §4.2.
pub fn set_packages(pkgs: impl IntoIterator<Item = String>) {
    registry::global().lock().unwrap().packages = pkgs.into_iter().collect();
}
