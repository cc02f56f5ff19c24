//! Wire contract for the redwork dispatcher: the key schema, payload types,
//! and shared error kinds that a master and its workers must agree on.
//!
//! This crate has no opinion on *how* the keys are read or written — that's
//! `redwork_store` — only on what they're named and what shape their values
//! take.

pub mod defaults;
pub mod error;
pub mod naming;
pub mod types;

pub use error::{ConfigError, DispatchError, ErrorPolicy};
pub use naming::{MarkerKind, QueueKeys};
pub use types::{ArgsTuple, Blob, Envelope, ReduceSpec, ResultChunk, TaskChunk};
