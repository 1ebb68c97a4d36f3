//! Kubernetes pod metadata for the sift pipeline.
//!
//! The crate keeps an in-memory, multi-key-indexed cache of pod and
//! namespace metadata fed by an external watch stream, and uses it to
//! enrich entries (spans, log records) with the metadata of the pod they
//! originate from.
//!
//! # Components
//!
//! - [`PodCache`]: the indexed cache. Every pod record is reachable under
//!   all identifiers derived from the configured [`AssociationRule`]s plus
//!   two implicit ones (pod uid, connection address). Deletions are
//!   deferred by a grace period to absorb event reordering; stale writes
//!   are skipped per identifier.
//! - [`WatchService`]: the single-owner event loop. The external informer
//!   layer pushes typed [`WatchEvent`]s into a bounded channel; the loop
//!   applies them to the cache and runs the periodic eviction sweep.
//! - [`Enricher`]: resolves an entry to a cached pod record through the
//!   same association rules and merges the record's extracted metadata into
//!   the entry without overwriting what the entry already carries.
//!
//! The cache is an explicitly constructed instance passed by handle; there
//! is no global watch state.

#![warn(missing_docs)]

pub mod conventions;

mod cache;
mod config;
mod enrich;
mod identifier;
mod record;
mod watch;

pub use cache::*;
pub use config::*;
pub use enrich::*;
pub use identifier::*;
pub use record::*;
pub use watch::*;
