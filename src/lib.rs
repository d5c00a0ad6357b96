//! Concurrent page-load queries with a write-through cache and a two-phase
//! fast/slow retrieval protocol.
//!
//! A page load is a set of [`QueryDescriptor`]s plus a [`Fingerprint`]. The
//! [`QueryOrchestrator`] issues every query in its own task, resolves each one
//! cache-first, and publishes per-query [`QueryState`]s on a [`StateView`].

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
pub(crate) mod util;

pub use application::{
    Fingerprint, QueryOrchestrator, ResourceClient, RunError, RunSnapshot, StateView,
};
pub use cache::{CacheError, CacheStore};
pub use domain::{
    QueryDescriptor, QueryMode, QueryState, QueryStatus, SufficiencyThreshold, TransportError,
};
