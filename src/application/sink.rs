//! Shared query-state map and the read-only view handed to consumers.
//!
//! The map lives in a `tokio::sync::watch` channel. The sender is the single
//! serializing owner: every mutation is a closure over the current snapshot,
//! applied under the channel's lock, so concurrent tasks never overwrite each
//! other's keys.

use serde::Serialize;
use tokio::sync::watch;

use crate::domain::state::{QueryState, StateMap};

/// Monotonic run counter. Each fingerprint change gets the next value.
pub type Generation = u64;

/// Consumer-visible state of the current run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSnapshot {
    pub generation: Generation,
    pub states: StateMap,
}

impl RunSnapshot {
    /// True when every query is loading. Vacuously true for an empty run.
    pub fn all_loading(&self) -> bool {
        self.states.values().all(|state| state.is_loading)
    }

    pub fn any_loading(&self) -> bool {
        self.states.values().any(|state| state.is_loading)
    }

    pub fn get(&self, name: &str) -> Option<&QueryState> {
        self.states.get(name)
    }
}

pub(crate) struct StateSink {
    tx: watch::Sender<RunSnapshot>,
}

impl StateSink {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(RunSnapshot::default());
        Self { tx }
    }

    /// Replace the whole map for a new run.
    pub(crate) fn reset(&self, generation: Generation, states: StateMap) {
        self.tx.send_modify(|snapshot| {
            snapshot.generation = generation;
            snapshot.states = states;
        });
    }

    /// Apply `next` to the state of `name`, provided `generation` is still the
    /// current run. Returns whether the update was committed.
    pub(crate) fn commit<F>(&self, generation: Generation, name: &str, next: F) -> bool
    where
        F: FnOnce(&QueryState) -> QueryState,
    {
        self.tx.send_if_modified(|snapshot| {
            if snapshot.generation != generation {
                return false;
            }
            let Some(current) = snapshot.states.get_mut(name) else {
                return false;
            };
            *current = next(current);
            true
        })
    }

    pub(crate) fn snapshot(&self) -> RunSnapshot {
        self.tx.borrow().clone()
    }

    pub(crate) fn view(&self) -> StateView {
        StateView {
            rx: self.tx.subscribe(),
        }
    }
}

/// Read-only handle on the published states.
#[derive(Debug, Clone)]
pub struct StateView {
    rx: watch::Receiver<RunSnapshot>,
}

impl StateView {
    pub fn snapshot(&self) -> RunSnapshot {
        self.rx.borrow().clone()
    }

    pub fn states(&self) -> StateMap {
        self.rx.borrow().states.clone()
    }

    pub fn state(&self, name: &str) -> Option<QueryState> {
        self.rx.borrow().get(name).cloned()
    }

    pub fn generation(&self) -> Generation {
        self.rx.borrow().generation
    }

    pub fn all_loading(&self) -> bool {
        self.rx.borrow().all_loading()
    }

    pub fn any_loading(&self) -> bool {
        self.rx.borrow().any_loading()
    }

    /// Wait for the next published snapshot.
    ///
    /// Intermediate snapshots may be skipped if several land before this view
    /// is polled. Returns `None` once the orchestrator and all of its tasks are
    /// gone.
    pub async fn changed(&mut self) -> Option<RunSnapshot> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    /// Wait until no query is loading and return that snapshot.
    pub async fn settled(&mut self) -> Option<RunSnapshot> {
        self.rx
            .wait_for(|snapshot| !snapshot.any_loading())
            .await
            .ok()
            .map(|snapshot| snapshot.clone())
    }
}
