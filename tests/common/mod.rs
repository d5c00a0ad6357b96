//! In-process fakes for the resource client and cache ports.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use querydeck::{
    CacheError, CacheStore, ResourceClient, RunSnapshot, StateView, TransportError,
};
use serde_json::Value;
use tokio::sync::Notify;

struct Step {
    gate: Option<Arc<Notify>>,
    outcome: Result<Value, TransportError>,
}

/// Resource client answering from per-request-id scripts, optionally held
/// back until a gate is opened.
#[derive(Default)]
pub struct ScriptedClient {
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    calls: Mutex<Vec<String>>,
    served: AtomicUsize,
}

impl ScriptedClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, request_id: &str, body: Value) -> &Self {
        self.push(request_id, None, Ok(body))
    }

    pub fn fail(&self, request_id: &str, error: TransportError) -> &Self {
        self.push(request_id, None, Err(error))
    }

    /// Respond with `body` once the returned gate is notified.
    pub fn respond_gated(&self, request_id: &str, body: Value) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.push(request_id, Some(Arc::clone(&gate)), Ok(body));
        gate
    }

    fn push(
        &self,
        request_id: &str,
        gate: Option<Arc<Notify>>,
        outcome: Result<Value, TransportError>,
    ) -> &Self {
        self.scripts
            .lock()
            .expect("scripts lock")
            .entry(request_id.to_string())
            .or_default()
            .push_back(Step { gate, outcome });
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn calls_for(&self, request_id: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.as_str() == request_id)
            .count()
    }

    /// Number of fetches that have returned to the caller.
    pub fn served(&self) -> usize {
        self.served.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResourceClient for ScriptedClient {
    async fn fetch_resource(&self, request_id: &str) -> Result<Value, TransportError> {
        self.calls
            .lock()
            .expect("calls lock")
            .push(request_id.to_string());
        let step = self
            .scripts
            .lock()
            .expect("scripts lock")
            .get_mut(request_id)
            .and_then(VecDeque::pop_front);
        let Some(step) = step else {
            self.served.fetch_add(1, Ordering::SeqCst);
            return Err(TransportError::new(format!("unscripted request {request_id}")));
        };
        if let Some(gate) = step.gate {
            gate.notified().await;
        }
        self.served.fetch_add(1, Ordering::SeqCst);
        step.outcome
    }
}

/// Map-backed cache that records traffic and can be told to fail.
#[derive(Default)]
pub struct RecordingCache {
    entries: Mutex<HashMap<String, Value>>,
    gets: Mutex<Vec<String>>,
    puts: Mutex<Vec<String>>,
    fail_gets: bool,
    fail_puts: bool,
}

impl RecordingCache {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_reads() -> Arc<Self> {
        Arc::new(Self {
            fail_gets: true,
            ..Self::default()
        })
    }

    pub fn failing_writes() -> Arc<Self> {
        Arc::new(Self {
            fail_puts: true,
            ..Self::default()
        })
    }

    pub fn seed(&self, key: &str, value: Value) {
        self.entries
            .lock()
            .expect("entries lock")
            .insert(key.to_string(), value);
    }

    pub fn entry(&self, key: &str) -> Option<Value> {
        self.entries.lock().expect("entries lock").get(key).cloned()
    }

    pub fn gets(&self) -> Vec<String> {
        self.gets.lock().expect("gets lock").clone()
    }

    pub fn puts(&self) -> Vec<String> {
        self.puts.lock().expect("puts lock").clone()
    }
}

#[async_trait]
impl CacheStore for RecordingCache {
    async fn get(&self, key: &str) -> Result<Value, CacheError> {
        self.gets.lock().expect("gets lock").push(key.to_string());
        if self.fail_gets {
            return Err(CacheError::Io(io::Error::other("disk unavailable")));
        }
        self.entry(key).ok_or_else(|| CacheError::miss(key))
    }

    async fn put(&self, key: &str, value: &Value) -> Result<(), CacheError> {
        self.puts.lock().expect("puts lock").push(key.to_string());
        if self.fail_puts {
            return Err(CacheError::Io(io::Error::other("disk full")));
        }
        self.seed(key, value.clone());
        Ok(())
    }
}

/// Wait (bounded) until `predicate` holds for the published snapshot.
pub async fn wait_until<F>(view: &mut StateView, predicate: F) -> RunSnapshot
where
    F: Fn(&RunSnapshot) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        let mut snapshot = view.snapshot();
        while !predicate(&snapshot) {
            snapshot = view.changed().await.expect("orchestrator alive");
        }
        snapshot
    })
    .await
    .expect("condition reached in time")
}

pub async fn settled(view: &mut StateView) -> RunSnapshot {
    tokio::time::timeout(Duration::from_secs(5), view.settled())
        .await
        .expect("settled in time")
        .expect("orchestrator alive")
}

pub fn orchestrator(
    client: &Arc<ScriptedClient>,
    cache: Option<&Arc<RecordingCache>>,
) -> querydeck::QueryOrchestrator {
    let client: Arc<dyn ResourceClient> = Arc::clone(client) as Arc<dyn ResourceClient>;
    let cache = cache.map(|cache| Arc::clone(cache) as Arc<dyn CacheStore>);
    querydeck::QueryOrchestrator::new(client, cache)
}
