//! Page-load orchestration: one run per fingerprint change, one task per query.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use thiserror::Error;
use tokio::runtime::Handle;
use tracing::{debug, info};

use crate::cache::CacheStore;
use crate::domain::descriptor::QueryDescriptor;
use crate::domain::error::TransportError;
use crate::domain::state::{QueryState, StateMap};
use crate::util::lock::mutex_lock;

use super::resolve::{TaskContext, resolve_query};
use super::resource::ResourceClient;
use super::sink::{Generation, RunSnapshot, StateSink, StateView};

const SOURCE: &str = "application::orchestrator";

/// Caller-supplied run identity, compared by value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fingerprint(Vec<Value>);

impl Fingerprint {
    pub fn new<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self(values.into_iter().map(Into::into).collect())
    }

    pub fn values(&self) -> &[Value] {
        &self.0
    }
}

impl From<Vec<Value>> for Fingerprint {
    fn from(values: Vec<Value>) -> Self {
        Self(values)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RunError {
    #[error("duplicate query name `{0}` in one run")]
    DuplicateName(String),
    #[error("runs must be started from within a tokio runtime")]
    NoRuntime,
}

/// Outcome of [`QueryOrchestrator::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStart {
    /// A new run began with this generation.
    Started(Generation),
    /// The fingerprint matched the current run; nothing was reissued.
    Unchanged(Generation),
}

/// Issues every query of a page load concurrently and publishes their states.
///
/// Starting a new run does not cancel the previous run's tasks. Their results
/// are dropped on arrival because each commit is tagged with the generation it
/// was started under.
pub struct QueryOrchestrator {
    client: Arc<dyn ResourceClient>,
    cache: Option<Arc<dyn CacheStore>>,
    sink: Arc<StateSink>,
    current: Mutex<Option<Fingerprint>>,
    generations: AtomicU64,
}

impl QueryOrchestrator {
    /// `cache` is the store consulted when a run enables caching; with `None`
    /// every run goes to the network.
    pub fn new(client: Arc<dyn ResourceClient>, cache: Option<Arc<dyn CacheStore>>) -> Self {
        Self {
            client,
            cache,
            sink: Arc::new(StateSink::new()),
            current: Mutex::new(None),
            generations: AtomicU64::new(0),
        }
    }

    /// Start a run for `fingerprint` unless it is already the current one.
    ///
    /// Every query's state is reset to loading before this returns; results
    /// then land on the returned view as each task settles.
    pub fn run(
        &self,
        descriptors: Vec<QueryDescriptor>,
        fingerprint: Fingerprint,
        cache_enabled: bool,
    ) -> Result<StateView, RunError> {
        self.start(descriptors, fingerprint, cache_enabled)?;
        Ok(self.view())
    }

    /// As [`run`](Self::run), reporting whether a new run began.
    pub fn start(
        &self,
        descriptors: Vec<QueryDescriptor>,
        fingerprint: Fingerprint,
        cache_enabled: bool,
    ) -> Result<RunStart, RunError> {
        ensure_unique_names(&descriptors)?;
        let runtime = Handle::try_current().map_err(|_| RunError::NoRuntime)?;

        let mut current = mutex_lock(&self.current, SOURCE, "start");
        if current.as_ref() == Some(&fingerprint) {
            let generation = self.sink.snapshot().generation;
            debug!(generation, "Fingerprint unchanged; keeping current run");
            return Ok(RunStart::Unchanged(generation));
        }

        let generation = self.generations.fetch_add(1, Ordering::SeqCst) + 1;
        let states: StateMap = descriptors
            .iter()
            .map(|descriptor| (descriptor.name.clone(), QueryState::loading(descriptor.mode)))
            .collect();
        self.sink.reset(generation, states);
        *current = Some(fingerprint);
        drop(current);

        let cache = if cache_enabled { self.cache.clone() } else { None };
        info!(
            generation,
            queries = descriptors.len(),
            cache_enabled = cache.is_some(),
            "Run started"
        );

        let ctx = TaskContext {
            generation,
            client: Arc::clone(&self.client),
            cache,
            sink: Arc::clone(&self.sink),
        };
        for descriptor in descriptors {
            spawn_query(&runtime, ctx.clone(), descriptor);
        }

        Ok(RunStart::Started(generation))
    }

    pub fn view(&self) -> StateView {
        self.sink.view()
    }

    pub fn snapshot(&self) -> RunSnapshot {
        self.sink.snapshot()
    }
}

/// Run one query in its own task. A panic inside resolution becomes a failed
/// state for that query instead of leaving it loading forever.
fn spawn_query(runtime: &Handle, ctx: TaskContext, descriptor: QueryDescriptor) {
    let name = descriptor.name.clone();
    let task = runtime.spawn(resolve_query(ctx.clone(), descriptor));
    runtime.spawn(async move {
        if let Err(err) = task.await {
            ctx.commit(&name, |_| {
                QueryState::failed(TransportError::new(format!("query task failed: {err}")))
            });
        }
    });
}

fn ensure_unique_names(descriptors: &[QueryDescriptor]) -> Result<(), RunError> {
    let mut seen = HashSet::with_capacity(descriptors.len());
    for descriptor in descriptors {
        if !seen.insert(descriptor.name.as_str()) {
            return Err(RunError::DuplicateName(descriptor.name.clone()));
        }
    }
    Ok(())
}
