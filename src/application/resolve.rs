//! Cache-then-network resolution of one request id, and the single- and
//! two-phase protocols built on it.

use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::CacheStore;
use crate::domain::body::unwrap_body;
use crate::domain::descriptor::{Phase, QueryDescriptor, Validator, phase_request_id};
use crate::domain::error::TransportError;
use crate::domain::state::QueryState;
use crate::infra::telemetry::{
    METRIC_CACHE_HIT, METRIC_CACHE_MISS, METRIC_CACHE_WRITE_FAILED, METRIC_FETCH,
    METRIC_FETCH_FAILED, METRIC_FETCH_MS, METRIC_STALE_RESULT,
};

use super::resource::ResourceClient;
use super::sink::{Generation, StateSink};

/// Everything one query task needs, cloned into the task at spawn time.
#[derive(Clone)]
pub(crate) struct TaskContext {
    pub(crate) generation: Generation,
    pub(crate) client: Arc<dyn ResourceClient>,
    /// `None` when caching is disabled for the run.
    pub(crate) cache: Option<Arc<dyn CacheStore>>,
    pub(crate) sink: Arc<StateSink>,
}

impl TaskContext {
    /// Publish the next state for `name` if this task's run is still current.
    pub(crate) fn commit<F>(&self, name: &str, next: F) -> bool
    where
        F: FnOnce(&QueryState) -> QueryState,
    {
        let committed = self.sink.commit(self.generation, name, next);
        if !committed {
            counter!(METRIC_STALE_RESULT).increment(1);
            debug!(
                op = "resolve::commit",
                query = name,
                generation = self.generation,
                result = "stale_discarded",
                "Discarding result from superseded run"
            );
        }
        committed
    }

    /// Resolve one request id: cache hit if possible, otherwise a network fetch
    /// whose unwrapped value is written back to the cache.
    pub(crate) async fn fetch(
        &self,
        request_id: &str,
        validator: Option<&Validator>,
    ) -> Result<Value, TransportError> {
        if let Some(cache) = &self.cache {
            match cache.get(request_id).await {
                Ok(body) => {
                    let value = unwrap_body(body);
                    match validator.map_or(Ok(()), |validator| validator.check(&value)) {
                        Ok(()) => {
                            counter!(METRIC_CACHE_HIT).increment(1);
                            debug!(
                                op = "resolve::fetch",
                                request_id,
                                result = "cache_hit",
                                "Served from cache"
                            );
                            return Ok(value);
                        }
                        Err(reason) => {
                            counter!(METRIC_CACHE_MISS).increment(1);
                            debug!(
                                op = "resolve::fetch",
                                request_id,
                                result = "cache_rejected",
                                reason = %reason,
                                "Cached value rejected by validator; fetching"
                            );
                        }
                    }
                }
                Err(err) => {
                    counter!(METRIC_CACHE_MISS).increment(1);
                    debug!(
                        op = "resolve::fetch",
                        request_id,
                        result = "cache_miss",
                        error = %err,
                        "Cache lookup missed; fetching"
                    );
                }
            }
        }

        let started_at = Instant::now();
        counter!(METRIC_FETCH).increment(1);
        let body = self.client.fetch_resource(request_id).await.map_err(|err| {
            counter!(METRIC_FETCH_FAILED).increment(1);
            warn!(
                op = "resolve::fetch",
                request_id,
                result = "error",
                elapsed_ms = started_at.elapsed().as_millis() as u64,
                status = err.status,
                error = %err,
                "Resource fetch failed"
            );
            err
        })?;
        histogram!(METRIC_FETCH_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);

        let value = unwrap_body(body);
        if let Some(validator) = validator {
            validator
                .check(&value)
                .map_err(|reason| TransportError::rejected(request_id, reason))?;
        }

        if let Some(cache) = &self.cache
            && let Err(err) = cache.put(request_id, &value).await
        {
            counter!(METRIC_CACHE_WRITE_FAILED).increment(1);
            warn!(
                op = "resolve::fetch",
                request_id,
                result = "cache_write_failed",
                error = %err,
                "Dropping cache write"
            );
        }

        Ok(value)
    }
}

/// Drive one descriptor to a terminal state.
pub(crate) async fn resolve_query(ctx: TaskContext, descriptor: QueryDescriptor) {
    let settled = if descriptor.is_two_phase() {
        resolve_two_phase(&ctx, &descriptor).await
    } else {
        let outcome = ctx
            .fetch(&descriptor.request_id, descriptor.validator.as_ref())
            .await;
        ctx.commit(&descriptor.name, |_| terminal(outcome))
    };

    if settled {
        debug!(
            op = "resolve::query",
            query = %descriptor.name,
            generation = ctx.generation,
            "Query settled"
        );
    }
}

async fn resolve_two_phase(ctx: &TaskContext, descriptor: &QueryDescriptor) -> bool {
    let name = descriptor.name.as_str();
    let validator = descriptor.validator.as_ref();

    let fast = match ctx
        .fetch(&phase_request_id(&descriptor.request_id, Phase::Fast), validator)
        .await
    {
        Ok(fast) => fast,
        Err(err) => return ctx.commit(name, |_| QueryState::failed(err)),
    };

    let insufficient = descriptor.min_sufficient_count.is_insufficient(&fast);
    let preview = fast.clone();
    if !ctx.commit(name, move |current| current.with_preview(preview)) {
        // A newer run owns this name; the slow phase would be discarded too.
        return false;
    }

    if !insufficient {
        return ctx.commit(name, |_| QueryState::ready(fast));
    }

    debug!(
        op = "resolve::two_phase",
        query = name,
        fast_len = fast.as_array().map_or(0, Vec::len),
        "Fast result insufficient; fetching slow variant"
    );
    let slow = ctx
        .fetch(&phase_request_id(&descriptor.request_id, Phase::Slow), validator)
        .await;
    ctx.commit(name, |_| terminal(slow))
}

fn terminal(outcome: Result<Value, TransportError>) -> QueryState {
    match outcome {
        Ok(data) => QueryState::ready(data),
        Err(err) => QueryState::failed(err),
    }
}
