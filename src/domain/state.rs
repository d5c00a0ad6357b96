//! Per-query state published to consumers.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use super::descriptor::QueryMode;
use super::error::TransportError;

/// Published state of one query.
///
/// Constructed only through the named constructors so that a settled state
/// always carries exactly one of `data` or `error` and is never partial.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryState {
    pub is_loading: bool,
    pub data: Option<Value>,
    pub error: Option<TransportError>,
    /// A two-phase preview is visible but the authoritative value has not landed.
    pub partially_loaded: bool,
    /// Reserved; always empty.
    pub warnings: Vec<String>,
}

/// Coarse classification of a [`QueryState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStatus {
    Loading,
    Partial,
    Ready,
    Failed,
}

impl QueryState {
    /// State at the start of a run.
    pub fn loading(mode: QueryMode) -> Self {
        Self {
            is_loading: true,
            data: None,
            error: None,
            partially_loaded: mode == QueryMode::TwoPhase,
            warnings: Vec::new(),
        }
    }

    /// A fast-phase preview on top of `self`; the query keeps loading.
    pub fn with_preview(&self, data: Value) -> Self {
        Self {
            is_loading: true,
            data: Some(data),
            error: None,
            partially_loaded: true,
            warnings: self.warnings.clone(),
        }
    }

    pub fn ready(data: Value) -> Self {
        Self {
            is_loading: false,
            data: Some(data),
            error: None,
            partially_loaded: false,
            warnings: Vec::new(),
        }
    }

    pub fn failed(error: TransportError) -> Self {
        Self {
            is_loading: false,
            data: None,
            error: Some(error),
            partially_loaded: false,
            warnings: Vec::new(),
        }
    }

    pub fn is_settled(&self) -> bool {
        !self.is_loading
    }

    pub fn status(&self) -> QueryStatus {
        match (self.is_loading, self.partially_loaded && self.data.is_some()) {
            (true, true) => QueryStatus::Partial,
            (true, false) => QueryStatus::Loading,
            (false, _) if self.error.is_some() => QueryStatus::Failed,
            (false, _) => QueryStatus::Ready,
        }
    }
}

/// Query states keyed by descriptor name.
pub type StateMap = BTreeMap<String, QueryState>;
