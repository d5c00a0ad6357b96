use std::error::Error as StdError;

use thiserror::Error;

use crate::{
    cache::CacheError, config::LoadError, domain::page::PageError, infra::error::InfraError,
};

use super::orchestrator::RunError;

/// Flattened error chain for logging at the process boundary.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, error: &dyn StdError) -> Self {
        let mut messages = Vec::new();
        messages.push(error.to_string());
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self { source, messages }
    }

    pub fn chain(&self) -> String {
        self.messages.join(": ")
    }
}

/// Setup failures of the command-line surface. Query failures are not errors
/// at this level; they are published as failed states.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("failed to load configuration")]
    Config(#[source] LoadError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("failed to read page definition")]
    Page(#[source] PageError),
    #[error("cache unavailable")]
    Cache(#[source] CacheError),
    #[error("run rejected")]
    Run(#[source] RunError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    pub fn report(&self) -> ErrorReport {
        ErrorReport::from_error("application::error::AppError", self)
    }
}

impl From<LoadError> for AppError {
    fn from(error: LoadError) -> Self {
        Self::Config(error)
    }
}

impl From<PageError> for AppError {
    fn from(error: PageError) -> Self {
        Self::Page(error)
    }
}

impl From<CacheError> for AppError {
    fn from(error: CacheError) -> Self {
        Self::Cache(error)
    }
}

impl From<RunError> for AppError {
    fn from(error: RunError) -> Self {
        Self::Run(error)
    }
}
