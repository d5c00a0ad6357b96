//! Application layer: query orchestration over the cache and resource ports.

pub mod error;
pub mod orchestrator;
mod resolve;
pub mod resource;
pub mod sink;

pub use orchestrator::{Fingerprint, QueryOrchestrator, RunError, RunStart};
pub use resource::ResourceClient;
pub use sink::{Generation, RunSnapshot, StateView};
