// Application Layer - Backend operations over the shared store

pub mod backend;
pub mod pagination;
pub mod scripts;
pub mod sentinel;

// Re-exports
pub use backend::{BackendStatus, JobBackend};
pub use pagination::{OrchestratorJobs, DEFAULT_LIMIT};
pub use sentinel::{translate, ScriptAbort, Sentinel};
