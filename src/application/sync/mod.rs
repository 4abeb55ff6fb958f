//! Repository synchronisation: the engine, its shared registry and the worker pool feeding it.

mod engine;
mod registry;
mod scheduler;

pub use engine::{
    SyncEngine, SyncEngineConfig, SyncError, SyncMode, SyncOutcome, SyncReport, remote_key,
};
pub use registry::SyncRegistry;
pub use scheduler::{SyncScheduler, SyncTask, sync_all};
