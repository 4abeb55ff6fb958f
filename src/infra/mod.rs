pub mod error;
pub mod http;
pub mod storage;
pub mod telemetry;
pub mod vcs;
