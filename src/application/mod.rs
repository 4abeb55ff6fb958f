//! Application services: repository sync, scheduling and external URL mirroring.

pub mod error;
pub mod hashing;
pub mod mirror;
pub mod sync;
