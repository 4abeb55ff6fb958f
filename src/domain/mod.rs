//! Domain types shared by the sync engine, the scheduler and the HTTP layer.

pub mod repository;
pub mod sync;
