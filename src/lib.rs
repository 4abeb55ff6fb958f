//! docmirror: mirrors git repositories into object storage and serves them
//! over HTTP behind a disk-backed response cache.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
pub mod util;
