//! Small helpers shared across layers.

pub mod bytes;
pub mod duration;
pub(crate) mod lock;
