//! Frame rendering: worker pools and the scheduler driving them.

pub(crate) mod download;
pub(crate) mod event;
pub mod params;
pub mod scheduler;
pub mod texture;
pub(crate) mod worker;
