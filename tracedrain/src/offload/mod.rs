//! Trace offload
//!
//! - `coordinator`: per-device buffer ownership and the offload state machine
//! - `drain`: the serialized buffer-to-sink copy shared with the thread
//! - `worker`: background thread and status publication

pub mod coordinator;
mod drain;
mod worker;

pub use coordinator::OffloadCoordinator;
pub use drain::DrainStats;
