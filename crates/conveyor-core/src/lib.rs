//! The conveyor dispatch core.
//!
//! Sits between the storage layer (`conveyor-db`) and the outer surfaces
//! (HTTP control plane, worker binaries): validated queue operations, the
//! atomic claim-next dispatch engine, guarded lifecycle transitions, the
//! worker runtime loop, and heartbeat-timeout recovery.

pub mod error;
pub mod queue;
pub mod reaper;
pub mod worker;

pub use error::QueueError;
