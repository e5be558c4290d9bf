//! The `TaskHandler` trait -- the seam between the dispatch core and
//! whatever a task actually does.
//!
//! The runtime claims tasks and reports outcomes; executing the payload is
//! the handler's business. Implementors get the full claimed [`Task`] and
//! return either a JSON result (recorded on COMPLETED) or an error (its
//! rendered chain becomes the FAILED row's error text).

use anyhow::Result;
use async_trait::async_trait;

use conveyor_db::models::Task;

/// Payload execution interface for worker runtimes.
///
/// # Object Safety
///
/// This trait is object-safe so a runtime can hold `Arc<dyn TaskHandler>`.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Execute the task's payload and return a JSON result.
    ///
    /// Errors are not retried by the runtime; they terminate the task as
    /// FAILED.
    async fn execute(&self, task: &Task) -> Result<serde_json::Value>;
}

// Compile-time assertion: TaskHandler must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn TaskHandler) {}
};
