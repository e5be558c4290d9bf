//! The error taxonomy surfaced by the dispatch core.
//!
//! Callers (the HTTP layer, the worker runtime) branch on these variants:
//! `Validation` maps to a 400, `NotFound` to a 404, `Conflict` is a guarded
//! transition denied by the current status (the API layer folds it into a
//! 404 for uniformity), and `Store` carries transient database failures.

use uuid::Uuid;

use conveyor_db::models::TaskStatus;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// Bad input: blank name, non-object payload, unknown status string.
    #[error("{0}")]
    Validation(String),

    /// The referenced row does not exist.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    /// A state-machine rule denied the operation.
    #[error("task {id} is {status}, cannot {action}")]
    Conflict {
        id: Uuid,
        status: TaskStatus,
        action: &'static str,
    },

    /// Underlying store failure (connection loss, lock timeout, ...).
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl QueueError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn task_not_found(id: Uuid) -> Self {
        Self::NotFound { entity: "task", id }
    }

    pub fn worker_not_found(id: Uuid) -> Self {
        Self::NotFound {
            entity: "worker",
            id,
        }
    }
}

pub type Result<T, E = QueueError> = std::result::Result<T, E>;
