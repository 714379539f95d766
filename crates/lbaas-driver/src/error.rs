//! Driver error types.

use lbaas_core::EntityKind;
use thiserror::Error;

/// Errors that can occur while driving an entity lifecycle.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("scheduling error: {0}")]
    Scheduler(#[from] lbaas_scheduler::SchedulerError),

    #[error("dispatch error: {0}")]
    Rpc(#[from] lbaas_rpc::RpcError),

    #[error("state store error: {0}")]
    State(#[from] lbaas_state::StateError),

    #[error("failed to encode {kind}: {reason}")]
    Encode { kind: EntityKind, reason: String },

    #[error("unroutable completion report: kind={kind} event={event}")]
    Routing { kind: String, event: String },

    #[error("failed to decode {kind} payload: {reason}")]
    Decode { kind: EntityKind, reason: String },
}

impl DriverError {
    /// Faults caused by a malformed or unexpected completion report.
    pub fn is_routing_fault(&self) -> bool {
        matches!(self, DriverError::Routing { .. } | DriverError::Decode { .. })
    }
}

pub type DriverResult<T> = Result<T, DriverError>;
