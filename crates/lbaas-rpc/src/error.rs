//! Dispatch channel error types.

use thiserror::Error;

/// Transport faults. Always propagated to the caller.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("no subscriber on topic: {0}")]
    NoRoute(String),

    #[error("channel closed for topic: {0}")]
    ChannelClosed(String),

    #[error("failed to encode message: {0}")]
    Encode(String),
}

pub type RpcResult<T> = Result<T, RpcError>;
