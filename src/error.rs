//! Process-wide error taxonomy, stable across the wire.
//!
//! Every failure that can reach a caller boils down to one [`ErrorCode`]
//! plus a human-readable message. Transport, store, and service errors each
//! carry their own `thiserror` enum but converge on the same [`ErrorMessage`]
//! so that a `RemoteNode` reply and a locally-raised error look identical to
//! the service layer.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable error code carried over the wire and surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    BadRequest,
    NotFound,
    Conflict,
    Timeout,
    MissingRoute,
    Internal,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCode::BadRequest => "BAD_REQUEST",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::Conflict => "CONFLICT",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::MissingRoute => "MISSING_ROUTE",
            ErrorCode::Internal => "INTERNAL",
        };
        write!(f, "{s}")
    }
}

/// Wire-level error payload: a code plus an explanatory message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub code: ErrorCode,
    pub message: String,
}

impl ErrorMessage {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for ErrorMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ErrorMessage {}

/// Errors raised while the store executes a [`crate::protocol::Command`].
#[derive(Debug, thiserror::Error)]
pub enum StoreOperationError {
    #[error("bucket not found: {0}")]
    BucketNotFound(String),
    #[error("key not found")]
    KeyNotFound,
    #[error("conditional guard failed")]
    Conflict,
    #[error("update timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("internal store error: {0}")]
    Internal(String),
}

impl From<&StoreOperationError> for ErrorCode {
    fn from(e: &StoreOperationError) -> Self {
        match e {
            StoreOperationError::BucketNotFound(_) | StoreOperationError::KeyNotFound => {
                ErrorCode::NotFound
            }
            StoreOperationError::Conflict => ErrorCode::Conflict,
            StoreOperationError::Timeout(_) => ErrorCode::Timeout,
            StoreOperationError::BadRequest(_) => ErrorCode::BadRequest,
            StoreOperationError::Internal(_) => ErrorCode::Internal,
        }
    }
}

impl From<StoreOperationError> for ErrorMessage {
    fn from(e: StoreOperationError) -> Self {
        let code = ErrorCode::from(&e);
        ErrorMessage::new(code, e.to_string())
    }
}

/// Errors raised by a [`crate::cluster::node::Node`] while transporting a command.
#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    #[error("node is disconnected")]
    Disconnected,
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),
    #[error("codec error: {0}")]
    Codec(String),
    #[error(transparent)]
    Remote(ErrorMessage),
}

impl From<ProcessingError> for ErrorMessage {
    fn from(e: ProcessingError) -> Self {
        match e {
            ProcessingError::Remote(msg) => msg,
            ProcessingError::Disconnected => {
                ErrorMessage::new(ErrorCode::MissingRoute, "node is disconnected")
            }
            other => ErrorMessage::new(ErrorCode::Internal, other.to_string()),
        }
    }
}

/// Errors raised by [`crate::router::Router`].
#[derive(Debug, thiserror::Error)]
pub enum RoutingError {
    #[error("no reachable node for cluster {cluster}")]
    MissingRoute { cluster: String },
    #[error("{command} is dispatched directly to resolved nodes, not via execute_on_router")]
    NotRoutable { command: &'static str },
}

impl From<RoutingError> for ErrorMessage {
    fn from(e: RoutingError) -> Self {
        ErrorMessage::new(ErrorCode::MissingRoute, e.to_string())
    }
}

/// Top-level error returned to a caller of [`crate::service`].
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct ServiceError(pub ErrorMessage);

impl From<ErrorMessage> for ServiceError {
    fn from(msg: ErrorMessage) -> Self {
        ServiceError(msg)
    }
}

impl From<RoutingError> for ServiceError {
    fn from(e: RoutingError) -> Self {
        ServiceError(e.into())
    }
}

impl From<ProcessingError> for ServiceError {
    fn from(e: ProcessingError) -> Self {
        ServiceError(e.into())
    }
}

impl From<StoreOperationError> for ServiceError {
    fn from(e: StoreOperationError) -> Self {
        ServiceError(e.into())
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
