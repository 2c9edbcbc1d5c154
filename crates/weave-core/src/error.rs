use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::agent::AgentError;

/// RPC status taxonomy carried by every service error.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RpcCode {
    InvalidArgument,
    NotFound,
    AlreadyExists,
    FailedPrecondition,
    Unauthenticated,
    PermissionDenied,
    DeadlineExceeded,
    Cancelled,
    Internal,
    Unavailable,
    Unimplemented,
}

impl RpcCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RpcCode::InvalidArgument => "invalid_argument",
            RpcCode::NotFound => "not_found",
            RpcCode::AlreadyExists => "already_exists",
            RpcCode::FailedPrecondition => "failed_precondition",
            RpcCode::Unauthenticated => "unauthenticated",
            RpcCode::PermissionDenied => "permission_denied",
            RpcCode::DeadlineExceeded => "deadline_exceeded",
            RpcCode::Cancelled => "cancelled",
            RpcCode::Internal => "internal",
            RpcCode::Unavailable => "unavailable",
            RpcCode::Unimplemented => "unimplemented",
        }
    }
}

#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct ServiceError {
    pub code: RpcCode,
    pub message: String,
}

impl ServiceError {
    pub fn new(code: RpcCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(RpcCode::InvalidArgument, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(RpcCode::NotFound, message)
    }

    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new(RpcCode::AlreadyExists, message)
    }

    pub fn failed_precondition(message: impl Into<String>) -> Self {
        Self::new(RpcCode::FailedPrecondition, message)
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(RpcCode::Unauthenticated, message)
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(RpcCode::PermissionDenied, message)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(RpcCode::Cancelled, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(RpcCode::Internal, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(RpcCode::Unavailable, message)
    }
}

impl From<AgentError> for ServiceError {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::Cancelled => ServiceError::cancelled("request cancelled"),
            AgentError::SessionNotFound(id) => {
                ServiceError::not_found(format!("session not found: {}", id))
            }
            other => ServiceError::internal(other.to_string()),
        }
    }
}
