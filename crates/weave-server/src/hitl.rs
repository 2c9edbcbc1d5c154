use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use weave_core::ServiceError;

use crate::state::ServerState;

const DEFAULT_TIMEOUT_SECONDS: u64 = 300;

#[derive(Debug, Clone, Deserialize)]
pub struct PermissionRequest {
    pub session_id: String,
    pub tool_name: String,
    #[serde(default)]
    pub args_json: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub risk_level: String,
    #[serde(default)]
    pub timeout_seconds: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PermissionDecision {
    pub granted: bool,
    pub message: String,
    pub remember_decision: bool,
    pub timed_out: bool,
}

#[derive(Debug, Clone)]
pub struct PermissionAnswer {
    pub granted: bool,
    pub message: String,
    pub remember: bool,
}

/// Exists only while a waiter blocks on it. The answer channel is size 1;
/// the answerer removes the entry before sending so a second answer finds
/// nothing.
pub struct PendingPermission {
    pub id: String,
    pub session_id: String,
    pub tool_name: String,
    pub args_json: String,
    pub description: String,
    pub risk_level: String,
    pub timeout_seconds: u64,
    pub created_at: DateTime<Utc>,
    answer_tx: mpsc::Sender<PermissionAnswer>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClarificationRequest {
    pub session_id: String,
    pub question: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub risk_level: String,
    #[serde(default)]
    pub timeout_seconds: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClarificationDecision {
    pub answer: String,
    pub timed_out: bool,
}

pub struct PendingClarification {
    pub id: String,
    pub session_id: String,
    pub question: String,
    pub description: String,
    pub risk_level: String,
    pub timeout_seconds: u64,
    pub created_at: DateTime<Utc>,
    answer_tx: mpsc::Sender<String>,
}

fn lock<'a, T>(mutex: &'a Mutex<T>) -> std::sync::MutexGuard<'a, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Removes the pending entry when the waiter future is dropped, covering
/// timeout, cancellation, and client disconnect with one exit path.
struct PendingCleanup<'a, T> {
    map: &'a Mutex<HashMap<String, T>>,
    id: String,
}

impl<T> Drop for PendingCleanup<'_, T> {
    fn drop(&mut self) {
        lock(self.map).remove(&self.id);
    }
}

fn effective_timeout(timeout_seconds: i64) -> u64 {
    if timeout_seconds <= 0 {
        DEFAULT_TIMEOUT_SECONDS
    } else {
        timeout_seconds as u64
    }
}

fn unix_nano() -> i64 {
    Utc::now().timestamp_nanos_opt().unwrap_or_default()
}

impl ServerState {
    /// Block until the permission is answered, the timeout fires, or the
    /// caller goes away. The pending entry is gone on every exit path.
    pub async fn request_tool_permission(
        &self,
        req: PermissionRequest,
        cancel: CancellationToken,
    ) -> Result<PermissionDecision, ServiceError> {
        if req.session_id.is_empty() {
            return Err(ServiceError::invalid_argument("session_id is required"));
        }
        if req.tool_name.is_empty() {
            return Err(ServiceError::invalid_argument("tool_name is required"));
        }

        let timeout_seconds = effective_timeout(req.timeout_seconds);
        let id = format!("perm-{}-{}-{}", req.session_id, req.tool_name, unix_nano());
        let (answer_tx, mut answer_rx) = mpsc::channel(1);

        {
            let mut pending = lock(&self.pending_permissions);
            pending.insert(
                id.clone(),
                PendingPermission {
                    id: id.clone(),
                    session_id: req.session_id.clone(),
                    tool_name: req.tool_name.clone(),
                    args_json: req.args_json,
                    description: req.description,
                    risk_level: req.risk_level,
                    timeout_seconds,
                    created_at: Utc::now(),
                    answer_tx,
                },
            );
        }
        let _cleanup = PendingCleanup {
            map: &self.pending_permissions,
            id: id.clone(),
        };
        log::info!(
            "[{}] permission request '{}' waiting (tool: {}, timeout: {}s)",
            req.session_id,
            id,
            req.tool_name,
            timeout_seconds
        );

        tokio::select! {
            answer = answer_rx.recv() => match answer {
                Some(answer) => Ok(PermissionDecision {
                    granted: answer.granted,
                    message: answer.message,
                    remember_decision: answer.remember,
                    timed_out: false,
                }),
                None => Err(ServiceError::internal("permission answer channel closed")),
            },
            _ = tokio::time::sleep(Duration::from_secs(timeout_seconds)) => {
                Ok(PermissionDecision {
                    granted: false,
                    message: format!(
                        "permission request timed out after {} seconds",
                        timeout_seconds
                    ),
                    remember_decision: false,
                    timed_out: true,
                })
            }
            _ = cancel.cancelled() => {
                Err(ServiceError::cancelled("permission request cancelled"))
            }
        }
    }

    /// Deliver the answer. Removing the entry and sending are one step from
    /// the waiter's point of view: after removal no second answer can land.
    pub fn grant_tool_permission(
        &self,
        perm_id: &str,
        granted: bool,
        message: impl Into<String>,
        remember: bool,
    ) -> Result<(), ServiceError> {
        let entry = lock(&self.pending_permissions)
            .remove(perm_id)
            .ok_or_else(|| {
                ServiceError::not_found(format!(
                    "permission request '{}' not found or already answered",
                    perm_id
                ))
            })?;

        entry
            .answer_tx
            .try_send(PermissionAnswer {
                granted,
                message: message.into(),
                remember,
            })
            .map_err(|_| ServiceError::internal("permission answer channel full"))?;
        log::info!(
            "[{}] permission '{}' answered: granted={}",
            entry.session_id,
            perm_id,
            granted
        );
        Ok(())
    }

    pub async fn request_clarification(
        &self,
        req: ClarificationRequest,
        cancel: CancellationToken,
    ) -> Result<ClarificationDecision, ServiceError> {
        if req.session_id.is_empty() {
            return Err(ServiceError::invalid_argument("session_id is required"));
        }
        if req.question.is_empty() {
            return Err(ServiceError::invalid_argument("question is required"));
        }

        let timeout_seconds = effective_timeout(req.timeout_seconds);
        let id = format!("clarify-{}-{}", req.session_id, unix_nano());
        let (answer_tx, mut answer_rx) = mpsc::channel(1);

        {
            let mut pending = lock(&self.pending_clarifications);
            pending.insert(
                id.clone(),
                PendingClarification {
                    id: id.clone(),
                    session_id: req.session_id.clone(),
                    question: req.question,
                    description: req.description,
                    risk_level: req.risk_level,
                    timeout_seconds,
                    created_at: Utc::now(),
                    answer_tx,
                },
            );
        }
        let _cleanup = PendingCleanup {
            map: &self.pending_clarifications,
            id: id.clone(),
        };
        log::info!(
            "[{}] clarification request '{}' waiting ({}s)",
            req.session_id,
            id,
            timeout_seconds
        );

        tokio::select! {
            answer = answer_rx.recv() => match answer {
                Some(answer) => Ok(ClarificationDecision {
                    answer,
                    timed_out: false,
                }),
                None => Err(ServiceError::internal("clarification answer channel closed")),
            },
            _ = tokio::time::sleep(Duration::from_secs(timeout_seconds)) => {
                Ok(ClarificationDecision {
                    answer: String::new(),
                    timed_out: true,
                })
            }
            _ = cancel.cancelled() => {
                Err(ServiceError::cancelled("clarification request cancelled"))
            }
        }
    }

    pub fn answer_clarification(
        &self,
        question_id: &str,
        answer: impl Into<String>,
    ) -> Result<(), ServiceError> {
        let entry = lock(&self.pending_clarifications)
            .remove(question_id)
            .ok_or_else(|| {
                ServiceError::not_found(format!(
                    "clarification request '{}' not found or already answered",
                    question_id
                ))
            })?;

        entry
            .answer_tx
            .try_send(answer.into())
            .map_err(|_| ServiceError::internal("clarification answer channel full"))?;
        Ok(())
    }

    pub fn pending_permission_ids(&self) -> Vec<String> {
        lock(&self.pending_permissions).keys().cloned().collect()
    }

    pub fn pending_clarification_ids(&self) -> Vec<String> {
        lock(&self.pending_clarifications).keys().cloned().collect()
    }
}
