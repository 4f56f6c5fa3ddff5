use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::types::{Timestamp, UserContext};

/// Lifecycle events emitted by the action registry and permission manager.
///
/// Consumed by:
/// - The audit sink (append-only record of every execution attempt)
/// - Telemetry or UI listeners attached to the event emitter
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ActionEventKind {
    /// An action was added to the action index.
    ActionRegistered,
    /// An action body ran to completion.
    ActionExecuted,
    /// An execution attempt failed anywhere between lookup and the action body.
    ActionFailed,
    /// A caller lacked the permissions an action requires.
    PermissionDenied,
    /// An approval request was opened for a gated action.
    ApprovalRequested,
    /// An approval request reached a terminal state.
    ApprovalResolved,
}

impl ActionEventKind {
    /// Returns a stable event name for logging and audit records.
    pub fn event_name(&self) -> &'static str {
        match self {
            ActionEventKind::ActionRegistered => "action_registered",
            ActionEventKind::ActionExecuted => "action_executed",
            ActionEventKind::ActionFailed => "action_failed",
            ActionEventKind::PermissionDenied => "permission_denied",
            ActionEventKind::ApprovalRequested => "approval_requested",
            ActionEventKind::ApprovalResolved => "approval_resolved",
        }
    }
}

impl std::fmt::Display for ActionEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.event_name())
    }
}

/// A single lifecycle event about one action id.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActionEvent {
    pub id: Uuid,
    pub kind: ActionEventKind,
    /// Full `pageId.actionId`.
    pub action_id: String,
    pub user_id: Option<String>,
    #[serde(default)]
    pub user_roles: Vec<String>,
    pub organization_id: Option<String>,
    pub params: Option<Value>,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub reason: Option<String>,
    pub timestamp: Timestamp,
}

impl ActionEvent {
    pub fn new(kind: ActionEventKind, action_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            action_id: action_id.into(),
            user_id: None,
            user_roles: Vec::new(),
            organization_id: None,
            params: None,
            result: None,
            error: None,
            reason: None,
            timestamp: Timestamp::now(),
        }
    }

    /// Attach the caller's identity (id, roles, organization).
    pub fn with_user(mut self, user: &UserContext) -> Self {
        self.user_id = Some(user.user_id.clone());
        self.user_roles = user.roles.clone();
        self.organization_id = user.organization_id.clone();
        self
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = Some(params);
        self
    }

    pub fn with_result(mut self, result: Value) -> Self {
        self.result = Some(result);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn event_name(&self) -> &'static str {
        self.kind.event_name()
    }
}
