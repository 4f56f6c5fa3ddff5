//! Error types for the action core.

use crate::approval::ApprovalStatus;
use uuid::Uuid;

/// Errors from registration, authorization and execution of actions.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("Action not found: {0}")]
    NotFound(String),
    #[error("Invalid action definition: {0}")]
    InvalidDefinition(String),
    #[error("Invalid page controller: {0}")]
    InvalidController(String),
    #[error("Page {page_id} exceeds the limit of {limit} actions")]
    ActionLimitExceeded { page_id: String, limit: usize },
    #[error("Parameter validation failed: {}", .0.join(", "))]
    ValidationFailed(Vec<String>),
    #[error("Permission denied for {action_id}: {reason}")]
    PermissionDenied { action_id: String, reason: String },
    #[error("Action {action_id} requires approval workflow {workflow_id} (request {request_id})")]
    ApprovalRequired {
        action_id: String,
        workflow_id: String,
        request_id: Uuid,
    },
    #[error("Action execution timeout after {0} ms")]
    Timeout(u64),
    #[error("Action handler failed: {0}")]
    HandlerFailed(String),
    #[error("External tool error: {0}")]
    ExternalTool(String),
    #[error("Approval error: {0}")]
    Approval(#[from] ApprovalError),
}

/// Errors from the approval state machine.
#[derive(Debug, thiserror::Error)]
pub enum ApprovalError {
    #[error("Approval request not found: {0}")]
    NotFound(Uuid),
    #[error("Unknown approval workflow: {0}")]
    UnknownWorkflow(String),
    #[error("Invalid approval transition: {0} -> {1}")]
    InvalidTransition(ApprovalStatus, ApprovalStatus),
    #[error("User {user_id} cannot approve step {step}")]
    NotAnApprover { user_id: String, step: String },
    #[error("User {0} already decided on this step")]
    DuplicateApproval(String),
    #[error("User {user_id} did not open approval request {request_id}")]
    NotRequester { request_id: Uuid, user_id: String },
    #[error("Approval request {request_id} was issued for {expected}, not {actual}")]
    ActionMismatch {
        request_id: Uuid,
        expected: String,
        actual: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_error_display() {
        let err = ActionError::NotFound("settings.missing".to_string());
        assert_eq!(err.to_string(), "Action not found: settings.missing");

        let err = ActionError::ActionLimitExceeded {
            page_id: "users".to_string(),
            limit: 50,
        };
        assert_eq!(err.to_string(), "Page users exceeds the limit of 50 actions");

        let err = ActionError::Timeout(30_000);
        assert_eq!(err.to_string(), "Action execution timeout after 30000 ms");

        let err = ActionError::HandlerFailed("connection reset".to_string());
        assert_eq!(err.to_string(), "Action handler failed: connection reset");
    }

    #[test]
    fn test_validation_errors_are_joined() {
        let err = ActionError::ValidationFailed(vec![
            "Missing required parameter: key".to_string(),
            "Parameter value must be of type string".to_string(),
        ]);
        assert_eq!(
            err.to_string(),
            "Parameter validation failed: Missing required parameter: key, Parameter value must be of type string"
        );
    }

    #[test]
    fn test_permission_denied_display() {
        let err = ActionError::PermissionDenied {
            action_id: "object-manager.deleteObject".to_string(),
            reason: "Missing required permissions: objects:write".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Permission denied for object-manager.deleteObject: Missing required permissions: objects:write"
        );
    }

    #[test]
    fn test_approval_required_mentions_workflow() {
        let id = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        let err = ActionError::ApprovalRequired {
            action_id: "billing.createInvoice".to_string(),
            workflow_id: "financial-approval".to_string(),
            request_id: id,
        };
        let msg = err.to_string();
        assert!(msg.contains("requires approval workflow financial-approval"));
        assert!(msg.contains("550e8400-e29b-41d4-a716-446655440000"));
    }

    #[test]
    fn test_approval_error_display() {
        let err = ApprovalError::InvalidTransition(ApprovalStatus::Rejected, ApprovalStatus::Approved);
        assert_eq!(err.to_string(), "Invalid approval transition: rejected -> approved");

        let err = ApprovalError::UnknownWorkflow("ghost".to_string());
        assert_eq!(err.to_string(), "Unknown approval workflow: ghost");

        let wrapped: ActionError = ApprovalError::DuplicateApproval("u1".to_string()).into();
        assert!(matches!(wrapped, ActionError::Approval(_)));
    }
}
