//! Central authority on who may run an action and which actions need
//! human approval.
//!
//! Denials are reported as data ([`PermissionResult`]) or as events; nothing
//! in this module returns an error for a refused caller.

pub mod roles;
pub mod workflows;

use platform_core::events::{ActionEvent, ActionEventKind};
use platform_core::types::UserContext;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, warn};

use crate::audit::AuditSink;
use crate::emitter::ActionEventEmitter;
use crate::error::ApprovalError;
use crate::types::{ActionDefinition, ActionResult, Params};
use roles::{effective_permissions, grants, wildcard_matches};
use workflows::{builtin_workflow_rules, builtin_workflows, ApprovalWorkflow};

/// Outcome of an authorization check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermissionResult {
    pub allowed: bool,
    pub reason: Option<String>,
    /// The declared permissions none of which the user holds.
    pub missing_permissions: Vec<String>,
}

impl PermissionResult {
    fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
            missing_permissions: Vec::new(),
        }
    }

    fn deny(missing: Vec<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(format!(
                "Missing required permissions: {}",
                missing.join(", ")
            )),
            missing_permissions: missing,
        }
    }
}

/// Permission and approval-workflow manager. One per process.
pub struct PermissionManager {
    emitter: Arc<ActionEventEmitter>,
    audit_sink: Arc<dyn AuditSink>,
    workflows: RwLock<HashMap<String, Arc<ApprovalWorkflow>>>,
    /// (pattern, workflow id), in registration order.
    workflow_rules: RwLock<Vec<(String, String)>>,
}

impl PermissionManager {
    /// Create a manager with the built-in workflows and rules registered.
    pub fn new(emitter: Arc<ActionEventEmitter>, audit_sink: Arc<dyn AuditSink>) -> Self {
        let manager = Self {
            emitter,
            audit_sink,
            workflows: RwLock::new(HashMap::new()),
            workflow_rules: RwLock::new(Vec::new()),
        };
        for workflow in builtin_workflows() {
            manager.register_approval_workflow(workflow);
        }
        for (pattern, workflow_id) in builtin_workflow_rules() {
            if let Err(e) = manager.register_workflow_rule(pattern.as_str(), workflow_id) {
                warn!(%pattern, error = %e, "Skipping built-in approval rule");
            }
        }
        manager
    }

    pub fn emitter(&self) -> &Arc<ActionEventEmitter> {
        &self.emitter
    }

    // ---- authorization ----

    /// Decide whether `user` may run `action`.
    pub fn validate_action_permissions(
        &self,
        action: &ActionDefinition,
        user: &UserContext,
    ) -> PermissionResult {
        if user.is_system_admin() || action.permissions.is_empty() {
            return PermissionResult::allow();
        }

        let held = effective_permissions(user);
        if held.contains("*") {
            return PermissionResult::allow();
        }

        if action.permissions.iter().any(|p| grants(&held, p)) {
            PermissionResult::allow()
        } else {
            debug!(
                action_id = %action.id,
                user_id = %user.user_id,
                "Permission check failed"
            );
            PermissionResult::deny(action.permissions.clone())
        }
    }

    /// Whether `user` holds a single permission.
    pub fn has_permission(&self, user: &UserContext, permission: &str) -> bool {
        user.is_system_admin() || grants(&effective_permissions(user), permission)
    }

    // ---- approval workflows ----

    pub fn register_approval_workflow(&self, workflow: ApprovalWorkflow) {
        self.workflows
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(workflow.id.clone(), Arc::new(workflow));
    }

    /// Map an action-id pattern (exact id or `prefix*`) to a workflow id.
    ///
    /// The workflow must already be registered.
    pub fn register_workflow_rule(
        &self,
        pattern: impl Into<String>,
        workflow_id: impl Into<String>,
    ) -> Result<(), ApprovalError> {
        let workflow_id = workflow_id.into();
        if self.workflow(&workflow_id).is_none() {
            return Err(ApprovalError::UnknownWorkflow(workflow_id));
        }
        self.workflow_rules
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((pattern.into(), workflow_id));
        Ok(())
    }

    pub fn workflow(&self, workflow_id: &str) -> Option<Arc<ApprovalWorkflow>> {
        self.workflows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(workflow_id)
            .cloned()
    }

    pub fn workflow_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .workflows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    /// Workflow gating `action_id`. Exact rules win over wildcard rules;
    /// among wildcards the first registered match wins.
    pub fn get_approval_workflow(&self, action_id: &str) -> Option<Arc<ApprovalWorkflow>> {
        let rules = self
            .workflow_rules
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        let exact = rules.iter().find(|(pattern, _)| pattern == action_id);
        let matched = exact.or_else(|| {
            rules
                .iter()
                .filter(|(pattern, _)| pattern.ends_with('*'))
                .find(|(pattern, _)| wildcard_matches(pattern, action_id))
        });

        let (_, workflow_id) = matched?;
        self.workflow(workflow_id)
    }

    pub fn requires_approval(&self, action_id: &str, user: &UserContext) -> bool {
        let required = self.get_approval_workflow(action_id).is_some();
        if required {
            debug!(%action_id, user_id = %user.user_id, "Action requires approval");
        }
        required
    }

    // ---- audit ----

    /// Record an execution attempt: emit it, then persist it.
    pub async fn audit_action_execution(
        &self,
        action_id: &str,
        params: &Params,
        result: Option<&ActionResult>,
        user: &UserContext,
        error: Option<&str>,
    ) {
        let kind = if error.is_some() {
            ActionEventKind::ActionFailed
        } else {
            ActionEventKind::ActionExecuted
        };

        let mut event = ActionEvent::new(kind, action_id)
            .with_user(user)
            .with_params(Value::Object(params.clone()));
        if let Some(result) = result {
            match serde_json::to_value(result) {
                Ok(value) => event = event.with_result(value),
                Err(e) => warn!(%action_id, error = %e, "Could not serialize result for audit"),
            }
        }
        if let Some(error) = error {
            event = event.with_error(error);
        }

        self.emitter.emit(&event);
        if let Err(e) = self.audit_sink.record(&event).await {
            warn!(%action_id, error = %e, "Audit sink rejected record");
        }
    }

    /// Announce a denial. Never fails.
    pub fn emit_permission_denied(&self, action_id: &str, user: &UserContext, reason: &str) {
        warn!(%action_id, user_id = %user.user_id, %reason, "Permission denied");
        let event = ActionEvent::new(ActionEventKind::PermissionDenied, action_id)
            .with_user(user)
            .with_reason(reason);
        self.emitter.emit(&event);
    }
}
