//! Human approval of gated actions.
//!
//! Requests are opened when the registry meets an action governed by an
//! approval workflow. Approvers advance a request step by step; escalation
//! rules and timeouts are applied by [`ApprovalQueue::check_timeouts`].

pub mod state_machine;

use platform_core::events::{ActionEvent, ActionEventKind};
use platform_core::types::{Timestamp, UserContext};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

use crate::emitter::ActionEventEmitter;
use crate::error::ApprovalError;
use crate::permission::workflows::{ApprovalWorkflow, EscalationAction};
use crate::types::Params;
use state_machine::validate_transition;

/// Lifecycle of an approval request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Escalated,
    Approved,
    Rejected,
    TimedOut,
    Cancelled,
    Executed,
}

impl ApprovalStatus {
    /// Whether approvers can still act on the request.
    pub fn is_open(&self) -> bool {
        matches!(self, ApprovalStatus::Pending | ApprovalStatus::Escalated)
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApprovalStatus::Pending => write!(f, "pending"),
            ApprovalStatus::Escalated => write!(f, "escalated"),
            ApprovalStatus::Approved => write!(f, "approved"),
            ApprovalStatus::Rejected => write!(f, "rejected"),
            ApprovalStatus::TimedOut => write!(f, "timed_out"),
            ApprovalStatus::Cancelled => write!(f, "cancelled"),
            ApprovalStatus::Executed => write!(f, "executed"),
        }
    }
}

/// One approver's vote on one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalDecision {
    pub approver_id: String,
    pub step_id: String,
    pub approved: bool,
    pub comment: Option<String>,
    pub decided_at: Timestamp,
}

/// A request to run a gated action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: Uuid,
    pub workflow_id: String,
    pub action_id: String,
    pub params: Params,
    pub requested_by: UserContext,
    pub status: ApprovalStatus,
    pub current_step: usize,
    pub decisions: Vec<ApprovalDecision>,
    pub escalated_to: Vec<String>,
    /// Indexes into the workflow's escalation rules that already fired.
    pub fired_escalations: Vec<usize>,
    pub created_at: Timestamp,
    pub step_started_at: Timestamp,
    pub resolved_at: Option<Timestamp>,
}

struct Entry {
    request: ApprovalRequest,
    workflow: Arc<ApprovalWorkflow>,
}

impl Entry {
    fn transition(&mut self, to: ApprovalStatus, now: Timestamp) -> Result<(), ApprovalError> {
        validate_transition(self.request.status, to)?;
        self.request.status = to;
        if !to.is_open() {
            self.request.resolved_at = Some(now);
        }
        Ok(())
    }

    fn event(&self, kind: ActionEventKind, reason: Option<&str>) -> ActionEvent {
        let mut event = ActionEvent::new(kind, self.request.action_id.clone())
            .with_user(&self.request.requested_by)
            .with_params(Value::Object(self.request.params.clone()))
            .with_result(json!({
                "requestId": self.request.id,
                "workflowId": self.request.workflow_id,
                "status": self.request.status,
                "escalatedTo": self.request.escalated_to,
            }));
        if let Some(reason) = reason {
            event = event.with_reason(reason);
        }
        event
    }

    fn can_approve(&self, user: &UserContext) -> bool {
        if user.is_system_admin() {
            return true;
        }
        let Some(step) = self.workflow.steps.get(self.request.current_step) else {
            return false;
        };
        let holds = |role: &String| user.roles.contains(role) || user.organization_roles.contains(role);
        step.approver_roles.iter().any(holds) || self.request.escalated_to.iter().any(holds)
    }
}

/// In-memory store of approval requests.
pub struct ApprovalQueue {
    entries: Mutex<Vec<Entry>>,
    emitter: Arc<ActionEventEmitter>,
}

impl ApprovalQueue {
    pub fn new(emitter: Arc<ActionEventEmitter>) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            emitter,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit_all(&self, events: Vec<ActionEvent>) {
        for event in events {
            self.emitter.emit(&event);
        }
    }

    /// Open a request. Starts at the first step whose conditions hold; if no
    /// step applies the request is approved immediately.
    ///
    /// A user asking again for the same call gets their unresolved or
    /// approved request back instead of a new one.
    pub fn submit(
        &self,
        workflow: Arc<ApprovalWorkflow>,
        action_id: &str,
        params: Params,
        user: &UserContext,
    ) -> ApprovalRequest {
        if let Some(existing) = self.lock().iter().find(|e| {
            let r = &e.request;
            (r.status.is_open() || r.status == ApprovalStatus::Approved)
                && r.workflow_id == workflow.id
                && r.action_id == action_id
                && r.requested_by.user_id == user.user_id
                && r.params == params
        }) {
            tracing::debug!(
                request_id = %existing.request.id,
                action_id = %action_id,
                "Reusing approval request"
            );
            return existing.request.clone();
        }

        let now = Timestamp::now();
        let first_step = workflow.next_applicable_step(0, &params);

        let mut entry = Entry {
            request: ApprovalRequest {
                id: Uuid::new_v4(),
                workflow_id: workflow.id.clone(),
                action_id: action_id.to_string(),
                params,
                requested_by: user.clone(),
                status: ApprovalStatus::Pending,
                current_step: first_step.unwrap_or(0),
                decisions: Vec::new(),
                escalated_to: Vec::new(),
                fired_escalations: Vec::new(),
                created_at: now,
                step_started_at: now,
                resolved_at: None,
            },
            workflow,
        };

        let mut events = vec![entry.event(ActionEventKind::ApprovalRequested, None)];
        if first_step.is_none() {
            // Pending -> Approved is always valid.
            let _ = entry.transition(ApprovalStatus::Approved, now);
            events.push(entry.event(
                ActionEventKind::ApprovalResolved,
                Some("no approval step applies"),
            ));
        }

        tracing::info!(
            request_id = %entry.request.id,
            action_id = %action_id,
            workflow_id = %entry.request.workflow_id,
            "Approval requested"
        );

        let request = entry.request.clone();
        self.lock().push(entry);
        self.emit_all(events);
        request
    }

    pub fn get(&self, id: Uuid) -> Result<ApprovalRequest, ApprovalError> {
        self.lock()
            .iter()
            .find(|e| e.request.id == id)
            .map(|e| e.request.clone())
            .ok_or(ApprovalError::NotFound(id))
    }

    /// Requests, newest first, optionally filtered by status.
    pub fn list(&self, status: Option<ApprovalStatus>) -> Vec<ApprovalRequest> {
        let mut result: Vec<ApprovalRequest> = self
            .lock()
            .iter()
            .filter(|e| status.map_or(true, |s| e.request.status == s))
            .map(|e| e.request.clone())
            .collect();
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        result
    }

    pub fn pending_count(&self) -> usize {
        self.lock()
            .iter()
            .filter(|e| e.request.status.is_open())
            .count()
    }

    /// Record an approval for the current step, advancing when it has enough.
    pub fn approve(
        &self,
        id: Uuid,
        approver: &UserContext,
        comment: Option<String>,
    ) -> Result<ApprovalRequest, ApprovalError> {
        let now = Timestamp::now();
        let mut events = Vec::new();

        let request = {
            let mut entries = self.lock();
            let entry = entries
                .iter_mut()
                .find(|e| e.request.id == id)
                .ok_or(ApprovalError::NotFound(id))?;

            if !entry.request.status.is_open() {
                return Err(ApprovalError::InvalidTransition(
                    entry.request.status,
                    ApprovalStatus::Approved,
                ));
            }

            let step = entry.workflow.steps[entry.request.current_step].clone();
            if !entry.can_approve(approver) {
                return Err(ApprovalError::NotAnApprover {
                    user_id: approver.user_id.clone(),
                    step: step.id,
                });
            }
            if entry
                .request
                .decisions
                .iter()
                .any(|d| d.step_id == step.id && d.approver_id == approver.user_id)
            {
                return Err(ApprovalError::DuplicateApproval(approver.user_id.clone()));
            }

            entry.request.decisions.push(ApprovalDecision {
                approver_id: approver.user_id.clone(),
                step_id: step.id.clone(),
                approved: true,
                comment,
                decided_at: now,
            });

            let approvals = entry
                .request
                .decisions
                .iter()
                .filter(|d| d.step_id == step.id && d.approved)
                .count() as u32;

            if approvals >= step.required_approvals.max(1) {
                let next = entry
                    .workflow
                    .next_applicable_step(entry.request.current_step + 1, &entry.request.params);
                match next {
                    Some(index) => {
                        tracing::debug!(request_id = %id, step = index, "Approval advanced to next step");
                        entry.request.current_step = index;
                        entry.request.step_started_at = now;
                    }
                    None => {
                        entry.transition(ApprovalStatus::Approved, now)?;
                        events.push(entry.event(ActionEventKind::ApprovalResolved, None));
                    }
                }
            }
            entry.request.clone()
        };

        self.emit_all(events);
        Ok(request)
    }

    /// Reject the request outright.
    pub fn reject(
        &self,
        id: Uuid,
        approver: &UserContext,
        reason: impl Into<String>,
    ) -> Result<ApprovalRequest, ApprovalError> {
        let now = Timestamp::now();
        let reason = reason.into();

        let (request, event) = {
            let mut entries = self.lock();
            let entry = entries
                .iter_mut()
                .find(|e| e.request.id == id)
                .ok_or(ApprovalError::NotFound(id))?;

            if entry.request.status.is_open() && !entry.can_approve(approver) {
                let step = entry
                    .workflow
                    .steps
                    .get(entry.request.current_step)
                    .map(|s| s.id.clone())
                    .unwrap_or_default();
                return Err(ApprovalError::NotAnApprover {
                    user_id: approver.user_id.clone(),
                    step,
                });
            }
            entry.transition(ApprovalStatus::Rejected, now)?;

            let step_id = entry
                .workflow
                .steps
                .get(entry.request.current_step)
                .map(|s| s.id.clone())
                .unwrap_or_default();
            entry.request.decisions.push(ApprovalDecision {
                approver_id: approver.user_id.clone(),
                step_id,
                approved: false,
                comment: Some(reason.clone()),
                decided_at: now,
            });
            (
                entry.request.clone(),
                entry.event(ActionEventKind::ApprovalResolved, Some(reason.as_str())),
            )
        };

        self.emitter.emit(&event);
        Ok(request)
    }

    /// Withdraw an open request.
    pub fn cancel(&self, id: Uuid) -> Result<ApprovalRequest, ApprovalError> {
        let now = Timestamp::now();
        let (request, event) = {
            let mut entries = self.lock();
            let entry = entries
                .iter_mut()
                .find(|e| e.request.id == id)
                .ok_or(ApprovalError::NotFound(id))?;
            entry.transition(ApprovalStatus::Cancelled, now)?;
            (
                entry.request.clone(),
                entry.event(ActionEventKind::ApprovalResolved, Some("cancelled")),
            )
        };
        self.emitter.emit(&event);
        Ok(request)
    }

    /// Consume an approved request for `action_id`.
    ///
    /// Only the requester, or a system administrator, may consume it.
    pub fn mark_executed(
        &self,
        id: Uuid,
        action_id: &str,
        caller: &UserContext,
    ) -> Result<ApprovalRequest, ApprovalError> {
        let mut entries = self.lock();
        let entry = entries
            .iter_mut()
            .find(|e| e.request.id == id)
            .ok_or(ApprovalError::NotFound(id))?;
        if entry.request.action_id != action_id {
            return Err(ApprovalError::ActionMismatch {
                request_id: id,
                expected: entry.request.action_id.clone(),
                actual: action_id.to_string(),
            });
        }
        if caller.user_id != entry.request.requested_by.user_id && !caller.is_system_admin() {
            tracing::warn!(
                request_id = %id,
                requested_by = %entry.request.requested_by.user_id,
                caller = %caller.user_id,
                "Approved request claimed by another user"
            );
            return Err(ApprovalError::NotRequester {
                request_id: id,
                user_id: caller.user_id.clone(),
            });
        }
        entry.transition(ApprovalStatus::Executed, Timestamp::now())?;
        Ok(entry.request.clone())
    }

    /// Drop rejected, timed out, cancelled and executed requests resolved
    /// before `before`. Returns how many were removed.
    pub fn purge_resolved(&self, before: Timestamp) -> usize {
        let mut entries = self.lock();
        let len = entries.len();
        entries.retain(|e| {
            let r = &e.request;
            r.status.is_open()
                || r.status == ApprovalStatus::Approved
                || r.resolved_at.unwrap_or(r.created_at) >= before
        });
        let removed = len - entries.len();
        if removed > 0 {
            tracing::debug!(removed, "Purged resolved approval requests");
        }
        removed
    }

    /// Apply escalation rules and timeouts as of `now`.
    ///
    /// Escalation rules are evaluated before timeouts, each firing at most
    /// once per request. Returns the requests whose state changed.
    pub fn check_timeouts(&self, now: Timestamp) -> Vec<ApprovalRequest> {
        let mut changed = Vec::new();
        let mut events = Vec::new();

        {
            let mut entries = self.lock();
            for entry in entries.iter_mut().filter(|e| e.request.status.is_open()) {
                let before = entry.request.clone();
                let elapsed = entry.request.created_at.minutes_until(now);

                let mut rules: Vec<(usize, _)> =
                    entry.workflow.escalation.iter().cloned().enumerate().collect();
                rules.sort_by_key(|(_, rule)| rule.trigger_after_minutes);

                for (index, rule) in rules {
                    if !entry.request.status.is_open() {
                        break;
                    }
                    if entry.request.fired_escalations.contains(&index)
                        || elapsed < rule.trigger_after_minutes
                    {
                        continue;
                    }
                    entry.request.fired_escalations.push(index);
                    tracing::warn!(
                        request_id = %entry.request.id,
                        action = %rule.action,
                        message = %rule.message,
                        "Approval escalation fired"
                    );

                    match rule.action {
                        EscalationAction::Notify => {
                            if entry.request.status == ApprovalStatus::Pending {
                                let _ = entry.transition(ApprovalStatus::Escalated, now);
                            }
                            for role in &rule.escalate_to {
                                if !entry.request.escalated_to.contains(role) {
                                    entry.request.escalated_to.push(role.clone());
                                }
                            }
                            events.push(
                                entry.event(ActionEventKind::ApprovalRequested, Some(rule.message.as_str())),
                            );
                        }
                        EscalationAction::AutoApprove => {
                            if entry.transition(ApprovalStatus::Approved, now).is_ok() {
                                events.push(entry.event(
                                    ActionEventKind::ApprovalResolved,
                                    Some(rule.message.as_str()),
                                ));
                            }
                        }
                        EscalationAction::AutoReject => {
                            if entry.transition(ApprovalStatus::Rejected, now).is_ok() {
                                events.push(entry.event(
                                    ActionEventKind::ApprovalResolved,
                                    Some(rule.message.as_str()),
                                ));
                            }
                        }
                    }
                }

                if entry.request.status.is_open() {
                    let step_expired = entry
                        .workflow
                        .steps
                        .get(entry.request.current_step)
                        .is_some_and(|step| {
                            entry.request.step_started_at.minutes_until(now) >= step.timeout_minutes
                        });
                    if elapsed >= entry.workflow.timeout_minutes || step_expired {
                        if entry.transition(ApprovalStatus::TimedOut, now).is_ok() {
                            events.push(entry.event(
                                ActionEventKind::ApprovalResolved,
                                Some("approval timed out"),
                            ));
                        }
                    }
                }

                if entry.request != before {
                    changed.push(entry.request.clone());
                }
            }
        }

        self.emit_all(events);
        changed
    }
}
