//! Approval workflow schema and the workflows shipped at startup.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::types::Params;

/// Comparison used by a step condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Gt,
    Gte,
    Lt,
    Lte,
    Eq,
    Ne,
}

/// Predicate on one field of the gated action's parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepCondition {
    pub field: String,
    pub operator: ConditionOperator,
    pub value: Value,
}

impl StepCondition {
    pub fn new(field: impl Into<String>, operator: ConditionOperator, value: Value) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }

    /// A missing field never satisfies the condition.
    pub fn evaluate(&self, params: &Params) -> bool {
        let Some(actual) = params.get(&self.field) else {
            return false;
        };
        let numeric = |cmp: fn(f64, f64) -> bool| match (actual.as_f64(), self.value.as_f64()) {
            (Some(a), Some(b)) => cmp(a, b),
            _ => false,
        };
        match self.operator {
            ConditionOperator::Eq => actual == &self.value,
            ConditionOperator::Ne => actual != &self.value,
            ConditionOperator::Gt => numeric(|a, b| a > b),
            ConditionOperator::Gte => numeric(|a, b| a >= b),
            ConditionOperator::Lt => numeric(|a, b| a < b),
            ConditionOperator::Lte => numeric(|a, b| a <= b),
        }
    }
}

/// One approval stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalStep {
    pub id: String,
    pub name: String,
    pub approver_roles: Vec<String>,
    pub required_approvals: u32,
    pub timeout_minutes: u64,
    /// All must hold for the step to apply. Empty means always.
    #[serde(default)]
    pub conditions: Vec<StepCondition>,
}

impl ApprovalStep {
    pub fn applies_to(&self, params: &Params) -> bool {
        self.conditions.iter().all(|c| c.evaluate(params))
    }
}

/// What happens when an escalation rule fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationAction {
    Notify,
    AutoApprove,
    AutoReject,
}

impl fmt::Display for EscalationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EscalationAction::Notify => write!(f, "notify"),
            EscalationAction::AutoApprove => write!(f, "auto_approve"),
            EscalationAction::AutoReject => write!(f, "auto_reject"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationRule {
    pub trigger_after_minutes: u64,
    pub escalate_to: Vec<String>,
    pub action: EscalationAction,
    pub message: String,
}

/// A multi-step human approval process gating an action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalWorkflow {
    pub id: String,
    pub name: String,
    pub description: String,
    pub steps: Vec<ApprovalStep>,
    pub timeout_minutes: u64,
    #[serde(default)]
    pub escalation: Vec<EscalationRule>,
}

impl ApprovalWorkflow {
    /// Index of the first step at or after `from` that applies to `params`.
    pub fn next_applicable_step(&self, from: usize, params: &Params) -> Option<usize> {
        self.steps
            .iter()
            .enumerate()
            .skip(from)
            .find(|(_, step)| step.applies_to(params))
            .map(|(i, _)| i)
    }
}

fn roles(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

/// The four workflows registered with every permission manager.
pub fn builtin_workflows() -> Vec<ApprovalWorkflow> {
    vec![
        ApprovalWorkflow {
            id: "system-admin-approval".to_string(),
            name: "System Administration Approval".to_string(),
            description: "Platform-wide operations reviewed by a system administrator"
                .to_string(),
            steps: vec![ApprovalStep {
                id: "system-admin-review".to_string(),
                name: "System administrator review".to_string(),
                approver_roles: roles(&["system-admin"]),
                required_approvals: 1,
                timeout_minutes: 60,
                conditions: Vec::new(),
            }],
            timeout_minutes: 240,
            escalation: vec![EscalationRule {
                trigger_after_minutes: 30,
                escalate_to: roles(&["system-admin"]),
                action: EscalationAction::Notify,
                message: "System operation awaiting approval".to_string(),
            }],
        },
        ApprovalWorkflow {
            id: "organization-admin-approval".to_string(),
            name: "Organization Administration Approval".to_string(),
            description: "Destructive organization changes reviewed by an organization admin"
                .to_string(),
            steps: vec![ApprovalStep {
                id: "org-admin-review".to_string(),
                name: "Organization administrator review".to_string(),
                approver_roles: roles(&["organization-admin"]),
                required_approvals: 1,
                timeout_minutes: 720,
                conditions: Vec::new(),
            }],
            timeout_minutes: 1440,
            escalation: vec![
                EscalationRule {
                    trigger_after_minutes: 240,
                    escalate_to: roles(&["system-admin"]),
                    action: EscalationAction::Notify,
                    message: "Organization change pending for four hours".to_string(),
                },
                EscalationRule {
                    trigger_after_minutes: 1440,
                    escalate_to: Vec::new(),
                    action: EscalationAction::AutoReject,
                    message: "Organization change not approved within a day".to_string(),
                },
            ],
        },
        ApprovalWorkflow {
            id: "financial-approval".to_string(),
            name: "Financial Approval".to_string(),
            description: "Billing operations; large amounts also need a security review"
                .to_string(),
            steps: vec![
                ApprovalStep {
                    id: "finance-review".to_string(),
                    name: "Finance review".to_string(),
                    approver_roles: roles(&["finance-manager", "organization-admin"]),
                    required_approvals: 1,
                    timeout_minutes: 480,
                    conditions: Vec::new(),
                },
                ApprovalStep {
                    id: "security-review".to_string(),
                    name: "Security review".to_string(),
                    approver_roles: roles(&["security-officer", "system-admin"]),
                    required_approvals: 1,
                    timeout_minutes: 480,
                    conditions: vec![StepCondition::new(
                        "amount",
                        ConditionOperator::Gt,
                        Value::from(10_000),
                    )],
                },
            ],
            timeout_minutes: 2880,
            escalation: vec![
                EscalationRule {
                    trigger_after_minutes: 720,
                    escalate_to: roles(&["organization-admin"]),
                    action: EscalationAction::Notify,
                    message: "Financial request pending for twelve hours".to_string(),
                },
                EscalationRule {
                    trigger_after_minutes: 2880,
                    escalate_to: Vec::new(),
                    action: EscalationAction::AutoReject,
                    message: "Financial request expired".to_string(),
                },
            ],
        },
        ApprovalWorkflow {
            id: "wallet-creation-approval".to_string(),
            name: "Wallet Creation Approval".to_string(),
            description: "New custodial wallets reviewed by an organization admin".to_string(),
            steps: vec![ApprovalStep {
                id: "wallet-review".to_string(),
                name: "Wallet review".to_string(),
                approver_roles: roles(&["organization-admin", "system-admin"]),
                required_approvals: 1,
                timeout_minutes: 120,
                conditions: Vec::new(),
            }],
            timeout_minutes: 480,
            escalation: vec![
                EscalationRule {
                    trigger_after_minutes: 60,
                    escalate_to: roles(&["system-admin"]),
                    action: EscalationAction::Notify,
                    message: "Wallet creation awaiting review".to_string(),
                },
                EscalationRule {
                    trigger_after_minutes: 480,
                    escalate_to: Vec::new(),
                    action: EscalationAction::AutoReject,
                    message: "Wallet creation not reviewed in time".to_string(),
                },
            ],
        },
    ]
}

/// Action-id patterns mapped to workflow ids. Exact ids win over wildcards.
pub fn builtin_workflow_rules() -> Vec<(String, String)> {
    [
        ("system.*", "system-admin-approval"),
        ("organization.delete", "organization-admin-approval"),
        ("organization.transferOwnership", "organization-admin-approval"),
        ("users.deleteUser", "organization-admin-approval"),
        ("billing.*", "financial-approval"),
        ("wallet.createWallet", "wallet-creation-approval"),
    ]
    .into_iter()
    .map(|(p, w)| (p.to_string(), w.to_string()))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> Params {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_four_builtin_workflows() {
        let ids: Vec<String> = builtin_workflows().into_iter().map(|w| w.id).collect();
        assert_eq!(
            ids,
            vec![
                "system-admin-approval",
                "organization-admin-approval",
                "financial-approval",
                "wallet-creation-approval",
            ]
        );
    }

    #[test]
    fn test_every_rule_points_at_a_builtin() {
        let workflows = builtin_workflows();
        for (_, workflow_id) in builtin_workflow_rules() {
            assert!(workflows.iter().any(|w| w.id == workflow_id));
        }
    }

    #[test]
    fn test_condition_numeric_comparisons() {
        let cond = StepCondition::new("amount", ConditionOperator::Gt, json!(10_000));
        assert!(cond.evaluate(&params(json!({"amount": 10_001}))));
        assert!(!cond.evaluate(&params(json!({"amount": 10_000}))));
        assert!(!cond.evaluate(&params(json!({"amount": "lots"}))));
        assert!(!cond.evaluate(&params(json!({}))));

        let cond = StepCondition::new("amount", ConditionOperator::Lte, json!(5));
        assert!(cond.evaluate(&params(json!({"amount": 5.0}))));
    }

    #[test]
    fn test_condition_equality() {
        let cond = StepCondition::new("currency", ConditionOperator::Eq, json!("EUR"));
        assert!(cond.evaluate(&params(json!({"currency": "EUR"}))));
        let cond = StepCondition::new("currency", ConditionOperator::Ne, json!("EUR"));
        assert!(cond.evaluate(&params(json!({"currency": "USD"}))));
    }

    #[test]
    fn test_financial_security_step_is_conditional() {
        let financial = builtin_workflows()
            .into_iter()
            .find(|w| w.id == "financial-approval")
            .unwrap();
        let small = params(json!({"amount": 500}));
        let large = params(json!({"amount": 25_000}));

        assert_eq!(financial.next_applicable_step(0, &small), Some(0));
        assert_eq!(financial.next_applicable_step(1, &small), None);
        assert_eq!(financial.next_applicable_step(1, &large), Some(1));
    }

    #[test]
    fn test_workflow_roundtrips_through_json() {
        let workflow = builtin_workflows().remove(2);
        let json = serde_json::to_string(&workflow).unwrap();
        let back: ApprovalWorkflow = serde_json::from_str(&json).unwrap();
        assert_eq!(back, workflow);
        assert!(json.contains("\"auto_reject\""));
    }
}
