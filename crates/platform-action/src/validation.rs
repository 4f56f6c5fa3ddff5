//! Shape validation for action definitions and caller parameters.
//!
//! Definition checks fail fast at registration time. Parameter checks never
//! fail; they collect every violation and leave the decision to the caller.

use serde::Serialize;
use serde_json::Value;

use crate::error::ActionError;
use crate::types::{ActionDefinition, ActionParameter, Params, RuleCheck, ValidationRule};

/// Collected outcome of parameter validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl ValidationResult {
    fn from_errors(errors: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}

/// Stateless validator for definitions and parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct ActionValidationService;

impl ActionValidationService {
    pub fn new() -> Self {
        Self
    }

    /// Check that a definition is complete enough to register.
    pub fn validate_action(&self, action: &ActionDefinition) -> Result<(), ActionError> {
        if action.id.trim().is_empty() {
            return Err(ActionError::InvalidDefinition(
                "Action must have an id".to_string(),
            ));
        }
        if action.name.trim().is_empty() {
            return Err(ActionError::InvalidDefinition(format!(
                "Action {} must have a name",
                action.id
            )));
        }
        if action.description.trim().is_empty() {
            return Err(ActionError::InvalidDefinition(format!(
                "Action {} must have a description",
                action.id
            )));
        }
        if action.executor.is_none() {
            return Err(ActionError::InvalidDefinition(format!(
                "Action {} must have an executor",
                action.id
            )));
        }
        if action.id.contains('.') {
            return Err(ActionError::InvalidDefinition(format!(
                "Action id {} must not contain '.'",
                action.id
            )));
        }
        Ok(())
    }

    /// Check caller parameters against the declared parameter list.
    pub fn validate_action_parameters(
        &self,
        action: &ActionDefinition,
        params: &Params,
    ) -> ValidationResult {
        let mut errors = Vec::new();

        for param in &action.parameters {
            let value = params.get(&param.name).filter(|v| !v.is_null());

            let Some(value) = value else {
                if param.required {
                    errors.push(format!("Missing required parameter: {}", param.name));
                }
                continue;
            };

            if !param.param_type.matches(value) {
                errors.push(format!(
                    "Parameter {} must be of type {}",
                    param.name, param.param_type
                ));
                continue;
            }

            for rule in &param.validation {
                if let Some(error) = check_rule(param, rule, value) {
                    errors.push(error);
                }
            }
        }

        ValidationResult::from_errors(errors)
    }
}

/// Apply one rule. Returns the error message when the rule fails.
fn check_rule(param: &ActionParameter, rule: &ValidationRule, value: &Value) -> Option<String> {
    match rule {
        ValidationRule::Format { pattern, message } => {
            let text = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (!pattern.is_match(&text)).then(|| message.clone())
        }
        ValidationRule::Enum { values, message } => {
            (!values.contains(value)).then(|| message.clone())
        }
        ValidationRule::Range { min, max, message } => {
            let n = value.as_f64()?;
            let below = min.is_some_and(|m| n < m);
            let above = max.is_some_and(|m| n > m);
            (below || above).then(|| message.clone())
        }
        ValidationRule::Custom { check, message } => match check(value) {
            RuleCheck::Pass => None,
            RuleCheck::Fail => Some(message.clone()),
            RuleCheck::FailWith(reason) => {
                tracing::debug!(parameter = %param.name, %reason, "Custom rule rejected value");
                Some(reason)
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ActionCategory, ActionResult, ParameterType};
    use platform_core::types::ActionContext;
    use serde_json::json;

    fn params(value: Value) -> Params {
        value.as_object().cloned().unwrap_or_default()
    }

    fn runnable(id: &str) -> ActionDefinition {
        ActionDefinition::new(id, "Update Setting", "Change a setting", ActionCategory::Data)
            .handler(|_p: Params, _c: ActionContext| async move { Ok(ActionResult::ok(json!(null))) })
    }

    fn setting_action() -> ActionDefinition {
        runnable("updateSetting")
            .parameter(
                ActionParameter::new("key", ParameterType::String, "Setting key")
                    .required()
                    .with_rule(ValidationRule::format("^[a-z_]+$", "key must be snake_case").unwrap()),
            )
            .parameter(ActionParameter::new("value", ParameterType::String, "New value").required())
            .parameter(
                ActionParameter::new("ttl", ParameterType::Number, "Seconds to keep")
                    .with_rule(ValidationRule::range(Some(1.0), Some(3600.0), "ttl out of range")),
            )
            .parameter(
                ActionParameter::new("scope", ParameterType::String, "Where it applies")
                    .with_rule(ValidationRule::one_of(["org", "user"], "scope must be org or user")),
            )
    }

    // ---- validate_action ----

    #[test]
    fn test_valid_action_passes() {
        assert!(ActionValidationService::new()
            .validate_action(&setting_action())
            .is_ok());
    }

    #[test]
    fn test_missing_fields_rejected() {
        let svc = ActionValidationService::new();
        let mut action = runnable("a");
        action.id = String::new();
        assert!(svc.validate_action(&action).is_err());

        let mut action = runnable("a");
        action.name = "  ".to_string();
        let err = svc.validate_action(&action).unwrap_err();
        assert!(err.to_string().contains("must have a name"));

        let mut action = runnable("a");
        action.description = String::new();
        assert!(svc.validate_action(&action).is_err());
    }

    #[test]
    fn test_missing_executor_rejected() {
        let action = ActionDefinition::new("a", "A", "desc", ActionCategory::Ui);
        let err = ActionValidationService::new()
            .validate_action(&action)
            .unwrap_err();
        assert!(err.to_string().contains("executor"));
    }

    #[test]
    fn test_dotted_id_rejected() {
        let action = runnable("bad.id");
        assert!(ActionValidationService::new().validate_action(&action).is_err());
    }

    // ---- validate_action_parameters ----

    #[test]
    fn test_valid_params() {
        let result = ActionValidationService::new().validate_action_parameters(
            &setting_action(),
            &params(json!({"key": "theme", "value": "dark", "ttl": 60, "scope": "org"})),
        );
        assert!(result.valid, "{:?}", result.errors);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn test_missing_required_reported_once() {
        let result = ActionValidationService::new()
            .validate_action_parameters(&setting_action(), &params(json!({"value": "y"})));
        assert!(!result.valid);
        assert_eq!(result.errors, vec!["Missing required parameter: key".to_string()]);
    }

    #[test]
    fn test_null_counts_as_missing() {
        let result = ActionValidationService::new().validate_action_parameters(
            &setting_action(),
            &params(json!({"key": null, "value": "y"})),
        );
        assert_eq!(result.errors, vec!["Missing required parameter: key".to_string()]);
    }

    #[test]
    fn test_type_mismatch_skips_rules() {
        let result = ActionValidationService::new().validate_action_parameters(
            &setting_action(),
            &params(json!({"key": 5, "value": "y"})),
        );
        assert_eq!(
            result.errors,
            vec!["Parameter key must be of type string".to_string()]
        );
    }

    #[test]
    fn test_each_failing_rule_recorded() {
        let result = ActionValidationService::new().validate_action_parameters(
            &setting_action(),
            &params(json!({"key": "Theme", "value": "y", "ttl": 0, "scope": "global"})),
        );
        assert_eq!(
            result.errors,
            vec![
                "key must be snake_case".to_string(),
                "ttl out of range".to_string(),
                "scope must be org or user".to_string(),
            ]
        );
    }

    #[test]
    fn test_optional_absent_is_fine() {
        let result = ActionValidationService::new().validate_action_parameters(
            &setting_action(),
            &params(json!({"key": "a", "value": "b"})),
        );
        assert!(result.valid);
    }

    #[test]
    fn test_custom_rule_messages() {
        let action = runnable("c").parameter(
            ActionParameter::new("name", ParameterType::String, "Name").with_rule(
                ValidationRule::custom(
                    |v| match v.as_str() {
                        Some("") => RuleCheck::Fail,
                        Some(s) if s.len() > 5 => RuleCheck::FailWith(format!("{} is too long", s)),
                        _ => RuleCheck::Pass,
                    },
                    "name must not be empty",
                ),
            ),
        );
        let svc = ActionValidationService::new();

        let r = svc.validate_action_parameters(&action, &params(json!({"name": ""})));
        assert_eq!(r.errors, vec!["name must not be empty".to_string()]);

        let r = svc.validate_action_parameters(&action, &params(json!({"name": "abcdefg"})));
        assert_eq!(r.errors, vec!["abcdefg is too long".to_string()]);

        let r = svc.validate_action_parameters(&action, &params(json!({"name": "abc"})));
        assert!(r.valid);
    }

    #[test]
    fn test_array_and_object_types() {
        let action = runnable("d")
            .parameter(ActionParameter::new("ids", ParameterType::Array, "Ids").required())
            .parameter(ActionParameter::new("filter", ParameterType::Object, "Filter"));
        let svc = ActionValidationService::new();

        let r = svc.validate_action_parameters(&action, &params(json!({"ids": {"0": 1}})));
        assert_eq!(r.errors, vec!["Parameter ids must be of type array".to_string()]);

        let r = svc.validate_action_parameters(&action, &params(json!({"ids": [], "filter": []})));
        assert_eq!(r.errors, vec!["Parameter filter must be of type object".to_string()]);
    }
}
