//! Action and page contracts shared by every component of the action core.
//!
//! Defines action definitions, their parameters and validation rules, page
//! controllers, and the uniform result type returned by every execution.

use platform_core::types::{ActionContext, PageContext, Timestamp};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::error::ActionError;
use crate::executor::{executor_fn, ActionExecutor};

/// Caller-supplied action parameters, keyed by parameter name.
pub type Params = Map<String, Value>;

// =============================================================================
// Enums
// =============================================================================

/// Fixed set of action categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionCategory {
    Navigation,
    Data,
    Ui,
    External,
}

impl ActionCategory {
    pub const ALL: [ActionCategory; 4] = [
        ActionCategory::Navigation,
        ActionCategory::Data,
        ActionCategory::Ui,
        ActionCategory::External,
    ];
}

impl fmt::Display for ActionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionCategory::Navigation => write!(f, "navigation"),
            ActionCategory::Data => write!(f, "data"),
            ActionCategory::Ui => write!(f, "ui"),
            ActionCategory::External => write!(f, "external"),
        }
    }
}

impl std::str::FromStr for ActionCategory {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "navigation" => Ok(ActionCategory::Navigation),
            "data" => Ok(ActionCategory::Data),
            "ui" => Ok(ActionCategory::Ui),
            "external" => Ok(ActionCategory::External),
            _ => Err(format!("Unknown action category: {}", s)),
        }
    }
}

/// Declared runtime type of an action parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterType {
    String,
    Number,
    Boolean,
    Object,
    Array,
}

impl ParameterType {
    /// Whether `value` has this runtime type. Objects never match arrays.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            ParameterType::String => value.is_string(),
            ParameterType::Number => value.is_number(),
            ParameterType::Boolean => value.is_boolean(),
            ParameterType::Object => value.is_object(),
            ParameterType::Array => value.is_array(),
        }
    }

    /// JSON-schema type name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterType::String => "string",
            ParameterType::Number => "number",
            ParameterType::Boolean => "boolean",
            ParameterType::Object => "object",
            ParameterType::Array => "array",
        }
    }
}

impl fmt::Display for ParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ParameterType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "string" => Ok(ParameterType::String),
            "number" => Ok(ParameterType::Number),
            "boolean" => Ok(ParameterType::Boolean),
            "object" => Ok(ParameterType::Object),
            "array" => Ok(ParameterType::Array),
            _ => Err(format!("Unknown parameter type: {}", s)),
        }
    }
}

// =============================================================================
// Validation rules
// =============================================================================

/// Outcome of a custom validation predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleCheck {
    Pass,
    /// Failed; report the rule's own message.
    Fail,
    /// Failed; report this message instead.
    FailWith(String),
}

type CustomCheck = Arc<dyn Fn(&Value) -> RuleCheck + Send + Sync>;

/// A single validation rule attached to a parameter.
#[derive(Clone)]
pub enum ValidationRule {
    Format { pattern: Regex, message: String },
    Enum { values: Vec<Value>, message: String },
    Range {
        min: Option<f64>,
        max: Option<f64>,
        message: String,
    },
    Custom { check: CustomCheck, message: String },
}

impl ValidationRule {
    /// Regex rule. Fails at definition time if the pattern does not compile.
    pub fn format(pattern: &str, message: impl Into<String>) -> Result<Self, ActionError> {
        let pattern = Regex::new(pattern)
            .map_err(|e| ActionError::InvalidDefinition(format!("bad format pattern: {}", e)))?;
        Ok(ValidationRule::Format {
            pattern,
            message: message.into(),
        })
    }

    pub fn one_of<I, V>(values: I, message: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        ValidationRule::Enum {
            values: values.into_iter().map(Into::into).collect(),
            message: message.into(),
        }
    }

    pub fn range(min: Option<f64>, max: Option<f64>, message: impl Into<String>) -> Self {
        ValidationRule::Range {
            min,
            max,
            message: message.into(),
        }
    }

    pub fn custom<F>(check: F, message: impl Into<String>) -> Self
    where
        F: Fn(&Value) -> RuleCheck + Send + Sync + 'static,
    {
        ValidationRule::Custom {
            check: Arc::new(check),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ValidationRule::Format { .. } => "format",
            ValidationRule::Enum { .. } => "enum",
            ValidationRule::Range { .. } => "range",
            ValidationRule::Custom { .. } => "custom",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ValidationRule::Format { message, .. }
            | ValidationRule::Enum { message, .. }
            | ValidationRule::Range { message, .. }
            | ValidationRule::Custom { message, .. } => message,
        }
    }
}

impl fmt::Debug for ValidationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationRule::Format { pattern, message } => f
                .debug_struct("Format")
                .field("pattern", &pattern.as_str())
                .field("message", message)
                .finish(),
            ValidationRule::Enum { values, message } => f
                .debug_struct("Enum")
                .field("values", values)
                .field("message", message)
                .finish(),
            ValidationRule::Range { min, max, message } => f
                .debug_struct("Range")
                .field("min", min)
                .field("max", max)
                .field("message", message)
                .finish(),
            ValidationRule::Custom { message, .. } => f
                .debug_struct("Custom")
                .field("message", message)
                .finish_non_exhaustive(),
        }
    }
}

// =============================================================================
// Action definitions
// =============================================================================

/// A declared parameter of an action. Immutable once the action is registered.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParameterType,
    pub required: bool,
    pub description: String,
    #[serde(skip)]
    pub validation: Vec<ValidationRule>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<Value>,
}

impl ActionParameter {
    pub fn new(
        name: impl Into<String>,
        param_type: ParameterType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            param_type,
            required: false,
            description: description.into(),
            validation: Vec::new(),
            default_value: None,
            examples: Vec::new(),
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_rule(mut self, rule: ValidationRule) -> Self {
        self.validation.push(rule);
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn with_example(mut self, value: impl Into<Value>) -> Self {
        self.examples.push(value.into());
        self
    }
}

/// A worked example of how to call an action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionExample {
    pub description: String,
    pub params: Value,
}

/// Optional descriptive metadata used by discovery and the AI bridge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionMetadata {
    pub tags: Vec<String>,
    pub examples: Vec<ActionExample>,
    pub related_actions: Vec<String>,
    pub version: Option<String>,
    pub deprecated: bool,
    pub deprecation_message: Option<String>,
}

/// A single named, permissioned, parameterized operation owned by a page.
#[derive(Clone)]
pub struct ActionDefinition {
    /// Unique within the owning page.
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: ActionCategory,
    /// Any one suffices. Empty means no permission is required.
    pub permissions: Vec<String>,
    pub parameters: Vec<ActionParameter>,
    pub executor: Option<Arc<dyn ActionExecutor>>,
    pub metadata: ActionMetadata,
}

impl ActionDefinition {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        category: ActionCategory,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            category,
            permissions: Vec::new(),
            parameters: Vec::new(),
            executor: None,
            metadata: ActionMetadata::default(),
        }
    }

    pub fn permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions.push(permission.into());
        self
    }

    pub fn parameter(mut self, parameter: ActionParameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn executor(mut self, executor: Arc<dyn ActionExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Attach an async closure as the executor.
    pub fn handler<F, Fut>(self, f: F) -> Self
    where
        F: Fn(Params, ActionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ActionResult, ActionError>> + Send + 'static,
    {
        self.executor(executor_fn(f))
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.metadata.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn example(mut self, description: impl Into<String>, params: Value) -> Self {
        self.metadata.examples.push(ActionExample {
            description: description.into(),
            params,
        });
        self
    }

    pub fn related(mut self, action_id: impl Into<String>) -> Self {
        self.metadata.related_actions.push(action_id.into());
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.metadata.version = Some(version.into());
        self
    }

    pub fn deprecated(mut self, message: impl Into<String>) -> Self {
        self.metadata.deprecated = true;
        self.metadata.deprecation_message = Some(message.into());
        self
    }

    pub fn required_parameters(&self) -> impl Iterator<Item = &ActionParameter> {
        self.parameters.iter().filter(|p| p.required)
    }
}

impl fmt::Debug for ActionDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionDefinition")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("category", &self.category)
            .field("permissions", &self.permissions)
            .field("parameters", &self.parameters)
            .field("has_executor", &self.executor.is_some())
            .field("metadata", &self.metadata)
            .finish()
    }
}

// =============================================================================
// Page controllers
// =============================================================================

/// Descriptive metadata of a page controller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControllerMetadata {
    pub category: String,
    pub tags: Vec<String>,
    pub permissions: Vec<String>,
    pub version: String,
}

/// A named group of related actions sharing a default page context.
#[derive(Debug, Clone)]
pub struct PageController {
    /// Global unique key.
    pub page_id: String,
    pub page_name: String,
    pub description: String,
    pub actions: HashMap<String, Arc<ActionDefinition>>,
    pub context: PageContext,
    pub metadata: ControllerMetadata,
    pub is_active: bool,
    pub registered_at: Timestamp,
}

impl PageController {
    pub fn new(
        page_id: impl Into<String>,
        page_name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        let page_id = page_id.into();
        Self {
            context: PageContext::for_page(page_id.clone()),
            page_id,
            page_name: page_name.into(),
            description: description.into(),
            actions: HashMap::new(),
            metadata: ControllerMetadata::default(),
            is_active: true,
            registered_at: Timestamp::now(),
        }
    }

    /// Add an action, replacing any previous action with the same id.
    pub fn with_action(mut self, action: ActionDefinition) -> Self {
        self.actions.insert(action.id.clone(), Arc::new(action));
        self
    }

    pub fn with_metadata(mut self, metadata: ControllerMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_context(mut self, context: PageContext) -> Self {
        self.context = context;
        self
    }

    pub fn action_count(&self) -> usize {
        self.actions.len()
    }

    /// `pageId.actionId` for one of this page's actions.
    pub fn full_action_id(&self, action_id: &str) -> String {
        format!("{}.{}", self.page_id, action_id)
    }
}

// =============================================================================
// Results
// =============================================================================

/// Execution metadata attached to a result by the registry and AI bridge.
///
/// Fields the caller put in `extra` are preserved; the named fields always
/// carry the wrapper's values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(rename = "executedByAI", skip_serializing_if = "Option::is_none")]
    pub executed_by_ai: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_execution_timestamp: Option<Timestamp>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Uniform result of an action execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ResultMetadata>,
}

impl ActionResult {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            ..Self::default()
        }
    }

    pub fn ok_with_message(data: Value, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }

    /// A copy of this result with `metadata` merged over the existing metadata.
    pub fn with_metadata(&self, metadata: ResultMetadata) -> Self {
        let mut merged = self.metadata.clone().unwrap_or_default();
        for (key, value) in metadata.extra {
            merged.extra.insert(key, value);
        }
        if metadata.execution_time.is_some() {
            merged.execution_time = metadata.execution_time;
        }
        if metadata.timestamp.is_some() {
            merged.timestamp = metadata.timestamp;
        }
        if metadata.action_id.is_some() {
            merged.action_id = metadata.action_id;
        }
        if metadata.user_id.is_some() {
            merged.user_id = metadata.user_id;
        }
        if metadata.executed_by_ai.is_some() {
            merged.executed_by_ai = metadata.executed_by_ai;
        }
        if metadata.ai_execution_timestamp.is_some() {
            merged.ai_execution_timestamp = metadata.ai_execution_timestamp;
        }
        Self {
            metadata: Some(merged),
            ..self.clone()
        }
    }
}
