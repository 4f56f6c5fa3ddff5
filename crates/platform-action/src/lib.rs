//! Action core for the Platform console.
//!
//! Page controllers register named, permissioned, parameterized actions into
//! the [`ControllerRegistry`], which validates, authorizes, executes and audits
//! every call. The [`AiActionBridge`] exposes the same index to an AI agent as
//! JSON-schema tool definitions.

pub mod ai_bridge;
pub mod approval;
pub mod audit;
pub mod discovery;
pub mod emitter;
pub mod error;
pub mod executor;
pub mod permission;
pub mod registry;
pub mod types;
pub mod validation;

pub use ai_bridge::{AiActionBridge, ExternalTool, ExternalToolSource, ToolDefinition, ToolSource};
pub use approval::{ApprovalDecision, ApprovalQueue, ApprovalRequest, ApprovalStatus};
pub use audit::{AuditSink, JsonlAuditSink, LogAuditSink, MemoryAuditLog};
pub use discovery::{ActionDiscoveryResult, ActionDiscoveryService, ActionQuery, DiscoveredAction};
pub use emitter::{ActionEventEmitter, EventListener, ListenerId};
pub use error::{ActionError, ApprovalError};
pub use executor::{executor_fn, ActionExecutor};
pub use permission::workflows::{
    ApprovalStep, ApprovalWorkflow, ConditionOperator, EscalationAction, EscalationRule,
    StepCondition,
};
pub use permission::{PermissionManager, PermissionResult};
pub use registry::{ControllerRegistry, RegistryStatistics};
pub use types::{
    ActionCategory, ActionDefinition, ActionExample, ActionMetadata, ActionParameter,
    ActionResult, ControllerMetadata, PageController, ParameterType, Params, ResultMetadata,
    RuleCheck, ValidationRule,
};
pub use validation::{ActionValidationService, ValidationResult};
