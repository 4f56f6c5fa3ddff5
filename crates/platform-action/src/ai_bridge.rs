//! Exposes registered actions to an AI agent as JSON-schema tools.
//!
//! The bridge re-checks existence and authorization before delegating to the
//! registry, and never returns an error: every failure becomes an
//! [`ActionResult`] with `success: false` the agent can reason about.

use async_trait::async_trait;
use platform_core::types::{ActionContext, PageContext, Timestamp, UserContext};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::discovery::{ActionDiscoveryResult, ActionQuery};
use crate::error::ActionError;
use crate::registry::ControllerRegistry;
use crate::types::{ActionDefinition, ActionResult, Params, ResultMetadata};

/// Where a tool is executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolSource {
    Native,
    External { server: String },
}

/// A tool as presented to the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    /// Action id (or `server_tool`) with everything but `[A-Za-z0-9_]` removed.
    pub name: String,
    pub description: String,
    /// Full action id for native tools, the source's own name for external ones.
    pub action_id: String,
    pub source: ToolSource,
    pub parameters: Value,
    pub output_schema: Value,
}

/// A tool advertised by an external tool server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalTool {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub input_schema: Value,
}

/// An external tool server (MCP-style) whose tools sit next to native actions.
#[async_trait]
pub trait ExternalToolSource: Send + Sync {
    fn server_name(&self) -> &str;

    async fn list_tools(&self) -> Result<Vec<ExternalTool>, ActionError>;

    async fn call_tool(&self, name: &str, params: Params) -> Result<Value, ActionError>;
}

/// Strip every character that is not ASCII alphanumeric or `_`.
pub fn tool_name(id: &str) -> String {
    id.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect()
}

fn external_tool_name(server: &str, tool: &str) -> String {
    tool_name(&format!("{}_{}", server, tool))
}

/// JSON schema of every tool's output.
pub fn output_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "success": { "type": "boolean" },
            "data": { "description": "Action payload" },
            "message": { "type": "string" },
            "error": { "type": "string" },
        },
        "required": ["success"],
    })
}

/// JSON schema of an action's declared parameters.
pub fn parameters_schema(action: &ActionDefinition) -> Value {
    let mut properties = Map::new();
    for param in &action.parameters {
        let mut property = Map::new();
        property.insert("type".to_string(), json!(param.param_type.as_str()));
        property.insert("description".to_string(), json!(param.description));
        if let Some(default) = &param.default_value {
            property.insert("default".to_string(), default.clone());
        }
        if !param.examples.is_empty() {
            property.insert("examples".to_string(), json!(param.examples));
        }
        properties.insert(param.name.clone(), Value::Object(property));
    }
    let required: Vec<&str> = action
        .required_parameters()
        .map(|p| p.name.as_str())
        .collect();

    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

fn describe(action: &ActionDefinition) -> String {
    match (action.metadata.deprecated, &action.metadata.deprecation_message) {
        (true, Some(message)) => format!("{} (deprecated: {})", action.description, message),
        (true, None) => format!("{} (deprecated)", action.description),
        _ => action.description.clone(),
    }
}

fn ai_metadata(action_id: &str) -> ResultMetadata {
    ResultMetadata {
        action_id: Some(action_id.to_string()),
        executed_by_ai: Some(true),
        ai_execution_timestamp: Some(Timestamp::now()),
        ..ResultMetadata::default()
    }
}

/// Adapter between the action registry and an AI tool host.
pub struct AiActionBridge {
    registry: Arc<ControllerRegistry>,
    sources: Vec<Arc<dyn ExternalToolSource>>,
}

impl AiActionBridge {
    pub fn new(registry: Arc<ControllerRegistry>) -> Self {
        Self {
            registry,
            sources: Vec::new(),
        }
    }

    pub fn with_source(mut self, source: Arc<dyn ExternalToolSource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn registry(&self) -> &Arc<ControllerRegistry> {
        &self.registry
    }

    /// Native tools in index order, then each source's tools.
    ///
    /// A source that fails to list its tools is skipped.
    pub async fn generate_tool_definitions(&self) -> Vec<ToolDefinition> {
        let mut tools: Vec<ToolDefinition> = self
            .registry
            .action_ids()
            .into_iter()
            .filter_map(|id| {
                let action = self.registry.get_action(&id)?;
                Some(ToolDefinition {
                    name: tool_name(&id),
                    description: describe(&action),
                    action_id: id,
                    source: ToolSource::Native,
                    parameters: parameters_schema(&action),
                    output_schema: output_schema(),
                })
            })
            .collect();

        for source in &self.sources {
            let server = source.server_name().to_string();
            match source.list_tools().await {
                Ok(external) => {
                    debug!(server = %server, count = external.len(), "Merged external tools");
                    tools.extend(external.into_iter().map(|tool| ToolDefinition {
                        name: external_tool_name(&server, &tool.name),
                        description: tool.description,
                        action_id: tool.name,
                        source: ToolSource::External {
                            server: server.clone(),
                        },
                        parameters: tool.input_schema,
                        output_schema: output_schema(),
                    }));
                }
                Err(e) => warn!(server = %server, error = %e, "External tool source unavailable"),
            }
        }
        tools
    }

    /// Run an action for the agent. Never returns an error.
    pub async fn execute_action_for_ai(
        &self,
        action_id: &str,
        params: Params,
        user: &UserContext,
        extra_context: Option<ActionContext>,
    ) -> ActionResult {
        let started = Instant::now();
        let Some(action) = self.registry.get_action(action_id) else {
            let err = ActionError::NotFound(action_id.to_string());
            return self.refuse(action_id, &params, user, err, started).await;
        };

        if self.registry.config().enable_permission_checking {
            let decision = self
                .registry
                .permissions()
                .validate_action_permissions(&action, user);
            if !decision.allowed {
                let reason = decision
                    .reason
                    .unwrap_or_else(|| "Permission denied".to_string());
                self.registry
                    .permissions()
                    .emit_permission_denied(action_id, user, &reason);
                let err = ActionError::PermissionDenied {
                    action_id: action_id.to_string(),
                    reason,
                };
                return self.refuse(action_id, &params, user, err, started).await;
            }
        }

        let mut context = extra_context.unwrap_or_else(|| ActionContext::for_user(user.clone()));
        context.user = user.clone();
        if context.page.page_id.is_empty() {
            if let Some((page_id, _)) = action_id.rsplit_once('.') {
                context.page = self
                    .registry
                    .get_page_controller(page_id)
                    .map(|c| c.context)
                    .unwrap_or_else(|| PageContext::for_page(page_id));
            }
        }

        match self.registry.execute_action(action_id, params, context).await {
            Ok(result) => result.with_metadata(ai_metadata(action_id)),
            Err(e) => {
                debug!(%action_id, error = %e, "AI action failed");
                ActionResult::failure(e.to_string()).with_metadata(ai_metadata(action_id))
            }
        }
    }

    async fn refuse(
        &self,
        action_id: &str,
        params: &Params,
        user: &UserContext,
        err: ActionError,
        started: Instant,
    ) -> ActionResult {
        self.registry
            .record_failure(action_id, params, user, &err, started)
            .await;
        ActionResult::failure(err.to_string()).with_metadata(ai_metadata(action_id))
    }

    /// Resolve a tool name to a native action or an external tool and run it.
    pub async fn execute_tool(&self, name: &str, params: Params, user: &UserContext) -> ActionResult {
        if let Some(action_id) = self
            .registry
            .action_ids()
            .into_iter()
            .find(|id| tool_name(id) == name)
        {
            return self
                .execute_action_for_ai(&action_id, params, user, None)
                .await;
        }

        for source in &self.sources {
            let server = source.server_name();
            let tools = match source.list_tools().await {
                Ok(tools) => tools,
                Err(e) => {
                    warn!(server = %server, error = %e, "External tool source unavailable");
                    continue;
                }
            };
            let Some(tool) = tools
                .into_iter()
                .find(|t| external_tool_name(server, &t.name) == name)
            else {
                continue;
            };

            let mut metadata = ai_metadata(&tool.name);
            metadata
                .extra
                .insert("server".to_string(), json!(server));
            return match source.call_tool(&tool.name, params).await {
                Ok(data) => ActionResult::ok(data).with_metadata(metadata),
                Err(e) => {
                    warn!(server = %server, tool = %tool.name, error = %e, "External tool failed");
                    ActionResult::failure(e.to_string()).with_metadata(metadata)
                }
            };
        }

        ActionResult::failure(format!("Unknown tool: {}", name))
    }

    /// Discovery restricted to actions `user` may run.
    pub fn discover_actions(&self, query: &ActionQuery, user: &UserContext) -> ActionDiscoveryResult {
        self.registry.discover_actions_for(query, user)
    }

    pub fn search_actions_by_natural_language(
        &self,
        text: &str,
        user: &UserContext,
        limit: Option<usize>,
    ) -> ActionDiscoveryResult {
        let mut query = ActionQuery::text(text);
        query.limit = limit;
        self.discover_actions(&query, user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditLog;
    use crate::emitter::ActionEventEmitter;
    use crate::permission::PermissionManager;
    use crate::types::{ActionCategory, ActionParameter, PageController, ParameterType};
    use platform_core::config::{DiscoveryConfig, RegistryConfig};
    use platform_core::events::ActionEventKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeServer {
        fail_listing: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ExternalToolSource for FakeServer {
        fn server_name(&self) -> &str {
            "web-search"
        }

        async fn list_tools(&self) -> Result<Vec<ExternalTool>, ActionError> {
            if self.fail_listing {
                return Err(ActionError::ExternalTool("connection refused".to_string()));
            }
            Ok(vec![ExternalTool {
                name: "search".to_string(),
                description: "Search the web".to_string(),
                input_schema: json!({"type": "object"}),
            }])
        }

        async fn call_tool(&self, name: &str, params: Params) -> Result<Value, ActionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(json!({"tool": name, "q": params.get("q").cloned()}))
        }
    }

    fn registry() -> (Arc<ControllerRegistry>, Arc<ActionEventEmitter>, Arc<MemoryAuditLog>) {
        let emitter = Arc::new(ActionEventEmitter::new());
        let audit = Arc::new(MemoryAuditLog::new());
        let pm = Arc::new(PermissionManager::new(Arc::clone(&emitter), audit.clone()));
        let registry =
            ControllerRegistry::new(RegistryConfig::default(), pm, DiscoveryConfig::default());

        let fetch = ActionDefinition::new("fetchObjects", "Fetch Objects", "List objects of a class", ActionCategory::Data)
            .permission("objects:read")
            .parameter(ActionParameter::new("className", ParameterType::String, "Class").required())
            .parameter(
                ActionParameter::new("limit", ParameterType::Number, "Page size")
                    .with_default(20)
                    .with_example(50),
            )
            .handler(|p: Params, c: ActionContext| async move {
                Ok(ActionResult::ok(json!({
                    "className": p.get("className").cloned(),
                    "page": c.page.page_id,
                })))
            });
        let drop = ActionDefinition::new("dropClass", "Drop Class", "Delete a class", ActionCategory::Data)
            .permission("schema:write")
            .deprecated("use deleteClass")
            .handler(|_p: Params, _c: ActionContext| async move { Ok(ActionResult::ok(json!(null))) });

        registry
            .register_page_controller(
                PageController::new("object-manager", "Object Manager", "Objects")
                    .with_action(fetch)
                    .with_action(drop),
            )
            .unwrap();
        (Arc::new(registry), emitter, audit)
    }

    fn params(value: Value) -> Params {
        value.as_object().cloned().unwrap_or_default()
    }

    fn reader() -> UserContext {
        UserContext::new("u1", "alice").with_permissions(["objects:read"])
    }

    #[test]
    fn test_tool_name_strips_punctuation() {
        assert_eq!(tool_name("object-manager.fetchObjects"), "objectmanagerfetchObjects");
        assert_eq!(tool_name("a_b.c"), "a_bc");
    }

    #[test]
    fn test_parameters_schema() {
        let (registry, _, _) = registry();
        let action = registry.get_action("object-manager.fetchObjects").unwrap();
        let schema = parameters_schema(&action);
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["required"], json!(["className"]));
        assert_eq!(schema["properties"]["className"]["type"], "string");
        assert_eq!(schema["properties"]["limit"]["default"], json!(20));
        assert_eq!(schema["properties"]["limit"]["examples"], json!([50]));
    }

    #[tokio::test]
    async fn test_generate_merges_external_tools() {
        let (registry, _, _) = registry();
        let bridge = AiActionBridge::new(registry).with_source(Arc::new(FakeServer {
            fail_listing: false,
            calls: AtomicUsize::new(0),
        }));
        let tools = bridge.generate_tool_definitions().await;
        let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["objectmanagerdropClass", "objectmanagerfetchObjects", "websearch_search"]
        );
        assert!(tools[0].description.contains("deprecated: use deleteClass"));
        assert_eq!(
            tools[2].source,
            ToolSource::External {
                server: "web-search".to_string()
            }
        );
        assert_eq!(tools[1].output_schema["required"], json!(["success"]));
    }

    #[tokio::test]
    async fn test_failing_source_is_skipped() {
        let (registry, _, _) = registry();
        let bridge = AiActionBridge::new(registry).with_source(Arc::new(FakeServer {
            fail_listing: true,
            calls: AtomicUsize::new(0),
        }));
        assert_eq!(bridge.generate_tool_definitions().await.len(), 2);
    }

    #[tokio::test]
    async fn test_execute_for_ai_stamps_metadata() {
        let (registry, _, _) = registry();
        let bridge = AiActionBridge::new(registry);
        let result = bridge
            .execute_action_for_ai(
                "object-manager.fetchObjects",
                params(json!({"className": "Invoice"})),
                &reader(),
                None,
            )
            .await;
        assert!(result.success);
        assert_eq!(result.data.as_ref().unwrap()["page"], "object-manager");
        let meta = result.metadata.unwrap();
        assert_eq!(meta.executed_by_ai, Some(true));
        assert!(meta.ai_execution_timestamp.is_some());
        assert!(meta.execution_time.is_some());
    }

    #[tokio::test]
    async fn test_execute_for_ai_never_errors() {
        let (registry, emitter, audit) = registry();
        let denied = Arc::new(AtomicUsize::new(0));
        let d = Arc::clone(&denied);
        emitter.add_listener_fn(move |e| {
            if e.kind == ActionEventKind::PermissionDenied {
                d.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        });
        let bridge = AiActionBridge::new(registry);

        let missing = bridge
            .execute_action_for_ai("nope.nothing", Params::new(), &reader(), None)
            .await;
        assert!(!missing.success);
        assert_eq!(missing.error.as_deref(), Some("Action not found: nope.nothing"));

        let forbidden = bridge
            .execute_action_for_ai("object-manager.dropClass", Params::new(), &reader(), None)
            .await;
        assert!(!forbidden.success);
        assert!(forbidden.error.unwrap().contains("schema:write"));
        assert_eq!(denied.load(Ordering::SeqCst), 1);

        let invalid = bridge
            .execute_action_for_ai("object-manager.fetchObjects", Params::new(), &reader(), None)
            .await;
        assert!(!invalid.success);
        assert!(invalid.error.unwrap().contains("className"));
        assert_eq!(invalid.metadata.unwrap().executed_by_ai, Some(true));

        // Refusals by the bridge itself are audited like registry failures.
        let failed = audit.events_of(ActionEventKind::ActionFailed);
        let ids: Vec<&str> = failed.iter().map(|e| e.action_id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["nope.nothing", "object-manager.dropClass", "object-manager.fetchObjects"]
        );
        assert_eq!(failed[0].error.as_deref(), Some("Action not found: nope.nothing"));
        assert!(failed[1].error.as_deref().unwrap().contains("schema:write"));
        assert_eq!(failed[1].user_id.as_deref(), Some("u1"));
    }

    #[tokio::test]
    async fn test_execute_tool_routes_native_and_external() {
        let (registry, _, _) = registry();
        let server = Arc::new(FakeServer {
            fail_listing: false,
            calls: AtomicUsize::new(0),
        });
        let bridge = AiActionBridge::new(registry).with_source(server.clone());

        let native = bridge
            .execute_tool(
                "objectmanagerfetchObjects",
                params(json!({"className": "User"})),
                &reader(),
            )
            .await;
        assert!(native.success);

        let external = bridge
            .execute_tool("websearch_search", params(json!({"q": "rust"})), &reader())
            .await;
        assert!(external.success);
        assert_eq!(external.data, Some(json!({"tool": "search", "q": "rust"})));
        assert_eq!(server.calls.load(Ordering::SeqCst), 1);

        let unknown = bridge.execute_tool("nothing", Params::new(), &reader()).await;
        assert_eq!(unknown.error.as_deref(), Some("Unknown tool: nothing"));
    }

    #[test]
    fn test_discovery_hides_unauthorized_actions_before_ranking() {
        let pm = Arc::new(PermissionManager::new(
            Arc::new(ActionEventEmitter::new()),
            Arc::new(MemoryAuditLog::new()),
        ));
        let registry =
            ControllerRegistry::new(RegistryConfig::default(), pm, DiscoveryConfig::default());
        let report = |id: &str, name: &str| {
            ActionDefinition::new(id, name, format!("{} report", name), ActionCategory::Data)
                .handler(|_p: Params, _c: ActionContext| async move { Ok(ActionResult::ok(json!(null))) })
        };
        registry
            .register_page_controller(
                PageController::new("reports", "Reports", "Reporting")
                    .with_action(
                        report("secretReport", "Secret report report")
                            .permission("secrets:read")
                            .tags(["report"])
                            .example("Leaked secret example", json!({})),
                    )
                    .with_action(report("salesReport", "Sales report").example("Monthly sales", json!({})))
                    .with_action(report("usageReport", "Usage report")),
            )
            .unwrap();
        let bridge = AiActionBridge::new(Arc::new(registry));
        let guest = UserContext::new("g", "guest").with_roles(["guest"]);

        let all = bridge.search_actions_by_natural_language("report", &guest, None);
        assert_eq!(all.total_found, 2);
        assert!(all.actions.iter().all(|a| a.full_id != "reports.secretReport"));
        assert_eq!(all.suggestions, vec!["Monthly sales"]);

        let one = bridge.search_actions_by_natural_language("report", &guest, Some(1));
        assert_eq!(one.actions.len(), 1);
        assert_ne!(one.actions[0].full_id, "reports.secretReport");
        assert_eq!(one.total_found, 2);
        assert_eq!(one.confidence, one.actions[0].score);
        assert!(!one.suggestions.contains(&"Leaked secret example".to_string()));
    }

    #[test]
    fn test_discovery_filters_by_permission() {
        let (registry, _, _) = registry();
        let bridge = AiActionBridge::new(registry);

        let hits = bridge.search_actions_by_natural_language("class", &reader(), None);
        let ids: Vec<&str> = hits.actions.iter().map(|a| a.full_id.as_str()).collect();
        assert_eq!(ids, vec!["object-manager.fetchObjects"]);

        let admin = UserContext::new("r", "root").with_roles(["system-admin"]);
        let hits = bridge.search_actions_by_natural_language("class", &admin, None);
        assert_eq!(hits.actions[0].full_id, "object-manager.dropClass");
        assert_eq!(hits.confidence, hits.actions[0].score);
    }
}
