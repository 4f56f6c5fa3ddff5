//! Platform application binary - composition root.
//!
//! Ties the action core together into a single executable:
//! 1. Load configuration from TOML
//! 2. Build the event emitter, audit sink and permission manager
//! 3. Register the bundled admin pages with the controller registry
//! 4. Run one subcommand and print its result as JSON

mod cli;
mod pages;

use std::sync::Arc;

use clap::Parser;
use serde_json::{json, Value};
use uuid::Uuid;

use platform_action::audit::sink_from_config;
use platform_action::{
    ActionCategory, ActionError, ActionEventEmitter, ActionQuery, AiActionBridge,
    ControllerRegistry, Params, PermissionManager,
};
use platform_core::config::PlatformConfig;
use platform_core::types::ActionContext;

use cli::{CliArgs, Command};
use pages::ObjectStore;

fn print_json(value: &Value) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn controllers_json(registry: &ControllerRegistry) -> Value {
    let pages: Vec<Value> = registry
        .list_page_controllers()
        .into_iter()
        .map(|controller| {
            let mut actions: Vec<&String> = controller.actions.keys().collect();
            actions.sort();
            json!({
                "pageId": controller.page_id,
                "pageName": controller.page_name,
                "description": controller.description,
                "category": controller.metadata.category,
                "active": controller.is_active,
                "actions": actions,
            })
        })
        .collect();
    Value::Array(pages)
}

/// Approval queues live in process memory, so a gated call cannot be
/// approved or resumed from a later CLI invocation.
fn approval_required_json(action_id: &str, workflow_id: &str, request_id: Uuid) -> Value {
    json!({
        "approvalRequired": true,
        "actionId": action_id,
        "workflowId": workflow_id,
        "requestId": request_id,
        "note": "approval requests are held in memory by the running process; \
                 approve and run them through the library API, not the CLI",
    })
}

fn parse_params(raw: &str) -> Result<Params, Box<dyn std::error::Error>> {
    match serde_json::from_str::<Value>(raw)? {
        Value::Object(map) => Ok(map),
        other => Err(format!("--params must be a JSON object, got {}", other).into()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config.
    let config_file = args.resolve_config_path();
    let config = PlatformConfig::load_or_default(&config_file);

    // Tracing.
    let level = args.resolve_log_level(&config.general.log_level);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&level)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Starting Platform v{}", env!("CARGO_PKG_VERSION"));

    if let Command::InitConfig { path, force } = &args.command {
        let target = path.clone().unwrap_or(config_file);
        if target.exists() && !force {
            tracing::error!(path = %target.display(), "Config file exists; pass --force to overwrite");
            return Err(format!("{} already exists", target.display()).into());
        }
        PlatformConfig::default().save(&target)?;
        return Ok(());
    }

    // Action core.
    let emitter = Arc::new(ActionEventEmitter::new());
    let audit_sink = sink_from_config(&config.audit);
    let permissions = Arc::new(PermissionManager::new(Arc::clone(&emitter), audit_sink));
    let registry = Arc::new(ControllerRegistry::new(
        config.registry.clone(),
        permissions,
        config.discovery.clone(),
    ));

    let store = Arc::new(ObjectStore::new());
    pages::register_all(&registry, store)?;
    tracing::info!(
        controllers = registry.list_page_controllers().len(),
        "Bundled pages registered"
    );

    let bridge = AiActionBridge::new(Arc::clone(&registry));

    match args.command {
        Command::Actions => print_json(&controllers_json(&registry))?,
        Command::Discover {
            query,
            category,
            tags,
            page,
            limit,
            user,
        } => {
            let mut action_query = ActionQuery {
                query,
                tags,
                page_id: page,
                limit,
                ..ActionQuery::default()
            };
            if let Some(category) = category {
                action_query.category = Some(category.parse::<ActionCategory>()?);
            }
            let result = if user.roles.is_empty() && user.permissions.is_empty() {
                registry.discover_actions(&action_query)
            } else {
                bridge.discover_actions(&action_query, &user.to_user())
            };
            print_json(&result.to_value())?;
        }
        Command::Tools => {
            let tools = bridge.generate_tool_definitions().await;
            print_json(&serde_json::to_value(tools)?)?;
        }
        Command::Stats => print_json(&registry.get_statistics().to_value())?,
        Command::Exec {
            action_id,
            params,
            ai,
            user,
        } => {
            let params = parse_params(&params)?;
            let user = user.to_user();
            let result = if ai {
                bridge.execute_action_for_ai(&action_id, params, &user, None).await
            } else {
                match registry
                    .execute_action(&action_id, params, ActionContext::for_user(user))
                    .await
                {
                    Ok(result) => result,
                    Err(ActionError::ApprovalRequired {
                        action_id,
                        workflow_id,
                        request_id,
                    }) => {
                        tracing::warn!(
                            action_id = %action_id,
                            workflow_id = %workflow_id,
                            "Action needs approval, which the CLI cannot grant"
                        );
                        print_json(&approval_required_json(&action_id, &workflow_id, request_id))?;
                        return Ok(());
                    }
                    Err(e) => {
                        tracing::error!(action_id = %action_id, error = %e, "Action failed");
                        return Err(e.into());
                    }
                }
            };
            print_json(&serde_json::to_value(result)?)?;
        }
        Command::InitConfig { .. } => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use platform_action::MemoryAuditLog;
    use platform_core::config::{DiscoveryConfig, RegistryConfig};

    #[test]
    fn test_parse_params_requires_object() {
        let params = parse_params(r#"{"key": "theme"}"#).unwrap();
        assert_eq!(params["key"], "theme");
        assert!(parse_params("[1, 2]").is_err());
        assert!(parse_params("not json").is_err());
    }

    #[test]
    fn test_approval_output_says_cli_cannot_approve() {
        let id = Uuid::new_v4();
        let out = approval_required_json("billing.createInvoice", "financial-approval", id);
        assert_eq!(out["approvalRequired"], true);
        assert_eq!(out["requestId"], json!(id));
        assert!(out["note"].as_str().unwrap().contains("not the CLI"));
    }

    #[test]
    fn test_controllers_json_lists_bundled_pages() {
        let permissions = Arc::new(PermissionManager::new(
            Arc::new(ActionEventEmitter::new()),
            Arc::new(MemoryAuditLog::new()),
        ));
        let registry =
            ControllerRegistry::new(RegistryConfig::default(), permissions, DiscoveryConfig::default());
        pages::register_all(&registry, Arc::new(ObjectStore::new())).unwrap();

        let listing = controllers_json(&registry);
        let pages = listing.as_array().unwrap();
        let ids: Vec<&str> = pages.iter().map(|p| p["pageId"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["billing", "object-manager", "settings"]);
        assert_eq!(
            pages[1]["actions"],
            json!(["createObject", "deleteObject", "fetchObjects"])
        );
    }
}
