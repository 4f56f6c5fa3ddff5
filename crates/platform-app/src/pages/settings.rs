//! Settings page: read and update organization settings.

use std::sync::Arc;

use platform_action::{
    ActionCategory, ActionDefinition, ActionError, ActionParameter, ActionResult,
    ControllerMetadata, PageController, ParameterType, Params,
};
use platform_core::types::ActionContext;
use serde_json::{json, Value};

use super::{str_param, ObjectStore};

fn key_param() -> ActionParameter {
    ActionParameter::new("key", ParameterType::String, "Setting key")
        .required()
        .with_example("theme")
}

fn get_setting(store: Arc<ObjectStore>) -> ActionDefinition {
    ActionDefinition::new(
        "getSetting",
        "Get Setting",
        "Read the current value of a setting",
        ActionCategory::Data,
    )
    .permission("settings:read")
    .parameter(key_param())
    .tags(["settings", "read"])
    .example("What theme is configured", json!({"key": "theme"}))
    .handler(move |params: Params, _ctx: ActionContext| {
        let store = Arc::clone(&store);
        async move {
            let key = str_param(&params, "key")?;
            match store.get_setting(key) {
                Some(value) => Ok::<_, ActionError>(ActionResult::ok(
                    json!({"key": key, "value": value}),
                )),
                None => Ok(ActionResult::failure(format!("Setting {} is not set", key))),
            }
        }
    })
}

fn update_setting(store: Arc<ObjectStore>) -> ActionDefinition {
    ActionDefinition::new(
        "updateSetting",
        "Update Setting",
        "Change the value of a setting",
        ActionCategory::Data,
    )
    .permission("settings:write")
    .parameter(key_param())
    .parameter(
        ActionParameter::new("value", ParameterType::String, "New value")
            .required()
            .with_example("dark"),
    )
    .tags(["settings", "update"])
    .example("Switch to the dark theme", json!({"key": "theme", "value": "dark"}))
    .related("settings.getSetting")
    .handler(move |params: Params, ctx: ActionContext| {
        let store = Arc::clone(&store);
        async move {
            let key = str_param(&params, "key")?;
            let value = params.get("value").cloned().unwrap_or(Value::Null);
            let previous = store.set_setting(key, value.clone());
            tracing::info!(key = %key, user_id = %ctx.user.user_id, "Setting updated");
            Ok::<_, ActionError>(ActionResult::ok_with_message(
                json!({"key": key, "value": value, "previous": previous}),
                format!("Updated {}", key),
            ))
        }
    })
}

pub fn controller(store: Arc<ObjectStore>) -> PageController {
    PageController::new("settings", "Settings", "Organization settings")
        .with_metadata(ControllerMetadata {
            category: "settings".to_string(),
            tags: vec!["settings".to_string(), "configuration".to_string()],
            permissions: vec!["settings:read".to_string()],
            version: "1.0.0".to_string(),
        })
        .with_action(get_setting(Arc::clone(&store)))
        .with_action(update_setting(store))
}

#[cfg(test)]
mod tests {
    use super::*;
    use platform_action::{ActionEventEmitter, ControllerRegistry, MemoryAuditLog, PermissionManager};
    use platform_core::config::{DiscoveryConfig, RegistryConfig};
    use platform_core::types::UserContext;

    fn setup() -> (ControllerRegistry, Arc<ObjectStore>) {
        let pm = Arc::new(PermissionManager::new(
            Arc::new(ActionEventEmitter::new()),
            Arc::new(MemoryAuditLog::new()),
        ));
        let registry =
            ControllerRegistry::new(RegistryConfig::default(), pm, DiscoveryConfig::default());
        let store = Arc::new(ObjectStore::new());
        registry
            .register_page_controller(controller(Arc::clone(&store)))
            .unwrap();
        (registry, store)
    }

    fn params(value: Value) -> Params {
        value.as_object().cloned().unwrap_or_default()
    }

    fn as_role(role: &str) -> ActionContext {
        ActionContext::for_user(UserContext::new("u", "user").with_roles([role]))
    }

    #[tokio::test]
    async fn test_update_then_get() {
        let (registry, store) = setup();
        let result = registry
            .execute_action(
                "settings.updateSetting",
                params(json!({"key": "theme", "value": "dark"})),
                as_role("organization-admin"),
            )
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.data.unwrap()["previous"], Value::Null);
        assert_eq!(store.get_setting("theme"), Some(json!("dark")));

        let read = registry
            .execute_action(
                "settings.getSetting",
                params(json!({"key": "theme"})),
                as_role("organization-member"),
            )
            .await
            .unwrap();
        assert_eq!(read.data.unwrap()["value"], "dark");
    }

    #[tokio::test]
    async fn test_unset_key_is_unsuccessful_result() {
        let (registry, _) = setup();
        let result = registry
            .execute_action(
                "settings.getSetting",
                params(json!({"key": "missing"})),
                as_role("organization-member"),
            )
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("missing"));
    }

    #[tokio::test]
    async fn test_member_cannot_update() {
        let (registry, store) = setup();
        let err = registry
            .execute_action(
                "settings.updateSetting",
                params(json!({"key": "theme", "value": "dark"})),
                as_role("organization-member"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::PermissionDenied { .. }));
        assert_eq!(store.get_setting("theme"), None);
    }
}
