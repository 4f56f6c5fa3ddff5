//! Object manager page: browse, create and delete objects of any class.

use std::sync::Arc;

use platform_action::{
    ActionCategory, ActionDefinition, ActionError, ActionParameter, ActionResult,
    ControllerMetadata, PageController, ParameterType, Params, ValidationRule,
};
use platform_core::types::ActionContext;
use serde_json::json;

use super::{str_param, usize_param, ObjectStore};

const CLASS_NAME_PATTERN: &str = r"^[A-Za-z][A-Za-z0-9_]*$";

fn class_name() -> Result<ActionParameter, ActionError> {
    Ok(
        ActionParameter::new("className", ParameterType::String, "Object class to operate on")
            .required()
            .with_rule(ValidationRule::format(
                CLASS_NAME_PATTERN,
                "className must start with a letter and contain only letters, digits and '_'",
            )?)
            .with_example("Customer"),
    )
}

fn fetch_objects(store: Arc<ObjectStore>) -> Result<ActionDefinition, ActionError> {
    Ok(ActionDefinition::new(
        "fetchObjects",
        "Fetch Objects",
        "List objects of a class with paging",
        ActionCategory::Data,
    )
    .permission("objects:read")
    .parameter(class_name()?)
    .parameter(
        ActionParameter::new("limit", ParameterType::Number, "Maximum objects to return")
            .with_rule(ValidationRule::range(Some(1.0), Some(1000.0), "limit must be between 1 and 1000"))
            .with_default(25),
    )
    .parameter(
        ActionParameter::new("skip", ParameterType::Number, "Objects to skip")
            .with_rule(ValidationRule::range(Some(0.0), None, "skip must not be negative"))
            .with_default(0),
    )
    .tags(["objects", "query"])
    .example("Show the first customers", json!({"className": "Customer", "limit": 10}))
    .related("object-manager.createObject")
    .handler(move |params: Params, _ctx: ActionContext| {
        let store = Arc::clone(&store);
        async move {
            let class = str_param(&params, "className")?;
            let skip = usize_param(&params, "skip", 0);
            let limit = usize_param(&params, "limit", 25);
            let objects = store.list(class, skip, limit);
            Ok::<_, ActionError>(ActionResult::ok(json!({
                "className": class,
                "objects": objects,
                "total": store.count(class),
            })))
        }
    }))
}

fn create_object(store: Arc<ObjectStore>) -> Result<ActionDefinition, ActionError> {
    Ok(ActionDefinition::new(
        "createObject",
        "Create Object",
        "Create a new object in a class",
        ActionCategory::Data,
    )
    .permission("objects:write")
    .parameter(class_name()?)
    .parameter(
        ActionParameter::new("fields", ParameterType::Object, "Field values of the new object")
            .required()
            .with_example(json!({"name": "Acme"})),
    )
    .tags(["objects", "create"])
    .example(
        "Create a customer named Acme",
        json!({"className": "Customer", "fields": {"name": "Acme"}}),
    )
    .handler(move |params: Params, ctx: ActionContext| {
        let store = Arc::clone(&store);
        async move {
            let class = str_param(&params, "className")?;
            let fields = params
                .get("fields")
                .and_then(|v| v.as_object())
                .cloned()
                .unwrap_or_default();
            let object = store.create(class, fields);
            tracing::debug!(class = %class, user_id = %ctx.user.user_id, "Object created");
            Ok::<_, ActionError>(ActionResult::ok_with_message(
                object,
                format!("Created {} object", class),
            ))
        }
    }))
}

fn delete_object(store: Arc<ObjectStore>) -> Result<ActionDefinition, ActionError> {
    Ok(ActionDefinition::new(
        "deleteObject",
        "Delete Object",
        "Permanently delete one object",
        ActionCategory::Data,
    )
    .permission("objects:write")
    .parameter(class_name()?)
    .parameter(ActionParameter::new("objectId", ParameterType::String, "Id of the object").required())
    .tags(["objects", "delete"])
    .handler(move |params: Params, _ctx: ActionContext| {
        let store = Arc::clone(&store);
        async move {
            let class = str_param(&params, "className")?;
            let object_id = str_param(&params, "objectId")?;
            if store.delete(class, object_id) {
                Ok::<_, ActionError>(ActionResult::ok_with_message(
                    json!({"objectId": object_id}),
                    format!("Deleted {} {}", class, object_id),
                ))
            } else {
                Ok(ActionResult::failure(format!("{} {} not found", class, object_id)))
            }
        }
    }))
}

pub fn controller(store: Arc<ObjectStore>) -> Result<PageController, ActionError> {
    Ok(PageController::new(
        "object-manager",
        "Object Manager",
        "Browse and edit objects of every class",
    )
    .with_metadata(ControllerMetadata {
        category: "data".to_string(),
        tags: vec!["objects".to_string()],
        permissions: vec!["objects:read".to_string()],
        version: "1.0.0".to_string(),
    })
    .with_action(fetch_objects(Arc::clone(&store))?)
    .with_action(create_object(Arc::clone(&store))?)
    .with_action(delete_object(store)?))
}
