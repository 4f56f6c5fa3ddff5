//! Admin pages bundled with the console.
//!
//! Each page is a thin controller over the [`ObjectStore`] backend.

pub mod billing;
pub mod object_manager;
pub mod settings;
pub mod store;

use std::sync::Arc;

use platform_action::{ActionError, ControllerRegistry, Params};
use serde_json::Value;

pub use store::ObjectStore;

/// Register every bundled page with `registry`.
pub fn register_all(registry: &ControllerRegistry, store: Arc<ObjectStore>) -> Result<(), ActionError> {
    registry.register_page_controller(object_manager::controller(Arc::clone(&store))?)?;
    registry.register_page_controller(settings::controller(Arc::clone(&store)))?;
    registry.register_page_controller(billing::controller(store))?;
    Ok(())
}

/// A string parameter the registry has already validated as present.
pub(crate) fn str_param<'a>(params: &'a Params, name: &str) -> Result<&'a str, ActionError> {
    params
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| ActionError::HandlerFailed(format!("parameter {} is not a string", name)))
}

pub(crate) fn usize_param(params: &Params, name: &str, fallback: usize) -> usize {
    params
        .get(name)
        .and_then(Value::as_f64)
        .map_or(fallback, |n| n.max(0.0) as usize)
}
