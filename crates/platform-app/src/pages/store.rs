//! In-memory stand-in for the backend object store and settings API.

use chrono::Utc;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    /// class name -> object id -> object
    classes: HashMap<String, BTreeMap<String, Value>>,
    settings: BTreeMap<String, Value>,
}

/// Thread-safe object and settings store.
#[derive(Default)]
pub struct ObjectStore {
    inner: Mutex<Inner>,
}

impl ObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a new object and return it with `objectId` and `createdAt` set.
    pub fn create(&self, class_name: &str, fields: Map<String, Value>) -> Value {
        let object_id = Uuid::new_v4().simple().to_string();
        let mut object = fields;
        object.insert("objectId".to_string(), json!(object_id));
        object.insert("createdAt".to_string(), json!(Utc::now().to_rfc3339()));
        let object = Value::Object(object);

        self.lock()
            .classes
            .entry(class_name.to_string())
            .or_default()
            .insert(object_id, object.clone());
        object
    }

    /// Objects of a class ordered by id.
    pub fn list(&self, class_name: &str, skip: usize, limit: usize) -> Vec<Value> {
        self.lock()
            .classes
            .get(class_name)
            .map(|objects| objects.values().skip(skip).take(limit).cloned().collect())
            .unwrap_or_default()
    }

    pub fn count(&self, class_name: &str) -> usize {
        self.lock().classes.get(class_name).map_or(0, BTreeMap::len)
    }

    pub fn delete(&self, class_name: &str, object_id: &str) -> bool {
        self.lock()
            .classes
            .get_mut(class_name)
            .and_then(|objects| objects.remove(object_id))
            .is_some()
    }

    pub fn get_setting(&self, key: &str) -> Option<Value> {
        self.lock().settings.get(key).cloned()
    }

    /// Store a setting and return the previous value.
    pub fn set_setting(&self, key: &str, value: Value) -> Option<Value> {
        self.lock().settings.insert(key.to_string(), value)
    }
}
