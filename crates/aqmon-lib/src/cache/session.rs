//! Transient session-scoped storage

use super::TransientStorage;
use dashmap::DashMap;
use serde_json::Value;

/// Scratch key/value store that lives for one session
///
/// Holds derived, reproducible data only; critical cleanup wipes it.
pub struct SessionStore {
    name: String,
    values: DashMap<String, Value>,
}

impl SessionStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: DashMap::new(),
        }
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.values.get(key).map(|v| v.clone())
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.values.remove(key).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl TransientStorage for SessionStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn clear(&self) -> usize {
        let cleared = self.values.len();
        self.values.clear();
        cleared
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_get_clear() {
        let store = SessionStore::new("session");
        store.set("last_range", json!("7d"));
        store.set("selected", json!(["pm25", "aqi"]));

        assert_eq!(store.get("last_range"), Some(json!("7d")));
        assert_eq!(store.len(), 2);

        assert_eq!(store.clear(), 2);
        assert!(store.is_empty());
        assert_eq!(store.get("last_range"), None);
    }
}
