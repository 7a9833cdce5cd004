use crate::Result;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// A string-keyed store of json values.
///
/// This is the surface shared by [`SessionData`], every
/// [`SessionAdapter`](crate::SessionAdapter) and the
/// [`Flash`](crate::Flash) view. Value access is fallible because a
/// store may transform values on the way in or out (the encrypted
/// adapter authenticates every read).
pub trait KeyValueStore {
    /// returns the value stored under `key`, if any
    fn get_value(&self, key: &str) -> Result<Option<Value>>;

    /// stores `value` under `key`, replacing any previous value
    fn insert_value(&mut self, key: &str, value: Value) -> Result<()>;

    /// removes the entry for `key`. removing a missing key is not an error
    fn remove(&mut self, key: &str);

    /// peeks whether an entry exists for `key`
    fn contains_key(&self, key: &str) -> bool;

    /// removes every entry
    fn clear(&mut self);

    /// the stored keys, in no particular order
    fn keys(&self) -> Vec<String>;

    /// the number of entries
    fn len(&self) -> usize;

    /// whether there are zero entries
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// a snapshot of every entry
    fn all(&self) -> Result<Map<String, Value>> {
        let mut all = Map::new();
        for key in self.keys() {
            if let Some(value) = self.get_value(&key)? {
                all.insert(key, value);
            }
        }
        Ok(all)
    }

    /// Merges `values` into the store. Nested objects and arrays are
    /// merged entry by entry, anything else is overwritten.
    fn replace(&mut self, values: Map<String, Value>) -> Result<()> {
        for (key, patch) in values {
            let merged = match self.get_value(&key)? {
                Some(mut existing) => {
                    merge_value(&mut existing, patch);
                    existing
                }
                None => patch,
            };
            self.insert_value(&key, merged)?;
        }
        Ok(())
    }
}

pub(crate) fn merge_value(base: &mut Value, patch: Value) {
    match (base, patch) {
        (Value::Object(base), Value::Object(patch)) => {
            for (key, value) in patch {
                match base.get_mut(&key) {
                    Some(existing) => merge_value(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (Value::Array(base), Value::Array(patch)) => {
            for (index, value) in patch.into_iter().enumerate() {
                match base.get_mut(index) {
                    Some(existing) => merge_value(existing, value),
                    None => base.push(value),
                }
            }
        }
        (base, patch) => *base = patch,
    }
}

/// # The owned session data map
///
/// Adapters keep one of these per logical session. It tracks whether
/// any of its entries changed since the last call to
/// [`SessionData::reset_data_changed`], which lets a backing medium
/// skip rewriting untouched records.
///
/// ```rust
/// # use scoped_session::{KeyValueStore, SessionData};
/// # fn main() -> scoped_session::Result<()> {
/// let mut data = SessionData::new();
/// assert!(!data.data_changed());
///
/// data.insert("key", 1)?;
/// assert!(data.data_changed());
///
/// data.reset_data_changed();
/// assert_eq!(data.get::<usize>("key"), Some(1));
/// data.remove("nonexistent key");
/// assert!(!data.data_changed());
/// data.remove("key");
/// assert!(data.data_changed());
/// # Ok(()) }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    data: HashMap<String, Value>,

    #[serde(skip)]
    data_changed: bool,
}

impl SessionData {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Rehydrate a map from a backing medium. The result is not
    /// considered changed.
    pub fn from_map(data: HashMap<String, Value>) -> Self {
        Self {
            data,
            data_changed: false,
        }
    }

    /// Borrow the underlying hashmap
    pub fn as_map(&self) -> &HashMap<String, Value> {
        &self.data
    }

    /// inserts a serializable value. returns an error if the
    /// serialization was unsuccessful.
    ///
    /// ```rust
    /// # use scoped_session::SessionData;
    /// let mut data = SessionData::new();
    /// data.insert("key", vec![1, 2, 3]).expect("serializable");
    /// let numbers: Vec<usize> = data.get("key").unwrap();
    /// assert_eq!(vec![1, 2, 3], numbers);
    /// ```
    pub fn insert(&mut self, key: &str, value: impl Serialize) -> Result<()> {
        self.put(key, serde_json::to_value(&value)?);
        Ok(())
    }

    /// deserializes a type T out of the map. values of another shape
    /// read as `None`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.data
            .get(key)
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .ok()
            .flatten()
    }

    /// removes and returns an entry
    pub fn take_value(&mut self, key: &str) -> Option<Value> {
        let took = self.data.remove(key);
        if took.is_some() {
            self.data_changed = true;
        }
        took
    }

    /// Checks if the data has been modified since the last reset
    pub fn data_changed(&self) -> bool {
        self.data_changed
    }

    /// Resets `data_changed` dirty tracking
    pub fn reset_data_changed(&mut self) {
        self.data_changed = false;
    }

    fn put(&mut self, key: &str, value: Value) {
        if self.data.get(key) != Some(&value) {
            self.data.insert(key.to_string(), value);
            self.data_changed = true;
        }
    }
}

impl KeyValueStore for SessionData {
    fn get_value(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.data.get(key).cloned())
    }

    fn insert_value(&mut self, key: &str, value: Value) -> Result<()> {
        self.put(key, value);
        Ok(())
    }

    fn remove(&mut self, key: &str) {
        self.take_value(key);
    }

    fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    fn clear(&mut self) {
        if !self.data.is_empty() {
            self.data.clear();
            self.data_changed = true;
        }
    }

    fn keys(&self) -> Vec<String> {
        self.data.keys().cloned().collect()
    }

    fn len(&self) -> usize {
        self.data.len()
    }

    fn all(&self) -> Result<Map<String, Value>> {
        Ok(self
            .data
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalar_values_round_trip() -> Result<()> {
        let mut data = SessionData::new();
        data.insert("string", "value")?;
        data.insert("int", 42)?;
        data.insert("float", 1.5)?;
        data.insert("bool", true)?;

        assert_eq!(data.get::<String>("string").as_deref(), Some("value"));
        assert_eq!(data.get::<i64>("int"), Some(42));
        assert_eq!(data.get::<f64>("float"), Some(1.5));
        assert_eq!(data.get::<bool>("bool"), Some(true));
        assert!(data.contains_key("int"));
        assert_eq!(data.len(), 4);

        data.remove("int");
        assert!(!data.contains_key("int"));
        data.clear();
        assert!(data.is_empty());
        Ok(())
    }

    #[test]
    fn reinserting_the_same_value_is_not_a_change() -> Result<()> {
        let mut data = SessionData::new();
        data.insert("key", "value")?;
        data.reset_data_changed();
        data.insert("key", "value")?;
        assert!(!data.data_changed());
        data.clear();
        assert!(data.data_changed());
        Ok(())
    }

    #[test]
    fn replace_merges_nested_values() -> Result<()> {
        let mut data = SessionData::new();
        data.insert_value("user", json!({ "name": "chashu", "roles": ["a", "b"] }))?;
        data.insert_value("count", json!(1))?;

        let patch = json!({
            "user": { "legs": 4, "roles": ["c"] },
            "count": 2,
            "fresh": "new",
        });
        let Value::Object(patch) = patch else {
            unreachable!()
        };
        data.replace(patch)?;

        assert_eq!(
            data.get_value("user")?,
            Some(json!({ "name": "chashu", "legs": 4, "roles": ["c", "b"] }))
        );
        assert_eq!(data.get_value("count")?, Some(json!(2)));
        assert_eq!(data.get_value("fresh")?, Some(json!("new")));
        Ok(())
    }

    #[test]
    fn all_is_a_snapshot() -> Result<()> {
        let mut data = SessionData::new();
        data.insert("a", 1)?;
        let snapshot = data.all()?;
        data.insert("b", 2)?;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(data.all()?.len(), 2);
        Ok(())
    }
}
