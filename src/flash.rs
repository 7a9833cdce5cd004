use crate::{KeyValueStore, Result};
use serde_json::Value;
use std::collections::BTreeMap;

/// The default reserved key that flash messages are kept under
pub const DEFAULT_FLASH_KEY: &str = "_flash";

/// # One-shot flash messages
///
/// A borrowing view over a [`KeyValueStore`]. Messages are grouped by
/// category and kept as a single object under a reserved key of the
/// store, so they live exactly as long as the session data does and
/// anything that clears the store also clears them.
///
/// Reading a category with [`Flash::get`] removes it.
///
/// ```rust
/// # use scoped_session::{Flash, SessionData};
/// # fn main() -> scoped_session::Result<()> {
/// let mut data = SessionData::new();
/// let mut flash = Flash::new(&mut data);
/// flash.add("notice", "saved")?;
/// assert!(flash.has("notice")?);
/// assert_eq!(flash.get("notice")?, vec!["saved".to_string()]);
/// assert!(flash.get("notice")?.is_empty());
/// # Ok(()) }
/// ```
#[derive(Debug)]
pub struct Flash<'a, S: KeyValueStore + ?Sized> {
    store: &'a mut S,
    key: &'a str,
}

impl<'a, S: KeyValueStore + ?Sized> Flash<'a, S> {
    /// A flash view stored under [`DEFAULT_FLASH_KEY`]
    pub fn new(store: &'a mut S) -> Self {
        Self::with_key(store, DEFAULT_FLASH_KEY)
    }

    /// A flash view stored under a custom key
    pub fn with_key(store: &'a mut S, key: &'a str) -> Self {
        Self { store, key }
    }

    /// appends a message to `category`
    pub fn add(&mut self, category: &str, message: impl Into<String>) -> Result<()> {
        let mut messages = self.load()?;
        messages
            .entry(category.to_string())
            .or_default()
            .push(message.into());
        self.persist(messages)
    }

    /// Returns every message in `category` and removes the category.
    /// A missing category yields an empty vec.
    pub fn get(&mut self, category: &str) -> Result<Vec<String>> {
        let mut messages = self.load()?;
        match messages.remove(category) {
            Some(taken) => {
                self.persist(messages)?;
                Ok(taken)
            }
            None => Ok(Vec::new()),
        }
    }

    /// whether `category` holds at least one message. does not consume it.
    pub fn has(&self, category: &str) -> Result<bool> {
        Ok(self
            .load()?
            .get(category)
            .map_or(false, |messages| !messages.is_empty()))
    }

    /// overwrites the messages of `category`
    pub fn set(&mut self, category: &str, messages: Vec<String>) -> Result<()> {
        let mut all = self.load()?;
        all.insert(category.to_string(), messages);
        self.persist(all)
    }

    /// removes every message by dropping the reserved key
    pub fn clear(&mut self) {
        self.store.remove(self.key);
    }

    /// Returns every category and drains the flash store
    pub fn all(&mut self) -> Result<BTreeMap<String, Vec<String>>> {
        let all = self.load()?;
        self.clear();
        Ok(all)
    }

    fn load(&self) -> Result<BTreeMap<String, Vec<String>>> {
        match self.store.get_value(self.key)? {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Ok(BTreeMap::new()),
        }
    }

    fn persist(&mut self, messages: BTreeMap<String, Vec<String>>) -> Result<()> {
        if messages.is_empty() {
            self.clear();
            Ok(())
        } else {
            let value: Value = serde_json::to_value(messages)?;
            self.store.insert_value(self.key, value)
        }
    }
}
