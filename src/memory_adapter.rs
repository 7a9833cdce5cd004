use crate::adapter::Lifecycle;
use crate::{CookieParams, KeyValueStore, Result, SessionAdapter, SessionData, SessionOptions};
use serde_json::{Map, Value};

/// # In-memory session adapter
///
/// Keeps the data in the adapter itself. Nothing is persisted and
/// there is no client side, so [`SessionAdapter::save`] is a no-op and
/// the session stays started until it is destroyed. Useful for tests
/// and command line contexts.
///
/// ```rust
/// # use scoped_session::{KeyValueStore, MemoryAdapter, SessionAdapter};
/// # fn main() -> scoped_session::Result<()> {
/// let mut adapter = MemoryAdapter::new();
/// adapter.start()?;
/// adapter.insert_value("key", "value".into())?;
/// assert!(adapter.contains_key("key"));
/// # Ok(()) }
/// ```
#[derive(Clone, Debug, Default)]
pub struct MemoryAdapter {
    lifecycle: Lifecycle,
    data: SessionData,
}

impl MemoryAdapter {
    /// Create an adapter with default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an adapter with the given options
    pub fn with_options(options: SessionOptions) -> Self {
        Self {
            lifecycle: Lifecycle::new(options),
            data: SessionData::new(),
        }
    }
}

impl KeyValueStore for MemoryAdapter {
    fn get_value(&self, key: &str) -> Result<Option<Value>> {
        self.data.get_value(key)
    }

    fn insert_value(&mut self, key: &str, value: Value) -> Result<()> {
        self.data.insert_value(key, value)
    }

    fn remove(&mut self, key: &str) {
        self.data.remove(key)
    }

    fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    fn clear(&mut self) {
        self.data.clear()
    }

    fn keys(&self) -> Vec<String> {
        self.data.keys()
    }

    fn len(&self) -> usize {
        self.data.len()
    }
}

impl SessionAdapter for MemoryAdapter {
    fn start(&mut self) -> Result<()> {
        self.lifecycle.ensure_not_started()?;
        if self.lifecycle.id.is_empty() {
            self.lifecycle.regenerate();
        }
        log::trace!("starting memory session `{}`", self.lifecycle.id);
        self.lifecycle.started = true;
        Ok(())
    }

    fn is_started(&self) -> bool {
        self.lifecycle.started
    }

    fn regenerate_id(&mut self) -> Result<()> {
        self.lifecycle.ensure_started()?;
        let old = self.lifecycle.regenerate();
        log::trace!("regenerated memory session `{}` -> `{}`", old, self.lifecycle.id);
        Ok(())
    }

    fn destroy(&mut self) -> Result<()> {
        if !self.lifecycle.started {
            return Ok(());
        }
        log::trace!("destroying memory session `{}`", self.lifecycle.id);
        self.data.clear();
        self.lifecycle.regenerate();
        self.lifecycle.started = false;
        Ok(())
    }

    fn id(&self) -> &str {
        &self.lifecycle.id
    }

    fn set_id(&mut self, id: String) -> Result<()> {
        self.lifecycle.set_id(id)
    }

    fn name(&self) -> &str {
        &self.lifecycle.options.name
    }

    fn set_name(&mut self, name: String) -> Result<()> {
        self.lifecycle.set_name(name)
    }

    fn save(&mut self) -> Result<()> {
        Ok(())
    }

    fn set_options(&mut self, config: Map<String, Value>) -> Result<()> {
        self.lifecycle.set_options(config)
    }

    fn options(&self) -> &SessionOptions {
        &self.lifecycle.options
    }

    fn set_cookie_params(&mut self, params: CookieParams) {
        self.lifecycle.options.cookie = params;
    }
}
