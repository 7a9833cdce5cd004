use crate::{
    CookieParams, Flash, KeyValueStore, Result, SessionAdapter, SessionOptions, DEFAULT_FLASH_KEY,
};
use cookie::Cookie;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};

#[cfg(feature = "encrypted-adapter")]
use crate::EncryptedNativeAdapter;
#[cfg(feature = "memory-adapter")]
use crate::MemoryAdapter;
#[cfg(feature = "native-adapter")]
use crate::{NativeAdapter, NativeMedium};

/// # The session facade
///
/// The single entry point application code and middleware talk to.
/// It owns one [`SessionAdapter`], chosen at construction, and
/// forwards every operation to it, so callers see the same behavior
/// and the same [`Error`](crate::Error)s whichever adapter is plugged
/// in.
///
/// ```rust
/// # use scoped_session::Session;
/// # fn main() -> scoped_session::Result<()> {
/// let mut session = Session::memory();
/// session.start()?;
/// session.insert("user_id", 1)?;
/// session.flash().add("notice", "welcome back")?;
///
/// assert_eq!(session.get::<usize>("user_id")?, Some(1));
/// assert_eq!(session.flash().get("notice")?, vec!["welcome back".to_string()]);
/// assert!(session.flash().get("notice")?.is_empty());
/// # Ok(()) }
/// ```
#[derive(Debug)]
pub struct Session {
    adapter: Box<dyn SessionAdapter>,
    flash_key: String,
}

impl Session {
    /// Create a session over any adapter
    pub fn new(adapter: impl SessionAdapter + 'static) -> Self {
        Self {
            adapter: Box::new(adapter),
            flash_key: DEFAULT_FLASH_KEY.to_string(),
        }
    }

    /// Create a session over a fresh [`MemoryAdapter`]
    #[cfg(feature = "memory-adapter")]
    pub fn memory() -> Self {
        Self::new(MemoryAdapter::new())
    }

    /// Create a session over a [`NativeAdapter`] on `medium`
    #[cfg(feature = "native-adapter")]
    pub fn native(medium: NativeMedium) -> Self {
        Self::new(NativeAdapter::new(medium))
    }

    /// Create a session over an [`EncryptedNativeAdapter`] on `medium`.
    /// Fails if `key` is shorter than 64 bytes.
    #[cfg(feature = "encrypted-adapter")]
    pub fn encrypted(medium: NativeMedium, key: &[u8]) -> Result<Self> {
        Ok(Self::new(EncryptedNativeAdapter::new(
            NativeAdapter::new(medium),
            key,
        )?))
    }

    /// Borrow the adapter
    pub fn adapter(&self) -> &dyn SessionAdapter {
        self.adapter.as_ref()
    }

    /// Mutably borrow the adapter
    pub fn adapter_mut(&mut self) -> &mut dyn SessionAdapter {
        self.adapter.as_mut()
    }

    /// Changes the reserved key that flash messages are stored under
    pub fn set_flash_key(&mut self, key: impl Into<String>) {
        self.flash_key = key.into();
    }

    /// The flash messages of this session. Reads and writes go
    /// through the adapter, so they share its data.
    pub fn flash(&mut self) -> Flash<'_, dyn SessionAdapter> {
        Flash::with_key(self.adapter.as_mut(), &self.flash_key)
    }

    /// Starts the session
    pub fn start(&mut self) -> Result<()> {
        self.adapter.start()
    }

    /// Checks if the session was started
    pub fn is_started(&self) -> bool {
        self.adapter.is_started()
    }

    /// Migrates the session to a new id, keeping all data
    pub fn regenerate_id(&mut self) -> Result<()> {
        self.adapter.regenerate_id()
    }

    /// Clears all data, flashes included, and invalidates the id
    pub fn destroy(&mut self) -> Result<()> {
        self.adapter.destroy()
    }

    /// Returns the session id
    pub fn id(&self) -> &str {
        self.adapter.id()
    }

    /// Sets the session id, typically from the request cookie
    pub fn set_id(&mut self, id: impl Into<String>) -> Result<()> {
        self.adapter.set_id(id.into())
    }

    /// Returns the session name
    pub fn name(&self) -> &str {
        self.adapter.name()
    }

    /// Sets the session name
    pub fn set_name(&mut self, name: impl Into<String>) -> Result<()> {
        self.adapter.set_name(name.into())
    }

    /// deserializes a type T out of the session. a value of another
    /// shape is an [`Error::Json`](crate::Error::Json).
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.adapter.get_value(key)? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// like [`Session::get`], falling back to `default` for a missing key
    ///
    /// ```rust
    /// # use scoped_session::Session;
    /// # fn main() -> scoped_session::Result<()> {
    /// let session = Session::memory();
    /// assert_eq!(session.get_or("missing", 5)?, 5);
    /// # Ok(()) }
    /// ```
    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> Result<T> {
        Ok(self.get(key)?.unwrap_or(default))
    }

    /// returns the raw json value stored under `key`
    pub fn get_value(&self, key: &str) -> Result<Option<Value>> {
        self.adapter.get_value(key)
    }

    /// inserts a serializable value
    pub fn insert(&mut self, key: &str, value: impl Serialize) -> Result<()> {
        self.adapter.insert_value(key, serde_json::to_value(&value)?)
    }

    /// inserts a raw json value
    pub fn insert_value(&mut self, key: &str, value: Value) -> Result<()> {
        self.adapter.insert_value(key, value)
    }

    /// whether an entry exists for `key`
    pub fn contains_key(&self, key: &str) -> bool {
        self.adapter.contains_key(key)
    }

    /// Deletes an entry
    pub fn delete(&mut self, key: &str) {
        self.adapter.remove(key)
    }

    /// Clears all entries
    pub fn clear(&mut self) {
        self.adapter.clear()
    }

    /// Merges `values` into the session, see [`KeyValueStore::replace`]
    pub fn replace(&mut self, values: Map<String, Value>) -> Result<()> {
        self.adapter.replace(values)
    }

    /// A snapshot of all entries
    pub fn all(&self) -> Result<Map<String, Value>> {
        self.adapter.all()
    }

    /// the number of entries
    pub fn len(&self) -> usize {
        self.adapter.len()
    }

    /// whether there are zero entries
    pub fn is_empty(&self) -> bool {
        self.adapter.is_empty()
    }

    /// Saves the session and releases the backing medium
    pub fn save(&mut self) -> Result<()> {
        self.adapter.save()
    }

    /// Applies runtime options
    pub fn set_options(&mut self, config: Map<String, Value>) -> Result<()> {
        self.adapter.set_options(config)
    }

    /// Returns the runtime options
    pub fn options(&self) -> &SessionOptions {
        self.adapter.options()
    }

    /// Sets the cookie attributes
    pub fn set_cookie_params(&mut self, params: CookieParams) {
        self.adapter.set_cookie_params(params)
    }

    /// Returns the cookie attributes
    pub fn cookie_params(&self) -> &CookieParams {
        self.adapter.cookie_params()
    }

    /// Drains the Set-Cookie directives queued for the response
    pub fn take_cookies(&mut self) -> Vec<Cookie<'static>> {
        self.adapter.take_cookies()
    }
}

#[cfg(all(test, feature = "memory-adapter", feature = "encrypted-adapter"))]
mod tests {
    use super::*;
    use crate::Error;
    use serde_json::json;

    const KEY: [u8; 64] = [3; 64];

    fn sessions() -> Vec<Session> {
        let medium = NativeMedium::new();
        vec![
            Session::memory(),
            Session::native(medium.clone()),
            Session::encrypted(medium, &KEY).unwrap(),
        ]
    }

    #[test]
    fn every_adapter_stores_scalars() -> Result<()> {
        for mut session in sessions() {
            session.start()?;
            session.insert("string", "value")?;
            session.insert("int", 7)?;
            session.insert("float", 0.25)?;
            session.insert("bool", false)?;

            assert_eq!(session.get::<String>("string")?.as_deref(), Some("value"));
            assert_eq!(session.get::<i32>("int")?, Some(7));
            assert_eq!(session.get::<f64>("float")?, Some(0.25));
            assert_eq!(session.get::<bool>("bool")?, Some(false));
            assert_eq!(session.len(), 4);

            assert!(session.contains_key("int"));
            session.delete("int");
            assert!(!session.contains_key("int"));
            assert_eq!(session.get_or("int", 1)?, 1);

            session.clear();
            assert!(session.is_empty());
            assert!(!session.contains_key("string"));
        }
        Ok(())
    }

    #[test]
    fn every_adapter_shares_one_error_taxonomy() -> Result<()> {
        for mut session in sessions() {
            assert!(matches!(session.regenerate_id(), Err(Error::NotStarted)));
            session.destroy()?;

            session.set_name("x")?;
            assert_eq!(session.name(), "x");

            session.start()?;
            assert!(matches!(session.start(), Err(Error::AlreadyStarted)));
            assert!(matches!(
                session.set_name("y"),
                Err(Error::InvalidStateTransition(_))
            ));
            assert!(matches!(
                session.set_id("y"),
                Err(Error::InvalidStateTransition(_))
            ));
        }
        Ok(())
    }

    #[test]
    fn regenerating_keeps_data() -> Result<()> {
        for mut session in sessions() {
            session.start()?;
            session.insert("key", "value")?;
            let before = session.id().to_string();
            session.regenerate_id()?;
            assert_ne!(session.id(), before);
            assert_eq!(session.get::<String>("key")?.as_deref(), Some("value"));
        }
        Ok(())
    }

    #[test]
    fn destroying_resets_the_session() -> Result<()> {
        for mut session in sessions() {
            session.start()?;
            session.insert("key", "value")?;
            session.flash().add("info", "bye")?;
            let before = session.id().to_string();

            session.destroy()?;
            assert_eq!(session.get::<String>("key")?, None);
            assert!(!session.flash().has("info")?);
            assert!(!session.is_started());
            assert_ne!(session.id(), before);
            session.destroy()?;
        }
        Ok(())
    }

    #[test]
    fn flash_and_session_share_data() -> Result<()> {
        for mut session in sessions() {
            session.start()?;
            session.flash().add("info", "hello")?;
            assert_eq!(
                session.get_value(DEFAULT_FLASH_KEY)?,
                Some(json!({ "info": ["hello"] }))
            );

            session.insert_value(DEFAULT_FLASH_KEY, json!({ "error": ["set directly"] }))?;
            assert!(!session.flash().has("info")?);
            assert_eq!(
                session.flash().get("error")?,
                vec!["set directly".to_string()]
            );

            session.flash().add("info", "again")?;
            session.clear();
            assert!(session.flash().all()?.is_empty());
        }
        Ok(())
    }

    #[test]
    fn custom_flash_key() -> Result<()> {
        let mut session = Session::memory();
        session.set_flash_key("notices");
        session.flash().add("info", "x")?;
        assert!(session.contains_key("notices"));
        assert!(!session.contains_key(DEFAULT_FLASH_KEY));
        Ok(())
    }

    #[test]
    fn options_pass_through() -> Result<()> {
        for mut session in sessions() {
            let Value::Object(config) = json!({
                "lifetime": 120,
                "secure": true,
                "cache_limiter": "private",
                "lazy_write": 1,
            }) else {
                unreachable!()
            };
            session.set_options(config)?;
            assert_eq!(session.cookie_params().lifetime, 120);
            assert!(session.cookie_params().secure);
            assert_eq!(session.options().cache_limiter, "private");
            assert_eq!(session.options().extra["lazy_write"], json!(1));

            let params = CookieParams {
                path: "/admin".into(),
                ..CookieParams::default()
            };
            session.set_cookie_params(params.clone());
            assert_eq!(session.cookie_params(), &params);
        }
        Ok(())
    }

    #[test]
    fn typed_get_reports_shape_mismatches() -> Result<()> {
        let mut session = Session::memory();
        session.insert("key", "not a number")?;
        assert!(matches!(session.get::<u32>("key"), Err(Error::Json(_))));
        Ok(())
    }

    #[test]
    fn native_sessions_emit_cookies() -> Result<()> {
        let mut session = Session::native(NativeMedium::new());
        session.start()?;
        let cookies = session.take_cookies();
        assert_eq!(cookies.len(), 1);
        assert_eq!(cookies[0].name(), "app");
        assert_eq!(cookies[0].value(), session.id());

        assert!(Session::memory().take_cookies().is_empty());
        Ok(())
    }
}
