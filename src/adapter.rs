use crate::{CookieParams, Error, KeyValueStore, Result, SessionOptions};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD as BASE64, Engine};
use cookie::Cookie;
use rand::RngCore;
use serde_json::{Map, Value};
use std::fmt::Debug;

/// # A pluggable session storage adapter
///
/// Every adapter owns the data of exactly one logical session and
/// walks the same lifecycle: not started, started, and back to not
/// started after [`save`](SessionAdapter::save) or
/// [`destroy`](SessionAdapter::destroy). Misuse surfaces as a typed
/// [`Error`] on every adapter alike:
///
/// * starting twice is [`Error::AlreadyStarted`]
/// * regenerating the id of an inactive session is [`Error::NotStarted`]
/// * renaming an active session is [`Error::InvalidStateTransition`]
/// * destroying an inactive session is a no-op
pub trait SessionAdapter: KeyValueStore + Debug + Send + Sync {
    /// Starts the session, assigning an id if none was set
    fn start(&mut self) -> Result<()>;

    /// Checks if the session was started
    fn is_started(&self) -> bool;

    /// Migrates the session to a fresh id while keeping every entry.
    /// The new id never equals the old one.
    fn regenerate_id(&mut self) -> Result<()>;

    /// Clears every entry, invalidates the current id and ends the
    /// session. Calling it on an inactive session does nothing.
    fn destroy(&mut self) -> Result<()>;

    /// Returns the session id
    fn id(&self) -> &str;

    /// Sets the session id. Fails while the session is active
    fn set_id(&mut self, id: String) -> Result<()>;

    /// Returns the session name
    fn name(&self) -> &str;

    /// Sets the session name. Fails while the session is active
    fn set_name(&mut self, name: String) -> Result<()>;

    /// Flushes the data to the backing medium and releases it
    fn save(&mut self) -> Result<()>;

    /// Applies runtime options. Unrecognized keys are kept as-is
    fn set_options(&mut self, config: Map<String, Value>) -> Result<()>;

    /// Returns the runtime options
    fn options(&self) -> &SessionOptions;

    /// Sets the cookie attributes
    fn set_cookie_params(&mut self, params: CookieParams);

    /// Returns the cookie attributes
    fn cookie_params(&self) -> &CookieParams {
        &self.options().cookie
    }

    /// Drains the Set-Cookie directives this adapter queued for the
    /// current response. Adapters without a client side have none.
    fn take_cookies(&mut self) -> Vec<Cookie<'static>> {
        Vec::new()
    }
}

/// identity, state and options shared by the concrete adapters
#[derive(Clone, Debug, Default)]
pub(crate) struct Lifecycle {
    pub(crate) id: String,
    pub(crate) started: bool,
    pub(crate) options: SessionOptions,
}

impl Lifecycle {
    pub(crate) fn new(options: SessionOptions) -> Self {
        Self {
            id: String::new(),
            started: false,
            options,
        }
    }

    pub(crate) fn ensure_started(&self) -> Result<()> {
        if self.started {
            Ok(())
        } else {
            Err(Error::NotStarted)
        }
    }

    pub(crate) fn ensure_not_started(&self) -> Result<()> {
        if self.started {
            Err(Error::AlreadyStarted)
        } else {
            Ok(())
        }
    }

    pub(crate) fn set_id(&mut self, id: String) -> Result<()> {
        if self.started {
            return Err(Error::InvalidStateTransition(
                "cannot change session id when session is active",
            ));
        }
        self.id = id;
        Ok(())
    }

    pub(crate) fn set_name(&mut self, name: String) -> Result<()> {
        if self.started {
            return Err(Error::InvalidStateTransition(
                "cannot change session name when session is active",
            ));
        }
        self.options.name = name;
        Ok(())
    }

    pub(crate) fn set_options(&mut self, config: Map<String, Value>) -> Result<()> {
        if self.started && config.contains_key("name") {
            return Err(Error::InvalidStateTransition(
                "cannot change session name when session is active",
            ));
        }
        self.options.apply(config)
    }

    /// replaces the id with a fresh one and returns the previous id
    pub(crate) fn regenerate(&mut self) -> String {
        let fresh = generate_id(&self.id);
        std::mem::replace(&mut self.id, fresh)
    }
}

/// generates a random, url safe session id that differs from `previous`
pub(crate) fn generate_id(previous: &str) -> String {
    loop {
        let mut key = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut key);
        let id = BASE64.encode(key);
        if id != previous {
            return id;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_url_safe_and_distinct() {
        let first = generate_id("");
        let second = generate_id(&first);
        assert_ne!(first, second);
        assert_eq!(first.len(), 43);
        assert!(first
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn identity_is_frozen_while_started() {
        let mut lifecycle = Lifecycle::new(SessionOptions::default());
        lifecycle.started = true;
        assert!(matches!(
            lifecycle.set_id("x".into()),
            Err(Error::InvalidStateTransition(_))
        ));
        assert!(matches!(
            lifecycle.set_name("x".into()),
            Err(Error::InvalidStateTransition(_))
        ));

        let mut config = Map::new();
        config.insert("name".into(), Value::from("x"));
        assert!(lifecycle.set_options(config).is_err());

        let mut config = Map::new();
        config.insert("gc_divisor".into(), Value::from(10));
        assert!(lifecycle.set_options(config).is_ok());
        assert_eq!(lifecycle.options.gc_divisor, 10);
    }

    #[test]
    fn regenerate_returns_the_previous_id() {
        let mut lifecycle = Lifecycle::new(SessionOptions::default());
        lifecycle.id = "old".into();
        assert_eq!(lifecycle.regenerate(), "old");
        assert_ne!(lifecycle.id, "old");
    }
}
