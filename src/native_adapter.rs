use crate::adapter::{generate_id, Lifecycle};
use crate::{
    CookieParams, Error, KeyValueStore, Result, SessionAdapter, SessionData, SessionOptions,
};
use cookie::Cookie;
use dashmap::{mapref::entry::Entry, DashMap};
use rand::Rng;
use serde_json::{Map, Value};
use std::{collections::HashMap, sync::Arc, time::Duration};
use time::OffsetDateTime as DateTime;

/// how far in the past an invalidation cookie expires
const EXPIRED_COOKIE_AGE: time::Duration = time::Duration::seconds(42_000);

#[derive(Clone, Debug)]
struct Record {
    data: HashMap<String, Value>,
    last_access: DateTime,
    locked: bool,
}

impl Record {
    fn locked() -> Self {
        Self {
            data: HashMap::new(),
            last_access: DateTime::now_utc(),
            locked: true,
        }
    }

    fn is_idle_for(&self, max_lifetime: Duration, now: DateTime) -> bool {
        !self.locked && now - self.last_access > max_lifetime
    }
}

/// # The native session medium
///
/// The process-side half of native sessions: a shared association
/// from session id to session record. Cloning the medium clones a
/// handle to the same records, so one medium is created at startup
/// and handed to every [`NativeAdapter`].
///
/// Records are keyed by a blake3 hash of the session id, so the id
/// only ever exists in the client cookie and the live adapter.
///
/// While an adapter has a session started it holds that record's
/// lock. A second adapter starting the same id fails with
/// [`Error::Locked`] until the first one saves or destroys it.
#[derive(Default, Debug, Clone)]
pub struct NativeMedium(Arc<DashMap<String, Record>>);

impl NativeMedium {
    /// Create an empty medium
    pub fn new() -> Self {
        Self::default()
    }

    /// returns the number of records in the medium
    pub fn count(&self) -> usize {
        self.0.len()
    }

    /// whether a record exists for the session `id`
    pub fn contains(&self, id: &str) -> bool {
        self.0.contains_key(&record_key(id))
    }

    /// Empties the entire medium, dropping every record
    pub fn clear(&self) {
        log::trace!("clearing native medium");
        self.0.clear();
    }

    /// Removes every unlocked record that has been idle for longer
    /// than `max_lifetime`, returning how many were removed.
    pub fn cleanup(&self, max_lifetime: Duration) -> usize {
        log::trace!("cleaning up native medium...");
        let now = DateTime::now_utc();
        let before = self.0.len();
        self.0.retain(|_, record| !record.is_idle_for(max_lifetime, now));
        before.saturating_sub(self.0.len())
    }

    fn acquire(&self, id: &str) -> Result<SessionData> {
        log::trace!("acquiring session by id `{}`", id);
        match self.0.entry(record_key(id)) {
            Entry::Occupied(mut entry) => {
                let record = entry.get_mut();
                if record.locked {
                    return Err(Error::Locked);
                }
                record.locked = true;
                record.last_access = DateTime::now_utc();
                Ok(SessionData::from_map(record.data.clone()))
            }
            Entry::Vacant(entry) => {
                entry.insert(Record::locked());
                Ok(SessionData::new())
            }
        }
    }

    fn migrate(&self, old_id: &str, new_id: &str) -> Result<()> {
        log::trace!("migrating session `{}` -> `{}`", old_id, new_id);
        let new_key = record_key(new_id);
        match self.0.entry(new_key.clone()) {
            Entry::Occupied(_) => return Err(Error::Locked),
            Entry::Vacant(entry) => {
                entry.insert(Record::locked());
            }
        }
        if let Some((_, old)) = self.0.remove(&record_key(old_id)) {
            if let Some(mut record) = self.0.get_mut(&new_key) {
                record.data = old.data;
            }
        }
        Ok(())
    }

    fn write_close(&self, id: &str, data: &SessionData) {
        log::trace!("writing session by id `{}`", id);
        let mut record = self.0.entry(record_key(id)).or_insert_with(Record::locked);
        if data.data_changed() {
            record.data = data.as_map().clone();
        }
        record.last_access = DateTime::now_utc();
        record.locked = false;
    }

    fn remove(&self, id: &str) {
        log::trace!("destroying session by id `{}`", id);
        self.0.remove(&record_key(id));
    }
}

fn record_key(id: &str) -> String {
    blake3::hash(id.as_bytes()).to_hex().to_string()
}

/// # Native session adapter
///
/// Reads and writes session data through a [`NativeMedium`] and models
/// the response side explicitly: the session cookie is queued as a
/// Set-Cookie directive (drain them with
/// [`SessionAdapter::take_cookies`]), and once
/// [`NativeAdapter::commit_output`] has been called no further cookie
/// can be sent, so starting or regenerating fails with
/// [`Error::HeadersAlreadySent`]. Destroying after the output was
/// committed still clears the data and discards the record, then
/// reports [`Error::HeadersAlreadySent`] because the expiring cookie
/// could not be sent.
///
/// [`SessionAdapter::start`] acquires the record lock,
/// [`SessionAdapter::save`] writes the data back and releases it. An
/// adapter dropped while started saves itself.
///
/// ```rust
/// # use scoped_session::{KeyValueStore, NativeAdapter, NativeMedium, SessionAdapter};
/// # fn main() -> scoped_session::Result<()> {
/// let medium = NativeMedium::new();
///
/// let mut first = NativeAdapter::new(medium.clone());
/// first.start()?;
/// first.insert_value("user_id", 1.into())?;
/// first.save()?;
/// let cookie = first.take_cookies().pop().unwrap();
///
/// let mut second = NativeAdapter::new(medium);
/// second.set_id(cookie.value().to_string())?;
/// second.start()?;
/// assert_eq!(second.get_value("user_id")?, Some(1.into()));
/// # Ok(()) }
/// ```
#[derive(Debug)]
pub struct NativeAdapter {
    medium: NativeMedium,
    lifecycle: Lifecycle,
    data: SessionData,
    output_committed: bool,
    cookies: Vec<Cookie<'static>>,
}

impl NativeAdapter {
    /// Create an adapter over `medium` with default options
    pub fn new(medium: NativeMedium) -> Self {
        Self::with_options(medium, SessionOptions::default())
    }

    /// Create an adapter over `medium` with the given options
    pub fn with_options(medium: NativeMedium, options: SessionOptions) -> Self {
        Self {
            medium,
            lifecycle: Lifecycle::new(options),
            data: SessionData::new(),
            output_committed: false,
            cookies: Vec::new(),
        }
    }

    /// Marks the response output as sent. Cookies can no longer be set.
    pub fn commit_output(&mut self) {
        self.output_committed = true;
    }

    /// whether [`NativeAdapter::commit_output`] was called
    pub fn output_committed(&self) -> bool {
        self.output_committed
    }

    /// the medium this adapter reads from and writes to
    pub fn medium(&self) -> &NativeMedium {
        &self.medium
    }

    fn ensure_headers_open(&self) -> Result<()> {
        if self.output_committed && self.lifecycle.options.use_cookies {
            Err(Error::HeadersAlreadySent)
        } else {
            Ok(())
        }
    }

    fn queue_cookie(&mut self, expired: bool) {
        let options = &self.lifecycle.options;
        if !options.use_cookies {
            return;
        }
        let value = if expired {
            String::new()
        } else {
            self.lifecycle.id.clone()
        };
        self.cookies
            .push(session_cookie(&options.name, value, &options.cookie, expired));
    }

    fn collect_garbage(&self) {
        let options = &self.lifecycle.options;
        if options.gc_probability == 0 || options.gc_divisor == 0 {
            return;
        }
        if rand::thread_rng().gen_range(0..options.gc_divisor) < options.gc_probability {
            let removed = self
                .medium
                .cleanup(Duration::from_secs(options.gc_maxlifetime));
            log::trace!("garbage collection removed {} records", removed);
        }
    }
}

fn session_cookie(
    name: &str,
    value: String,
    params: &CookieParams,
    expired: bool,
) -> Cookie<'static> {
    let mut cookie = Cookie::new(name.to_string(), value);
    cookie.set_path(params.path.clone());
    if !params.domain.is_empty() {
        cookie.set_domain(params.domain.clone());
    }
    cookie.set_secure(params.secure);
    cookie.set_http_only(params.http_only);

    if expired {
        cookie.set_max_age(time::Duration::ZERO);
        cookie.set_expires(DateTime::now_utc() - EXPIRED_COOKIE_AGE);
    } else if params.lifetime > 0 {
        let lifetime = time::Duration::seconds(params.lifetime);
        cookie.set_max_age(lifetime);
        // Max-Age alone still bounds the cookie when Expires is unrepresentable
        if let Some(expires) = DateTime::now_utc().checked_add(lifetime) {
            cookie.set_expires(expires);
        }
    }
    cookie
}

impl KeyValueStore for NativeAdapter {
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

impl SessionAdapter for NativeAdapter {
    fn start(&mut self) -> Result<()> {
        self.lifecycle.ensure_not_started()?;
        self.ensure_headers_open()?;

        let fresh = self.lifecycle.id.is_empty();
        if fresh {
            self.lifecycle.regenerate();
        }
        self.data = self.medium.acquire(&self.lifecycle.id)?;
        self.lifecycle.started = true;
        log::trace!("started native session `{}`", self.lifecycle.id);

        self.collect_garbage();
        if fresh {
            self.queue_cookie(false);
        }
        Ok(())
    }

    fn is_started(&self) -> bool {
        self.lifecycle.started
    }

    fn regenerate_id(&mut self) -> Result<()> {
        self.lifecycle.ensure_started()?;
        self.ensure_headers_open()?;

        let fresh = generate_id(&self.lifecycle.id);
        self.medium.migrate(&self.lifecycle.id, &fresh)?;
        self.lifecycle.id = fresh;
        self.queue_cookie(false);
        Ok(())
    }

    fn destroy(&mut self) -> Result<()> {
        if !self.lifecycle.started {
            return Ok(());
        }
        let headers_open = self.ensure_headers_open();
        self.data.clear();
        if headers_open.is_ok() {
            self.queue_cookie(true);
        }
        self.medium.remove(&self.lifecycle.id);
        self.lifecycle.regenerate();
        self.lifecycle.started = false;
        headers_open
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
        if !self.lifecycle.started {
            return Ok(());
        }
        self.medium.write_close(&self.lifecycle.id, &self.data);
        self.data.reset_data_changed();
        self.lifecycle.started = false;
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

    fn take_cookies(&mut self) -> Vec<Cookie<'static>> {
        std::mem::take(&mut self.cookies)
    }
}

impl Drop for NativeAdapter {
    fn drop(&mut self) {
        if self.lifecycle.started {
            log::trace!("saving native session `{}` on drop", self.lifecycle.id);
            self.medium.write_close(&self.lifecycle.id, &self.data);
        }
    }
}
