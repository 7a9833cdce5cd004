use crate::{Error, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};

/// Attributes of the session cookie
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CookieParams {
    /// lifetime of the cookie in seconds. zero means "until the browser closes"
    pub lifetime: i64,
    /// the path the cookie is scoped to
    pub path: String,
    /// the domain the cookie is scoped to. empty means the current host
    pub domain: String,
    /// only send the cookie over secure connections
    pub secure: bool,
    /// hide the cookie from client-side scripts
    #[serde(rename = "httponly", alias = "http_only")]
    pub http_only: bool,
}

impl Default for CookieParams {
    fn default() -> Self {
        Self {
            lifetime: 0,
            path: "/".into(),
            domain: String::new(),
            secure: false,
            http_only: true,
        }
    }
}

/// # Session runtime options
///
/// Recognized keys map onto typed fields; any other key is kept in
/// [`SessionOptions::extra`] untouched, for the caller to read back
/// through `options()` and [`SessionOptions::to_map`]. Options
/// deserialize with defaults, so a partial config document is enough:
///
/// ```rust
/// # use scoped_session::SessionOptions;
/// let options: SessionOptions =
///     serde_json::from_str(r#"{ "name": "sid", "gc_maxlifetime": 60, "sid_length": 48 }"#).unwrap();
/// assert_eq!(options.name, "sid");
/// assert_eq!(options.gc_maxlifetime, 60);
/// assert_eq!(options.cookie.path, "/");
/// assert_eq!(options.extra["sid_length"], 48);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    /// the cookie name the session id travels under
    pub name: String,
    /// cookie attributes
    #[serde(flatten)]
    pub cookie: CookieParams,
    /// cache control policy for session pages
    pub cache_limiter: String,
    /// whether the session id is transported in a cookie
    pub use_cookies: bool,
    /// numerator of the chance that a start runs garbage collection
    pub gc_probability: u32,
    /// denominator of the chance that a start runs garbage collection
    pub gc_divisor: u32,
    /// seconds after which an idle record is considered garbage
    pub gc_maxlifetime: u64,
    /// unrecognized options, kept as given
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            name: "app".into(),
            cookie: CookieParams::default(),
            cache_limiter: "nocache".into(),
            use_cookies: true,
            gc_probability: 1,
            gc_divisor: 100,
            gc_maxlifetime: 1440,
            extra: Map::new(),
        }
    }
}

impl SessionOptions {
    /// applies every entry of `config`. a recognized key holding a
    /// value of the wrong type fails with [`Error::InvalidOption`] and
    /// leaves the remaining entries unapplied.
    pub fn apply(&mut self, config: Map<String, Value>) -> Result<()> {
        for (key, value) in config {
            self.apply_one(key, value)?;
        }
        Ok(())
    }

    /// the same options flattened into a json object
    pub fn to_map(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    fn apply_one(&mut self, key: String, value: Value) -> Result<()> {
        match key.as_str() {
            "name" => self.name = typed(&key, value)?,
            "lifetime" => self.cookie.lifetime = typed(&key, value)?,
            "path" => self.cookie.path = typed(&key, value)?,
            "domain" => self.cookie.domain = typed(&key, value)?,
            "secure" => self.cookie.secure = typed(&key, value)?,
            "httponly" | "http_only" => self.cookie.http_only = typed(&key, value)?,
            "cache_limiter" => self.cache_limiter = typed(&key, value)?,
            "use_cookies" => self.use_cookies = typed(&key, value)?,
            "gc_probability" => self.gc_probability = typed(&key, value)?,
            "gc_divisor" => self.gc_divisor = typed(&key, value)?,
            "gc_maxlifetime" => self.gc_maxlifetime = typed(&key, value)?,
            _ => {
                self.extra.insert(key, value);
            }
        }
        Ok(())
    }
}

fn typed<T: DeserializeOwned>(key: &str, value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|_| Error::InvalidOption {
        key: key.to_string(),
    })
}
