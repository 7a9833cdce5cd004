//! Request-scoped sessions.
//!
//! This crate puts one interface in front of several interchangeable
//! session storage adapters: an in-memory map, a native medium shared
//! by the process, and an encrypted variant of the native medium. On
//! top of the session data it offers one-shot flash messages.
//!
//! # Example
//!
//! ```
//! use scoped_session::{NativeMedium, Session};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // one medium per process, one session per request
//! let medium = NativeMedium::new();
//!
//! let mut session = Session::native(medium.clone());
//! session.start()?;
//! session.insert("user_id", 1)?;
//! session.flash().add("notice", "signed in")?;
//! session.save()?;
//!
//! // send this back to the client
//! let cookie = session.take_cookies().pop().unwrap();
//!
//! // the next request carries the cookie
//! let mut session = Session::native(medium);
//! session.set_id(cookie.value())?;
//! session.start()?;
//! assert_eq!(session.get::<usize>("user_id")?, Some(1));
//! assert_eq!(session.flash().get("notice")?, vec!["signed in".to_string()]);
//! assert!(session.flash().get("notice")?.is_empty());
//! # Ok(()) }
//! ```

#![forbid(unsafe_code)]
#![deny(
    future_incompatible,
    missing_debug_implementations,
    nonstandard_style,
    missing_docs,
    unreachable_pub,
    missing_copy_implementations,
    unused_qualifications
)]

mod adapter;
mod error;
mod flash;
mod middleware;
mod options;
mod session;
mod store;

#[cfg(feature = "encrypted-adapter")]
mod encrypted_adapter;
#[cfg(feature = "memory-adapter")]
mod memory_adapter;
#[cfg(feature = "native-adapter")]
mod native_adapter;

pub use adapter::SessionAdapter;
pub use error::{Error, Result};
pub use flash::{Flash, DEFAULT_FLASH_KEY};
pub use middleware::{Endpoint, SessionMiddleware};
pub use options::{CookieParams, SessionOptions};
pub use session::Session;
pub use store::{KeyValueStore, SessionData};

#[cfg(feature = "encrypted-adapter")]
pub use encrypted_adapter::{EncryptedNativeAdapter, MIN_KEY_LEN};
#[cfg(feature = "memory-adapter")]
pub use memory_adapter::MemoryAdapter;
#[cfg(feature = "native-adapter")]
pub use native_adapter::{NativeAdapter, NativeMedium};

pub use async_trait::async_trait;
pub use cookie;
