use crate::{
    CookieParams, Error, KeyValueStore, NativeAdapter, Result, SessionAdapter, SessionOptions,
};
use aes::Aes256;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use cookie::Cookie;
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde_json::{Map, Value};
use sha2::Sha256;
use std::fmt;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;
type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// The minimum length in bytes of the key given to
/// [`EncryptedNativeAdapter::new`]
pub const MIN_KEY_LEN: usize = 64;

const CIPHER_KEY_LEN: usize = 32;
const MAC_LEN: usize = 32;
const IV_LEN: usize = 16;

struct SessionKey {
    encryption: [u8; CIPHER_KEY_LEN],
    authentication: Vec<u8>,
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionKey(..)")
    }
}

/// # Encrypted native session adapter
///
/// Wraps a [`NativeAdapter`] and encrypts every value before it
/// reaches the medium. The first 32 bytes of the key encrypt with
/// AES-256-CBC, the rest authenticate with HMAC-SHA256. A stored value
/// is the base64 of `HMAC || IV || ciphertext`, where the mac covers
/// `IV || ciphertext` and is checked in constant time before anything
/// is decrypted. A value that fails the check is an
/// [`Error::AuthenticationFailure`], never a default.
///
/// ```rust
/// # use scoped_session::{EncryptedNativeAdapter, KeyValueStore, NativeAdapter, NativeMedium, SessionAdapter};
/// # fn main() -> scoped_session::Result<()> {
/// let key = [42u8; 64];
/// let mut adapter = EncryptedNativeAdapter::new(NativeAdapter::new(NativeMedium::new()), &key)?;
/// adapter.start()?;
/// adapter.insert_value("secret", "value".into())?;
/// assert_eq!(adapter.get_value("secret")?, Some("value".into()));
/// assert_ne!(adapter.inner().get_value("secret")?, Some("value".into()));
///
/// assert!(EncryptedNativeAdapter::new(NativeAdapter::new(NativeMedium::new()), &[0; 32]).is_err());
/// # Ok(()) }
/// ```
#[derive(Debug)]
pub struct EncryptedNativeAdapter {
    inner: NativeAdapter,
    key: SessionKey,
}

impl EncryptedNativeAdapter {
    /// Wraps `inner`. Fails with [`Error::InvalidKeyMaterial`] if `key`
    /// is shorter than [`MIN_KEY_LEN`].
    pub fn new(inner: NativeAdapter, key: &[u8]) -> Result<Self> {
        if key.len() < MIN_KEY_LEN {
            return Err(Error::InvalidKeyMaterial { len: key.len() });
        }
        let (encryption, authentication) = key.split_at(CIPHER_KEY_LEN);
        let mut cipher_key = [0u8; CIPHER_KEY_LEN];
        cipher_key.copy_from_slice(encryption);

        Ok(Self {
            inner,
            key: SessionKey {
                encryption: cipher_key,
                authentication: authentication.to_vec(),
            },
        })
    }

    /// Borrow the wrapped adapter. Values read through it are ciphertext.
    pub fn inner(&self) -> &NativeAdapter {
        &self.inner
    }

    /// Mutably borrow the wrapped adapter
    pub fn inner_mut(&mut self) -> &mut NativeAdapter {
        &mut self.inner
    }

    fn mac(&self) -> Result<HmacSha256> {
        <HmacSha256 as Mac>::new_from_slice(&self.key.authentication).map_err(|_| {
            Error::InvalidKeyMaterial {
                len: CIPHER_KEY_LEN + self.key.authentication.len(),
            }
        })
    }

    fn encrypt(&self, value: &Value) -> Result<Value> {
        let plaintext = serde_json::to_vec(value)?;

        let mut iv = [0u8; IV_LEN];
        rand::thread_rng().fill_bytes(&mut iv);
        let ciphertext = Aes256CbcEnc::new(&self.key.encryption.into(), &iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(&plaintext);

        let mut mac = self.mac()?;
        mac.update(&iv);
        mac.update(&ciphertext);
        let tag = mac.finalize().into_bytes();

        let mut payload = Vec::with_capacity(MAC_LEN + IV_LEN + ciphertext.len());
        payload.extend_from_slice(&tag);
        payload.extend_from_slice(&iv);
        payload.extend_from_slice(&ciphertext);
        Ok(Value::String(BASE64.encode(payload)))
    }

    fn decrypt(&self, stored: &Value) -> Result<Value> {
        let Value::String(encoded) = stored else {
            return Err(Error::AuthenticationFailure);
        };
        let payload = BASE64
            .decode(encoded)
            .map_err(|_| Error::AuthenticationFailure)?;
        if payload.len() < MAC_LEN + IV_LEN {
            return Err(Error::AuthenticationFailure);
        }

        let (tag, authenticated) = payload.split_at(MAC_LEN);
        let mut mac = self.mac()?;
        mac.update(authenticated);
        let expected = mac.finalize().into_bytes();
        if expected.as_slice().ct_eq(tag).unwrap_u8() != 1 {
            log::warn!("session value failed authentication");
            return Err(Error::AuthenticationFailure);
        }

        let (iv, ciphertext) = authenticated.split_at(IV_LEN);
        let plaintext = Aes256CbcDec::new_from_slices(&self.key.encryption, iv)
            .map_err(|_| Error::Decryption)?
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| Error::Decryption)?;
        Ok(serde_json::from_slice(&plaintext)?)
    }
}

impl KeyValueStore for EncryptedNativeAdapter {
    fn get_value(&self, key: &str) -> Result<Option<Value>> {
        self.inner
            .get_value(key)?
            .map(|stored| self.decrypt(&stored))
            .transpose()
    }

    fn insert_value(&mut self, key: &str, value: Value) -> Result<()> {
        let encrypted = self.encrypt(&value)?;
        self.inner.insert_value(key, encrypted)
    }

    fn remove(&mut self, key: &str) {
        self.inner.remove(key)
    }

    fn contains_key(&self, key: &str) -> bool {
        self.inner.contains_key(key)
    }

    fn clear(&mut self) {
        self.inner.clear()
    }

    fn keys(&self) -> Vec<String> {
        self.inner.keys()
    }

    fn len(&self) -> usize {
        self.inner.len()
    }
}

impl SessionAdapter for EncryptedNativeAdapter {
    fn start(&mut self) -> Result<()> {
        self.inner.start()
    }

    fn is_started(&self) -> bool {
        self.inner.is_started()
    }

    fn regenerate_id(&mut self) -> Result<()> {
        self.inner.regenerate_id()
    }

    fn destroy(&mut self) -> Result<()> {
        self.inner.destroy()
    }

    fn id(&self) -> &str {
        self.inner.id()
    }

    fn set_id(&mut self, id: String) -> Result<()> {
        self.inner.set_id(id)
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn set_name(&mut self, name: String) -> Result<()> {
        self.inner.set_name(name)
    }

    fn save(&mut self) -> Result<()> {
        self.inner.save()
    }

    fn set_options(&mut self, config: Map<String, Value>) -> Result<()> {
        self.inner.set_options(config)
    }

    fn options(&self) -> &SessionOptions {
        self.inner.options()
    }

    fn set_cookie_params(&mut self, params: CookieParams) {
        self.inner.set_cookie_params(params)
    }

    fn take_cookies(&mut self) -> Vec<Cookie<'static>> {
        self.inner.take_cookies()
    }
}
