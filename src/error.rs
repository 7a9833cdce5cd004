/// All errors that can occur while driving a session
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// `start` was called on a session that is already active
    #[error("failed to start the session: already started")]
    AlreadyStarted,

    /// the operation requires an active session
    #[error("the session has not been started")]
    NotStarted,

    /// the identity of an active session cannot change
    #[error("{0}")]
    InvalidStateTransition(&'static str),

    /// the response output was already committed, so no cookie can be sent
    #[error("headers have already been sent")]
    HeadersAlreadySent,

    /// an encrypted value failed its integrity check
    #[error("session authentication failed: invalid hash value")]
    AuthenticationFailure,

    /// the encryption key is too short
    #[error("the session encryption key must be at least 64 bytes, got {len}")]
    InvalidKeyMaterial {
        /// length of the rejected key in bytes
        len: usize,
    },

    /// another adapter currently holds the record for this session id
    #[error("the session record is locked by another request")]
    Locked,

    /// an authenticated payload could not be decrypted
    #[error("the session value could not be decrypted")]
    Decryption,

    /// a recognized option was given a value of the wrong type
    #[error("invalid value for session option `{key}`")]
    InvalidOption {
        /// the offending option key
        key: String,
    },

    /// A json error
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Result alias used throughout this crate
pub type Result<T> = std::result::Result<T, Error>;
