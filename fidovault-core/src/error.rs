//! Error types for vault operations.

use thiserror::Error;

/// Result type for vault operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the vault engines and their collaborators.
///
/// The unlock loop of a simple vault recovers from [`Error::NoCredentials`]
/// by re-prompting; every other consumer treats every variant as fatal and
/// surfaces it unchanged.
#[derive(Debug, Error)]
pub enum Error {
    /// No FIDO2 token is attached.
    #[error("no device")]
    NoDevice,

    /// The user cancelled at a prompt.
    #[error("aborted by user")]
    UserAbort,

    /// The token holds none of the supplied credential ids.
    #[error("no credentials")]
    NoCredentials,

    /// AEAD authentication failure: wrong key, tampered or truncated data.
    #[error("decryption failed")]
    Decrypt,

    /// Sealed input shorter than the nonce prefix.
    #[error("ciphertext too short: {len} bytes, need at least {min}")]
    ShortCiphertext {
        /// Length of the rejected input.
        len: usize,
        /// Minimum sealed length.
        min: usize,
    },

    /// The system RNG could not produce randomness.
    #[error("random number generator failure")]
    Rng,

    /// Cryptographic primitive failure outside the taxonomy above.
    #[error("crypto error: {0}")]
    Crypto(String),

    /// Vault document version outside the supported range.
    #[error("invalid vault version: {found}")]
    InvalidVersion {
        /// Version found in the document.
        found: i64,
    },

    /// Unrecognized vault type tag.
    #[error("unknown vault type: {found}")]
    UnknownType {
        /// Tag found in the document.
        found: String,
    },

    /// An integrity check failed.
    #[error("vault corrupted: {field}")]
    Corrupt {
        /// The field violating its invariant.
        field: String,
    },

    /// Header lookup by name or credential id failed.
    #[error("no header")]
    NoHeader,

    /// Unlock attempted on a vault with no enrolled tokens.
    #[error("vault is not initialized")]
    NotInitialized,

    /// k/n outside `2 <= k <= n <= 255`.
    #[error("threshold out of range: k={k}, n={n}")]
    ThresholdOutOfRange {
        /// Shares required to unlock.
        k: u8,
        /// Total shares.
        n: u8,
    },

    /// Number of enrolled shares disagrees with `n`.
    #[error("share count mismatch: {count} shares, n={n}")]
    ShareCountMismatch {
        /// Shares present.
        count: usize,
        /// Shares expected.
        n: u8,
    },

    /// Too few shares to interpolate.
    #[error("insufficient shares: {provided} provided, {required} required")]
    InsufficientShares {
        /// Shares provided.
        provided: usize,
        /// Structural minimum.
        required: usize,
    },

    /// Shares of differing lengths cannot be combined.
    #[error("share length mismatch: expected {expected}, found {found}")]
    ShareLength {
        /// Length of the first share.
        expected: usize,
        /// Length of the disagreeing share.
        found: usize,
    },

    /// Two shares carry the same x-coordinate.
    #[error("duplicate share index: {0}")]
    DuplicateIndex(u8),

    /// Share index 0 is the secret itself and never a valid tag.
    #[error("invalid share index: {0}")]
    InvalidShareIndex(u8),

    /// Biometrics are unavailable or disabled and the token has no PIN.
    #[error("token supports no permitted user verification method")]
    NoUv,

    /// The token backend reported an error.
    #[error("token error: {0}")]
    Token(String),

    /// Invalid hex input.
    #[error("invalid hex input: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    /// JSON (de)serialization failure.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Store I/O failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Creates a corruption error naming the offending field.
    pub fn corrupt(field: impl Into<String>) -> Self {
        Self::Corrupt {
            field: field.into(),
        }
    }
}
