//! Shared vault document types.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::token::DerivationParams;

/// Latest vault document version this build understands.
pub const CURRENT_VAULT_VERSION: i64 = 0;

/// Default literal whose SHA-256 is passed as the FIDO2 clientDataHash.
pub const DEFAULT_CLIENT_DATA_HASH_TEXT: &str = "create-credential";

/// Default literal whose SHA-256 is the `hmac-secret` salt.
pub const DEFAULT_SALT_TEXT: &str = "vault-master-key";

/// Default relying party id namespacing credentials on the token.
pub const DEFAULT_RP_ID: &str = "crypto.zyte.dev";

/// Relying party display name; never retained on the token.
pub const RP_NAME: &str = "crypto";

/// Vault type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VaultKind {
    /// Any single enrolled token unlocks the vault.
    Simple,
    /// K of N enrolled tokens unlock the vault.
    Shamir,
}

impl fmt::Display for VaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Simple => write!(f, "simple"),
            Self::Shamir => write!(f, "shamir"),
        }
    }
}

/// Opaque token-generated identifier for a non-resident credential.
///
/// The token mints one at enrollment; it is required to request assertions
/// against that credential later and is otherwise meaningless to the host.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CredentialId(#[serde(with = "base64_bytes")] Vec<u8>);

impl CredentialId {
    /// Wraps raw credential id bytes.
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Returns the raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// True for a zero-length id, which no token ever mints.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Hex form for diagnostics.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl fmt::Debug for CredentialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CredentialId({})", self.to_hex())
    }
}

impl fmt::Display for CredentialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl AsRef<[u8]> for CredentialId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Creation and modification timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// When the vault was created.
    pub created: DateTime<Utc>,
    /// When the vault was last mutated.
    pub modified: DateTime<Utc>,
}

/// Per-token record holding the sealed master key or share.
///
/// Unlock re-derives the wrapping key from the token named by
/// `credential_id` and opens `encrypted_key` with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultHeader {
    /// User-chosen label, unique within the vault.
    pub name: String,
    /// Credential the header belongs to.
    pub credential_id: CredentialId,
    /// `nonce || ciphertext || tag` sealing the master key (simple vaults)
    /// or one Shamir share (threshold vaults) under the assertion's
    /// `hmac-secret` output.
    #[serde(with = "base64_bytes")]
    pub encrypted_key: Vec<u8>,
}

/// Fields common to both vault forms.
///
/// `client_data_hash`, `salt` and `rp_id` are stored as plaintext literals
/// so key derivation stays reproducible across installs; changing any of
/// them invalidates every header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultBase {
    /// Document format version.
    pub version: i64,
    /// Vault type tag.
    #[serde(rename = "type")]
    pub kind: VaultKind,
    /// Random identifier, generated at creation and never modified.
    pub id: String,
    /// Descriptive vault name.
    pub name: String,
    /// Optional free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Literal hashed into the FIDO2 clientDataHash.
    pub client_data_hash: String,
    /// Literal hashed into the `hmac-secret` salt.
    pub salt: String,
    /// Relying party id.
    pub rp_id: String,
    /// Timestamps.
    pub metadata: Metadata,
}

impl VaultBase {
    /// Creates a base with defaults, a fresh id and current timestamps.
    pub(crate) fn new(kind: VaultKind, name: String, description: Option<String>) -> Result<Self> {
        let now = Utc::now();
        Ok(Self {
            version: CURRENT_VAULT_VERSION,
            kind,
            id: random_id()?,
            name,
            description,
            client_data_hash: DEFAULT_CLIENT_DATA_HASH_TEXT.to_string(),
            salt: DEFAULT_SALT_TEXT.to_string(),
            rp_id: DEFAULT_RP_ID.to_string(),
            metadata: Metadata {
                created: now,
                modified: now,
            },
        })
    }

    /// Bumps the modified timestamp.
    pub(crate) fn touch(&mut self) {
        self.metadata.modified = Utc::now();
    }

    /// Hashes the stored literals into wire-exact FIDO2 parameters.
    #[must_use]
    pub fn derivation_params(&self) -> DerivationParams {
        DerivationParams::new(&self.client_data_hash, &self.salt, &self.rp_id)
    }

    /// Checks the base invariants, naming the offending field on failure.
    pub(crate) fn verify(&self) -> Result<()> {
        if self.version < 0 || self.version > CURRENT_VAULT_VERSION {
            return Err(Error::corrupt("version"));
        }
        if self.client_data_hash.is_empty() {
            return Err(Error::corrupt("client_data_hash"));
        }
        if self.salt.is_empty() {
            return Err(Error::corrupt("salt"));
        }
        if self.rp_id.is_empty() {
            return Err(Error::corrupt("rp_id"));
        }
        Ok(())
    }
}

/// 16 hex characters from 8 random bytes.
fn random_id() -> Result<String> {
    let mut buf = [0u8; 8];
    getrandom::getrandom(&mut buf).map_err(|_| Error::Rng)?;
    Ok(hex::encode(buf))
}

/// Standard-base64 encoding for byte fields in the JSON document.
pub(crate) mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        STANDARD.encode(bytes).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
