//! FIDO2 token abstraction.
//!
//! Engines reach hardware only through [`TokenProvider`] and [`Token`]. The
//! wrapping key for every header comes from the CTAP2 `hmac-secret`
//! extension: for a fixed (token, credential, relying party, client data
//! hash, salt) tuple and a successful user verification, the output is
//! constant across invocations and across hosts. That determinism is what
//! makes persistent wrapping possible.

#[cfg(feature = "hid")]
pub mod hid;
pub mod soft;

use std::fmt;
use std::time::Duration;

use sha2::{Digest, Sha256};

use crate::capabilities::Prompt;
use crate::config::CoreConfig;
use crate::envelope::DerivedKey;
use crate::error::{Error, Result};
use crate::vault::{CredentialId, RP_NAME};

/// How long a multi-device selection waits for the user.
pub const SELECT_TIMEOUT: Duration = Duration::from_secs(30);

/// User id presented at enrollment. Not retained on the token because the
/// credential is non-resident.
pub const USER_ID: &[u8] = b"n/a";

/// User name presented at enrollment.
pub const USER_NAME: &str = "n/a";

/// Where a token is attached, and what the transport reports about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceLocation {
    /// Backend-specific path or identifier.
    pub path: String,
    /// Manufacturer string; empty when the transport does not report one.
    pub manufacturer: String,
    /// Human-readable product string.
    pub product: String,
    /// USB vendor id.
    pub vendor_id: u16,
    /// USB product id.
    pub product_id: u16,
}

impl fmt::Display for DeviceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}:{}] {} ({})",
            self.manufacturer, self.vendor_id, self.product, self.product_id
        )
    }
}

/// Capability options a token advertises.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenCapabilities {
    /// `clientPin`: a PIN is set on the token.
    pub client_pin: bool,
    /// `bioEnroll`: on-token biometrics are enrolled.
    pub bio_enroll: bool,
}

/// Resolved user verification method for one token.
#[derive(Clone, PartialEq, Eq)]
pub enum Verification {
    /// Verify on the token with a fingerprint or equivalent.
    Biometric,
    /// Verify with the client PIN.
    Pin(String),
}

impl fmt::Debug for Verification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Biometric => write!(f, "Biometric"),
            Self::Pin(_) => write!(f, "Pin([REDACTED])"),
        }
    }
}

/// Enrollment artifact from `make_credential`.
#[derive(Debug, Clone)]
pub struct Attestation {
    /// Token-minted identifier for the new non-resident credential.
    pub credential_id: CredentialId,
}

/// Assertion carrying the derived wrapping key.
#[derive(Debug)]
pub struct Assertion {
    /// The credential the token answered for, exactly one of those allowed.
    pub credential_id: CredentialId,
    /// The 32-byte `hmac-secret` output.
    pub hmac_secret: DerivedKey,
}

/// FIDO2 parameters derived from a vault's stored literals.
///
/// Changing any input invalidates every header sealed under the old values.
#[derive(Debug, Clone)]
pub struct DerivationParams {
    /// SHA-256 of the vault's client data hash literal.
    pub client_data_hash: [u8; 32],
    /// SHA-256 of the vault's salt literal; the `hmac-secret` input.
    pub hmac_salt: [u8; 32],
    /// Relying party id namespacing the credentials.
    pub rp_id: String,
    /// Relying party display name.
    pub rp_name: String,
}

impl DerivationParams {
    /// Hashes the vault literals into wire-exact FIDO2 inputs.
    #[must_use]
    pub fn new(client_data_hash_text: &str, salt_text: &str, rp_id: &str) -> Self {
        Self {
            client_data_hash: Sha256::digest(client_data_hash_text.as_bytes()).into(),
            hmac_salt: Sha256::digest(salt_text.as_bytes()).into(),
            rp_id: rp_id.to_string(),
            rp_name: RP_NAME.to_string(),
        }
    }
}

/// One attached FIDO2 token.
pub trait Token {
    /// Where the token is attached.
    fn location(&self) -> &DeviceLocation;

    /// Reads the token's advertised capability options.
    ///
    /// # Errors
    ///
    /// Fails if the token cannot be queried.
    fn capabilities(&self) -> Result<TokenCapabilities>;

    /// Creates a non-resident ES256 credential with the `hmac-secret`
    /// extension enabled and user verification required.
    ///
    /// # Errors
    ///
    /// Fails if the token refuses or the user does not verify.
    fn make_credential(
        &mut self,
        params: &DerivationParams,
        verification: &Verification,
    ) -> Result<Attestation>;

    /// Requests an assertion with the `hmac-secret` extension, bounded to
    /// the allowed `credential_ids`. The token answers for exactly one of
    /// them.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::NoCredentials`] when the token holds none of the
    /// allowed credentials.
    fn assert(
        &mut self,
        params: &DerivationParams,
        verification: &Verification,
        credential_ids: &[CredentialId],
    ) -> Result<Assertion>;
}

/// Access to attached tokens.
pub trait TokenProvider {
    /// Lists attached tokens.
    ///
    /// # Errors
    ///
    /// Fails if the backend cannot enumerate devices.
    fn enumerate(&self) -> Result<Vec<DeviceLocation>>;

    /// Picks one token: zero attached fails with [`Error::NoDevice`], one
    /// is returned directly, more than one involves the user, giving up
    /// after `timeout`.
    ///
    /// # Errors
    ///
    /// [`Error::NoDevice`] when nothing usable is attached.
    fn select(&self, timeout: Duration) -> Result<Box<dyn Token>>;
}

/// Decides how the user verifies on `token`.
///
/// Biometric wins when the token has biometrics enrolled and they are not
/// globally disabled; otherwise a PIN is collected when one is set. A token
/// offering neither fails: user verification is required for every
/// operation here.
///
/// # Errors
///
/// Fails with [`Error::NoUv`] when no permitted method remains.
pub fn resolve_verification(
    token: &dyn Token,
    prompt: &dyn Prompt,
    config: &CoreConfig,
) -> Result<Verification> {
    let caps = token.capabilities()?;
    log::debug!(
        "token options: clientPin={} bioEnroll={}",
        caps.client_pin,
        caps.bio_enroll
    );

    // Biometric-only token with biometrics disabled: nothing to fall back
    // to. Rare, but the failure must be explicit.
    if caps.bio_enroll && !caps.client_pin && config.disable_biometrics {
        return Err(Error::NoUv);
    }
    if caps.bio_enroll && !config.disable_biometrics {
        return Ok(Verification::Biometric);
    }
    if !caps.client_pin {
        return Err(Error::NoUv);
    }

    let pin = prompt.ask_secret("Enter PIN: ")?;
    Ok(Verification::Pin(pin))
}
