//! 1-of-N vaults: any enrolled token unlocks the master key.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::capabilities::Prompt;
use crate::config::CoreConfig;
use crate::envelope::{self, MasterKey};
use crate::error::{Error, Result};
use crate::token::{self, TokenProvider, SELECT_TIMEOUT};

use super::types::{CredentialId, VaultBase, VaultHeader, VaultKind};
use super::{read_or_generate_master_key, wait_ready};

/// A vault whose every header independently wraps the same master key.
///
/// The master key exists nowhere in the document; each header carries it
/// sealed under the wrapping key derived from one enrolled token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimpleVault {
    /// Common vault fields.
    #[serde(flatten)]
    pub base: VaultBase,
    /// Headers by user-chosen name; any one of them unlocks the vault.
    pub headers: BTreeMap<String, VaultHeader>,
}

impl SimpleVault {
    /// Creates an empty simple vault.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Rng`] if no id randomness is available.
    pub fn create(name: impl Into<String>, description: Option<String>) -> Result<Self> {
        Ok(Self {
            base: VaultBase::new(VaultKind::Simple, name.into(), description)?,
            headers: BTreeMap::new(),
        })
    }

    /// Enrolls a new token.
    ///
    /// The first header seals a fresh or user-supplied master key. Every
    /// later header requires unlocking an existing one first, then
    /// re-seals the *same* master key: the key is never rotated, so old
    /// headers stay valid.
    ///
    /// On failure the vault is left unchanged.
    ///
    /// # Errors
    ///
    /// Token, prompt and envelope failures, unchanged.
    pub fn add(
        &mut self,
        provider: &dyn TokenProvider,
        prompt: &dyn Prompt,
        config: &CoreConfig,
    ) -> Result<()> {
        prompt.notify("Insert the FIDO2 key you want to add.");
        wait_ready(
            provider,
            prompt,
            config,
            1,
            "Press ENTER when you have inserted the key.",
        )?;

        let mut token = provider.select(SELECT_TIMEOUT)?;
        let verification = token::resolve_verification(token.as_ref(), prompt, config)?;
        let params = self.base.derivation_params();

        let attestation = token.make_credential(&params, &verification)?;
        log::debug!("new credential id: {}", attestation.credential_id);

        let assertion = token.assert(
            &params,
            &verification,
            std::slice::from_ref(&attestation.credential_id),
        )?;
        let name = prompt.ask_non_empty("Enter a name for this key: ")?;

        let master = if self.headers.is_empty() {
            read_or_generate_master_key(prompt)?
        } else {
            self.recover_master_key(provider, prompt, config)?
        };

        let encrypted_key = envelope::seal(&assertion.hmac_secret, master.as_bytes())?;
        self.headers.insert(
            name.clone(),
            VaultHeader {
                name,
                credential_id: attestation.credential_id,
                encrypted_key,
            },
        );
        self.base.touch();
        Ok(())
    }

    /// Unlocks an existing header to recover the master key, so a new
    /// header can re-seal it.
    fn recover_master_key(
        &self,
        provider: &dyn TokenProvider,
        prompt: &dyn Prompt,
        config: &CoreConfig,
    ) -> Result<MasterKey> {
        prompt.notify("Please unlock one of the existing headers to recover the vault master key.");
        prompt.notify(&format!("Existing keys: {}", self.header_names().join(", ")));
        wait_ready(
            provider,
            prompt,
            config,
            1,
            "Press ENTER to continue once you have plugged in an existing key.",
        )?;

        let mut token = provider.select(SELECT_TIMEOUT)?;
        let verification = token::resolve_verification(token.as_ref(), prompt, config)?;
        let params = self.base.derivation_params();
        let assertion = token.assert(&params, &verification, &self.credential_ids())?;

        let header = self.header_by_credential(&assertion.credential_id)?;
        let master = envelope::open(&assertion.hmac_secret, &header.encrypted_key)?;
        Ok(MasterKey::from_bytes(master))
    }

    /// Removes the header named `name`.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::NoHeader`] when no such header exists.
    pub fn delete(&mut self, name: &str) -> Result<()> {
        if self.headers.remove(name).is_none() {
            return Err(Error::NoHeader);
        }
        self.base.touch();
        Ok(())
    }

    /// Unlocks the master key with any enrolled token.
    ///
    /// A presented token that is not enrolled re-prompts instead of
    /// failing the whole call; every other error is fatal.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::NotInitialized`] when no header exists yet, and
    /// with token or envelope failures otherwise.
    pub fn unlock(
        &self,
        provider: &dyn TokenProvider,
        prompt: &dyn Prompt,
        config: &CoreConfig,
    ) -> Result<MasterKey> {
        if self.headers.is_empty() {
            return Err(Error::NotInitialized);
        }

        let params = self.base.derivation_params();
        let credential_ids = self.credential_ids();

        let assertion = loop {
            wait_ready(
                provider,
                prompt,
                config,
                1,
                "Insert an enrolled FIDO2 key, then press ENTER.",
            )?;
            let mut token = provider.select(SELECT_TIMEOUT)?;
            let verification = token::resolve_verification(token.as_ref(), prompt, config)?;
            match token.assert(&params, &verification, &credential_ids) {
                Ok(assertion) => break assertion,
                Err(Error::NoCredentials) => {
                    prompt.notify(
                        "No credentials found: this key is not enrolled in the vault. Try another.",
                    );
                }
                Err(err) => return Err(err),
            }
        };

        let header = self.header_by_credential(&assertion.credential_id)?;
        let master = envelope::open(&assertion.hmac_secret, &header.encrypted_key)?;
        Ok(MasterKey::from_bytes(master))
    }

    /// Removes every header, returning the vault to its empty state.
    pub fn reset(&mut self) {
        self.headers.clear();
        self.base.touch();
    }

    /// Header names in map order.
    #[must_use]
    pub fn header_names(&self) -> Vec<String> {
        self.headers.keys().cloned().collect()
    }

    /// Finds the header enrolled for `credential_id`.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::NoHeader`] when no header matches.
    pub fn header_by_credential(&self, credential_id: &CredentialId) -> Result<&VaultHeader> {
        self.headers
            .values()
            .find(|header| &header.credential_id == credential_id)
            .ok_or(Error::NoHeader)
    }

    /// Credential ids of every enrolled token.
    #[must_use]
    pub fn credential_ids(&self) -> Vec<CredentialId> {
        self.headers
            .values()
            .map(|header| header.credential_id.clone())
            .collect()
    }

    /// Integrity checks for the simple form.
    ///
    /// # Errors
    ///
    /// One [`Error::Corrupt`] per violated invariant, naming the field.
    pub fn verify(&self) -> Result<()> {
        self.base.verify()?;
        if self.base.kind != VaultKind::Simple {
            return Err(Error::corrupt("type"));
        }

        let mut seen = HashSet::new();
        for (key, header) in &self.headers {
            if key != &header.name {
                return Err(Error::corrupt("name"));
            }
            if header.credential_id.is_empty() {
                return Err(Error::corrupt("credential_id"));
            }
            if header.encrypted_key.is_empty() {
                return Err(Error::corrupt("encrypted_key"));
            }
            if !seen.insert(header.credential_id.as_bytes().to_vec()) {
                return Err(Error::corrupt("duplicate_credential_id"));
            }
        }
        Ok(())
    }
}
