//! K-of-N vaults: the master key is split into shares, one per token.
//!
//! There is no incremental add or delete here. Changing any share requires
//! possession of the master key and a full re-split, so the share set is
//! fixed at initialization and only `reset` discards it.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::capabilities::Prompt;
use crate::config::CoreConfig;
use crate::envelope::{self, MasterKey};
use crate::error::{Error, Result};
use crate::shamir;
use crate::token::{self, TokenProvider, SELECT_TIMEOUT};

use super::types::{CredentialId, VaultBase, VaultHeader, VaultKind};
use super::{read_or_generate_master_key, wait_ready};

/// A vault requiring `k` of `n` enrolled tokens to unlock.
///
/// Each share header wraps one Shamir share of the master key; the share's
/// x-coordinate is the key of the `shares` map, fixed at enrollment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdVault {
    /// Common vault fields.
    #[serde(flatten)]
    pub base: VaultBase,
    /// Shares required to unlock.
    pub k: u8,
    /// Total shares enrolled.
    pub n: u8,
    /// Share headers by share index (`1..=n`).
    pub shares: BTreeMap<u8, VaultHeader>,
}

impl ThresholdVault {
    /// Creates an empty, uninitialized threshold vault.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::ThresholdOutOfRange`] unless `2 <= k <= n`, and
    /// with [`Error::Rng`] if no id randomness is available.
    pub fn create(
        name: impl Into<String>,
        description: Option<String>,
        k: u8,
        n: u8,
    ) -> Result<Self> {
        if k < 2 || n < k {
            return Err(Error::ThresholdOutOfRange { k, n });
        }
        Ok(Self {
            base: VaultBase::new(VaultKind::Shamir, name.into(), description)?,
            k,
            n,
            shares: BTreeMap::new(),
        })
    }

    /// True once all `n` shares are enrolled.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.shares.len() == usize::from(self.n)
    }

    /// Splits the master key and enrolls all `n` tokens in one sitting.
    ///
    /// Every token must be available during the call: each share is sealed
    /// under a freshly made credential on the next presented token. The
    /// share index is persisted as the map key at enrollment and is the
    /// only index `unlock` ever trusts. Headers are staged and committed
    /// together, so a failure part-way leaves the vault unchanged.
    ///
    /// # Errors
    ///
    /// Token, prompt, split and envelope failures, unchanged.
    pub fn initialize(
        &mut self,
        provider: &dyn TokenProvider,
        prompt: &dyn Prompt,
        config: &CoreConfig,
    ) -> Result<()> {
        let master = read_or_generate_master_key(prompt)?;
        let split = shamir::split(master.as_bytes(), self.k, self.n)?;

        prompt.notify("You will now be walked through the process of adding keys to your vault.");
        prompt.notify("You will be asked to plug in each key you wish to add.");
        prompt.notify("Note that all keys must be present while creating a threshold vault.");

        let params = self.base.derivation_params();
        let mut staged: BTreeMap<u8, VaultHeader> = BTreeMap::new();
        for (index, share) in &split {
            wait_ready(
                provider,
                prompt,
                config,
                usize::from(self.n),
                "Insert the next key you want to use, then press ENTER.",
            )?;

            let mut token = provider.select(SELECT_TIMEOUT)?;
            let verification = token::resolve_verification(token.as_ref(), prompt, config)?;

            let attestation = token.make_credential(&params, &verification)?;
            log::debug!("credential for share {index}: {}", attestation.credential_id);

            let assertion = token.assert(
                &params,
                &verification,
                std::slice::from_ref(&attestation.credential_id),
            )?;
            let encrypted_key = envelope::seal(&assertion.hmac_secret, share)?;
            let name = prompt.ask("Enter a name for this key: ")?;

            staged.insert(
                *index,
                VaultHeader {
                    name,
                    credential_id: assertion.credential_id,
                    encrypted_key,
                },
            );
        }

        self.shares = staged;
        self.base.touch();
        Ok(())
    }

    /// Collects `k` distinct shares from presented tokens and recombines
    /// the master key.
    ///
    /// A token mapping to an index that was already collected notifies the
    /// user and re-prompts; it never counts twice.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::NotInitialized`] when no shares are enrolled,
    /// and with token, envelope or combine failures otherwise.
    pub fn unlock(
        &self,
        provider: &dyn TokenProvider,
        prompt: &dyn Prompt,
        config: &CoreConfig,
    ) -> Result<MasterKey> {
        if self.shares.is_empty() {
            return Err(Error::NotInitialized);
        }

        prompt.notify(&format!(
            "You must have at least {} of the {} enrolled keys to unlock the vault.",
            self.k, self.n
        ));

        let params = self.base.derivation_params();
        let credential_ids = self.credential_ids();

        let mut collected: BTreeMap<u8, Vec<u8>> = BTreeMap::new();
        while collected.len() < usize::from(self.k) {
            wait_ready(
                provider,
                prompt,
                config,
                usize::from(self.k),
                "Insert the next key you want to use, then press ENTER.",
            )?;

            let mut token = provider.select(SELECT_TIMEOUT)?;
            let verification = token::resolve_verification(token.as_ref(), prompt, config)?;
            let assertion = token.assert(&params, &verification, &credential_ids)?;

            let (index, header) = self.share_by_credential(&assertion.credential_id)?;
            if collected.contains_key(&index) {
                prompt.notify("You already used this key. Select another key to unlock the vault.");
                continue;
            }

            let share = envelope::open(&assertion.hmac_secret, &header.encrypted_key)?;
            collected.insert(index, share);
        }

        let pairs: Vec<(u8, Vec<u8>)> = collected.into_iter().collect();
        Ok(MasterKey::from_bytes(shamir::combine(&pairs)?))
    }

    /// Discards every share, returning the vault to uninitialized.
    pub fn reset(&mut self) {
        self.shares.clear();
        self.base.touch();
    }

    /// Finds the share index and header enrolled for `credential_id`.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::NoHeader`] when no share matches.
    pub fn share_by_credential(
        &self,
        credential_id: &CredentialId,
    ) -> Result<(u8, &VaultHeader)> {
        self.shares
            .iter()
            .find(|(_, header)| &header.credential_id == credential_id)
            .map(|(index, header)| (*index, header))
            .ok_or(Error::NoHeader)
    }

    /// Credential ids of every enrolled token, taken from the share map's
    /// values directly.
    #[must_use]
    pub fn credential_ids(&self) -> Vec<CredentialId> {
        self.shares
            .values()
            .map(|header| header.credential_id.clone())
            .collect()
    }

    /// Integrity checks for the threshold form.
    ///
    /// # Errors
    ///
    /// One error per violated invariant: [`Error::ThresholdOutOfRange`] for
    /// the k/n bounds, [`Error::ShareCountMismatch`] for a partial share
    /// set, [`Error::Corrupt`] naming the field otherwise.
    pub fn verify(&self) -> Result<()> {
        self.base.verify()?;
        if self.base.kind != VaultKind::Shamir {
            return Err(Error::corrupt("type"));
        }
        if self.k < 2 || self.n < self.k {
            return Err(Error::ThresholdOutOfRange { k: self.k, n: self.n });
        }
        // Zero shares means uninitialized; anything else must be exactly n.
        if !self.shares.is_empty() && self.shares.len() != usize::from(self.n) {
            return Err(Error::ShareCountMismatch {
                count: self.shares.len(),
                n: self.n,
            });
        }

        let mut seen = HashSet::new();
        for (index, header) in &self.shares {
            if *index == 0 || *index > self.n {
                return Err(Error::corrupt("share_index"));
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
