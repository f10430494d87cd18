//! Vault documents: typed model, canonical JSON, versioning, integrity.
//!
//! A vault is a tagged union of the simple and threshold forms. Parsing is
//! two-phase: a tiny probe object decides the type and gates the version,
//! then the concrete form is deserialized. Serialization is canonical —
//! 4-space indent, trailing newline — so that parse and serialize are
//! inverses byte-for-byte.

mod simple;
mod threshold;
mod types;

pub use simple::SimpleVault;
pub use threshold::ThresholdVault;
pub use types::{
    CredentialId, Metadata, VaultBase, VaultHeader, VaultKind, CURRENT_VAULT_VERSION,
    DEFAULT_CLIENT_DATA_HASH_TEXT, DEFAULT_RP_ID, DEFAULT_SALT_TEXT, RP_NAME,
};

use serde::Deserialize;
use serde_json::ser::PrettyFormatter;

use crate::capabilities::{Prompt, Store};
use crate::config::CoreConfig;
use crate::envelope::MasterKey;
use crate::error::{Error, Result};
use crate::token::TokenProvider;

/// A parsed vault of either form.
#[derive(Debug, Clone, PartialEq)]
pub enum Vault {
    /// 1-of-N: any enrolled token unlocks.
    Simple(SimpleVault),
    /// K-of-N: a threshold of enrolled tokens unlocks.
    Threshold(ThresholdVault),
}

/// Probe object read before committing to a typed parse.
#[derive(Deserialize)]
struct Probe {
    #[serde(rename = "type")]
    kind: String,
    version: i64,
}

impl Vault {
    /// Parses a vault document.
    ///
    /// The version gate runs on the probe alone, before the typed body is
    /// deserialized.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidVersion`] outside `[0, CURRENT_VAULT_VERSION]`,
    /// [`Error::UnknownType`] for an unrecognized tag, [`Error::Json`] for
    /// malformed JSON.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let probe: Probe = serde_json::from_slice(data)?;
        if probe.version < 0 || probe.version > CURRENT_VAULT_VERSION {
            return Err(Error::InvalidVersion {
                found: probe.version,
            });
        }
        match probe.kind.as_str() {
            "simple" => Ok(Self::Simple(serde_json::from_slice(data)?)),
            "shamir" => Ok(Self::Threshold(serde_json::from_slice(data)?)),
            other => Err(Error::UnknownType {
                found: other.to_string(),
            }),
        }
    }

    /// Canonical serialization: 4-space indent, trailing newline.
    ///
    /// # Errors
    ///
    /// Fails only if a value refuses to serialize, which well-formed vaults
    /// never do.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let formatter = PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
        match self {
            Self::Simple(vault) => serde::Serialize::serialize(vault, &mut serializer)?,
            Self::Threshold(vault) => serde::Serialize::serialize(vault, &mut serializer)?,
        }
        out.push(b'\n');
        Ok(out)
    }

    /// The vault's type tag.
    #[must_use]
    pub const fn kind(&self) -> VaultKind {
        match self {
            Self::Simple(_) => VaultKind::Simple,
            Self::Threshold(_) => VaultKind::Shamir,
        }
    }

    /// The fields common to both forms.
    #[must_use]
    pub const fn base(&self) -> &VaultBase {
        match self {
            Self::Simple(vault) => &vault.base,
            Self::Threshold(vault) => &vault.base,
        }
    }

    /// Runs the integrity checks for the vault's form.
    ///
    /// # Errors
    ///
    /// One error per violated invariant, naming the offending field.
    pub fn verify(&self) -> Result<()> {
        match self {
            Self::Simple(vault) => vault.verify(),
            Self::Threshold(vault) => vault.verify(),
        }
    }
}

/// Loads and parses a vault, verifying integrity unless the config skips
/// it.
///
/// # Errors
///
/// Propagates store, parse and verification failures.
pub fn load_vault(store: &dyn Store, path: &str, config: &CoreConfig) -> Result<Vault> {
    let data = store.load(path)?;
    let vault = Vault::parse(&data)?;
    if config.skip_checks {
        log::warn!("integrity checks skipped for {path}");
    } else {
        vault.verify()?;
    }
    Ok(vault)
}

/// Serializes and persists a vault.
///
/// # Errors
///
/// Propagates serialization and store failures.
pub fn save_vault(store: &dyn Store, path: &str, vault: &Vault) -> Result<()> {
    store.save(path, &vault.to_json()?)
}

/// Waits for the user to plug in keys, unless enough devices are already
/// connected and assumptions are permitted.
fn wait_ready(
    provider: &dyn TokenProvider,
    prompt: &dyn Prompt,
    config: &CoreConfig,
    needed: usize,
    label: &str,
) -> Result<()> {
    if !config.make_assumptions || provider.enumerate()?.len() < needed {
        prompt.ask(label)?;
    }
    Ok(())
}

/// Label of the master key prompt at initialization.
///
/// Exported so outer layers can answer this one question from a file
/// (`--input`) instead of the terminal.
pub const MASTER_KEY_PROMPT: &str =
    "Enter a master key (hex), or leave blank to randomly generate one: ";

/// Asks for a hex master key; a blank line generates 32 random bytes and
/// echoes them so the user can store the key independently.
fn read_or_generate_master_key(prompt: &dyn Prompt) -> Result<MasterKey> {
    let line = prompt.ask(MASTER_KEY_PROMPT)?;
    if line.is_empty() {
        let master = MasterKey::generate()?;
        prompt.notify(&format!("Master Key: {}", master.to_hex()));
        Ok(master)
    } else {
        MasterKey::from_hex(&line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::soft::MemoryStore;

    fn simple_fixture() -> Vault {
        let mut vault = SimpleVault::create("laptop keys", Some("disk unlock".into())).unwrap();
        vault.headers.insert(
            "alpha".into(),
            VaultHeader {
                name: "alpha".into(),
                credential_id: CredentialId::new(vec![1, 2, 3, 4]),
                encrypted_key: vec![5; 48],
            },
        );
        Vault::Simple(vault)
    }

    fn threshold_fixture() -> Vault {
        let mut vault = ThresholdVault::create("backup", None, 2, 3).unwrap();
        for index in 1..=3u8 {
            vault.shares.insert(
                index,
                VaultHeader {
                    name: format!("share-{index}"),
                    credential_id: CredentialId::new(vec![index; 8]),
                    encrypted_key: vec![index; 48],
                },
            );
        }
        Vault::Threshold(vault)
    }

    #[test]
    fn parse_serialize_is_idempotent() {
        for vault in [simple_fixture(), threshold_fixture()] {
            let first = vault.to_json().unwrap();
            let reparsed = Vault::parse(&first).unwrap();
            assert_eq!(reparsed, vault);
            let second = reparsed.to_json().unwrap();
            assert_eq!(first, second, "canonical form must be stable");
        }
    }

    #[test]
    fn serialized_form_is_canonical() {
        let json = simple_fixture().to_json().unwrap();
        let text = String::from_utf8(json).unwrap();
        assert!(text.ends_with('\n'));
        assert!(text.contains("\n    \"version\": 0"));
    }

    #[test]
    fn threshold_share_keys_are_decimal_strings() {
        let json = threshold_fixture().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&json).unwrap();
        assert!(value["shares"]["1"].is_object());
        assert!(value["shares"]["3"].is_object());
        assert_eq!(value["k"], 2);
        assert_eq!(value["n"], 3);
    }

    #[test]
    fn byte_fields_are_base64() {
        let json = simple_fixture().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&json).unwrap();
        assert_eq!(value["headers"]["alpha"]["credential_id"], "AQIDBA==");
    }

    #[test]
    fn version_gate_runs_before_the_typed_parse() {
        // The body is not a valid vault of either type; the version gate
        // must reject the document before that matters.
        let doc = br#"{"type": "shamir", "version": 2}"#;
        assert!(matches!(
            Vault::parse(doc),
            Err(Error::InvalidVersion { found: 2 })
        ));

        let doc = br#"{"type": "simple", "version": -1}"#;
        assert!(matches!(
            Vault::parse(doc),
            Err(Error::InvalidVersion { found: -1 })
        ));
    }

    #[test]
    fn unknown_type_is_rejected() {
        let doc = br#"{"type": "sss", "version": 0}"#;
        match Vault::parse(doc) {
            Err(Error::UnknownType { found }) => assert_eq!(found, "sss"),
            other => panic!("expected UnknownType, got {other:?}"),
        }
    }

    #[test]
    fn malformed_json_is_a_json_error() {
        assert!(matches!(Vault::parse(b"{"), Err(Error::Json(_))));
    }

    #[test]
    fn load_vault_verifies_unless_skipped() {
        let store = MemoryStore::new();
        let mut vault = match threshold_fixture() {
            Vault::Threshold(v) => v,
            Vault::Simple(_) => unreachable!(),
        };
        vault.shares.get_mut(&2).unwrap().credential_id = CredentialId::new(Vec::new());
        save_vault(&store, "vault.json", &Vault::Threshold(vault)).unwrap();

        let config = CoreConfig::default();
        match load_vault(&store, "vault.json", &config) {
            Err(Error::Corrupt { field }) => assert_eq!(field, "credential_id"),
            other => panic!("expected Corrupt(credential_id), got {other:?}"),
        }

        let skipping = CoreConfig {
            skip_checks: true,
            ..CoreConfig::default()
        };
        assert!(load_vault(&store, "vault.json", &skipping).is_ok());
    }

    #[test]
    fn kind_and_base_accessors() {
        let vault = simple_fixture();
        assert_eq!(vault.kind(), VaultKind::Simple);
        assert_eq!(vault.base().name, "laptop keys");

        let vault = threshold_fixture();
        assert_eq!(vault.kind(), VaultKind::Shamir);
        assert_eq!(vault.base().kind, VaultKind::Shamir);
    }
}
