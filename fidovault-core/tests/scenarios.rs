//! End-to-end vault scenarios over software tokens, a scripted prompt and
//! an in-memory store. No hardware is required.

use fidovault_core::error::Error;
use fidovault_core::token::soft::{
    MemoryStore, ScriptedPrompt, SoftwareToken, SoftwareTokenProvider,
};
use fidovault_core::vault::{load_vault, save_vault, SimpleVault, ThresholdVault, Vault};
use fidovault_core::CoreConfig;
use fidovault_core::Store;

const PIN: &str = "123456";

fn provider_with(names: &[&str]) -> SoftwareTokenProvider {
    SoftwareTokenProvider::new(
        names
            .iter()
            .map(|name| SoftwareToken::with_pin(name, PIN))
            .collect(),
    )
}

fn skipping() -> CoreConfig {
    CoreConfig {
        skip_checks: true,
        ..CoreConfig::default()
    }
}

#[test]
fn s1_simple_vault_lifecycle() {
    let provider = provider_with(&["a", "b"]);
    let config = CoreConfig::default();

    let mut vault = SimpleVault::create("s1", Some("lifecycle".into())).unwrap();

    // Enroll token A with a generated master key.
    provider.connect_only(&["a"]);
    vault
        .add(&provider, &ScriptedPrompt::new([PIN, "alpha", ""]), &config)
        .unwrap();
    let m1 = vault
        .unlock(&provider, &ScriptedPrompt::new([PIN]), &config)
        .unwrap();

    // Enroll token B: the new token is selected first, then an existing
    // header is unlocked to recover the master key.
    provider.connect_only(&["a", "b"]);
    provider.queue_selection("b");
    provider.queue_selection("a");
    vault
        .add(&provider, &ScriptedPrompt::new([PIN, "bravo", PIN]), &config)
        .unwrap();

    // Both tokens unlock the same master key.
    provider.connect_only(&["b"]);
    let m2 = vault
        .unlock(&provider, &ScriptedPrompt::new([PIN]), &config)
        .unwrap();
    assert_eq!(m1.as_bytes(), m2.as_bytes());

    // Delete A's header; its credential no longer resolves.
    let cred_a = vault.headers["alpha"].credential_id.clone();
    vault.delete("alpha").unwrap();
    assert!(matches!(
        vault.header_by_credential(&cred_a),
        Err(Error::NoHeader)
    ));
    assert!(matches!(vault.delete("alpha"), Err(Error::NoHeader)));

    // Presenting A now loops with a notice; B then completes the unlock.
    provider.connect_only(&["a", "b"]);
    provider.queue_selection("a");
    provider.queue_selection("b");
    let prompt = ScriptedPrompt::new([PIN, PIN]);
    let m3 = vault.unlock(&provider, &prompt, &config).unwrap();
    assert_eq!(m1.as_bytes(), m3.as_bytes());
    assert!(prompt
        .notices()
        .iter()
        .any(|notice| notice.contains("not enrolled")));
}

#[test]
fn s2_threshold_unlock_reproduces_an_all_zero_master() {
    let provider = provider_with(&["a", "b", "c"]);
    let config = CoreConfig::default();

    let mut vault = ThresholdVault::create("s2", None, 2, 3).unwrap();
    provider.connect_only(&["a", "b", "c"]);
    for name in ["a", "b", "c"] {
        provider.queue_selection(name);
    }
    let zero_hex = "00".repeat(32);
    vault
        .initialize(
            &provider,
            &ScriptedPrompt::new([
                zero_hex.as_str(),
                PIN,
                "key-a",
                PIN,
                "key-b",
                PIN,
                "key-c",
            ]),
            &config,
        )
        .unwrap();
    assert!(vault.is_initialized());

    for pair in [["a", "c"], ["b", "c"]] {
        provider.connect_only(&pair);
        for name in pair {
            provider.queue_selection(name);
        }
        let master = vault
            .unlock(&provider, &ScriptedPrompt::new([PIN, PIN]), &config)
            .unwrap();
        assert_eq!(master.as_bytes(), &[0u8; 32][..], "quorum {pair:?}");
    }
}

#[test]
fn s3_threshold_unlock_rejects_a_reused_token() {
    let names = ["a", "b", "c", "d", "e"];
    let provider = provider_with(&names);
    let config = CoreConfig::default();

    let mut vault = ThresholdVault::create("s3", None, 3, 5).unwrap();
    provider.connect_only(&names);
    for name in names {
        provider.queue_selection(name);
    }
    let init_prompt = ScriptedPrompt::new([
        "", PIN, "key-a", PIN, "key-b", PIN, "key-c", PIN, "key-d", PIN, "key-e",
    ]);
    vault.initialize(&provider, &init_prompt, &config).unwrap();

    // The generated master key is echoed exactly once.
    let master_hex = init_prompt
        .notices()
        .iter()
        .find_map(|notice| notice.strip_prefix("Master Key: ").map(str::to_string))
        .expect("generated key must be echoed");

    // A, B, then A again (rejected with a notice), then D.
    for name in ["a", "b", "a", "d"] {
        provider.queue_selection(name);
    }
    let unlock_prompt = ScriptedPrompt::new([PIN, PIN, PIN, PIN]);
    let master = vault.unlock(&provider, &unlock_prompt, &config).unwrap();

    assert_eq!(master.to_hex(), master_hex);
    assert!(unlock_prompt
        .notices()
        .iter()
        .any(|notice| notice.contains("already used")));
}

#[test]
fn s4_bit_flipped_encrypted_key_fails_with_decrypt() {
    let provider = provider_with(&["a"]);
    let config = CoreConfig::default();
    let store = MemoryStore::new();

    let mut vault = SimpleVault::create("s4", None).unwrap();
    provider.connect_only(&["a"]);
    vault
        .add(&provider, &ScriptedPrompt::new([PIN, "alpha", ""]), &config)
        .unwrap();

    // One flipped bit inside the sealed blob, persisted and reloaded with
    // checks skipped (the emptiness checks would pass anyway).
    vault.headers.get_mut("alpha").unwrap().encrypted_key[30] ^= 0x01;
    save_vault(&store, "vault.json", &Vault::Simple(vault)).unwrap();

    let reloaded = match load_vault(&store, "vault.json", &skipping()).unwrap() {
        Vault::Simple(vault) => vault,
        Vault::Threshold(_) => unreachable!(),
    };
    assert!(matches!(
        reloaded.unlock(&provider, &ScriptedPrompt::new([PIN]), &config),
        Err(Error::Decrypt)
    ));
}

#[test]
fn s5_emptied_credential_id_is_caught_or_bypassed() {
    let provider = provider_with(&["a", "b", "c"]);
    let config = CoreConfig::default();
    let store = MemoryStore::new();

    let mut vault = ThresholdVault::create("s5", None, 2, 3).unwrap();
    provider.connect_only(&["a", "b", "c"]);
    for name in ["a", "b", "c"] {
        provider.queue_selection(name);
    }
    let init_prompt = ScriptedPrompt::new(["", PIN, "key-a", PIN, "key-b", PIN, "key-c"]);
    vault.initialize(&provider, &init_prompt, &config).unwrap();
    let master_hex = init_prompt
        .notices()
        .iter()
        .find_map(|notice| notice.strip_prefix("Master Key: ").map(str::to_string))
        .expect("generated key must be echoed");

    // Shares were assigned 1..=3 in selection order, so share 2 belongs to
    // token "b". Empty its credential id and persist the damage.
    vault.shares.get_mut(&2).unwrap().credential_id =
        fidovault_core::vault::CredentialId::new(Vec::new());
    save_vault(&store, "vault.json", &Vault::Threshold(vault)).unwrap();

    // Without --skip-checks the load aborts naming the field.
    match load_vault(&store, "vault.json", &config) {
        Err(Error::Corrupt { field }) => assert_eq!(field, "credential_id"),
        other => panic!("expected Corrupt(credential_id), got {other:?}"),
    }

    // With --skip-checks the vault loads, but the damaged token can no
    // longer answer for any stored credential.
    let reloaded = match load_vault(&store, "vault.json", &skipping()).unwrap() {
        Vault::Threshold(vault) => vault,
        Vault::Simple(_) => unreachable!(),
    };
    provider.connect_only(&["b"]);
    assert!(matches!(
        reloaded.unlock(&provider, &ScriptedPrompt::new([PIN]), &config),
        Err(Error::NoCredentials)
    ));

    // The two intact tokens still reach the threshold.
    provider.connect_only(&["a", "c"]);
    provider.queue_selection("a");
    provider.queue_selection("c");
    let master = reloaded
        .unlock(&provider, &ScriptedPrompt::new([PIN, PIN]), &config)
        .unwrap();
    assert_eq!(master.to_hex(), master_hex);
}

#[test]
fn s6_future_version_is_rejected_before_the_typed_parse() {
    let store = MemoryStore::new();
    store
        .save("vault.json", br#"{"type": "shamir", "version": 2}"#)
        .unwrap();

    match load_vault(&store, "vault.json", &CoreConfig::default()) {
        Err(Error::InvalidVersion { found }) => assert_eq!(found, 2),
        other => panic!("expected InvalidVersion, got {other:?}"),
    }
}

#[test]
fn enrolled_vaults_roundtrip_through_the_store() {
    let provider = provider_with(&["a"]);
    let config = CoreConfig::default();
    let store = MemoryStore::new();

    let mut vault = SimpleVault::create("roundtrip", Some("desc".into())).unwrap();
    provider.connect_only(&["a"]);
    vault
        .add(&provider, &ScriptedPrompt::new([PIN, "alpha", ""]), &config)
        .unwrap();

    let original = Vault::Simple(vault);
    save_vault(&store, "vault.json", &original).unwrap();
    let reloaded = load_vault(&store, "vault.json", &config).unwrap();
    assert_eq!(reloaded, original);

    // Canonical form is stable across a save/load/save cycle.
    save_vault(&store, "copy.json", &reloaded).unwrap();
    assert_eq!(store.load("vault.json").unwrap(), store.load("copy.json").unwrap());
}

#[test]
fn gapped_share_indices_still_unlock_under_skip_checks() {
    let provider = provider_with(&["a", "b", "c"]);
    let config = CoreConfig::default();
    let store = MemoryStore::new();

    let mut vault = ThresholdVault::create("gaps", None, 2, 3).unwrap();
    provider.connect_only(&["a", "b", "c"]);
    for name in ["a", "b", "c"] {
        provider.queue_selection(name);
    }
    let init_prompt = ScriptedPrompt::new(["", PIN, "key-a", PIN, "key-b", PIN, "key-c"]);
    vault.initialize(&provider, &init_prompt, &config).unwrap();
    let master_hex = init_prompt
        .notices()
        .iter()
        .find_map(|notice| notice.strip_prefix("Master Key: ").map(str::to_string))
        .expect("generated key must be echoed");

    // Lose the middle share entirely, as an erroneous manual edit would.
    // Credential lookup works off the remaining map values, so the
    // surviving quorum still unlocks.
    vault.shares.remove(&2);
    save_vault(&store, "vault.json", &Vault::Threshold(vault)).unwrap();

    let reloaded = match load_vault(&store, "vault.json", &skipping()).unwrap() {
        Vault::Threshold(vault) => vault,
        Vault::Simple(_) => unreachable!(),
    };
    provider.connect_only(&["a", "c"]);
    provider.queue_selection("a");
    provider.queue_selection("c");
    let master = reloaded
        .unlock(&provider, &ScriptedPrompt::new([PIN, PIN]), &config)
        .unwrap();
    assert_eq!(master.to_hex(), master_hex);
}
