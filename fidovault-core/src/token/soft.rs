//! Software implementations of the token, prompt and store capabilities.
//!
//! These implementations are NOT secure and exist to test the engines
//! without hardware. The software token reproduces the one property the
//! engines rely on: for a fixed (token, credential, salt) tuple the
//! derived `hmac-secret` output is constant.

// Test-support code; panics on poisoned locks are acceptable here.
#![allow(clippy::missing_panics_doc)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sha2::{Digest, Sha256};

use crate::capabilities::{Prompt, Store};
use crate::envelope::DerivedKey;
use crate::error::{Error, Result};
use crate::vault::CredentialId;

use super::{
    Assertion, Attestation, DerivationParams, DeviceLocation, Token, TokenCapabilities,
    TokenProvider, Verification,
};

// Software token

struct TokenState {
    seed: [u8; 32],
    pin: Option<String>,
    bio: bool,
    credentials: HashSet<Vec<u8>>,
    counter: u64,
}

/// A deterministic in-memory FIDO2 token.
///
/// **FOR TESTING ONLY.** Clones share state, so a clone handed out by the
/// provider sees every credential minted through any other clone.
#[derive(Clone)]
pub struct SoftwareToken {
    state: Arc<Mutex<TokenState>>,
    location: DeviceLocation,
}

impl SoftwareToken {
    fn new(name: &str, pin: Option<String>, bio: bool) -> Self {
        let mut seed = [0u8; 32];
        getrandom::getrandom(&mut seed).expect("getrandom failed");
        Self {
            state: Arc::new(Mutex::new(TokenState {
                seed,
                pin,
                bio,
                credentials: HashSet::new(),
                counter: 0,
            })),
            location: DeviceLocation {
                path: format!("soft:{name}"),
                manufacturer: "software".to_string(),
                product: name.to_string(),
                vendor_id: 0,
                product_id: 0,
            },
        }
    }

    /// A token with a client PIN set and no biometrics.
    #[must_use]
    pub fn with_pin(name: &str, pin: &str) -> Self {
        Self::new(name, Some(pin.to_string()), false)
    }

    /// A token with biometrics enrolled and no PIN.
    #[must_use]
    pub fn biometric(name: &str) -> Self {
        Self::new(name, None, true)
    }

    /// A token advertising no user verification method at all.
    #[must_use]
    pub fn bare(name: &str) -> Self {
        Self::new(name, None, false)
    }

    /// Enrolls biometrics after the fact.
    pub fn enroll_biometrics(&mut self) {
        self.state.lock().unwrap().bio = true;
    }

    /// The token's display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.location.product
    }

    fn check_verification(state: &TokenState, verification: &Verification) -> Result<()> {
        match verification {
            Verification::Biometric if state.bio => Ok(()),
            Verification::Biometric => {
                Err(Error::Token("no biometrics enrolled on this token".into()))
            }
            Verification::Pin(pin) => match &state.pin {
                Some(expected) if expected == pin => Ok(()),
                Some(_) => Err(Error::Token("pin mismatch".into())),
                None => Err(Error::Token("no pin set on this token".into())),
            },
        }
    }
}

impl Token for SoftwareToken {
    fn location(&self) -> &DeviceLocation {
        &self.location
    }

    fn capabilities(&self) -> Result<TokenCapabilities> {
        let state = self.state.lock().unwrap();
        Ok(TokenCapabilities {
            client_pin: state.pin.is_some(),
            bio_enroll: state.bio,
        })
    }

    fn make_credential(
        &mut self,
        _params: &DerivationParams,
        verification: &Verification,
    ) -> Result<Attestation> {
        let mut state = self.state.lock().unwrap();
        Self::check_verification(&state, verification)?;

        state.counter += 1;
        let mut hasher = Sha256::new();
        hasher.update(state.seed);
        hasher.update(b"credential");
        hasher.update(state.counter.to_le_bytes());
        let credential_id = hasher.finalize()[..16].to_vec();

        state.credentials.insert(credential_id.clone());
        Ok(Attestation {
            credential_id: CredentialId::new(credential_id),
        })
    }

    fn assert(
        &mut self,
        params: &DerivationParams,
        verification: &Verification,
        credential_ids: &[CredentialId],
    ) -> Result<Assertion> {
        let state = self.state.lock().unwrap();
        Self::check_verification(&state, verification)?;

        let held = credential_ids
            .iter()
            .find(|id| state.credentials.contains(id.as_bytes()))
            .ok_or(Error::NoCredentials)?;

        // The real extension computes HMAC(per-credential key, salt); this
        // reproduces the determinism, nothing else.
        let mut hasher = Sha256::new();
        hasher.update(b"hmac-secret");
        hasher.update(state.seed);
        hasher.update(held.as_bytes());
        hasher.update(params.hmac_salt);
        let secret: [u8; 32] = hasher.finalize().into();

        Ok(Assertion {
            credential_id: held.clone(),
            hmac_secret: DerivedKey::from_bytes(secret),
        })
    }
}

// Software provider

/// An in-memory token provider with scripted device presence.
///
/// **FOR TESTING ONLY.** Tests connect and disconnect tokens between engine
/// calls and, when several are connected at once, script which one the
/// simulated user "taps".
pub struct SoftwareTokenProvider {
    tokens: Vec<SoftwareToken>,
    connected: Mutex<Vec<usize>>,
    selections: Mutex<VecDeque<usize>>,
}

impl SoftwareTokenProvider {
    /// A provider over `tokens`, all initially disconnected.
    #[must_use]
    pub fn new(tokens: Vec<SoftwareToken>) -> Self {
        Self {
            tokens,
            connected: Mutex::new(Vec::new()),
            selections: Mutex::new(VecDeque::new()),
        }
    }

    fn index_of(&self, name: &str) -> usize {
        self.tokens
            .iter()
            .position(|t| t.name() == name)
            .unwrap_or_else(|| panic!("no software token named {name}"))
    }

    /// Plugs in the named token.
    pub fn connect(&self, name: &str) {
        let index = self.index_of(name);
        let mut connected = self.connected.lock().unwrap();
        if !connected.contains(&index) {
            connected.push(index);
        }
    }

    /// Unplugs the named token.
    pub fn disconnect(&self, name: &str) {
        let index = self.index_of(name);
        self.connected.lock().unwrap().retain(|i| *i != index);
    }

    /// Unplugs everything.
    pub fn disconnect_all(&self) {
        self.connected.lock().unwrap().clear();
    }

    /// Replaces the connected set.
    pub fn connect_only(&self, names: &[&str]) {
        self.disconnect_all();
        for name in names {
            self.connect(name);
        }
    }

    /// Scripts which token the user "taps" at the next multi-device
    /// selection.
    pub fn queue_selection(&self, name: &str) {
        let index = self.index_of(name);
        self.selections.lock().unwrap().push_back(index);
    }
}

impl TokenProvider for SoftwareTokenProvider {
    fn enumerate(&self) -> Result<Vec<DeviceLocation>> {
        let connected = self.connected.lock().unwrap();
        Ok(connected
            .iter()
            .map(|i| self.tokens[*i].location.clone())
            .collect())
    }

    fn select(&self, _timeout: Duration) -> Result<Box<dyn Token>> {
        let connected = self.connected.lock().unwrap();
        match connected.len() {
            0 => Err(Error::NoDevice),
            1 => Ok(Box::new(self.tokens[connected[0]].clone())),
            _ => {
                let index = self
                    .selections
                    .lock()
                    .unwrap()
                    .pop_front()
                    .ok_or_else(|| {
                        Error::Token("multiple devices connected, no selection scripted".into())
                    })?;
                if !connected.contains(&index) {
                    return Err(Error::Token(format!(
                        "scripted selection {} is not connected",
                        self.tokens[index].name()
                    )));
                }
                Ok(Box::new(self.tokens[index].clone()))
            }
        }
    }
}

// Scripted prompt

/// A prompt answering from a prepared script.
///
/// **FOR TESTING ONLY.** An exhausted script fails with
/// [`Error::UserAbort`] so a missing answer surfaces instead of hanging.
/// Notifications are recorded for assertions.
#[derive(Default)]
pub struct ScriptedPrompt {
    answers: Mutex<VecDeque<String>>,
    notices: Mutex<Vec<String>>,
}

impl ScriptedPrompt {
    /// A prompt that will answer with `answers`, in order.
    #[must_use]
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: Mutex::new(answers.into_iter().map(Into::into).collect()),
            notices: Mutex::new(Vec::new()),
        }
    }

    /// A prompt with no scripted answers.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Appends one more scripted answer.
    pub fn push(&self, answer: impl Into<String>) {
        self.answers.lock().unwrap().push_back(answer.into());
    }

    /// Everything the engines notified so far.
    #[must_use]
    pub fn notices(&self) -> Vec<String> {
        self.notices.lock().unwrap().clone()
    }
}

impl Prompt for ScriptedPrompt {
    fn ask(&self, _label: &str) -> Result<String> {
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(Error::UserAbort)
    }

    fn notify(&self, message: &str) {
        self.notices.lock().unwrap().push(message.to_string());
    }
}

// Memory store

/// Byte storage backed by a map.
///
/// **FOR TESTING ONLY.**
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn load(&self, path: &str) -> Result<Vec<u8>> {
        self.entries
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| {
                Error::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("no entry at {path}"),
                ))
            })
    }

    fn save(&self, path: &str, bytes: &[u8]) -> Result<()> {
        self.entries
            .lock()
            .unwrap()
            .insert(path.to_string(), bytes.to_vec());
        Ok(())
    }
}
