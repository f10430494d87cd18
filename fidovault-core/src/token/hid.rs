//! USB HID token backend over CTAP2.
//!
//! This is the one module that touches hardware. Everything here funnels
//! through the [`Token`]/[`TokenProvider`] traits, so the engines never see
//! the HID stack.

use std::sync::Arc;
use std::time::Duration;

use ctap_hid_fido2::fidokey::get_assertion::get_assertion_params::Extension as Gext;
use ctap_hid_fido2::fidokey::make_credential::make_credential_params::Extension as Mext;
use ctap_hid_fido2::fidokey::{FidoKeyHid, GetAssertionArgsBuilder, MakeCredentialArgsBuilder};
use ctap_hid_fido2::{get_fidokey_devices, Cfg, FidoKeyHidFactory, HidInfo};

use crate::capabilities::Prompt;
use crate::envelope::DerivedKey;
use crate::error::{Error, Result};
use crate::vault::CredentialId;

use super::{
    Assertion, Attestation, DerivationParams, DeviceLocation, Token, TokenCapabilities,
    TokenProvider, Verification,
};

/// CTAP2 status returned when a token holds none of the allowed
/// credentials; the HID stack reports it inside the error text.
const CTAP2_ERR_NO_CREDENTIALS: &str = "0x2E";

/// Token provider backed by USB HID FIDO2 devices.
///
/// Multi-device selection asks the user to pick a device by number through
/// `prompt`; the HID stack has no portable cross-device tap primitive.
pub struct HidTokenProvider {
    cfg: Cfg,
    prompt: Arc<dyn Prompt>,
}

impl HidTokenProvider {
    /// Creates a provider that talks to the user via `prompt`.
    #[must_use]
    pub fn new(prompt: Arc<dyn Prompt>) -> Self {
        Self {
            cfg: Cfg::init(),
            prompt,
        }
    }

    fn open(&self, info: &HidInfo) -> Result<Box<dyn Token>> {
        let device = FidoKeyHidFactory::create_by_params(&[info.param.clone()], &self.cfg)
            .map_err(|e| Error::Token(e.to_string()))?;
        Ok(Box::new(HidToken {
            device,
            location: location_of(info),
            prompt: Arc::clone(&self.prompt),
        }))
    }
}

fn location_of(info: &HidInfo) -> DeviceLocation {
    DeviceLocation {
        path: info.info.clone(),
        // The HID enumeration exposes no manufacturer string.
        manufacturer: String::new(),
        product: info.product_string.clone(),
        vendor_id: info.vid,
        product_id: info.pid,
    }
}

impl TokenProvider for HidTokenProvider {
    fn enumerate(&self) -> Result<Vec<DeviceLocation>> {
        Ok(get_fidokey_devices().iter().map(location_of).collect())
    }

    fn select(&self, _timeout: Duration) -> Result<Box<dyn Token>> {
        let devices = get_fidokey_devices();
        match devices.len() {
            0 => Err(Error::NoDevice),
            1 => self.open(&devices[0]),
            _ => {
                self.prompt.notify("Multiple keys found:");
                for (i, info) in devices.iter().enumerate() {
                    self.prompt
                        .notify(&format!("  {} -> {}", i + 1, location_of(info)));
                }
                let line = self
                    .prompt
                    .ask_non_empty("Enter the number of the key to use: ")?;
                let choice: usize = line
                    .parse()
                    .map_err(|_| Error::Token(format!("not a device number: {line}")))?;
                let info = choice
                    .checked_sub(1)
                    .and_then(|i| devices.get(i))
                    .ok_or_else(|| Error::Token(format!("no device numbered {choice}")))?;
                self.open(info)
            }
        }
    }
}

/// One opened HID token.
struct HidToken {
    device: FidoKeyHid,
    location: DeviceLocation,
    prompt: Arc<dyn Prompt>,
}

impl HidToken {
    fn option_flag(options: &[(String, bool)], name: &str) -> bool {
        options
            .iter()
            .any(|(option, value)| option == name && *value)
    }

    fn prompt_touch(&self) {
        self.prompt.notify("Tap your security key.");
    }
}

impl Token for HidToken {
    fn location(&self) -> &DeviceLocation {
        &self.location
    }

    fn capabilities(&self) -> Result<TokenCapabilities> {
        let info = self
            .device
            .get_info()
            .map_err(|e| Error::Token(e.to_string()))?;
        Ok(TokenCapabilities {
            client_pin: Self::option_flag(&info.options, "clientPin"),
            bio_enroll: Self::option_flag(&info.options, "bioEnroll"),
        })
    }

    fn make_credential(
        &mut self,
        params: &DerivationParams,
        verification: &Verification,
    ) -> Result<Attestation> {
        self.prompt_touch();

        let mut builder = MakeCredentialArgsBuilder::new(&params.rp_id, &params.client_data_hash)
            .extensions(&[Mext::HmacSecret(Some(true))]);
        if let Verification::Pin(pin) = verification {
            // pinUvAuthParam carries the user verification for this path.
            builder = builder.pin(pin);
        }
        let mut args = builder.build();
        if matches!(verification, Verification::Biometric) {
            // Internal UV (options.uv) must be requested explicitly; a
            // request with neither pin nor uv settles for mere presence.
            args.uv = Some(true);
        }

        let attestation = self
            .device
            .make_credential_with_args(&args)
            .map_err(map_hid_error)?;

        Ok(Attestation {
            credential_id: CredentialId::new(attestation.credential_descriptor.id.clone()),
        })
    }

    fn assert(
        &mut self,
        params: &DerivationParams,
        verification: &Verification,
        credential_ids: &[CredentialId],
    ) -> Result<Assertion> {
        self.prompt_touch();

        let mut builder = GetAssertionArgsBuilder::new(&params.rp_id, &params.client_data_hash)
            .extensions(&[Gext::HmacSecret(Some(params.hmac_salt))]);
        for credential_id in credential_ids {
            builder = builder.credential_id(credential_id.as_bytes());
        }
        if let Verification::Pin(pin) = verification {
            // pinUvAuthParam carries the user verification for this path.
            builder = builder.pin(pin);
        }
        let mut args = builder.build();
        if matches!(verification, Verification::Biometric) {
            // Internal UV (options.uv) must be requested explicitly; a
            // request with neither pin nor uv settles for mere presence.
            args.uv = Some(true);
        }

        let assertions = self
            .device
            .get_assertion_with_args(&args)
            .map_err(map_hid_error)?;
        let assertion = assertions
            .first()
            .ok_or_else(|| Error::Token("token returned no assertion".into()))?;

        let mut secret = None;
        for extension in &assertion.extensions {
            if let Gext::HmacSecret(Some(output)) = extension {
                secret = Some(*output);
            }
        }
        let secret =
            secret.ok_or_else(|| Error::Token("assertion carries no hmac-secret output".into()))?;

        Ok(Assertion {
            credential_id: CredentialId::new(assertion.credential_id.clone()),
            hmac_secret: DerivedKey::from_bytes(secret),
        })
    }
}

fn map_hid_error(err: impl std::fmt::Display) -> Error {
    let message = err.to_string();
    if message.contains(CTAP2_ERR_NO_CREDENTIALS)
        || message.to_ascii_lowercase().contains("no credentials")
    {
        return Error::NoCredentials;
    }
    Error::Token(message)
}
