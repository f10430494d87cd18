//! Runtime configuration threaded through the engines.

/// Process-wide switches, passed explicitly instead of living in globals.
///
/// The binary builds one `CoreConfig` from its flags and hands it to every
/// engine call that needs it.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Emit verbose diagnostics.
    pub debug: bool,

    /// Never use on-token biometrics; always fall back to a PIN. Useful
    /// when a fingerprint reader is broken or unusable.
    pub disable_biometrics: bool,

    /// Skip "press ENTER when ready" prompts whenever enough devices are
    /// already connected for the current step. The assumption is that the
    /// user plugged in all the keys they intend to use up front.
    pub make_assumptions: bool,

    /// Skip integrity verification when loading a vault, as a recovery aid
    /// for damaged files.
    pub skip_checks: bool,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            debug: false,
            disable_biometrics: false,
            make_assumptions: true,
            skip_checks: false,
        }
    }
}
