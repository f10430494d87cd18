//! FIDO2 `hmac-secret` protected master-key vaults.
//!
//! A vault is a small JSON document that never stores the master key in any
//! recoverable form: each enrolled hardware token wraps the key (or one
//! Shamir share of it) under a 32-byte key re-derived on demand from the
//! token's CTAP2 `hmac-secret` extension. Presence of a user-verified token
//! is both necessary and sufficient to unlock.
//!
//! The engines in [`vault`] talk to the outside world only through three
//! narrow capabilities: a [`token::TokenProvider`] for hardware, a
//! [`Prompt`] for user input, and a [`Store`] for bytes on disk. The CLI
//! owns all console and file I/O.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod capabilities;
pub mod config;
pub mod envelope;
pub mod error;
pub mod shamir;
pub mod token;
pub mod vault;

pub use capabilities::{Prompt, Store};
pub use config::CoreConfig;
pub use error::{Error, Result};
