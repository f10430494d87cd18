//! Narrow capabilities the engines consume.
//!
//! The engines own no console or file I/O. The REPL supplies a [`Prompt`],
//! the binary supplies a [`Store`], and tests supply scripted and in-memory
//! implementations of both.

use crate::error::Result;

/// A line-oriented user prompt.
pub trait Prompt {
    /// Presents `label` and reads one line of input, trimmed.
    ///
    /// # Errors
    ///
    /// Fails with [`crate::Error::UserAbort`] when the user cancels (for a
    /// terminal prompt, end of input).
    fn ask(&self, label: &str) -> Result<String>;

    /// Asks repeatedly until the answer is non-empty.
    ///
    /// # Errors
    ///
    /// Propagates the first error from [`Prompt::ask`].
    fn ask_non_empty(&self, label: &str) -> Result<String> {
        loop {
            let line = self.ask(label)?;
            if !line.is_empty() {
                return Ok(line);
            }
        }
    }

    /// Asks for a value that should not be echoed, such as a PIN.
    ///
    /// Defaults to a regular [`Prompt::ask`]; terminal implementations
    /// override this to suppress echo.
    ///
    /// # Errors
    ///
    /// Same contract as [`Prompt::ask`].
    fn ask_secret(&self, label: &str) -> Result<String> {
        self.ask(label)
    }

    /// Surfaces an informational message to the user.
    ///
    /// Engines use this for walkthrough text and recoverable conditions
    /// ("this key was already used"). The default drops the message.
    fn notify(&self, _message: &str) {}
}

/// Byte storage addressed by path.
pub trait Store {
    /// Loads the full contents at `path`.
    ///
    /// # Errors
    ///
    /// Fails if `path` does not exist or cannot be read.
    fn load(&self, path: &str) -> Result<Vec<u8>>;

    /// Replaces the contents at `path`.
    ///
    /// # Errors
    ///
    /// Fails if the bytes cannot be written.
    fn save(&self, path: &str, bytes: &[u8]) -> Result<()>;
}
