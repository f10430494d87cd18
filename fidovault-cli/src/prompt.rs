//! Terminal prompt over stdin.

use std::io::{self, BufRead, Write};
use std::sync::Mutex;

use fidovault_core::vault::MASTER_KEY_PROMPT;
use fidovault_core::{Error, Prompt, Result};

/// Prompt reading lines from stdin, echoing labels to stdout.
///
/// PINs go through `rpassword` so they never echo. End of input surfaces as
/// [`Error::UserAbort`].
pub struct StdinPrompt;

impl StdinPrompt {
    pub fn new() -> Self {
        Self
    }
}

impl Prompt for StdinPrompt {
    fn ask(&self, label: &str) -> Result<String> {
        print!("{label}");
        io::stdout().flush()?;

        let mut line = String::new();
        let read = io::stdin().lock().read_line(&mut line)?;
        if read == 0 {
            return Err(Error::UserAbort);
        }
        Ok(line.trim().to_string())
    }

    fn ask_secret(&self, label: &str) -> Result<String> {
        rpassword::prompt_password(label).map_err(Error::Io)
    }

    fn notify(&self, message: &str) {
        println!("{message}");
    }
}

/// Stdin prompt that answers the master key question from `--input` once,
/// then defers everything else to the terminal.
pub struct FileInputPrompt {
    inner: StdinPrompt,
    master_key: Mutex<Option<String>>,
}

impl FileInputPrompt {
    /// Reads the master key material from `path` up front.
    pub fn new(inner: StdinPrompt, path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(Self {
            inner,
            master_key: Mutex::new(Some(contents.trim().to_string())),
        })
    }
}

impl Prompt for FileInputPrompt {
    fn ask(&self, label: &str) -> Result<String> {
        if label == MASTER_KEY_PROMPT {
            if let Some(master_key) = self.master_key.lock().unwrap().take() {
                println!("Using master key material from the input file.");
                return Ok(master_key);
            }
        }
        self.inner.ask(label)
    }

    fn ask_secret(&self, label: &str) -> Result<String> {
        self.inner.ask_secret(label)
    }

    fn notify(&self, message: &str) {
        self.inner.notify(message);
    }
}
