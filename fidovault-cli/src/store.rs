//! File-backed byte store.

use std::fs;

use fidovault_core::{Result, Store};

/// Store reading and writing ordinary files.
pub struct FileStore;

impl Store for FileStore {
    fn load(&self, path: &str) -> Result<Vec<u8>> {
        Ok(fs::read(path)?)
    }

    fn save(&self, path: &str, bytes: &[u8]) -> Result<()> {
        Ok(fs::write(path, bytes)?)
    }
}
