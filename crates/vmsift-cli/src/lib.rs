//! Local-filesystem front end for the inventory report pipeline.
//!
//! The [`cli`] module owns the command-line surface. The crate root provides
//! the filesystem-backed collaborators handed to `vmsift-report`: a data
//! source that reads the inventory from a path, a secret source that reads
//! the report password from a file, and a delivery sink that writes the
//! encrypted artifact into an output directory.

pub mod cli;

use std::path::PathBuf;

use vmsift_report::{CollaboratorError, DataSource, DeliverySink, SecretSource};

/// Reads inventory bytes from the local path given as the locator.
pub struct FileDataSource;

impl DataSource for FileDataSource {
    fn fetch(&self, locator: &str) -> Result<Vec<u8>, CollaboratorError> {
        std::fs::read(locator)
            .map_err(|err| CollaboratorError::new(format!("read {locator}: {err}")))
    }
}

/// Reads the report password from a file.
///
/// Trailing newlines are trimmed; all other whitespace is part of the
/// password. The secret name selects nothing here (one file, one secret) and
/// only shows up in error messages.
pub struct PasswordFileSecretSource {
    path: PathBuf,
}

impl PasswordFileSecretSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SecretSource for PasswordFileSecretSource {
    fn get_secret(&self, name: &str) -> Result<String, CollaboratorError> {
        let raw = std::fs::read_to_string(&self.path).map_err(|err| {
            CollaboratorError::new(format!(
                "read secret {name} from {}: {err}",
                self.path.display()
            ))
        })?;
        Ok(raw.trim_end_matches(&['\r', '\n'][..]).to_string())
    }
}

/// Writes delivered artifacts into a directory, overwriting on name
/// collision. The directory is created on first store.
pub struct DirectoryDeliverySink {
    dir: PathBuf,
}

impl DirectoryDeliverySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl DeliverySink for DirectoryDeliverySink {
    fn store(&self, locator: &str, bytes: &[u8]) -> Result<(), CollaboratorError> {
        std::fs::create_dir_all(&self.dir).map_err(|err| {
            CollaboratorError::new(format!("create {}: {err}", self.dir.display()))
        })?;
        let path = self.dir.join(locator);
        std::fs::write(&path, bytes)
            .map_err(|err| CollaboratorError::new(format!("write {}: {err}", path.display())))
    }
}
