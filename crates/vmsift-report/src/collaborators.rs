//! Contracts for the environment the pipeline runs against.
//!
//! Implementations are deployment glue (filesystem, object storage, secret managers). The
//! pipeline only ever sees these traits, so tests substitute in-memory fakes.

use thiserror::Error;

/// Failure inside an injected collaborator. Fatal to the invocation that observed it.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct CollaboratorError {
    message: String,
}

impl CollaboratorError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Source of the raw inventory bytes.
pub trait DataSource {
    /// Fetch the object named `locator`. A missing or unreadable object is an error.
    fn fetch(&self, locator: &str) -> Result<Vec<u8>, CollaboratorError>;
}

/// Source of the report-protection password.
pub trait SecretSource {
    /// Fetch the value of the named secret. An unreachable backing store or an absent secret
    /// value is an error; an absent secret *location* is modeled by the orchestrator having no
    /// `SecretSource` at all (see [`crate::Collaborators::secret_source`]).
    fn get_secret(&self, name: &str) -> Result<String, CollaboratorError>;
}

/// Destination for the finished, encrypted report.
pub trait DeliverySink {
    /// Store `bytes` under `locator`, replacing any existing object with that name.
    fn store(&self, locator: &str, bytes: &[u8]) -> Result<(), CollaboratorError>;
}
