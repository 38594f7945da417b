//! Run pipeline for filtered, password-protected VM inventory reports.
//!
//! Wires the model/render/crypto crates together behind injected collaborator traits: a
//! [`DataSource`] supplies the raw inventory CSV, a [`SecretSource`] supplies the protection
//! password, and a [`DeliverySink`] receives the encrypted artifact. The pipeline itself is
//! synchronous and stateless across invocations; see [`run_report_pipeline`].

mod collaborators;
mod config;
mod pipeline;
mod response;

pub use collaborators::{CollaboratorError, DataSource, DeliverySink, SecretSource};
pub use config::RunConfig;
pub use pipeline::{run_report_pipeline, Collaborators, RunError, RunOutcome};
pub use response::TriggerResponse;
