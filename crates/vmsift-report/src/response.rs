use crate::pipeline::{RunError, RunOutcome};

/// Transport-facing summary of a run, in HTTP terms (status code + plain-text body).
///
/// Trigger adapters (HTTP handlers, CLI exit paths) hand the run result to [`from_run`] and
/// forward the response verbatim.
///
/// [`from_run`]: TriggerResponse::from_run
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TriggerResponse {
    pub status: u16,
    pub body: String,
}

impl TriggerResponse {
    /// Map a finished run onto the response contract.
    pub fn from_run(result: &Result<RunOutcome, RunError>) -> Self {
        match result {
            Ok(RunOutcome::Report { name, match_count }) => Self {
                status: 200,
                body: format!(
                    "Report generated successfully: {name}\n\
                     Total SQL Server VMs: {match_count}\n\
                     File is password-protected using the configured secret"
                ),
            },
            Ok(RunOutcome::NoMatches) => Self {
                status: 200,
                body: "No SQL Server installations found in inventory".to_string(),
            },
            Err(RunError::Configuration(message)) => Self {
                status: 500,
                body: format!("Configuration error: {message}"),
            },
            Err(err) => Self {
                status: 500,
                body: format!("Error: {err}"),
            },
        }
    }
}
