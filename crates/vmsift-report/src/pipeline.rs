//! The run pipeline: load → filter → render → encrypt → deliver.

use chrono::Local;
use thiserror::Error;

use vmsift_model::{filter_inventory, import_csv_table, CsvImportError, MissingColumnError};
use vmsift_office_crypto::{
    encrypt_package_to_ole, is_encrypted_ooxml_ole, EncryptOptions, OfficeCryptoError,
};
use vmsift_xlsx::{rewrite_identifier_column, write_report_xlsx, FormatError, ReportOptions};

use crate::collaborators::{CollaboratorError, DataSource, DeliverySink, SecretSource};
use crate::config::RunConfig;

/// Terminal value of a successful invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    /// A report was rendered, encrypted, and stored under `name`.
    Report { name: String, match_count: usize },
    /// The inventory held no matching records. Nothing was rendered, no secret was read, and
    /// nothing was stored.
    NoMatches,
}

#[derive(Debug, Error)]
pub enum RunError {
    /// A required setting or the secret location is absent. Surfaced, never retried.
    #[error("missing configuration: {0}")]
    Configuration(String),
    #[error(transparent)]
    Parse(#[from] CsvImportError),
    #[error(transparent)]
    MissingColumn(#[from] MissingColumnError),
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error("encryption failed: {0}")]
    Encryption(#[from] OfficeCryptoError),
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),
}

/// The collaborator set for one invocation.
///
/// `secret_source` is optional because its absence is meaningful: with matches to report and no
/// configured secret location, the run fails as a configuration error rather than a runtime one.
/// The zero-match path completes without it.
pub struct Collaborators<'a> {
    pub data_source: &'a dyn DataSource,
    pub secret_source: Option<&'a dyn SecretSource>,
    pub delivery: &'a dyn DeliverySink,
}

/// Run the full report pipeline once.
///
/// Stages: load the inventory, filter it, and (only when at least one record matched) render,
/// encrypt, and deliver the report. An empty filter result is the [`RunOutcome::NoMatches`]
/// terminal, not an error.
pub fn run_report_pipeline(
    config: &RunConfig,
    collaborators: &Collaborators<'_>,
) -> Result<RunOutcome, RunError> {
    log::info!("Loading data from {}...", config.inventory_locator);
    let raw = collaborators.data_source.fetch(&config.inventory_locator)?;
    let inventory = import_csv_table(raw.as_slice())?;
    log::info!("Loaded {} total VMs", inventory.row_count());

    log::info!("Filtering VMs for {}...", config.engine_name);
    let matches = filter_inventory(&inventory, &config.software_column, &config.engine_name)?;
    log::info!(
        "Found {} VMs with {} installed.",
        matches.row_count(),
        config.engine_name
    );

    if matches.is_empty() {
        log::warn!("No {} installations found", config.engine_name);
        return Ok(RunOutcome::NoMatches);
    }

    // The secret location is only required once there is something to protect.
    let Some(secret_source) = collaborators.secret_source else {
        log::error!("secret source not configured");
        return Err(RunError::Configuration(
            "secret source is required".to_string(),
        ));
    };
    log::info!("Retrieving report password...");
    let password = secret_source.get_secret(&config.secret_name)?;
    log::info!("Password retrieved successfully");

    log::info!("Exporting {} VMs to Excel...", matches.row_count());
    let rewritten = rewrite_identifier_column(&matches, &config.identifier_column)?;
    let report = write_report_xlsx(
        &rewritten,
        &ReportOptions {
            sheet_name: config.sheet_name.clone(),
        },
    )?;

    log::info!("Applying password protection to Excel file...");
    let encrypted = encrypt_package_to_ole(&report, &password, EncryptOptions::default())?;
    // Delivery guard: an artifact that is not a password-protected OLE container is never stored.
    if !is_encrypted_ooxml_ole(&encrypted) {
        return Err(RunError::Encryption(OfficeCryptoError::InvalidFormat(
            "encrypted report is not an OLE container".to_string(),
        )));
    }
    log::info!("Password protection applied successfully");

    let name = report_artifact_name(&config.report_basename);
    log::info!("Uploading password-protected file to {name}...");
    collaborators.delivery.store(&name, &encrypted)?;
    log::info!("Successfully uploaded {name}");

    let match_count = matches.row_count();
    log::info!(
        "Successfully created report with {match_count} {} VMs",
        config.engine_name
    );
    Ok(RunOutcome::Report { name, match_count })
}

/// Timestamped artifact name, so repeated runs never overwrite an earlier report by coincidence.
fn report_artifact_name(basename: &str) -> String {
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    format!("{basename}_{timestamp}.xlsx")
}
