use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use serde::Serialize;
use vmsift_report::{
    run_report_pipeline, Collaborators, RunConfig, RunOutcome, SecretSource, TriggerResponse,
};

use crate::{DirectoryDeliverySink, FileDataSource, PasswordFileSecretSource};

const ENV_INPUT: &str = "VMSIFT_INPUT";
const ENV_OUTPUT_DIR: &str = "VMSIFT_OUTPUT_DIR";
const ENV_PASSWORD_FILE: &str = "VMSIFT_PASSWORD_FILE";
const ENV_SECRET_NAME: &str = "VMSIFT_SECRET_NAME";

#[derive(Clone, Debug, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

/// CLI arguments for the `vmsift` binary.
///
/// Every setting has a flag; the four deployment-shaped ones also read an
/// environment variable when the flag is absent. Flags win over environment.
#[derive(Parser)]
#[command(
    about = "Filter a VM inventory CSV for SQL Server installs and deliver a password-protected XLSX report."
)]
pub struct Args {
    /// Inventory CSV to read (VMSIFT_INPUT; default vm_inventory.csv).
    #[arg(long, value_name = "PATH")]
    input: Option<PathBuf>,

    /// Directory the encrypted report is written into (VMSIFT_OUTPUT_DIR; default `.`).
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Read the report password from a file (trailing newlines are trimmed).
    ///
    /// VMSIFT_PASSWORD_FILE. Required once the inventory has matches; a run
    /// with zero matches completes without it.
    #[arg(long, value_name = "PATH")]
    password_file: Option<PathBuf>,

    /// Name the password secret is looked up under (VMSIFT_SECRET_NAME).
    #[arg(long, value_name = "NAME")]
    secret_name: Option<String>,

    /// Column holding the installed-software inventory.
    #[arg(long, value_name = "NAME")]
    software_column: Option<String>,

    /// Identifier column rewritten to exact text in the report.
    #[arg(long, value_name = "NAME")]
    identifier_column: Option<String>,

    /// Product name the software inventory is matched against.
    #[arg(long, value_name = "NAME")]
    engine: Option<String>,

    /// Worksheet tab name of the generated report.
    #[arg(long, value_name = "NAME")]
    sheet_name: Option<String>,

    /// Stem of the timestamped report artifact.
    #[arg(long, value_name = "NAME")]
    basename: Option<String>,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

#[derive(Debug, Serialize)]
struct JsonSummary<'a> {
    status: u16,
    body: &'a str,
    input: &'a str,
    output_dir: &'a str,
    matches: Option<usize>,
    artifact: Option<&'a str>,
}

pub fn run() -> Result<()> {
    let args = Args::parse();
    let response = run_with_args(args)?;
    if response.status != 200 {
        std::process::exit(1);
    }
    Ok(())
}

/// Resolve flags and environment into a [`RunConfig`], run the pipeline with
/// filesystem collaborators, print the outcome, and return the response.
///
/// The non-zero exit for failed runs happens in [`run`]; this function only
/// reports.
pub fn run_with_args(args: Args) -> Result<TriggerResponse> {
    let defaults = RunConfig::default();
    let input = path_flag_or_env(args.input, ENV_INPUT)
        .unwrap_or_else(|| PathBuf::from(&defaults.inventory_locator));
    let output_dir =
        path_flag_or_env(args.output_dir, ENV_OUTPUT_DIR).unwrap_or_else(|| PathBuf::from("."));
    let password_file = path_flag_or_env(args.password_file, ENV_PASSWORD_FILE);

    let config = RunConfig {
        inventory_locator: input.to_string_lossy().into_owned(),
        software_column: args.software_column.unwrap_or(defaults.software_column),
        identifier_column: args.identifier_column.unwrap_or(defaults.identifier_column),
        engine_name: args.engine.unwrap_or(defaults.engine_name),
        secret_name: flag_or_env(args.secret_name, ENV_SECRET_NAME)
            .unwrap_or(defaults.secret_name),
        sheet_name: args.sheet_name.unwrap_or(defaults.sheet_name),
        report_basename: args.basename.unwrap_or(defaults.report_basename),
    };

    let data_source = FileDataSource;
    let secret_source = password_file.map(PasswordFileSecretSource::new);
    let delivery = DirectoryDeliverySink::new(&output_dir);

    let result = run_report_pipeline(
        &config,
        &Collaborators {
            data_source: &data_source,
            secret_source: secret_source
                .as_ref()
                .map(|source| source as &dyn SecretSource),
            delivery: &delivery,
        },
    );
    let response = TriggerResponse::from_run(&result);

    match args.format {
        OutputFormat::Text => {
            if response.status == 200 {
                println!("{}", response.body);
            } else {
                eprintln!("{}", response.body);
            }
        }
        OutputFormat::Json => {
            let (artifact, matches) = match &result {
                Ok(RunOutcome::Report { name, match_count }) => {
                    (Some(name.as_str()), Some(*match_count))
                }
                Ok(RunOutcome::NoMatches) => (None, Some(0)),
                Err(_) => (None, None),
            };
            let output_dir_text = output_dir.to_string_lossy().into_owned();
            let summary = JsonSummary {
                status: response.status,
                body: &response.body,
                input: &config.inventory_locator,
                output_dir: &output_dir_text,
                matches,
                artifact,
            };
            let stdout = std::io::stdout();
            let mut handle = stdout.lock();
            serde_json::to_writer(&mut handle, &summary)?;
            handle.write_all(b"\n")?;
        }
    }

    Ok(response)
}

fn path_flag_or_env(flag: Option<PathBuf>, var: &str) -> Option<PathBuf> {
    flag.or_else(|| {
        std::env::var_os(var)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
    })
}

fn flag_or_env(flag: Option<String>, var: &str) -> Option<String> {
    flag.or_else(|| std::env::var(var).ok().filter(|value| !value.is_empty()))
}
