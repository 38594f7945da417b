/// Settings for one report run.
///
/// Callers construct this directly; the CLI fills it from flags and environment variables. The
/// defaults match the inventory export this pipeline was built for.
#[derive(Clone, Debug)]
pub struct RunConfig {
    /// Locator passed to the data source (object name or file path).
    pub inventory_locator: String,
    /// Column whose value encodes the installed-software inventory.
    pub software_column: String,
    /// Column holding the numeric account identifier.
    pub identifier_column: String,
    /// Literal product-name substring that marks a record as a match.
    pub engine_name: String,
    /// Name of the secret holding the report-protection password.
    pub secret_name: String,
    /// Worksheet tab name of the rendered report.
    pub sheet_name: String,
    /// Stem of the delivered artifact name; a timestamp and `.xlsx` are appended.
    pub report_basename: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            inventory_locator: "vm_inventory.csv".to_string(),
            software_column: "SQLSoftware".to_string(),
            identifier_column: "AccountID".to_string(),
            engine_name: "Microsoft SQL Server".to_string(),
            secret_name: "postprocess-secret".to_string(),
            sheet_name: "SQL Servers".to_string(),
            report_basename: "sql_servers_report".to_string(),
        }
    }
}
