use anyhow::Result;

fn main() -> Result<()> {
    vmsift_cli::cli::run()
}
