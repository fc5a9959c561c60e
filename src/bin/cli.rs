// src/bin/cli.rs
use std::process::ExitCode;

use cpso_scrape::cli;

fn main() -> color_eyre::Result<ExitCode> {
    color_eyre::install()?;
    Ok(cli::run()?)
}
