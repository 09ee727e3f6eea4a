// Headless binary: parse arguments, run the batch fill driver, map the
// result to a process exit code. All real work lives in the library.

use clap::Parser;
use std::process::ExitCode;

use patchfill::{cli, logger};

fn main() -> ExitCode {
    // Initialize session log (overwrites previous session log)
    logger::init();

    let args = cli::CliArgs::parse();
    cli::run(args)
}
