// Entrypoint for the CLI application.
// - Keeps `main` small: parse arguments, set up logging, hand off to the UI.
// - Exit status is 0 only when every document went through.

use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use utprint::{cli::Cli, ui};

fn setup_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("utprint=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("utprint=warn"))
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .without_time()
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match ui::run(&cli) {
        Ok(report) if report.failures() == 0 => ExitCode::SUCCESS,
        Ok(report) => {
            eprintln!(
                "{} of {} documents failed",
                report.failures(),
                report.documents.len()
            );
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
