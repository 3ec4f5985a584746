use clap::Parser;
use patchq::cli::output::Output;
use patchq::cli::Cli;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();
    match cli.run() {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            Output::pq_error(&e);
            ExitCode::from(e.exit_code())
        }
    }
}
