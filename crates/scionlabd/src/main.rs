//! Entry point for the SCIONLab stack supervisor.

use std::process::ExitCode;

fn main() -> ExitCode {
    match scionlabd::run_daemon() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            report(&error);
            ExitCode::FAILURE
        }
    }
}

#[expect(clippy::print_stderr, reason = "telemetry may not be installed yet")]
fn report(error: &scionlabd::LaunchError) {
    eprintln!("scionlabd: {error}");
}
