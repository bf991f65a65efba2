use std::io::{self, Write};
use std::process::ExitCode;

fn main() -> ExitCode {
    match binderd::run_daemon() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            writeln!(io::stderr(), "binderd: {error}").ok();
            ExitCode::FAILURE
        }
    }
}
