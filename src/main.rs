//! Kiln - Incremental build orchestrator for C/C++ projects

use std::process::ExitCode;

fn main() -> ExitCode {
    if let Err(e) = kiln_build::cli::run() {
        eprintln!("Error: {:#}", e);
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
