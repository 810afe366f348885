use std::process::ExitCode;

fn main() -> ExitCode {
    crewrate_cli::run()
}
