use std::process::ExitCode;

fn main() -> ExitCode {
    boqtrack_cli::logging::init();
    boqtrack_cli::run()
}
